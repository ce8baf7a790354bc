use nalgebra::{Matrix3, Vector3};

/// Cartesian separation `r_a - r_b` under the minimum-image convention,
/// applied in reduced coordinates.
pub fn minimum_image(lattice: &Matrix3<f64>, a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
    let d = (a - b).map(|x| x - x.round());
    lattice * d
}

/// Lennard-Jones ion-ion repulsion in a periodic cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LennardJones {
    pub epsilon: f64,
    pub sigma: f64,
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64) -> Self {
        LennardJones { epsilon, sigma }
    }

    fn pair_energy(&self, r2: f64) -> f64 {
        let inv_r2 = self.sigma * self.sigma / r2;
        let inv_r6 = inv_r2 * inv_r2 * inv_r2;
        4.0 * self.epsilon * (inv_r6 * inv_r6 - inv_r6)
    }

    pub fn energy(&self, lattice: &Matrix3<f64>, positions: &[Vector3<f64>]) -> f64 {
        let n = positions.len();
        let mut energy = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let rij = minimum_image(lattice, &positions[i], &positions[j]);
                energy += self.pair_energy(rij.norm_squared());
            }
        }
        energy
    }

    /// Cartesian forces for reduced `positions`.
    pub fn forces(&self, lattice: &Matrix3<f64>, positions: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let n = positions.len();
        let mut forces = vec![Vector3::zeros(); n];
        let sigma2 = self.sigma * self.sigma;

        for i in 0..n {
            for j in (i + 1)..n {
                let rij = minimum_image(lattice, &positions[i], &positions[j]);
                let r2 = rij.norm_squared();

                let inv_r2 = sigma2 / r2;
                let inv_r6 = inv_r2 * inv_r2 * inv_r2;
                let f_mag = 48.0 * self.epsilon * inv_r6 * (inv_r6 - 0.5) / r2;
                let fij = rij * f_mag;

                forces[i] += fij;
                forces[j] -= fij;
            }
        }

        forces
    }
}
