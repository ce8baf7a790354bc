use crate::force::{ForceEvaluation, ForceProvider};
use crate::logger::RunLog;
use itertools::izip;
use nalgebra::{Matrix3, Vector3};
use scf::ScfError;
use serde_json::json;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VerletOptions {
    /// Remove the centre-of-mass momentum after every step
    pub zero_momentum: bool,
}

/// State after one velocity-Verlet step.
#[derive(Debug, Clone)]
pub struct VerletStep {
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub forces: Vec<Vector3<f64>>,
    pub evaluation: ForceEvaluation,
}

/// Advances positions `x` and velocities `v` by one step of length `dt`.
///
/// Positions, velocities and forces are in reduced coordinates; `forces`
/// are the ones at `x`.
#[allow(clippy::too_many_arguments)]
pub fn velocity_verlet<P: ForceProvider + ?Sized>(
    x: &[Vector3<f64>],
    v: &[Vector3<f64>],
    forces: &[Vector3<f64>],
    dt: f64,
    masses: &[f64],
    provider: &mut P,
    options: VerletOptions,
    log: &mut RunLog,
) -> Result<VerletStep, ScfError> {
    let positions: Vec<Vector3<f64>> = izip!(x, v, forces, masses)
        .map(|(x, v, f, &m)| x + v * dt + 0.5 * f / m * dt * dt)
        .collect();

    let start = Instant::now();
    let evaluation = provider.compute_forces(&positions, log)?;
    let t_evalforce = start.elapsed().as_secs_f64();

    let mut velocities: Vec<Vector3<f64>> = izip!(v, forces, &evaluation.forces, masses)
        .map(|(v, f, fn_, &m)| v + 0.5 / m * (f + fn_) * dt)
        .collect();

    let momentum: Vector3<f64> = velocities.iter().zip(masses).map(|(v, &m)| v * m).sum();
    info!(
        "momentum: [{:.6e}, {:.6e}, {:.6e}]",
        momentum.x, momentum.y, momentum.z
    );
    if options.zero_momentum {
        let total_mass: f64 = masses.iter().sum();
        let drift = momentum / total_mass;
        for v in &mut velocities {
            *v -= drift;
        }
    }

    let mut entry = json!({
        "t_evalforce": t_evalforce,
        "momentum": momentum,
        "energy_components": &evaluation.energy_components,
        "F": &evaluation.forces,
    });
    if let Some(moments) = &evaluation.magnetic_moments {
        entry["atomic_mag_mom"] = json!(moments);
    }
    log.insert(entry);

    Ok(VerletStep {
        positions,
        forces: evaluation.forces.clone(),
        velocities,
        evaluation,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct MdSettings {
    pub steps: usize,
    pub dt: f64,
    pub options: VerletOptions,
}

/// One point of the trajectory, Cartesian.
#[derive(Debug, Clone)]
pub struct Frame {
    pub step: usize,
    pub time: f64,
    pub positions: Vec<Vector3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub kinetic_energy: f64,
    pub potential_energy: f64,
    pub total_energy: f64,
}

/// Runs `settings.steps` velocity-Verlet steps from reduced `positions` and
/// `velocities`. Stops at the first failed force evaluation.
pub fn run_md<P: ForceProvider + ?Sized>(
    provider: &mut P,
    lattice: &Matrix3<f64>,
    positions: Vec<Vector3<f64>>,
    velocities: Vec<Vector3<f64>>,
    masses: &[f64],
    settings: &MdSettings,
    log: &mut RunLog,
) -> Result<Vec<Frame>, ScfError> {
    if positions.len() != masses.len() || velocities.len() != masses.len() {
        return Err(ScfError::config(format!(
            "{} positions, {} velocities and {} masses",
            positions.len(),
            velocities.len(),
            masses.len()
        )));
    }

    let mut x = positions;
    let mut v = velocities;
    let mut forces = provider.compute_forces(&x, log)?.forces;
    let mut frames = Vec::with_capacity(settings.steps);

    for i in 0..settings.steps {
        info!("iteration: {}", i);
        let step = velocity_verlet(
            &x,
            &v,
            &forces,
            settings.dt,
            masses,
            provider,
            settings.options,
            log,
        )?;

        let displacement = x
            .iter()
            .zip(&step.positions)
            .map(|(a, b)| (b - a).norm_squared())
            .sum::<f64>()
            .sqrt();
        info!("displacement: {:.2e}", displacement);

        let cartesian_v = to_cartesian(lattice, &step.velocities);
        let cartesian_x = to_cartesian(lattice, &step.positions);
        let ekin = kinetic_energy(&cartesian_v, masses);
        let eks = step.evaluation.energy;
        let time = (i + 1) as f64 * settings.dt;
        info!(
            "Etot: {:10.8}, Ekin: {:10.8}, Eks: {:10.8}",
            eks + ekin,
            ekin,
            eks
        );
        log.insert(json!({
            "i": i,
            "v": &cartesian_v,
            "x": &cartesian_x,
            "E": eks + ekin,
            "EKS": eks,
            "ekin": ekin,
            "t": time,
        }));

        frames.push(Frame {
            step: i,
            time,
            positions: cartesian_x,
            velocities: cartesian_v,
            kinetic_energy: ekin,
            potential_energy: eks,
            total_energy: eks + ekin,
        });
        x = step.positions;
        v = step.velocities;
        forces = step.forces;
    }

    Ok(frames)
}

pub fn to_cartesian(lattice: &Matrix3<f64>, reduced: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    reduced.iter().map(|r| lattice * r).collect()
}

/// `None` for a singular lattice.
pub fn from_cartesian(lattice: &Matrix3<f64>, cartesian: &[Vector3<f64>]) -> Option<Vec<Vector3<f64>>> {
    let inverse = lattice.try_inverse()?;
    Some(cartesian.iter().map(|c| inverse * c).collect())
}

pub fn kinetic_energy(velocities: &[Vector3<f64>], masses: &[f64]) -> f64 {
    velocities
        .iter()
        .zip(masses)
        .map(|(v, &m)| 0.5 * m * v.norm_squared())
        .sum()
}
