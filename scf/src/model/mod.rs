//! Self-consistent tight-binding model
//!
//! One orbital per atom with distance-dependent hopping
//! `H0_ij = -t·exp(-r_ij/λ)`, an on-site mean-field interaction and a
//! Lennard-Jones repulsion between the ions. With two spin channels the
//! on-site term is spin resolved, `H_σ = H0 + U·diag(n_{-σ})`; a single
//! channel interacts with its own density. Small enough to
//! diagonalize densely, but it has a real self-consistency loop, a
//! variational energy and Hellmann-Feynman forces, which is everything the
//! MD driver needs from a solver.

mod pair;

pub use pair::{minimum_image, LennardJones};

use crate::error::ScfError;
use crate::solver::{DftSolver, Energy, FindParams, ForceComponents, InnerMinimizer, ScfResult};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use wavefunction::{orthogonalize, BlockKey, CoefficientArray, LinalgError};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelParams {
    /// Hopping amplitude `t`
    #[serde(default = "default_hopping")]
    pub hopping: f64,
    /// Decay length `λ` of the hopping
    #[serde(default = "default_decay_length")]
    pub decay_length: f64,
    /// On-site interaction `U`
    #[serde(default = "default_interaction")]
    pub interaction: f64,
    /// Occupied bands per spin channel; one entry per channel
    pub bands: Vec<usize>,
    #[serde(default = "default_lj_epsilon")]
    pub lj_epsilon: f64,
    #[serde(default = "default_lj_sigma")]
    pub lj_sigma: f64,
    /// Linear density mixing parameter of the SCF minimizer
    #[serde(default = "default_mixing")]
    pub mixing: f64,
}

fn default_hopping() -> f64 {
    1.0
}
fn default_decay_length() -> f64 {
    1.0
}
fn default_interaction() -> f64 {
    0.5
}
fn default_lj_epsilon() -> f64 {
    0.01
}
fn default_lj_sigma() -> f64 {
    1.0
}
fn default_mixing() -> f64 {
    0.5
}

impl ModelParams {
    pub fn new(bands: Vec<usize>) -> Self {
        ModelParams {
            hopping: default_hopping(),
            decay_length: default_decay_length(),
            interaction: default_interaction(),
            bands,
            lj_epsilon: default_lj_epsilon(),
            lj_sigma: default_lj_sigma(),
            mixing: default_mixing(),
        }
    }

    pub fn validate(&self, num_atoms: usize) -> Result<(), ScfError> {
        if self.bands.is_empty() || self.bands.len() > 2 {
            return Err(ScfError::config("model needs one or two spin channels"));
        }
        if self.bands.iter().any(|&nb| nb == 0 || nb > num_atoms) {
            return Err(ScfError::config(format!(
                "occupied bands {:?} must be between 1 and the number of atoms ({})",
                self.bands, num_atoms
            )));
        }
        if !(self.decay_length > 0.0) {
            return Err(ScfError::config("decay_length must be positive"));
        }
        if !(self.mixing > 0.0 && self.mixing <= 1.0) {
            return Err(ScfError::config("mixing must be in (0, 1]"));
        }
        if !(self.lj_sigma > 0.0) || self.lj_epsilon < 0.0 {
            return Err(ScfError::config("invalid Lennard-Jones parameters"));
        }
        Ok(())
    }
}

/// Outcome of one inner minimization.
struct Progress {
    converged: bool,
    iterations: usize,
    energy: Energy,
    band_gap: f64,
    residual: f64,
}

pub struct ModelSolver {
    params: ModelParams,
    /// Lattice vectors as columns
    lattice: Matrix3<f64>,
    positions: Vec<Vector3<f64>>,
    hopping: DMatrix<f64>,
    /// Site occupations, one vector per spin channel
    occupations: Vec<DVector<f64>>,
    wave_functions: CoefficientArray,
    minimizer: InnerMinimizer,
    pair: LennardJones,
}

impl ModelSolver {
    /// Builds the model at reduced `positions`, starting from the
    /// non-interacting ground state.
    pub fn new(
        lattice: Matrix3<f64>,
        positions: Vec<Vector3<f64>>,
        params: ModelParams,
    ) -> Result<Self, ScfError> {
        params.validate(positions.len())?;
        if lattice.try_inverse().is_none() {
            return Err(ScfError::config("lattice vectors are linearly dependent"));
        }

        let n = positions.len();
        let pair = LennardJones::new(params.lj_epsilon, params.lj_sigma);
        let mut solver = ModelSolver {
            params,
            lattice,
            positions,
            hopping: DMatrix::zeros(n, n),
            occupations: Vec::new(),
            wave_functions: CoefficientArray::new(),
            minimizer: InnerMinimizer::Scf,
            pair,
        };
        solver.update();
        solver.wave_functions = solver.initial_guess();
        solver.generate_density_potential();
        Ok(solver)
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn minimizer(&self) -> InnerMinimizer {
        self.minimizer
    }

    fn num_sites(&self) -> usize {
        self.positions.len()
    }

    fn build_hopping(&self) -> DMatrix<f64> {
        let n = self.num_sites();
        let mut h = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let r = minimum_image(&self.lattice, &self.positions[i], &self.positions[j]).norm();
                let t = -self.params.hopping * (-r / self.params.decay_length).exp();
                h[(i, j)] = t;
                h[(j, i)] = t;
            }
        }
        h
    }

    /// Channel whose density shifts the on-site levels of `spin`.
    fn partner(&self, spin: usize) -> usize {
        if self.params.bands.len() == 2 {
            1 - spin
        } else {
            spin
        }
    }

    fn effective_hamiltonians(&self, occupations: &[DVector<f64>]) -> Vec<DMatrix<f64>> {
        (0..occupations.len())
            .map(|spin| {
                let shift = &occupations[self.partner(spin)] * self.params.interaction;
                &self.hopping + DMatrix::from_diagonal(&shift)
            })
            .collect()
    }

    /// Lowest eigenvectors of each channel's Hamiltonian, one block per channel.
    fn aufbau(&self, vectors: &[DMatrix<f64>]) -> CoefficientArray {
        self.params
            .bands
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(spin, (&nb, v))| {
                let block = v.columns(0, nb).map(Complex64::from);
                (BlockKey::new(0, spin), block)
            })
            .collect()
    }

    /// Non-interacting levels for the first channel; the second one is
    /// filled in the field of the first, which breaks the spin symmetry.
    fn initial_guess(&self) -> CoefficientArray {
        let mut c = CoefficientArray::new();
        let mut first: Option<DVector<f64>> = None;
        for (spin, &nb) in self.params.bands.iter().enumerate() {
            let h = match &first {
                Some(n) => &self.hopping + DMatrix::from_diagonal(&(n * self.params.interaction)),
                None => self.hopping.clone(),
            };
            let (_, vectors) = sorted_eigen(&h);
            let block = vectors.columns(0, nb).map(Complex64::from);
            if first.is_none() {
                first = Some(block_occupations(&block));
            }
            c.insert(BlockKey::new(0, spin), block);
        }
        c
    }

    fn energy(&self, c: &CoefficientArray, occupations: &[DVector<f64>]) -> Energy {
        let h0 = self.hopping.map(Complex64::from);
        let band: f64 = c
            .iter()
            .map(|(_, block)| (block.adjoint() * &h0 * block).trace().re)
            .sum();
        let interaction = 0.5
            * self.params.interaction
            * occupations
                .iter()
                .enumerate()
                .map(|(spin, n)| n.dot(&occupations[self.partner(spin)]))
                .sum::<f64>();
        let ion_ion = self.pair.energy(&self.lattice, &self.positions);

        let components = BTreeMap::from([
            ("band".to_string(), band),
            ("interaction".to_string(), interaction),
            ("ion_ion".to_string(), ion_ion),
        ]);
        Energy {
            total: band + interaction + ion_ion,
            components,
        }
    }

    /// Gap between the highest occupied and lowest unoccupied level over
    /// all channels, zero for a metal or a full band.
    fn band_gap(&self, eigenvalues: &[Vec<f64>]) -> f64 {
        let homo = self
            .params
            .bands
            .iter()
            .zip(eigenvalues)
            .map(|(&nb, levels)| levels[nb - 1])
            .fold(f64::NEG_INFINITY, f64::max);
        let lumo = self
            .params
            .bands
            .iter()
            .zip(eigenvalues)
            .filter_map(|(&nb, levels)| levels.get(nb).copied())
            .fold(f64::INFINITY, f64::min);
        if lumo.is_finite() {
            (lumo - homo).max(0.0)
        } else {
            0.0
        }
    }

    /// Diagonalization with linear density mixing.
    fn minimize_scf(&mut self, params: &FindParams) -> Progress {
        let mut occupations = self.occupations.clone();
        let mut previous = self.energy(&self.wave_functions, &occupations).total;
        let mut progress = Progress {
            converged: false,
            iterations: 0,
            energy: Energy::default(),
            band_gap: 0.0,
            residual: f64::INFINITY,
        };

        for iteration in 1..=params.num_dft_iter {
            let (eigenvalues, vectors): (Vec<_>, Vec<_>) = self
                .effective_hamiltonians(&occupations)
                .iter()
                .map(sorted_eigen)
                .unzip();
            let c = self.aufbau(&vectors);
            let n_out = channel_occupations(&c);
            let energy = self.energy(&c, &n_out);

            let residual = max_deviation(&n_out, &occupations);
            let de = (energy.total - previous).abs();
            debug!(
                "scf iteration {}: E = {:.12}, dE = {:.3e}, residual = {:.3e}",
                iteration, energy.total, de, residual
            );

            self.wave_functions = c;
            previous = energy.total;
            progress = Progress {
                converged: de < params.energy_tol && residual < params.potential_tol,
                iterations: iteration,
                band_gap: self.band_gap(&eigenvalues),
                energy,
                residual,
            };
            if progress.converged {
                occupations = n_out;
                break;
            }
            let mixing = self.params.mixing;
            occupations = occupations
                .iter()
                .zip(&n_out)
                .map(|(n_in, n_out)| n_in * (1.0 - mixing) + n_out * mixing)
                .collect();
        }

        self.occupations = occupations;
        progress
    }

    /// Projected steepest descent on the occupied subspace with Loewdin
    /// re-orthogonalization after every step.
    fn minimize_direct(&mut self, params: &FindParams) -> Result<Progress, LinalgError> {
        let mut c = orthogonalize(&self.wave_functions)?;
        let mut occupations = channel_occupations(&c);
        let mut previous = self.energy(&c, &occupations).total;
        let mut progress = Progress {
            converged: false,
            iterations: 0,
            energy: Energy::default(),
            band_gap: 0.0,
            residual: f64::INFINITY,
        };

        for iteration in 1..=params.num_dft_iter {
            let hamiltonians = self.effective_hamiltonians(&occupations);
            let step = 0.5
                / hamiltonians
                    .iter()
                    .map(gershgorin_bound)
                    .fold(f64::EPSILON, f64::max);
            let hc: Vec<DMatrix<Complex64>> =
                hamiltonians.iter().map(|h| h.map(Complex64::from)).collect();

            // G_σ = H_σ·C_σ - C_σ·(C_σᴴ·H_σ·C_σ)
            let gradient = c.map_blocks(|key, block| {
                let h_block = &hc[key.spin] * block;
                let projected = block * (block.adjoint() * &h_block);
                h_block - projected
            });
            let mut trial = c.clone();
            trial.add_scaled(-step, &gradient);
            let c_new = orthogonalize(&trial)?;

            let n_new = channel_occupations(&c_new);
            let energy = self.energy(&c_new, &n_new);
            let residual = max_deviation(&n_new, &occupations);
            let de = (energy.total - previous).abs();
            debug!(
                "direct minimization iteration {}: E = {:.12}, dE = {:.3e}, |grad| = {:.3e}",
                iteration,
                energy.total,
                de,
                gradient.norm()
            );

            c = c_new;
            occupations = n_new;
            previous = energy.total;
            progress = Progress {
                converged: de < params.energy_tol && residual < params.potential_tol,
                iterations: iteration,
                energy,
                band_gap: 0.0,
                residual,
            };
            if progress.converged {
                break;
            }
        }

        let eigenvalues: Vec<Vec<f64>> = self
            .effective_hamiltonians(&occupations)
            .iter()
            .map(|h| sorted_eigen(h).0)
            .collect();
        progress.band_gap = self.band_gap(&eigenvalues);
        self.wave_functions = c;
        self.occupations = occupations;
        Ok(progress)
    }

    pub fn magnetic_moments(&self) -> Option<Vec<f64>> {
        if self.params.bands.len() != 2 {
            return None;
        }
        let n = self.num_sites();
        let channel = |spin: usize| {
            self.wave_functions
                .get(&BlockKey::new(0, spin))
                .map(block_occupations)
                .unwrap_or_else(|| DVector::zeros(n))
        };
        let moments = channel(0) - channel(1);
        Some(moments.iter().copied().collect())
    }
}

impl DftSolver for ModelSolver {
    fn lattice_vectors(&self) -> Matrix3<f64> {
        self.lattice
    }

    fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    fn atom_positions(&self) -> Vec<Vector3<f64>> {
        self.positions.clone()
    }

    fn set_atom_positions(&mut self, positions: &[Vector3<f64>]) {
        if positions.len() != self.positions.len() {
            warn!(
                "ignoring {} positions for a model of {} atoms",
                positions.len(),
                self.positions.len()
            );
            return;
        }
        self.positions = positions.to_vec();
    }

    fn update(&mut self) {
        self.hopping = self.build_hopping();
    }

    fn generate_density_potential(&mut self) {
        self.occupations = channel_occupations(&self.wave_functions);
    }

    fn find(&mut self, params: &FindParams) -> ScfResult {
        let progress = match self.minimizer {
            InnerMinimizer::Scf => self.minimize_scf(params),
            InnerMinimizer::DirectMinimization => match self.minimize_direct(params) {
                Ok(progress) => progress,
                Err(err) => {
                    warn!("direct minimization broke down: {}", err);
                    Progress {
                        converged: false,
                        iterations: params.num_dft_iter,
                        energy: self.energy(&self.wave_functions, &self.occupations),
                        band_gap: 0.0,
                        residual: f64::INFINITY,
                    }
                }
            },
        };

        ScfResult {
            converged: progress.converged,
            num_scf_iterations: progress.iterations,
            energy: progress.energy,
            band_gap: progress.band_gap,
            state: json!({
                "minimizer": self.minimizer.to_string(),
                "density_residual": progress.residual,
            }),
        }
    }

    fn wave_functions(&self) -> &CoefficientArray {
        &self.wave_functions
    }

    fn set_wave_functions(&mut self, c: CoefficientArray) {
        if !c.same_layout(&self.wave_functions) {
            warn!("ignoring wave functions that do not match the model layout");
            return;
        }
        self.wave_functions = c;
    }

    fn forces(&self) -> ForceComponents {
        let n = self.num_sites();
        let mut forces = ForceComponents::zeros(n);

        let mut density = DMatrix::<Complex64>::zeros(n, n);
        for (_, block) in &self.wave_functions {
            density += block * block.adjoint();
        }

        let t = self.params.hopping;
        let lambda = self.params.decay_length;
        for i in 0..n {
            for j in (i + 1)..n {
                let rij = minimum_image(&self.lattice, &self.positions[i], &self.positions[j]);
                let r = rij.norm();
                // dH0_ij/dr
                let dh = t / lambda * (-r / lambda).exp();
                let fij = rij * (2.0 * density[(i, j)].re * dh / r);
                forces.nonloc[i] -= fij;
                forces.nonloc[j] += fij;
            }
        }

        forces.ewald = self.pair.forces(&self.lattice, &self.positions);
        forces
    }

    fn atomic_magnetic_moments(&self) -> Option<Vec<f64>> {
        self.magnetic_moments()
    }

    fn select_minimizer(&mut self, minimizer: InnerMinimizer) -> Result<(), ScfError> {
        self.minimizer = minimizer;
        Ok(())
    }
}

/// Eigenpairs of a real symmetric matrix in ascending order.
fn sorted_eigen(h: &DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let eigen = h.clone().symmetric_eigen();
    let order: Vec<usize> = (0..eigen.eigenvalues.len())
        .sorted_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]))
        .collect();
    let values = order.iter().map(|&k| eigen.eigenvalues[k]).collect();
    let columns: Vec<DVector<f64>> = order
        .iter()
        .map(|&k| eigen.eigenvectors.column(k).into_owned())
        .collect();
    (values, DMatrix::from_columns(&columns))
}

fn block_occupations(block: &DMatrix<Complex64>) -> DVector<f64> {
    DVector::from_iterator(
        block.nrows(),
        block.row_iter().map(|row| row.norm_squared()),
    )
}

/// Site occupations of every block, in block order.
fn channel_occupations(c: &CoefficientArray) -> Vec<DVector<f64>> {
    c.iter().map(|(_, block)| block_occupations(block)).collect()
}

fn max_deviation(a: &[DVector<f64>], b: &[DVector<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).amax())
        .fold(0.0, f64::max)
}

fn gershgorin_bound(h: &DMatrix<f64>) -> f64 {
    h.row_iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(f64::EPSILON, f64::max)
}
