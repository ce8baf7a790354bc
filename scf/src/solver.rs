//! Interface to the electronic-structure solver driven by the MD loop
//!
//! The solver owns the density, the potential and the occupied wave
//! functions. Everything in this crate talks to it through [`DftSolver`].

use crate::error::ScfError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use wavefunction::CoefficientArray;

/// Parameters of a single ground-state search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FindParams {
    pub potential_tol: f64,
    pub energy_tol: f64,
    /// Tolerance of the first inner iterative solve.
    pub initial_tol: f64,
    pub num_dft_iter: usize,
    pub write_state: bool,
}

/// Total energy and its named contributions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub total: f64,
    #[serde(flatten)]
    pub components: BTreeMap<String, f64>,
}

/// Outcome of a ground-state search, as reported by the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScfResult {
    pub converged: bool,
    pub num_scf_iterations: usize,
    pub energy: Energy,
    pub band_gap: f64,
    /// Solver specific details, passed through to the run log untouched.
    #[serde(default)]
    pub state: serde_json::Value,
}

/// Per-atom Cartesian forces split by physical origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceComponents {
    pub ewald: Vec<Vector3<f64>>,
    pub vloc: Vec<Vector3<f64>>,
    pub nonloc: Vec<Vector3<f64>>,
    pub core: Vec<Vector3<f64>>,
    pub scf_corr: Vec<Vector3<f64>>,
}

impl ForceComponents {
    pub fn zeros(num_atoms: usize) -> Self {
        let zero = vec![Vector3::zeros(); num_atoms];
        ForceComponents {
            ewald: zero.clone(),
            vloc: zero.clone(),
            nonloc: zero.clone(),
            core: zero.clone(),
            scf_corr: zero,
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.ewald.len()
    }

    /// Sum of all five contributions.
    pub fn total(&self) -> Vec<Vector3<f64>> {
        (0..self.num_atoms())
            .map(|i| {
                self.ewald[i] + self.vloc[i] + self.nonloc[i] + self.core[i] + self.scf_corr[i]
            })
            .collect()
    }

    /// Named views, in the order they are reported.
    pub fn named(&self) -> [(&'static str, &[Vector3<f64>]); 5] {
        [
            ("ewald", &self.ewald),
            ("vloc", &self.vloc),
            ("nonloc", &self.nonloc),
            ("core", &self.core),
            ("scf_corr", &self.scf_corr),
        ]
    }
}

/// Inner minimization scheme used by the solver for one ground state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerMinimizer {
    /// Diagonalization with density mixing.
    Scf,
    /// Direct minimization on the manifold of orthonormal wave functions.
    DirectMinimization,
}

impl FromStr for InnerMinimizer {
    type Err = ScfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scf" => Ok(Self::Scf),
            "ot" => Ok(Self::DirectMinimization),
            _ => Err(ScfError::config(format!("unknown solver: {}", s))),
        }
    }
}

impl fmt::Display for InnerMinimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InnerMinimizer::Scf => write!(f, "scf"),
            InnerMinimizer::DirectMinimization => write!(f, "ot"),
        }
    }
}

/// The DFT solver interface
///
/// Positions are always given in reduced (fractional) coordinates. The
/// lattice matrix holds the lattice vectors as columns.
pub trait DftSolver {
    fn lattice_vectors(&self) -> Matrix3<f64>;
    fn num_atoms(&self) -> usize;
    fn atom_positions(&self) -> Vec<Vector3<f64>>;
    /// A position list of the wrong length is ignored.
    fn set_atom_positions(&mut self, positions: &[Vector3<f64>]);

    /// Recompute everything that depends on the atomic positions.
    fn update(&mut self);

    /// Rebuild density and effective potential from the current wave functions.
    fn generate_density_potential(&mut self);

    /// Run the self-consistent loop from the current density and wave functions.
    fn find(&mut self, params: &FindParams) -> ScfResult;

    fn wave_functions(&self) -> &CoefficientArray;
    /// Coefficients whose block layout differs from the current one are
    /// ignored.
    fn set_wave_functions(&mut self, c: CoefficientArray);

    /// Force decomposition for the last ground state.
    fn forces(&self) -> ForceComponents;

    fn atomic_magnetic_moments(&self) -> Option<Vec<f64>> {
        None
    }

    fn select_minimizer(&mut self, minimizer: InnerMinimizer) -> Result<(), ScfError> {
        match minimizer {
            InnerMinimizer::Scf => Ok(()),
            other => Err(ScfError::config(format!(
                "solver does not support the '{}' minimizer",
                other
            ))),
        }
    }
}
