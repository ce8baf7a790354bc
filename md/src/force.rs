use crate::logger::RunLog;
use nalgebra::{Matrix3, Vector3};
use scf::{DftSolver, Energy, GroundStateStrategy, ScfError};
use serde_json::json;
use tracing::info;

/// Energy and forces at one geometry.
#[derive(Debug, Clone)]
pub struct ForceEvaluation {
    /// Forces in reduced coordinates
    pub forces: Vec<Vector3<f64>>,
    /// Total (Kohn-Sham) energy
    pub energy: f64,
    pub energy_components: Energy,
    pub magnetic_moments: Option<Vec<f64>>,
}

pub trait ForceProvider {
    /// Ground-state energy and forces at `positions` (reduced coordinates).
    fn compute_forces(
        &mut self,
        positions: &[Vector3<f64>],
        log: &mut RunLog,
    ) -> Result<ForceEvaluation, ScfError>;
}

/// Forces from a converged electronic ground state.
pub struct ForceEvaluator<S: DftSolver> {
    strategy: Box<dyn GroundStateStrategy<S>>,
    lattice: Matrix3<f64>,
    inverse_lattice: Matrix3<f64>,
}

impl<S: DftSolver> ForceEvaluator<S> {
    pub fn new(strategy: Box<dyn GroundStateStrategy<S>>) -> Result<Self, ScfError> {
        let lattice = strategy.solver().lattice_vectors();
        let inverse_lattice = lattice
            .try_inverse()
            .ok_or_else(|| ScfError::config("lattice vectors are linearly dependent"))?;
        Ok(ForceEvaluator {
            strategy,
            lattice,
            inverse_lattice,
        })
    }

    /// Lattice vectors as columns.
    pub fn lattice(&self) -> &Matrix3<f64> {
        &self.lattice
    }

    pub fn strategy(&self) -> &dyn GroundStateStrategy<S> {
        self.strategy.as_ref()
    }
}

impl<S: DftSolver> ForceProvider for ForceEvaluator<S> {
    fn compute_forces(
        &mut self,
        positions: &[Vector3<f64>],
        log: &mut RunLog,
    ) -> Result<ForceEvaluation, ScfError> {
        let result = self.strategy.predict_and_solve(positions)?;
        if !result.converged {
            return Err(ScfError::Convergence {
                iterations: result.num_scf_iterations,
            });
        }

        log.insert(json!({
            "nscf": result.num_scf_iterations,
            "band_gap": result.band_gap,
            "scf_dict": &result,
        }));
        info!("band_gap: {:.8}", result.band_gap);
        info!("nscf: {}", result.num_scf_iterations);

        let solver = self.strategy.solver();
        let components = solver.forces();
        let named: serde_json::Map<String, serde_json::Value> = components
            .named()
            .iter()
            .map(|(name, forces)| (name.to_string(), json!(forces)))
            .collect();
        log.insert(json!({ "forces": named }));

        let forces = components
            .total()
            .iter()
            .map(|f| self.inverse_lattice * f)
            .collect();

        Ok(ForceEvaluation {
            forces,
            energy: result.energy.total,
            energy_components: result.energy,
            magnetic_moments: solver.atomic_magnetic_moments(),
        })
    }
}
