use crate::solver::{DftSolver, FindParams, ScfResult};
use nalgebra::Vector3;
use tracing::debug;

/// Tolerance of the first inner solve of every ground-state search.
pub const INITIAL_TOL: f64 = 1e-2;

/// Plain ground-state driver
///
/// Owns the solver and the convergence parameters. This is the only place
/// that moves atoms inside the solver.
pub struct GroundState<S: DftSolver> {
    solver: S,
    potential_tol: f64,
    energy_tol: f64,
    maxiter: usize,
}

impl<S: DftSolver> GroundState<S> {
    pub fn new(solver: S, potential_tol: f64, energy_tol: f64, maxiter: usize) -> Self {
        GroundState {
            solver,
            potential_tol,
            energy_tol,
            maxiter,
        }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    fn find_params(&self) -> FindParams {
        FindParams {
            potential_tol: self.potential_tol,
            energy_tol: self.energy_tol,
            initial_tol: INITIAL_TOL,
            num_dft_iter: self.maxiter,
            write_state: false,
        }
    }

    /// Moves the atoms to `positions` (reduced coordinates, wrapped into the
    /// unit cell) and solves for the ground state.
    pub fn update_and_find(&mut self, positions: &[Vector3<f64>]) -> ScfResult {
        let wrapped: Vec<Vector3<f64>> = positions.iter().map(wrap_fractional).collect();
        self.solver.set_atom_positions(&wrapped);
        self.solver.update();

        let params = self.find_params();
        let result = self.solver.find(&params);
        debug!(
            "ground state: converged = {}, iterations = {}, E = {:.10}",
            result.converged, result.num_scf_iterations, result.energy.total
        );
        result
    }

    pub fn regenerate_density_potential(&mut self) {
        self.solver.generate_density_potential();
    }
}

/// Maps each component into `[0, 1)`.
pub fn wrap_fractional(x: &Vector3<f64>) -> Vector3<f64> {
    x.map(|c| {
        let w = c.rem_euclid(1.0);
        // rem_euclid rounds up to 1.0 for tiny negative inputs
        if w >= 1.0 {
            0.0
        } else {
            w
        }
    })
}
