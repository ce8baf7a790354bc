use super::coefficients::{dissipation_coefficients, niklasson_coefficients};
use super::{GroundStateStrategy, Method};
use crate::error::ScfError;
use crate::ground_state::GroundState;
use crate::history::History;
use crate::solver::{DftSolver, ScfResult};
use nalgebra::Vector3;
use tracing::debug;
use wavefunction::{align_subspace, orthogonalize, CoefficientArray};

/// Wave-function extended Lagrangian propagation with dissipation
///
/// Steneteg et al., Phys. Rev. B 82, 075110 (2010);
/// Niklasson et al., J. Chem. Phys. 130, 214109 (2009).
///
/// The history holds the propagated auxiliary wave functions, not the
/// converged ones.
pub struct NiklassonExtrapolation<S: DftSolver> {
    ground_state: GroundState<S>,
    order: usize,
    history: History<CoefficientArray>,
}

impl<S: DftSolver> NiklassonExtrapolation<S> {
    pub fn new(ground_state: GroundState<S>, order: usize) -> Result<Self, ScfError> {
        niklasson_coefficients(order)?;
        Ok(NiklassonExtrapolation {
            ground_state,
            order,
            history: History::with_capacity(order + 1),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn history(&self) -> &History<CoefficientArray> {
        &self.history
    }

    /// `Cp = 2·H[-1] - H[-2] + κ·(C̃ - H[-1]) + a·Σ_i c[i]·H[-(i+1)]`,
    /// `C̃` being the current solution aligned to `H[-1]`.
    fn predict(&self) -> Result<Option<CoefficientArray>, ScfError> {
        let (Some(last), Some(second_last)) = (self.history.newest(0), self.history.newest(1))
        else {
            return Ok(None);
        };
        let n = self.order.min(self.history.len() - 1);
        let coeffs = dissipation_coefficients(n)?;

        let current = self.ground_state.solver().wave_functions();
        let aligned = align_subspace(current, last)?;

        let mut cp = last.scale(2.0);
        cp.add_scaled(-1.0, second_last);
        cp.add_scaled(coeffs.kappa, &(&aligned - last));
        for (past, &c) in self.history.iter().rev().zip(coeffs.c) {
            cp.add_scaled(coeffs.alpha * c as f64, past);
        }
        debug!(
            "Niklasson step with n = {}, kappa = {}, displacement {:.5e}",
            n,
            coeffs.kappa,
            (&cp - last).norm()
        );
        Ok(Some(cp))
    }
}

impl<S: DftSolver> GroundStateStrategy<S> for NiklassonExtrapolation<S> {
    fn predict_and_solve(&mut self, positions: &[Vector3<f64>]) -> Result<ScfResult, ScfError> {
        if let Some(cp) = self.predict()? {
            let cp = orthogonalize(&cp)?;
            self.ground_state.solver_mut().set_wave_functions(cp.clone());
            let result = self.ground_state.update_and_find(positions);
            if result.converged {
                self.history.push(cp);
            }
            return Ok(result);
        }

        let result = self.ground_state.update_and_find(positions);
        if result.converged {
            let c = self.ground_state.solver().wave_functions();
            let stored = match self.history.newest(0) {
                Some(previous) => align_subspace(c, previous)?,
                None => c.clone(),
            };
            self.history.push(stored);
        }
        Ok(result)
    }

    fn ground_state(&self) -> &GroundState<S> {
        &self.ground_state
    }

    fn ground_state_mut(&mut self) -> &mut GroundState<S> {
        &mut self.ground_state
    }

    fn method(&self) -> Method {
        Method::Niklasson
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }
}
