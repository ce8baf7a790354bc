use super::coefficients::kolafa_coefficients;
use super::{GroundStateStrategy, Method};
use crate::error::ScfError;
use crate::ground_state::GroundState;
use crate::history::History;
use crate::solver::{DftSolver, ScfResult};
use nalgebra::Vector3;
use tracing::debug;
use wavefunction::{align_subspace, orthogonalize, CoefficientArray};

/// Time-reversible always-stable predictor-corrector on wave functions
///
/// Kolafa, J. Comput. Chem. 25, 335 (2004), with the subspace alignment of
/// Steneteg et al., Phys. Rev. B 82, 075110 (2010), Eq. (11).
pub struct KolafaExtrapolation<S: DftSolver> {
    ground_state: GroundState<S>,
    order: usize,
    coefficients: Vec<f64>,
    /// Corrector weight `K / (2K - 1)`.
    omega: f64,
    history: History<CoefficientArray>,
}

impl<S: DftSolver> KolafaExtrapolation<S> {
    pub fn new(ground_state: GroundState<S>, order: usize) -> Result<Self, ScfError> {
        let coefficients = kolafa_coefficients(order)?;
        Ok(Self::with_coefficients(ground_state, order, coefficients))
    }

    pub(super) fn with_coefficients(
        ground_state: GroundState<S>,
        order: usize,
        coefficients: Vec<f64>,
    ) -> Self {
        debug!("Kolafa coefficients: {:?}", coefficients);
        KolafaExtrapolation {
            ground_state,
            order,
            coefficients,
            omega: order as f64 / (2 * order - 1) as f64,
            history: History::with_capacity(order + 1),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn history(&self) -> &History<CoefficientArray> {
        &self.history
    }

    /// `Cp = Σ_j B[j] · H[-(j+1)] · (H[-(j+1)]ᴴ · H[-1])`, or `None` while the
    /// history is still filling up.
    fn predict(&self) -> Option<CoefficientArray> {
        if !self.history.is_full() {
            return None;
        }
        let latest = self.history.newest(0)?;
        let mut cp = latest.zeros_like();
        for (past, &b) in self.history.iter().rev().zip(&self.coefficients) {
            cp.add_scaled(b, &past.dot(&past.adjoint().dot(latest)));
        }
        Some(cp)
    }
}

impl<S: DftSolver> GroundStateStrategy<S> for KolafaExtrapolation<S> {
    fn predict_and_solve(&mut self, positions: &[Vector3<f64>]) -> Result<ScfResult, ScfError> {
        let Some(cp) = self.predict() else {
            let result = self.ground_state.update_and_find(positions);
            if result.converged {
                let c = self.ground_state.solver().wave_functions().clone();
                self.history.push(c);
            }
            return Ok(result);
        };

        let cp = orthogonalize(&cp)?;
        self.ground_state.solver_mut().set_wave_functions(cp.clone());
        self.ground_state.regenerate_density_potential();

        let result = self.ground_state.update_and_find(positions);
        if !result.converged {
            return Ok(result);
        }

        let c = self.ground_state.solver().wave_functions();
        let aligned = align_subspace(c, &cp)?;
        debug!("Kolafa alignment displacement: {:.5e}", (&aligned - c).norm());

        let mut corrected = aligned.scale(self.omega);
        corrected.add_scaled(1.0 - self.omega, &cp);
        self.ground_state.solver_mut().set_wave_functions(aligned);
        self.history.push(corrected);

        Ok(result)
    }

    fn ground_state(&self) -> &GroundState<S> {
        &self.ground_state
    }

    fn ground_state_mut(&mut self) -> &mut GroundState<S> {
        &mut self.ground_state
    }

    fn method(&self) -> Method {
        Method::Kolafa
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }
}
