use super::{GroundStateStrategy, Method};
use crate::error::ScfError;
use crate::ground_state::GroundState;
use crate::solver::{DftSolver, ScfResult};
use nalgebra::Vector3;

/// No extrapolation: every step starts from whatever the solver holds.
pub struct PlainGroundState<S: DftSolver> {
    ground_state: GroundState<S>,
}

impl<S: DftSolver> PlainGroundState<S> {
    pub fn new(ground_state: GroundState<S>) -> Self {
        PlainGroundState { ground_state }
    }
}

impl<S: DftSolver> GroundStateStrategy<S> for PlainGroundState<S> {
    fn predict_and_solve(&mut self, positions: &[Vector3<f64>]) -> Result<ScfResult, ScfError> {
        Ok(self.ground_state.update_and_find(positions))
    }

    fn ground_state(&self) -> &GroundState<S> {
        &self.ground_state
    }

    fn ground_state_mut(&mut self) -> &mut GroundState<S> {
        &mut self.ground_state
    }

    fn method(&self) -> Method {
        Method::Plain
    }

    fn history_len(&self) -> usize {
        0
    }
}
