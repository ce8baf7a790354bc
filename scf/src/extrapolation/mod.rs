//! Ground-state strategies: plain SCF and wave-function extrapolation
//!
//! A strategy owns the ground-state driver and whatever wave-function
//! history it needs. The MD loop only sees [`GroundStateStrategy`].

mod coefficients;
mod kolafa;
mod niklasson;
mod plain;

pub use coefficients::{
    binomial, dissipation_coefficients, kolafa_coefficients, niklasson_coefficients,
    NiklassonCoefficients, MAX_NIKLASSON_ORDER, MIN_NIKLASSON_ORDER,
};
pub use kolafa::KolafaExtrapolation;
pub use niklasson::NiklassonExtrapolation;
pub use plain::PlainGroundState;

use crate::config::GroundStateConfig;
use crate::error::ScfError;
use crate::ground_state::GroundState;
use crate::solver::{DftSolver, InnerMinimizer, ScfResult};
use nalgebra::Vector3;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Plain,
    Kolafa,
    Niklasson,
}

impl FromStr for Method {
    type Err = ScfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "kolafa" => Ok(Self::Kolafa),
            "niklasson_wf" => Ok(Self::Niklasson),
            _ => Err(ScfError::config(format!(
                "invalid extrapolation method: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Plain => write!(f, "plain"),
            Method::Kolafa => write!(f, "kolafa"),
            Method::Niklasson => write!(f, "niklasson_wf"),
        }
    }
}

pub trait GroundStateStrategy<S: DftSolver> {
    /// Predicts a starting guess for `positions` (reduced coordinates) and
    /// solves for the ground state there.
    ///
    /// A non-converged solve is reported through `ScfResult::converged`,
    /// not as an error; in that case the history is left untouched.
    fn predict_and_solve(&mut self, positions: &[Vector3<f64>]) -> Result<ScfResult, ScfError>;

    fn ground_state(&self) -> &GroundState<S>;
    fn ground_state_mut(&mut self) -> &mut GroundState<S>;

    fn method(&self) -> Method;

    /// Number of stored wave functions.
    fn history_len(&self) -> usize;

    fn solver(&self) -> &S {
        self.ground_state().solver()
    }

    fn solver_mut(&mut self) -> &mut S {
        self.ground_state_mut().solver_mut()
    }
}

/// Builds the strategy described by `config` around `solver`.
///
/// Everything in `config` is validated before the solver is touched; the
/// inner-minimizer choice is applied last.
pub fn make_strategy<S: DftSolver + 'static>(
    mut solver: S,
    config: &GroundStateConfig,
) -> Result<Box<dyn GroundStateStrategy<S>>, ScfError> {
    config.validate()?;
    let method = Method::from_str(&config.method.kind)?;
    let minimizer = config
        .solver
        .as_deref()
        .map(InnerMinimizer::from_str)
        .transpose()?;

    let order = match method {
        Method::Plain => None,
        Method::Kolafa | Method::Niklasson => Some(config.method.order.ok_or_else(|| {
            ScfError::config(format!("method '{}' requires an order", method))
        })?),
    };

    // Coefficient tables are checked here so no solver state is created
    // for an unsupported order.
    let kolafa = match (method, order) {
        (Method::Kolafa, Some(order)) => Some(kolafa_coefficients(order)?),
        _ => None,
    };
    if let (Method::Niklasson, Some(order)) = (method, order) {
        niklasson_coefficients(order)?;
    }

    if let Some(minimizer) = minimizer {
        solver.select_minimizer(minimizer)?;
        info!("Inner minimizer: {}", minimizer);
    }

    let ground_state = GroundState::new(
        solver,
        config.potential_tol,
        config.energy_tol,
        config.maxiter,
    );

    info!("Ground state method: {}", method);
    let strategy: Box<dyn GroundStateStrategy<S>> = match (method, order, kolafa) {
        (Method::Kolafa, Some(order), Some(coefficients)) => {
            info!("Extrapolation order: {}", order);
            Box::new(KolafaExtrapolation::with_coefficients(
                ground_state,
                order,
                coefficients,
            ))
        }
        (Method::Niklasson, Some(order), _) => {
            info!("Extrapolation order: {}", order);
            Box::new(NiklassonExtrapolation::new(ground_state, order)?)
        }
        _ => Box::new(PlainGroundState::new(ground_state)),
    };
    Ok(strategy)
}

#[cfg(test)]
mod tests;
