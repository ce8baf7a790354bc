use std::fmt;
use wavefunction::LinalgError;

/// Errors raised while building a strategy or solving for a ground state.
#[derive(Debug, Clone, PartialEq)]
pub enum ScfError {
    /// Invalid or unsupported configuration. Raised before the solver is
    /// touched.
    Config(String),
    /// The SCF loop stopped without reaching the requested tolerances.
    Convergence { iterations: usize },
    /// An orthogonalization or alignment step broke down.
    Degenerate(LinalgError),
}

impl ScfError {
    pub fn config(msg: impl Into<String>) -> Self {
        ScfError::Config(msg.into())
    }
}

impl fmt::Display for ScfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScfError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            ScfError::Convergence { iterations } => {
                write!(f, "SCF not converged after {} iterations", iterations)
            }
            ScfError::Degenerate(err) => write!(f, "numerical degeneracy: {}", err),
        }
    }
}

impl std::error::Error for ScfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScfError::Degenerate(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LinalgError> for ScfError {
    fn from(err: LinalgError) -> Self {
        ScfError::Degenerate(err)
    }
}
