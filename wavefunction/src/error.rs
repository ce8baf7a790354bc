use crate::coefficients::BlockKey;
use std::fmt;

/// Numerical failure of a per-block decomposition.
#[derive(Debug, Clone, PartialEq)]
pub enum LinalgError {
    /// The Gram matrix of a block has a non-positive eigenvalue, i.e. the
    /// columns are linearly dependent.
    RankDeficient { key: BlockKey, eigenvalue: f64 },
    /// Cholesky factorization failed.
    NotPositiveDefinite { key: BlockKey },
    /// A linear system could not be solved.
    Singular { key: BlockKey },
}

impl fmt::Display for LinalgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinalgError::RankDeficient { key, eigenvalue } => write!(
                f,
                "overlap of block {} is not full rank (eigenvalue {:.3e})",
                key, eigenvalue
            ),
            LinalgError::NotPositiveDefinite { key } => {
                write!(f, "matrix of block {} is not positive definite", key)
            }
            LinalgError::Singular { key } => write!(f, "matrix of block {} is singular", key),
        }
    }
}

impl std::error::Error for LinalgError {}
