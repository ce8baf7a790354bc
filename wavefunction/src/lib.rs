//! Block-structured wave-function coefficients
//!
//! Occupied states are stored as one dense complex matrix per discretization
//! point (k-point and spin channel). All linear algebra in this crate acts
//! block by block; there is no coupling between blocks.

pub mod coefficients;
pub mod error;
pub mod linalg;

pub use coefficients::{BlockKey, CoefficientArray};
pub use error::LinalgError;
pub use linalg::{align_subspace, cholesky, orthogonalize, solve, solve_lower_triangular};

#[cfg(test)]
mod tests;
