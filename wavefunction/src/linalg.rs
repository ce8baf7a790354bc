//! Per-block dense linear algebra on coefficient arrays.

use crate::coefficients::CoefficientArray;
use crate::error::LinalgError;
use nalgebra::DMatrix;
use num_complex::Complex64;

/// Eigenvalues of a Gram matrix below this fraction of the largest one are
/// treated as zero.
const RANK_TOLERANCE: f64 = 1e-14;

/// Loewdin (symmetric) orthogonalization, `X · (XᴴX)^(-1/2)` for each block.
///
/// The result has orthonormal columns and is the orthonormal basis closest
/// to `X`. Fails if any block does not have full column rank.
pub fn orthogonalize(x: &CoefficientArray) -> Result<CoefficientArray, LinalgError> {
    x.try_map_blocks(|key, block| {
        if block.ncols() == 0 {
            return Ok(block.clone());
        }
        // S = U Λ Uᴴ
        let overlap = block.adjoint() * block;
        let eigen = overlap.symmetric_eigen();
        let largest = eigen.eigenvalues.max();
        let smallest = eigen.eigenvalues.min();
        if !(largest > 0.0) || !(smallest > RANK_TOLERANCE * largest) {
            return Err(LinalgError::RankDeficient {
                key: *key,
                eigenvalue: smallest,
            });
        }
        // S^{-1/2} = U Λ^{-1/2} Uᴴ
        let inv_sqrt = eigen.eigenvalues.map(|w| Complex64::from(1.0 / w.sqrt()));
        let u = &eigen.eigenvectors;
        let s_inv_sqrt = u * DMatrix::from_diagonal(&inv_sqrt) * u.adjoint();
        Ok(block * s_inv_sqrt)
    })
}

/// Lower Cholesky factor `L` of each block, `A = L·Lᴴ`.
pub fn cholesky(a: &CoefficientArray) -> Result<CoefficientArray, LinalgError> {
    a.try_map_blocks(|key, block| {
        block
            .clone()
            .cholesky()
            .map(|factor| factor.l())
            .ok_or(LinalgError::NotPositiveDefinite { key: *key })
    })
}

/// `A⁻¹ · X` for each block, via LU decomposition.
pub fn solve(a: &CoefficientArray, x: &CoefficientArray) -> Result<CoefficientArray, LinalgError> {
    a.try_zip_blocks(x, |key, a, x| {
        a.clone()
            .lu()
            .solve(x)
            .ok_or(LinalgError::Singular { key: *key })
    })
}

/// `L⁻¹ · X` for lower-triangular blocks `L`.
pub fn solve_lower_triangular(
    l: &CoefficientArray,
    x: &CoefficientArray,
) -> Result<CoefficientArray, LinalgError> {
    l.try_zip_blocks(x, |key, l, x| {
        l.solve_lower_triangular(x)
            .ok_or(LinalgError::Singular { key: *key })
    })
}

/// Rotates `c` within its own span so that it matches `c_ref` as closely
/// as possible, removing the unitary gauge freedom between two bases of
/// (nearly) the same subspace.
///
/// With `Om = cᴴ·c_ref` and `Om·Omᴴ = L·Lᴴ`, the rotation is the unitary
/// `U = L⁻¹·Om` and the result is `c·U`. A rank-deficient overlap means the
/// two bases are not comparable and is reported as an error.
///
/// Arias, Payne, Joannopoulos, Phys. Rev. B 45, 1538 (1992).
pub fn align_subspace(
    c: &CoefficientArray,
    c_ref: &CoefficientArray,
) -> Result<CoefficientArray, LinalgError> {
    let om = c.adjoint().dot(c_ref);
    let l = cholesky(&om.dot(&om.adjoint()))?;
    let u = solve_lower_triangular(&l, &om)?;
    Ok(c.dot(&u))
}
