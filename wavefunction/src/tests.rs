//! Tests for coefficient arrays and the orthogonalization/alignment routines

use super::*;
use approx::assert_relative_eq;
use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_block(rng: &mut StdRng, rows: usize, cols: usize) -> DMatrix<Complex64> {
    DMatrix::from_fn(rows, cols, |_, _| {
        Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    })
}

/// Two k-points with different block shapes.
fn random_array(seed: u64) -> CoefficientArray {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut c = CoefficientArray::new();
    c.insert(BlockKey::new(0, 0), random_block(&mut rng, 12, 4));
    c.insert(BlockKey::new(1, 0), random_block(&mut rng, 9, 3));
    c
}

fn random_unitary(rng: &mut StdRng, n: usize) -> DMatrix<Complex64> {
    random_block(rng, n, n).qr().q()
}

fn max_deviation_from_identity(m: &DMatrix<Complex64>) -> f64 {
    let identity = DMatrix::<Complex64>::identity(m.nrows(), m.ncols());
    (m - identity).iter().map(|z| z.norm()).fold(0.0, f64::max)
}

#[test]
fn test_orthogonalize_gives_orthonormal_columns() {
    let x = random_array(7);
    let xo = orthogonalize(&x).expect("random blocks have full rank");

    for (key, block) in &xo {
        let gram = block.adjoint() * block;
        let dev = max_deviation_from_identity(&gram);
        assert!(dev < 1e-10, "block {} deviates from identity by {:.3e}", key, dev);
    }
}

#[test]
fn test_orthogonalize_keeps_orthonormal_basis() {
    let xo = orthogonalize(&random_array(11)).unwrap();
    let again = orthogonalize(&xo).unwrap();
    assert!((&again - &xo).norm() < 1e-10);
}

#[test]
fn test_orthogonalize_rejects_rank_deficient_block() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut block = random_block(&mut rng, 6, 3);
    let first = block.column(0).clone_owned();
    block.set_column(2, &(first * Complex64::new(2.0, -1.0)));

    let mut x = CoefficientArray::new();
    x.insert(BlockKey::new(0, 1), block);

    match orthogonalize(&x) {
        Err(LinalgError::RankDeficient { key, .. }) => assert_eq!(key, BlockKey::new(0, 1)),
        other => panic!("expected rank deficiency, got {:?}", other),
    }
}

#[test]
fn test_align_subspace_to_itself_is_noop() {
    let c = orthogonalize(&random_array(21)).unwrap();
    let aligned = align_subspace(&c, &c).unwrap();
    assert!((&aligned - &c).norm() < 1e-10);
}

#[test]
fn test_align_subspace_removes_unitary_rotation() {
    let mut rng = StdRng::seed_from_u64(5);
    let c = orthogonalize(&random_array(5)).unwrap();
    let rotated = c.map_blocks(|_, block| block * random_unitary(&mut rng, block.ncols()));

    assert!((&rotated - &c).norm() > 1e-2);
    let aligned = align_subspace(&rotated, &c).unwrap();
    assert!((&aligned - &c).norm() < 1e-10);
}

#[test]
fn test_align_subspace_preserves_orthonormality() {
    let mut rng = StdRng::seed_from_u64(10);
    let c = orthogonalize(&random_array(8)).unwrap();
    let perturbed = orthogonalize(&(&c + &random_array(9).scale(0.05))).unwrap();
    let rotated = perturbed.map_blocks(|_, block| block * random_unitary(&mut rng, block.ncols()));

    let aligned = align_subspace(&rotated, &c).unwrap();
    for (_, block) in &aligned {
        assert!(max_deviation_from_identity(&(block.adjoint() * block)) < 1e-10);
    }
    assert!((&aligned - &c).norm() < 0.5 * (&rotated - &c).norm());
}

#[test]
fn test_align_subspace_fails_for_orthogonal_subspaces() {
    let mut c = DMatrix::<Complex64>::zeros(4, 2);
    c[(0, 0)] = Complex64::new(1.0, 0.0);
    c[(1, 1)] = Complex64::new(1.0, 0.0);
    let mut c_ref = DMatrix::<Complex64>::zeros(4, 2);
    c_ref[(2, 0)] = Complex64::new(1.0, 0.0);
    c_ref[(3, 1)] = Complex64::new(1.0, 0.0);

    let key = BlockKey::new(0, 0);
    let a: CoefficientArray = [(key, c)].into_iter().collect();
    let b: CoefficientArray = [(key, c_ref)].into_iter().collect();

    assert_eq!(
        align_subspace(&a, &b),
        Err(LinalgError::NotPositiveDefinite { key })
    );
}

#[test]
fn test_cholesky_reconstructs_matrix() {
    let x = random_array(13);
    let gram = x.adjoint().dot(&x);
    let l = cholesky(&gram).unwrap();
    let rebuilt = l.dot(&l.adjoint());
    assert!((&rebuilt - &gram).norm() < 1e-10 * gram.norm());
}

#[test]
fn test_solve_inverts_product() {
    let x = random_array(17);
    let a = x.adjoint().dot(&x);
    let mut rng = StdRng::seed_from_u64(1);
    let b = a.map_blocks(|_, block| random_block(&mut rng, block.nrows(), 2));

    let solution = solve(&a, &b).unwrap();
    assert!((&a.dot(&solution) - &b).norm() < 1e-10);
}

#[test]
fn test_norm_sums_over_blocks() {
    let mut c = CoefficientArray::new();
    c.insert(BlockKey::new(0, 0), DMatrix::from_element(2, 2, Complex64::new(1.0, 0.0)));
    c.insert(BlockKey::new(1, 0), DMatrix::from_element(1, 1, Complex64::new(0.0, 3.0)));
    // sqrt(4 * 1 + 9)
    assert_relative_eq!(c.norm(), 13f64.sqrt(), epsilon = 1e-14);
}

#[test]
fn test_arithmetic_is_blockwise() {
    let c = random_array(2);
    let d = random_array(4);

    let mut acc = c.clone();
    acc.add_scaled(-0.5, &d);
    let expected = &c - &(&d * 0.5);
    assert!((&acc - &expected).norm() < 1e-14);

    let mut sum = c.zeros_like();
    sum += &c;
    sum += &c;
    assert!((&sum - &(2.0 * &c)).norm() < 1e-14);
    assert!(c.same_layout(&d));
}

#[test]
#[should_panic(expected = "different block keys")]
fn test_mismatched_keys_panic() {
    let c = random_array(1);
    let mut other = CoefficientArray::new();
    other.insert(BlockKey::new(5, 1), DMatrix::zeros(12, 4));
    let _ = &c + &other;
}
