//! Strategy tests against a scripted solver

use super::*;
use crate::config::{GroundStateConfig, MethodConfig};
use crate::solver::{Energy, FindParams, ForceComponents};
use nalgebra::{DMatrix, DVector, Matrix3};
use num_complex::Complex64;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use wavefunction::{align_subspace, orthogonalize, BlockKey, CoefficientArray};

#[derive(Debug, Default)]
struct Calls {
    find: usize,
    update: usize,
    regenerate: usize,
    minimizer: usize,
    injected: Vec<CoefficientArray>,
}

impl Calls {
    fn total(&self) -> usize {
        self.find + self.update + self.regenerate + self.minimizer + self.injected.len()
    }
}

/// Returns a known orthonormal basis at every `find`, in a different gauge
/// each time, and records how it is driven.
struct StubSolver {
    calls: Rc<RefCell<Calls>>,
    positions: Vec<Vector3<f64>>,
    wave_functions: CoefficientArray,
    converged_calls: usize,
}

impl StubSolver {
    fn new() -> (Self, Rc<RefCell<Calls>>) {
        Self::converging_for(usize::MAX)
    }

    /// The first `n` searches converge, later ones do not.
    fn converging_for(n: usize) -> (Self, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let solver = StubSolver {
            calls: Rc::clone(&calls),
            positions: vec![Vector3::zeros()],
            wave_functions: ground_truth(0.0, 0),
            converged_calls: n,
        };
        (solver, calls)
    }
}

/// Orthonormal 4x2 block depending on `x`, times a diagonal phase gauge.
fn ground_truth(x: f64, gauge: usize) -> CoefficientArray {
    let theta = 0.3 + x;
    let mut block = DMatrix::<Complex64>::zeros(4, 2);
    block[(0, 0)] = Complex64::new(theta.cos(), 0.0);
    block[(1, 0)] = Complex64::new(theta.sin(), 0.0);
    block[(2, 1)] = Complex64::new((2.0 * theta).cos(), 0.0);
    block[(3, 1)] = Complex64::new((2.0 * theta).sin(), 0.0);

    let g = gauge as f64;
    let phases = DVector::from_vec(vec![
        Complex64::from_polar(1.0, 0.7 * g),
        Complex64::from_polar(1.0, -0.3 * g),
    ]);
    let block = block * DMatrix::from_diagonal(&phases);
    [(BlockKey::new(0, 0), block)].into_iter().collect()
}

impl DftSolver for StubSolver {
    fn lattice_vectors(&self) -> Matrix3<f64> {
        Matrix3::identity()
    }

    fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    fn atom_positions(&self) -> Vec<Vector3<f64>> {
        self.positions.clone()
    }

    fn set_atom_positions(&mut self, positions: &[Vector3<f64>]) {
        self.positions = positions.to_vec();
    }

    fn update(&mut self) {
        self.calls.borrow_mut().update += 1;
    }

    fn generate_density_potential(&mut self) {
        self.calls.borrow_mut().regenerate += 1;
    }

    fn find(&mut self, params: &FindParams) -> ScfResult {
        let mut calls = self.calls.borrow_mut();
        calls.find += 1;
        let converged = calls.find <= self.converged_calls;
        self.wave_functions = ground_truth(self.positions[0].x, calls.find);
        ScfResult {
            converged,
            num_scf_iterations: if converged { 3 } else { params.num_dft_iter },
            energy: Energy {
                total: -1.0,
                components: BTreeMap::new(),
            },
            band_gap: 0.5,
            state: serde_json::Value::Null,
        }
    }

    fn wave_functions(&self) -> &CoefficientArray {
        &self.wave_functions
    }

    fn set_wave_functions(&mut self, c: CoefficientArray) {
        self.calls.borrow_mut().injected.push(c.clone());
        self.wave_functions = c;
    }

    fn forces(&self) -> ForceComponents {
        ForceComponents::zeros(self.positions.len())
    }

    fn select_minimizer(&mut self, minimizer: InnerMinimizer) -> Result<(), ScfError> {
        self.calls.borrow_mut().minimizer += 1;
        match minimizer {
            InnerMinimizer::Scf => Ok(()),
            _ => Err(ScfError::config("stub only knows scf")),
        }
    }
}

fn ground_state(solver: StubSolver) -> GroundState<StubSolver> {
    GroundState::new(solver, 1e-6, 1e-6, 20)
}

fn config(kind: &str, order: Option<usize>) -> GroundStateConfig {
    GroundStateConfig {
        method: MethodConfig {
            kind: kind.to_string(),
            order,
        },
        ..GroundStateConfig::default()
    }
}

fn position(step: usize) -> Vec<Vector3<f64>> {
    vec![Vector3::new(0.01 * step as f64, 0.5, 0.5)]
}

#[test]
fn test_kolafa_warm_up_boundary() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = KolafaExtrapolation::new(ground_state(solver), 3).unwrap();

    for step in 1..=4 {
        let result = strategy.predict_and_solve(&position(step)).unwrap();
        assert!(result.converged);
        assert_eq!(strategy.history_len(), step);
        assert_eq!(calls.borrow().regenerate, 0);
        assert!(calls.borrow().injected.is_empty());
    }

    strategy.predict_and_solve(&position(5)).unwrap();
    let calls = calls.borrow();
    assert_eq!(calls.regenerate, 1);
    // prediction plus the aligned write-back
    assert_eq!(calls.injected.len(), 2);
    assert_eq!(strategy.history_len(), 4);
}

#[test]
fn test_niklasson_warm_up_boundary() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = NiklassonExtrapolation::new(ground_state(solver), 3).unwrap();

    for step in 1..=2 {
        strategy.predict_and_solve(&position(step)).unwrap();
        assert_eq!(strategy.history_len(), step);
        assert!(calls.borrow().injected.is_empty());
    }

    strategy.predict_and_solve(&position(3)).unwrap();
    assert_eq!(calls.borrow().injected.len(), 1);
    assert_eq!(strategy.history_len(), 3);
}

#[test]
fn test_niklasson_injects_without_regenerating() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = NiklassonExtrapolation::new(ground_state(solver), 3).unwrap();

    for step in 1..=6 {
        assert!(strategy.predict_and_solve(&position(step)).unwrap().converged);
    }
    let calls = calls.borrow();
    // one prediction per call from the third on
    assert_eq!(calls.injected.len(), 4);
    assert_eq!(calls.regenerate, 0);
    assert_eq!(calls.find, 6);
}

#[test]
fn test_kolafa_steady_state_step() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = KolafaExtrapolation::new(ground_state(solver), 3).unwrap();
    for step in 1..=4 {
        strategy.predict_and_solve(&position(step)).unwrap();
    }
    let h: Vec<CoefficientArray> = strategy.history().iter().cloned().collect();
    assert_eq!(h.len(), 4);

    // B = [2.8, -2.8, 1.2, -0.2] paired newest first, each entry projected
    // onto the newest one
    let latest = &h[3];
    let b = [2.8, -2.8, 1.2, -0.2];
    let mut expected = latest.zeros_like();
    for (j, &bj) in b.iter().enumerate() {
        let past = &h[3 - j];
        expected.add_scaled(bj, &past.dot(&past.adjoint().dot(latest)));
    }
    let expected = orthogonalize(&expected).unwrap();

    strategy.predict_and_solve(&position(5)).unwrap();
    {
        let calls = calls.borrow();
        assert!((&calls.injected[0] - &expected).norm() < 1e-12);
    }

    // corrector: ω = 3/5 blend of the aligned solution and the prediction
    let aligned = align_subspace(&ground_truth(position(5)[0].x, 5), &expected).unwrap();
    assert!((strategy.solver().wave_functions() - &aligned).norm() < 1e-12);
    let omega = 0.6;
    let mut corrected = aligned.scale(omega);
    corrected.add_scaled(1.0 - omega, &expected);
    assert!((strategy.history().newest(0).unwrap() - &corrected).norm() < 1e-12);

    // the oldest entry was dropped, the rest moved down by one
    let after: Vec<CoefficientArray> = strategy.history().iter().cloned().collect();
    assert_eq!(after.len(), 4);
    assert_eq!(&after[..3], &h[1..]);
}

#[test]
fn test_niklasson_steady_state_step() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = NiklassonExtrapolation::new(ground_state(solver), 3).unwrap();
    for step in 1..=4 {
        strategy.predict_and_solve(&position(step)).unwrap();
    }
    let h: Vec<CoefficientArray> = strategy.history().iter().cloned().collect();
    assert_eq!(h.len(), 4);
    let current = strategy.solver().wave_functions().clone();

    // full order-3 row: κ = 1.69, a = 0.15, c = [-2, 3, 0, -1] newest first
    let (kappa, alpha) = (1.69, 0.15);
    let c = [-2.0, 3.0, 0.0, -1.0];
    let aligned = align_subspace(&current, &h[3]).unwrap();
    let mut expected = h[3].scale(2.0);
    expected.add_scaled(-1.0, &h[2]);
    expected.add_scaled(kappa, &(&aligned - &h[3]));
    for (i, &ci) in c.iter().enumerate() {
        expected.add_scaled(alpha * ci, &h[3 - i]);
    }
    let expected = orthogonalize(&expected).unwrap();

    strategy.predict_and_solve(&position(5)).unwrap();
    let calls = calls.borrow();
    let injected = calls.injected.last().unwrap();
    assert!((injected - &expected).norm() < 1e-12);

    // the propagated prediction is stored, not the converged solution
    assert!((strategy.history().newest(0).unwrap() - &expected).norm() < 1e-12);
    let after: Vec<CoefficientArray> = strategy.history().iter().cloned().collect();
    assert_eq!(after.len(), 4);
    assert_eq!(&after[..3], &h[1..]);
}

#[test]
fn test_history_is_bounded() {
    let (solver, _) = StubSolver::new();
    let mut kolafa = KolafaExtrapolation::new(ground_state(solver), 2).unwrap();
    let (solver, _) = StubSolver::new();
    let mut niklasson = NiklassonExtrapolation::new(ground_state(solver), 4).unwrap();

    for step in 1..=12 {
        kolafa.predict_and_solve(&position(step)).unwrap();
        niklasson.predict_and_solve(&position(step)).unwrap();
        assert_eq!(kolafa.history_len(), step.min(3));
        assert_eq!(niklasson.history_len(), step.min(5));
    }
}

#[test]
fn test_kolafa_reproduces_constant_subspace() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = KolafaExtrapolation::new(ground_state(solver), 2).unwrap();
    let fixed = position(0);

    for _ in 0..3 {
        strategy.predict_and_solve(&fixed).unwrap();
    }
    let latest = strategy.history().newest(0).unwrap().clone();
    strategy.predict_and_solve(&fixed).unwrap();

    // All history entries span the same subspace, so the prediction is the
    // newest entry and the converged result aligns onto it.
    let calls = calls.borrow();
    let predicted = &calls.injected[0];
    assert!((predicted - &latest).norm() < 1e-10);
    assert!((strategy.solver().wave_functions() - &latest).norm() < 1e-10);
    assert!((strategy.history().newest(0).unwrap() - &latest).norm() < 1e-10);
}

#[test]
fn test_niklasson_reproduces_constant_subspace() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = NiklassonExtrapolation::new(ground_state(solver), 3).unwrap();
    let fixed = position(0);

    strategy.predict_and_solve(&fixed).unwrap();
    let first = strategy.history().newest(0).unwrap().clone();
    strategy.predict_and_solve(&fixed).unwrap();
    // second entry is aligned onto the first one
    assert!((strategy.history().newest(0).unwrap() - &first).norm() < 1e-10);

    strategy.predict_and_solve(&fixed).unwrap();
    assert!((&calls.borrow().injected[0] - &first).norm() < 1e-10);
}

#[test]
fn test_prediction_tracks_moving_subspace() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = KolafaExtrapolation::new(ground_state(solver), 2).unwrap();

    for step in 1..=3 {
        strategy.predict_and_solve(&position(step)).unwrap();
    }
    strategy.predict_and_solve(&position(4)).unwrap();

    // The predicted subspace is closer to the new ground state than the
    // previous one is.
    let exact = ground_truth(position(4)[0].x, 0);
    let previous = ground_truth(position(3)[0].x, 0);
    let projector_distance = |c: &CoefficientArray| {
        (&c.dot(&c.adjoint()) - &exact.dot(&exact.adjoint())).norm()
    };
    let calls = calls.borrow();
    let predicted = &calls.injected[0];
    assert!(projector_distance(predicted) < projector_distance(&previous));
}

#[test]
fn test_failed_solve_leaves_history_untouched() {
    let (solver, _) = StubSolver::converging_for(4);
    let mut strategy = KolafaExtrapolation::new(ground_state(solver), 2).unwrap();
    for step in 1..=4 {
        assert!(strategy.predict_and_solve(&position(step)).unwrap().converged);
    }
    let before: Vec<CoefficientArray> = strategy.history().iter().cloned().collect();

    let result = strategy.predict_and_solve(&position(5)).unwrap();
    assert!(!result.converged);
    assert_eq!(result.num_scf_iterations, 20);
    let after: Vec<CoefficientArray> = strategy.history().iter().cloned().collect();
    assert_eq!(before, after);

    let (solver, _) = StubSolver::converging_for(1);
    let mut strategy = NiklassonExtrapolation::new(ground_state(solver), 3).unwrap();
    strategy.predict_and_solve(&position(1)).unwrap();
    assert!(!strategy.predict_and_solve(&position(2)).unwrap().converged);
    assert_eq!(strategy.history_len(), 1);
}

#[test]
fn test_plain_never_injects() {
    let (solver, calls) = StubSolver::new();
    let mut strategy = make_strategy(solver, &config("plain", None)).unwrap();
    for step in 1..=5 {
        strategy.predict_and_solve(&position(step)).unwrap();
    }
    assert_eq!(strategy.method(), Method::Plain);
    assert_eq!(strategy.history_len(), 0);
    let calls = calls.borrow();
    assert_eq!(calls.find, 5);
    assert_eq!(calls.update, 5);
    assert!(calls.injected.is_empty());
}

#[test]
fn test_ground_state_wraps_positions() {
    let (solver, _) = StubSolver::new();
    let mut strategy = make_strategy(solver, &config("plain", None)).unwrap();
    strategy
        .predict_and_solve(&[Vector3::new(1.25, -0.5, 0.0)])
        .unwrap();
    assert_eq!(
        strategy.solver().atom_positions(),
        vec![Vector3::new(0.25, 0.5, 0.0)]
    );
}

#[test]
fn test_factory_builds_requested_method() {
    let (solver, _) = StubSolver::new();
    let strategy = make_strategy(solver, &config("KOLAFA", Some(3))).unwrap();
    assert_eq!(strategy.method(), Method::Kolafa);

    let (solver, _) = StubSolver::new();
    let strategy = make_strategy(solver, &config("niklasson_wf", Some(9))).unwrap();
    assert_eq!(strategy.method(), Method::Niklasson);

    let (solver, calls) = StubSolver::new();
    let mut with_solver = config("plain", None);
    with_solver.solver = Some("scf".to_string());
    make_strategy(solver, &with_solver).unwrap();
    assert_eq!(calls.borrow().minimizer, 1);
}

#[test]
fn test_factory_rejects_invalid_niklasson_order() {
    for order in [2, 10] {
        let (solver, calls) = StubSolver::new();
        let mut cfg = config("niklasson_wf", Some(order));
        cfg.solver = Some("scf".to_string());
        let err = make_strategy(solver, &cfg).err().unwrap();
        assert!(matches!(err, ScfError::Config(_)));
        assert_eq!(calls.borrow().total(), 0);
    }
}

#[test]
fn test_factory_rejects_bad_config() {
    let cases = [
        config("verlet", None),
        config("kolafa", None),
        config("niklasson_wf", None),
        config("kolafa", Some(0)),
    ];
    for cfg in cases.iter() {
        let (solver, calls) = StubSolver::new();
        let result = make_strategy(solver, cfg);
        assert!(matches!(result.err(), Some(ScfError::Config(_))), "{:?}", cfg);
        assert_eq!(calls.borrow().total(), 0);
    }

    let (solver, calls) = StubSolver::new();
    let mut cfg = config("plain", None);
    cfg.solver = Some("cg".to_string());
    assert!(make_strategy(solver, &cfg).is_err());
    assert_eq!(calls.borrow().total(), 0);
}

#[test]
fn test_factory_reports_unsupported_minimizer() {
    let (solver, calls) = StubSolver::new();
    let mut cfg = config("kolafa", Some(2));
    cfg.solver = Some("ot".to_string());
    let err = make_strategy(solver, &cfg).err().unwrap();
    assert!(matches!(err, ScfError::Config(_)));
    assert_eq!(calls.borrow().minimizer, 1);
    assert_eq!(calls.borrow().find, 0);
}
