//! Extrapolation coefficient tables

use crate::error::ScfError;

/// Binomial coefficient as a float, zero outside `0 <= k <= n`.
pub fn binomial(n: i64, k: i64) -> f64 {
    if k < 0 || k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Kolafa predictor coefficients for order `K`
///
/// `B[j-1] = (-1)^(j+1) · j · C(2K+2, K+1-j) / C(2K, K)` for `j = 1..=K+1`.
///
/// Kolafa, J. Comput. Chem. 25, 335 (2004), Eq. (19).
pub fn kolafa_coefficients(order: usize) -> Result<Vec<f64>, ScfError> {
    if order == 0 {
        return Err(ScfError::config("kolafa order must be at least 1"));
    }
    let k = order as i64;
    let norm = binomial(2 * k, k);
    let coefficients: Vec<f64> = (1..=k + 1)
        .map(|j| {
            let sign = if j % 2 == 0 { -1.0 } else { 1.0 };
            sign * j as f64 * binomial(2 * k + 2, k + 1 - j) / norm
        })
        .collect();

    let sum: f64 = coefficients.iter().sum();
    if (sum - 1.0).abs() > 1e-9 {
        return Err(ScfError::config(format!(
            "kolafa coefficients of order {} sum to {}",
            order, sum
        )));
    }
    Ok(coefficients)
}

/// Dissipative extended-Lagrangian coefficients for one order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiklassonCoefficients {
    pub kappa: f64,
    pub alpha: f64,
    pub c: &'static [i32],
}

/// Niklasson et al., J. Chem. Phys. 130, 214109 (2009).
const NIKLASSON_TABLE: [(usize, NiklassonCoefficients); 7] = [
    (3, NiklassonCoefficients { kappa: 1.69, alpha: 0.15, c: &[-2, 3, 0, -1] }),
    (4, NiklassonCoefficients { kappa: 1.75, alpha: 0.057, c: &[-3, 6, -2, -2, 1] }),
    (5, NiklassonCoefficients { kappa: 1.82, alpha: 0.018, c: &[-6, 14, -8, -3, 4, -1] }),
    (6, NiklassonCoefficients { kappa: 1.84, alpha: 0.0055, c: &[-14, 36, -27, -2, 12, -6, 1] }),
    (7, NiklassonCoefficients { kappa: 1.86, alpha: 0.0016, c: &[-36, 99, -88, 11, 32, -25, 8, -1] }),
    (8, NiklassonCoefficients { kappa: 1.88, alpha: 0.00044, c: &[-99, 286, -286, 78, 78, -90, 42, -10, 1] }),
    (9, NiklassonCoefficients { kappa: 1.89, alpha: 0.00012, c: &[-286, 858, -936, 364, 168, -300, 184, -63, 12, -1] }),
];

pub const MIN_NIKLASSON_ORDER: usize = 3;
pub const MAX_NIKLASSON_ORDER: usize = 9;

/// Tabulated coefficients for `order` in `3..=9`.
pub fn niklasson_coefficients(order: usize) -> Result<NiklassonCoefficients, ScfError> {
    let entry = NIKLASSON_TABLE
        .iter()
        .find(|(n, _)| *n == order)
        .map(|(_, coeffs)| *coeffs)
        .ok_or_else(|| {
            ScfError::config(format!(
                "niklasson_wf order must be in {}..={}, got {}",
                MIN_NIKLASSON_ORDER, MAX_NIKLASSON_ORDER, order
            ))
        })?;
    if entry.c.len() != order + 1 {
        return Err(ScfError::config(format!(
            "malformed niklasson table: order {} has {} coefficients",
            order,
            entry.c.len()
        )));
    }
    Ok(entry)
}

/// Coefficients used while the history is too short for the table.
///
/// Below order 3 there is no damping term; the step reduces to the
/// time-reversible Verlet-like propagation with `κ = 2`.
pub fn dissipation_coefficients(n: usize) -> Result<NiklassonCoefficients, ScfError> {
    if n < MIN_NIKLASSON_ORDER {
        Ok(NiklassonCoefficients {
            kappa: 2.0,
            alpha: 0.0,
            c: &[],
        })
    } else {
        niklasson_coefficients(n)
    }
}
