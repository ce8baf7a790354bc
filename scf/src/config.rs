//! Configuration of the ground-state strategy

use crate::error::ScfError;
use serde::{Deserialize, Serialize};

/// Solver tolerances plus the extrapolation method.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GroundStateConfig {
    #[serde(default = "default_maxiter")]
    pub maxiter: usize,
    #[serde(default = "default_tol")]
    pub potential_tol: f64,
    #[serde(default = "default_tol")]
    pub energy_tol: f64,
    #[serde(default)]
    pub method: MethodConfig,
    /// Inner minimizer, `scf` or `ot`. Left to the solver when absent.
    #[serde(default)]
    pub solver: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MethodConfig {
    /// `plain`, `kolafa` or `niklasson_wf`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub order: Option<usize>,
}

impl Default for MethodConfig {
    fn default() -> Self {
        MethodConfig {
            kind: "plain".to_string(),
            order: None,
        }
    }
}

impl Default for GroundStateConfig {
    fn default() -> Self {
        GroundStateConfig {
            maxiter: default_maxiter(),
            potential_tol: default_tol(),
            energy_tol: default_tol(),
            method: MethodConfig::default(),
            solver: None,
        }
    }
}

fn default_maxiter() -> usize {
    100
}
fn default_tol() -> f64 {
    1e-6
}

impl GroundStateConfig {
    /// Checks tolerances and iteration count. Method names and orders are
    /// checked when the strategy is built.
    pub fn validate(&self) -> Result<(), ScfError> {
        if self.maxiter == 0 {
            return Err(ScfError::config("maxiter must be positive"));
        }
        if !(self.potential_tol > 0.0) {
            return Err(ScfError::config("potential_tol must be positive"));
        }
        if !(self.energy_tol > 0.0) {
            return Err(ScfError::config("energy_tol must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let yaml = "
maxiter: 30
method:
  type: kolafa
  order: 4
";
        let config: GroundStateConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.maxiter, 30);
        assert_eq!(config.method.kind, "kolafa");
        assert_eq!(config.method.order, Some(4));
        assert_eq!(config.potential_tol, 1e-6);
        assert_eq!(config.solver, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_tolerances() {
        let mut config = GroundStateConfig::default();
        config.energy_tol = 0.0;
        assert!(config.validate().is_err());

        let mut config = GroundStateConfig::default();
        config.maxiter = 0;
        assert!(config.validate().is_err());
    }
}
