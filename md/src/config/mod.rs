//! Input file of the MD driver
//!
//! Positions are given in reduced coordinates, velocities in Cartesian
//! ones. Lattice vectors are the rows of `system.lattice`.

mod args;

pub use args::Args;

use crate::run_md::{from_cartesian, MdSettings, VerletOptions};
use color_eyre::eyre::{Result, WrapErr};
use nalgebra::{Matrix3, Vector3};
use scf::{GroundStateConfig, ModelParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MdConfig {
    pub parameters: Parameters,
    pub system: SystemConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Time stepping plus the ground-state settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Parameters {
    /// Number of time steps
    #[serde(rename = "N")]
    pub steps: usize,
    pub dt: f64,
    #[serde(default)]
    pub zero_momentum: bool,
    #[serde(flatten)]
    pub ground_state: GroundStateConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    pub lattice: [[f64; 3]; 3],
    pub positions: Vec<[f64; 3]>,
    pub masses: MassConfig,
    #[serde(default)]
    pub velocities: VelocityConfig,
    pub model: ModelParams,
}

/// Initial velocities
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(tag = "type")]
pub enum VelocityConfig {
    #[serde(rename = "explicit")]
    Explicit { velocities: Vec<[f64; 3]> },
    /// Maxwell-Boltzmann distribution at `temperature` (k_B = 1)
    #[serde(rename = "maxwell_boltzmann")]
    MaxwellBoltzmann { temperature: f64, seed: Option<u64> },
    #[serde(rename = "zero")]
    #[default]
    Zero,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum MassConfig {
    Uniform(f64),
    Individual(Vec<f64>),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// JSON run log, none to keep it in memory only
    #[serde(default = "default_log_file")]
    pub log_file: Option<String>,
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            log_file: default_log_file(),
            flush_every: default_flush_every(),
        }
    }
}

fn default_log_file() -> Option<String> {
    Some("logger.json".to_string())
}
fn default_flush_every() -> usize {
    10
}

impl MdConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Unable to read configuration file: {}", path.display()))?;
        serde_yml::from_str(&content).wrap_err("Failed to parse configuration file")
    }

    /// Command-line values take precedence over the file.
    pub fn apply_overrides(&mut self, args: &Args) {
        let parameters = &mut self.parameters;
        if let Some(steps) = args.steps {
            parameters.steps = steps;
        }
        if let Some(dt) = args.dt {
            parameters.dt = dt;
        }
        if let Some(method) = &args.method {
            parameters.ground_state.method.kind = method.clone();
        }
        if let Some(order) = args.order {
            parameters.ground_state.method.order = Some(order);
        }
        if let Some(solver) = &args.solver {
            parameters.ground_state.solver = Some(solver.clone());
        }
        if args.zero_momentum {
            parameters.zero_momentum = true;
        }
        if let Some(log_file) = &args.log_file {
            self.output.log_file = Some(log_file.clone());
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.parameters.steps == 0 {
            return Err("Number of steps must be positive".to_string());
        }
        if !(self.parameters.dt > 0.0) {
            return Err("Time step must be positive".to_string());
        }
        self.parameters
            .ground_state
            .validate()
            .map_err(|e| e.to_string())?;

        if self.lattice().determinant().abs() < 1e-12 {
            return Err("Lattice vectors must be linearly independent".to_string());
        }
        let num_atoms = self.system.positions.len();
        if num_atoms == 0 {
            return Err("At least one atom is required".to_string());
        }
        self.masses(num_atoms)?;
        if let VelocityConfig::Explicit { velocities } = &self.system.velocities {
            if velocities.len() != num_atoms {
                return Err(format!(
                    "Number of explicit velocities ({}) doesn't match number of atoms ({})",
                    velocities.len(),
                    num_atoms
                ));
            }
        }
        if let VelocityConfig::MaxwellBoltzmann { temperature, .. } = &self.system.velocities {
            if *temperature < 0.0 {
                return Err("Temperature must not be negative".to_string());
            }
        }
        self.system
            .model
            .validate(num_atoms)
            .map_err(|e| e.to_string())
    }

    /// Lattice vectors as columns.
    pub fn lattice(&self) -> Matrix3<f64> {
        let columns: Vec<Vector3<f64>> = self.system.lattice.iter().map(|&row| row.into()).collect();
        Matrix3::from_columns(&columns)
    }

    /// Reduced initial positions.
    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.system.positions.iter().map(|&p| p.into()).collect()
    }

    pub fn masses(&self, n_atoms: usize) -> Result<Vec<f64>, String> {
        match &self.system.masses {
            MassConfig::Uniform(mass) => {
                if *mass <= 0.0 {
                    return Err("Mass must be positive".to_string());
                }
                Ok(vec![*mass; n_atoms])
            }
            MassConfig::Individual(masses) => {
                if masses.len() != n_atoms {
                    return Err(format!(
                        "Number of masses ({}) doesn't match number of atoms ({})",
                        masses.len(),
                        n_atoms
                    ));
                }
                if masses.iter().any(|&m| m <= 0.0) {
                    return Err("All masses must be positive".to_string());
                }
                Ok(masses.clone())
            }
        }
    }

    /// Reduced initial velocities.
    pub fn velocities(&self, lattice: &Matrix3<f64>, masses: &[f64]) -> Result<Vec<Vector3<f64>>, String> {
        let cartesian: Vec<Vector3<f64>> = match &self.system.velocities {
            VelocityConfig::Explicit { velocities } => {
                if velocities.len() != masses.len() {
                    return Err(format!(
                        "Number of explicit velocities ({}) doesn't match number of atoms ({})",
                        velocities.len(),
                        masses.len()
                    ));
                }
                velocities.iter().map(|&v| v.into()).collect()
            }
            VelocityConfig::MaxwellBoltzmann { temperature, seed } => {
                maxwell_boltzmann(*temperature, masses, *seed)
            }
            VelocityConfig::Zero => vec![Vector3::zeros(); masses.len()],
        };
        from_cartesian(lattice, &cartesian)
            .ok_or_else(|| "Lattice vectors must be linearly independent".to_string())
    }

    pub fn md_settings(&self) -> MdSettings {
        MdSettings {
            steps: self.parameters.steps,
            dt: self.parameters.dt,
            options: VerletOptions {
                zero_momentum: self.parameters.zero_momentum,
            },
        }
    }
}

/// Cartesian velocities with zero total momentum and kinetic temperature
/// exactly `temperature` when there is more than one atom.
pub fn maxwell_boltzmann(temperature: f64, masses: &[f64], seed: Option<u64>) -> Vec<Vector3<f64>> {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let n_atoms = masses.len();

    let mut velocities: Vec<Vector3<f64>> = masses
        .iter()
        .map(|&m| {
            let v: Vector3<f64> = Vector3::new(
                StandardNormal.sample(&mut rng),
                StandardNormal.sample(&mut rng),
                StandardNormal.sample(&mut rng),
            );
            v * (temperature / m).sqrt()
        })
        .collect();

    if n_atoms > 1 {
        let total_mass: f64 = masses.iter().sum();
        let momentum: Vector3<f64> = velocities.iter().zip(masses).map(|(v, &m)| v * m).sum();
        let v_cm = momentum / total_mass;
        for v in &mut velocities {
            *v -= v_cm;
        }

        let current = kinetic_temperature(&velocities, masses);
        if current > 0.0 {
            let scale = (temperature / current).sqrt();
            for v in &mut velocities {
                *v *= scale;
            }
        }
    }
    velocities
}

/// `Σ m v² / 3N`
pub fn kinetic_temperature(velocities: &[Vector3<f64>], masses: &[f64]) -> f64 {
    let twice_kinetic: f64 = velocities
        .iter()
        .zip(masses)
        .map(|(v, &m)| m * v.norm_squared())
        .sum();
    twice_kinetic / (3.0 * masses.len() as f64)
}
