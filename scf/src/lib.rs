//! Ground-state driver and wave-function extrapolation for Born-Oppenheimer MD

pub mod config;
pub mod error;
pub mod extrapolation;
pub mod ground_state;
pub mod history;
pub mod model;
pub mod solver;

pub use config::{GroundStateConfig, MethodConfig};
pub use error::ScfError;
pub use extrapolation::{make_strategy, GroundStateStrategy, Method};
pub use ground_state::GroundState;
pub use history::History;
pub use model::{ModelParams, ModelSolver};
pub use solver::{DftSolver, Energy, FindParams, ForceComponents, InnerMinimizer, ScfResult};
