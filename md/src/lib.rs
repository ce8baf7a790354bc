//! Born-Oppenheimer molecular dynamics driven by an extrapolated ground state

pub mod config;
pub mod force;
pub mod logger;
pub mod output;
pub mod run_md;

pub use config::{Args, MdConfig};
pub use force::{ForceEvaluation, ForceEvaluator, ForceProvider};
pub use logger::RunLog;
pub use run_md::{run_md, velocity_verlet, Frame, MdSettings, VerletOptions, VerletStep};
