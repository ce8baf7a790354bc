//! Command-line arguments of the MD driver

use clap::Parser;

/// Born-Oppenheimer molecular dynamics with wave-function extrapolation
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML input file
    #[arg(short, long, default_value = "input.yml")]
    pub config_file: String,

    /// Write the text log to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override the number of time steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Override the time step
    #[arg(long)]
    pub dt: Option<f64>,

    /// Override the extrapolation method (plain, kolafa, niklasson_wf)
    #[arg(long)]
    pub method: Option<String>,

    /// Override the extrapolation order
    #[arg(long)]
    pub order: Option<usize>,

    /// Override the inner minimizer (scf or ot)
    #[arg(long)]
    pub solver: Option<String>,

    /// Override the JSON run log path
    #[arg(long)]
    pub log_file: Option<String>,

    /// Remove the centre-of-mass momentum after every step
    #[arg(long)]
    pub zero_momentum: bool,

    /// Also print extrapolation diagnostics
    #[arg(short, long)]
    pub verbose: bool,
}
