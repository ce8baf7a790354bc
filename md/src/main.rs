use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use md::output::setup_output;
use md::{run_md, Args, ForceEvaluator, MdConfig, RunLog};
use scf::{make_strategy, ModelSolver};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    setup_output(args.output.as_deref(), args.verbose)?;

    info!("Reading configuration from: {}", args.config_file);
    let mut config = MdConfig::from_file(&args.config_file)?;
    config.apply_overrides(&args);
    config
        .validate()
        .map_err(|e| eyre!(e))
        .wrap_err("Invalid configuration")?;
    info!("Configuration loaded:\n{:?}", config);

    let lattice = config.lattice();
    let positions = config.positions();
    let masses = config.masses(positions.len()).map_err(|e| eyre!(e))?;
    let velocities = config
        .velocities(&lattice, &masses)
        .map_err(|e| eyre!(e))?;

    let solver = ModelSolver::new(lattice, positions.clone(), config.system.model.clone())
        .wrap_err("Failed to set up the model solver")?;
    let strategy = make_strategy(solver, &config.parameters.ground_state)
        .wrap_err("Failed to set up the ground-state method")?;
    info!(
        "Method: {} ({} atoms, {} steps, dt = {})",
        strategy.method(),
        masses.len(),
        config.parameters.steps,
        config.parameters.dt
    );
    let mut provider = ForceEvaluator::new(strategy)?;

    let mut log = RunLog::new(
        config.output.log_file.as_ref().map(PathBuf::from),
        config.output.flush_every,
    );
    let run = run_md(
        &mut provider,
        &lattice,
        positions,
        velocities,
        &masses,
        &config.md_settings(),
        &mut log,
    );
    // keep whatever was logged before a failure
    let written = log.finish();
    let frames = run.wrap_err("Molecular dynamics run failed")?;
    written.wrap_err("Failed to write the run log")?;

    if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
        info!(
            "Finished {} steps, total energy drift: {:.3e}",
            frames.len(),
            last.total_energy - first.total_energy
        );
    }
    if let Some(path) = log.output() {
        info!("Run log written to: {}", path.display());
    }
    Ok(())
}
