//! The command line interface for the modeling tool.
use crate::model::Model;
use crate::output::{create_output_directory, get_output_dir, report_solution, write_solution};
use crate::settings::Settings;
use crate::solver::Budget;
use crate::{instance, log, solver};
use ::log::info;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

/// The command line interface for the modeling tool.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Commands,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Path to a separate data file
    #[arg(short, long)]
    pub data: Option<PathBuf>,
    /// Wall-clock limit for the solve, in seconds
    #[arg(long)]
    pub time_limit: Option<f64>,
    /// Simplex iteration limit for the solve
    #[arg(long)]
    pub iteration_limit: Option<i32>,
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Compile a model, solve it and write the solution.
    Run {
        /// Path to the model file.
        model: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Compile a model without solving, reporting any diagnostics.
    Check {
        /// Path to the model file.
        model: PathBuf,
        /// Path to a separate data file
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model, opts } => handle_run_command(&model, &opts, None),
            Self::Check { model, data } => handle_check_command(&model, data.as_deref(), None),
        }
    }
}

/// Parse CLI arguments and dispatch to the chosen command.
pub fn run_cli() -> Result<()> {
    Cli::parse().command.execute()
}

/// Compile the model at `model_path`, with an optional separate data file.
fn compile(model_path: &Path, data_path: Option<&Path>) -> Result<Model> {
    let source = fs::read_to_string(model_path)
        .with_context(|| format!("Could not read model file {}", model_path.display()))?;

    let model = match data_path {
        Some(data_path) => {
            let data = fs::read_to_string(data_path)
                .with_context(|| format!("Could not read data file {}", data_path.display()))?;
            Model::from_text_with_data(&source, &data)
        }
        None => Model::from_text(&source),
    }
    .context("Failed to compile model.")?;

    info!("Compiled model from {}", model_path.display());
    Ok(model)
}

/// Handle the `run` command.
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    // Load program settings, if not provided
    let settings = match settings {
        Some(settings) => settings,
        None => Settings::from_model_path(model_path).context("Failed to load settings.")?,
    };

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(model_path)?;
        &pathbuf
    };
    create_output_directory(output_path).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    // Initialise program logger
    log::init(settings.log_level.as_deref(), Some(output_path))
        .context("Failed to initialise logging.")?;
    info!("Output folder: {}", output_path.display());

    let model = compile(model_path, opts.data.as_deref())?;
    let instance = instance::build(&model).context("Failed to generate instance.")?;

    // Command-line limits override the settings file
    let budget = Budget {
        time_limit: opts.time_limit.or(settings.time_limit),
        iteration_limit: opts.iteration_limit.or(settings.iteration_limit),
    };
    let solution = solver::solve(&instance, &budget).context("Solver failed.")?;

    report_solution(&solution);
    write_solution(output_path, &solution)?;

    Ok(())
}

/// Handle the `check` command.
pub fn handle_check_command(
    model_path: &Path,
    data_path: Option<&Path>,
    settings: Option<Settings>,
) -> Result<()> {
    // Load program settings, if not provided
    let settings = match settings {
        Some(settings) => settings,
        None => Settings::from_model_path(model_path).context("Failed to load settings.")?,
    };

    // No log files for a validate-only run
    log::init(settings.log_level.as_deref(), None).context("Failed to initialise logging.")?;

    let model = compile(model_path, data_path)?;

    // Generate the instance too, so constant-only rows and bound errors are caught
    let instance = instance::build(&model).context("Failed to generate instance.")?;
    info!(
        "Model is valid: {} column(s), {} row(s)",
        instance.columns.len(),
        instance.rows.len()
    );

    Ok(())
}
