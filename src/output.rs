//! The module responsible for reporting solutions and writing output data to disk.
use crate::solver::{SolveStatus, Solution};
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "mathprog_results";

/// The output file name for variable values
const SOLUTION_FILE_NAME: &str = "solution.csv";

/// Get the default output directory for the given model file.
///
/// The directory is named after the model file, under [`OUTPUT_DIRECTORY_ROOT`].
pub fn get_output_dir(model_path: &Path) -> Result<PathBuf> {
    let model_name = model_path
        .file_stem()
        .context("Model path has no file name")?
        .to_str()
        .context("Invalid chars in model file name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create the output directory, with parents, if it does not already exist.
pub fn create_output_directory(output_dir: &Path) -> Result<()> {
    if output_dir.is_dir() {
        // already exists
        return Ok(());
    }

    fs::create_dir_all(output_dir)?;

    Ok(())
}

/// Represents a row in the solution CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SolutionRow {
    variable: String,
    value: f64,
}

/// Write the variable values of a solved instance to `solution.csv`.
///
/// Rows appear in column order, so repeated runs of an unchanged model produce identical files.
pub fn write_solution(output_path: &Path, solution: &Solution) -> Result<()> {
    let file_path = output_path.join(SOLUTION_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for (key, value) in &solution.values {
        writer.serialize(SolutionRow {
            variable: key.to_string(),
            value: *value,
        })?;
    }
    writer.flush()?;

    info!("Solution written to {}", file_path.display());
    Ok(())
}

/// Log a human-readable report of the solve outcome.
pub fn report_solution(solution: &Solution) {
    match solution.status {
        SolveStatus::Optimal => {
            // `objective` is always present for an optimal solve
            if let Some(objective) = solution.objective {
                info!("Optimal objective value: {objective}");
            }
            for (key, value) in &solution.values {
                if *value != 0.0 {
                    info!("  {key} = {value}");
                }
            }
        }
        status => info!("Solve finished without a solution: {status}"),
    }
}
