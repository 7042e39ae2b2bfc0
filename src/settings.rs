//! Code for loading program settings.
//!
//! Settings are read from a `mathprog.toml` file next to the model file; every field is optional
//! and a missing file means defaults throughout.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The file name of the optional settings file
const SETTINGS_FILE_NAME: &str = "mathprog.toml";

/// Program settings from the config file
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// The default program log level
    pub log_level: Option<String>,
    /// A default wall-clock limit for solves, in seconds
    pub time_limit: Option<f64>,
    /// A default simplex iteration limit for solves
    pub iteration_limit: Option<i32>,
}

impl Settings {
    /// Load settings from the directory containing the given model file.
    ///
    /// If no settings file is present, default values are used.
    pub fn from_model_path(model_path: &Path) -> Result<Settings> {
        let dir = model_path.parent().unwrap_or_else(|| Path::new("."));
        Self::load_from_path(&dir.join(SETTINGS_FILE_NAME))
    }

    /// Read settings from the specified file, or defaults if it does not exist.
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(file_path)
            .with_context(|| format!("Could not read {}", file_path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Could not parse {}", file_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_settings_load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn test_settings_load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_level = \"warn\"\ntime_limit = 30.0").unwrap();
        }

        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings {
                log_level: Some("warn".to_string()),
                time_limit: Some(30.0),
                iteration_limit: None,
            }
        );
    }

    #[test]
    fn test_settings_unknown_field_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_levell = \"warn\"").unwrap();
        }

        assert!(Settings::load_from_path(&file_path).is_err());
    }
}
