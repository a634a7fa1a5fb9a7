//! Settings discovery for the command line
//!
//! Without `--config` two optional layers are read, later sections replacing
//! earlier ones:
//!
//! 1. `~/.treepdf.toml` (user defaults)
//! 2. `./.treepdf.toml` (project defaults)
//!
//! Command-line flags are applied on top by the caller.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use treepdf_core::Settings;

/// File name of both settings layers
pub const CONFIG_FILE_NAME: &str = ".treepdf.toml";

/// Candidate settings files in precedence order, lowest first
pub fn discover() -> Vec<PathBuf> {
    let user = dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME));
    let project = Some(PathBuf::from(CONFIG_FILE_NAME));
    let mut found: Vec<PathBuf> = user.into_iter().chain(project).filter(|path| path.is_file()).collect();
    // Running from the home directory finds the same file twice
    found.dedup_by(|a, b| a.canonicalize().ok() == b.canonicalize().ok());
    found
}

/// Load the explicit settings file, or the discovered layers
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return Settings::load_from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()));
    }

    let layers = discover();
    if layers.is_empty() {
        debug!("No {CONFIG_FILE_NAME} found, using defaults");
        return Ok(Settings::default());
    }
    let refs: Vec<&Path> = layers.iter().map(PathBuf::as_path).collect();
    Settings::load_layers(&refs).context("Failed to load configuration")
}
