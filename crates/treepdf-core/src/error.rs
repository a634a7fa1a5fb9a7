//! Error types for configuration handling

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating settings
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path of the settings file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or has unexpected fields
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the settings file
        path: PathBuf,
        /// TOML error including line/column information
        #[source]
        source: toml::de::Error,
    },

    /// A value is syntactically valid but unusable
    #[error("Invalid setting '{key}': {reason}")]
    Invalid {
        /// Dotted key of the offending setting
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A human-readable size could not be parsed
    #[error("Invalid size '{input}': {reason}")]
    InvalidSize {
        /// The rejected input
        input: String,
        /// Why it was rejected
        reason: String,
    },
}
