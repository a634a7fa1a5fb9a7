//! Settings consumed by the conversion pipeline
//!
//! Settings are read from TOML files. Every section is optional and every
//! field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [archive]
//! enabled = true
//! size_limit = 104857600
//! max_depth = 10
//!
//! [converters]
//! universal = "/usr/local/bin/anything2pdf"
//! fallback = "/usr/local/bin/last-resort"
//! disable_builtin = false
//! timeout_secs = 120
//!
//! [converters.mime]
//! "text/html" = ["/usr/bin/html2pdf", "/usr/bin/html2ps | /usr/bin/ps2pdf"]
//!
//! [pdf]
//! page_labels = true
//! page_label_font = "helveticaB"
//! generated_pages_font = "courier"
//! label_font_size = 8.0
//!
//! [pipeline]
//! jobs = 1
//! ```

use crate::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default timeout for a single external converter invocation
pub const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 120;

/// Default number of nested archive levels the walker descends into
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Archive extraction settings
    pub archive: ArchiveSettings,
    /// Converter chain settings
    pub converters: ConverterSettings,
    /// Output document settings
    pub pdf: PdfSettings,
    /// Scheduling settings
    pub pipeline: PipelineSettings,
}

/// Archive extraction settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Recurse into archive files. When disabled archives are converted like
    /// any other leaf file.
    pub enabled: bool,
    /// Soft limit for the uncompressed size of an archive, in bytes.
    /// `None` disables the soft limit; the fixed bomb limit still applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<u64>,
    /// Maximum number of nested archive levels
    pub max_depth: usize,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            size_limit: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Converter chain settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    /// Program tried first for every file regardless of its mime-type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub universal: Option<String>,
    /// Program tried after every other converter failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Do not register the builtin converters
    pub disable_builtin: bool,
    /// Timeout for one external converter run, in seconds
    pub timeout_secs: u64,
    /// Mime-type specific converters, tried in order. An entry is either a
    /// program path or a pipeline of programs separated by `|`.
    pub mime: BTreeMap<String, Vec<String>>,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            universal: None,
            fallback: None,
            disable_builtin: false,
            timeout_secs: DEFAULT_CONVERTER_TIMEOUT_SECS,
            mime: BTreeMap::new(),
        }
    }
}

/// Output document settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    /// Stamp every page with `BASENAME PAGE/PAGES`
    pub page_labels: bool,
    /// Font identifier used for the page labels
    pub page_label_font: String,
    /// Font identifier used for generated pages (text and error pages)
    pub generated_pages_font: String,
    /// Font size of the page labels, in points
    pub label_font_size: f32,
    /// Additional directory with font descriptor files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<PathBuf>,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            page_labels: true,
            page_label_font: "helvetica".to_string(),
            generated_pages_font: "courier".to_string(),
            label_font_size: 8.0,
            font_dir: None,
        }
    }
}

/// Scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Number of leaf conversions run concurrently
    pub jobs: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

/// On-disk form: every section optional so layers can be merged per section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    archive: Option<ArchiveSettings>,
    converters: Option<ConverterSettings>,
    pdf: Option<PdfSettings>,
    pipeline: Option<PipelineSettings>,
}

impl SettingsFile {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Settings {
    /// Load settings from a single TOML file and validate them
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or a value
    /// is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_layers(&[path])
    }

    /// Load several settings files; sections present in later files replace
    /// the same sections of earlier files.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any file cannot be read or parsed, or the
    /// merged result is invalid.
    pub fn load_layers(paths: &[&Path]) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        for path in paths {
            debug!("Loading settings layer {}", path.display());
            let layer = SettingsFile::read(path)?;
            if let Some(archive) = layer.archive {
                settings.archive = archive;
            }
            if let Some(converters) = layer.converters {
                settings.converters = converters;
            }
            if let Some(pdf) = layer.pdf {
                settings.pdf = pdf;
            }
            if let Some(pipeline) = layer.pipeline {
                settings.pipeline = pipeline;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archive.max_depth == 0 {
            return Err(invalid("archive.max_depth", "must be at least 1"));
        }
        if self.converters.timeout_secs == 0 {
            return Err(invalid("converters.timeout_secs", "must be at least 1"));
        }
        for (mime, specs) in &self.converters.mime {
            if !mime.contains('/') {
                return Err(invalid(
                    &format!("converters.mime.{mime}"),
                    "not a mime-type (expected type/subtype)",
                ));
            }
            if specs.iter().any(|spec| spec.trim().is_empty()) {
                return Err(invalid(
                    &format!("converters.mime.{mime}"),
                    "empty converter entry",
                ));
            }
        }
        if !(self.pdf.label_font_size.is_finite() && self.pdf.label_font_size > 0.0) {
            return Err(invalid("pdf.label_font_size", "must be a positive number"));
        }
        if self.pipeline.jobs == 0 {
            return Err(invalid("pipeline.jobs", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
