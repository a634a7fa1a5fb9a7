//! # treepdf core
//!
//! Types shared by every treepdf crate:
//!
//! - [`Settings`]: the already-validated configuration scalars consumed by the
//!   archive guard, the converter chain and the PDF synthesizer
//! - [`mime`]: mime-type detection for files found while walking a tree
//! - [`size`]: parsing of human-readable byte sizes (`100M`, `1.5G`)
//!
//! ```no_run
//! use treepdf_core::Settings;
//! use std::path::Path;
//!
//! let settings = Settings::load_from_file(Path::new(".treepdf.toml")).unwrap();
//! println!("archives enabled: {}", settings.archive.enabled);
//! ```

pub mod error;
pub mod mime;
pub mod settings;
pub mod size;

pub use error::ConfigError;
pub use settings::{
    ArchiveSettings, ConverterSettings, PdfSettings, PipelineSettings, Settings,
    DEFAULT_CONVERTER_TIMEOUT_SECS,
};
