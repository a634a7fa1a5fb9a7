//! Error types for conversion and the pipeline

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use treepdf_archive::ArchiveError;
use treepdf_core::ConfigError;
use treepdf_pdf::PdfError;

/// Failure of one converter invocation
///
/// Always contained to the leaf being converted; the chain moves on to the
/// next converter.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The converter program does not exist
    #[error("Please install the \"{program}\" program on the server.")]
    NotInstalled {
        /// Program as configured
        program: String,
    },

    /// The program could not be started or talked to
    #[error("Cannot run \"{program}\": {source}")]
    Spawn {
        /// Program as configured
        program: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// The program exited unsuccessfully
    #[error("\"{program}\" exited with {status}: {stderr}")]
    Failed {
        /// Program as configured
        program: String,
        /// Exit status description
        status: String,
        /// Tail of the program's standard error
        stderr: String,
    },

    /// The program ran longer than allowed and was killed
    #[error("\"{program}\" timed out after {timeout_secs}s")]
    TimedOut {
        /// Program as configured
        program: String,
        /// Timeout in effect
        timeout_secs: u64,
    },

    /// The converter claimed success but its output is not a mergeable PDF
    #[error("Converter \"{converter}\" produced invalid PDF: {reason}")]
    InvalidOutput {
        /// Converter name
        converter: String,
        /// Validation failure
        reason: String,
    },

    /// A builtin converter was handed a mime-type it does not handle
    #[error("Converter \"{converter}\" cannot handle mime-type \"{mime_type}\"")]
    Unsupported {
        /// Converter name
        converter: String,
        /// Declared mime-type
        mime_type: String,
    },

    /// A builtin converter failed to draw its document
    #[error(transparent)]
    Render(#[from] PdfError),
}

/// Errors fatal to a whole pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The starting node does not exist
    #[error("Input not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The starting node could not be read
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// The starting node is an archive that cannot be opened
    #[error(transparent)]
    CannotOpen(ArchiveError),

    /// Settings are inconsistent
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The synthesizer could not be set up or the output assembled
    #[error("Cannot assemble output document: {0}")]
    Output(#[from] PdfError),
}
