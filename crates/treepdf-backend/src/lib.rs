//! Conversion backend for treepdf
//!
//! Walks a directory or archive, converts every file to PDF through a chain
//! of converters and merges the results into one labelled document:
//!
//! - [`Converter`] is one way of turning bytes into PDF: an external program
//!   ([`ExternalConverter`]), a pipeline of programs ([`PipelineConverter`])
//!   or one of the [`builtin`] converters
//! - [`ConverterChain`] tries the universal, mime-specific and fallback
//!   converters in turn
//! - [`TreeWalker`] descends through directories and nested archives
//! - [`Pipeline`] ties them together and produces a [`ConversionReport`]

pub mod builtin;
pub mod chain;
pub mod converter;
pub mod error;
pub mod external;
pub mod pipeline;
pub mod report;
pub mod walker;

pub use chain::{Attempt, ChainEntry, ChainOutcome, ConverterChain, Stage};
pub use converter::{Converter, ConverterKind, ConverterStatus};
pub use error::{ConvertError, PipelineError};
pub use external::{converter_from_spec, ExternalConverter, PipelineConverter};
pub use pipeline::{Pipeline, PipelineOutput};
pub use report::{ConversionReport, Diagnostic, DiagnosticKind};
pub use walker::{LeafData, TreeWalker, WalkNode, WalkOptions, WalkOutput};
