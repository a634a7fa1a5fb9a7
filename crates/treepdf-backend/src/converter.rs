//! The converter seam

use crate::error::ConvertError;
use serde::Serialize;

/// Something that turns bytes of a given mime-type into PDF bytes
///
/// Implementations must be callable from several threads at once. The output
/// is validated by the chain; a converter does not need to check it.
pub trait Converter: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Convert `data`, declared as `mime_type`, to PDF
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError`] if the conversion fails or times out.
    fn convert(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError>;

    /// How the converter is put together
    fn kind(&self) -> ConverterKind {
        ConverterKind::Single
    }

    /// Whether the converter can run on this host
    fn status(&self) -> ConverterStatus {
        ConverterStatus::Available
    }
}

/// Shape of a converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    /// One program or builtin
    Single,
    /// Programs whose output is piped into the next one
    Pipeline,
    /// Builtin converter
    Builtin,
}

impl ConverterKind {
    /// Human readable description
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Single => "single converter",
            Self::Pipeline => "converter chain",
            Self::Builtin => "builtin converter",
        }
    }
}

/// Availability of a converter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "program")]
pub enum ConverterStatus {
    /// Ready to run
    Available,
    /// A required program was not found
    Missing(String),
}

impl ConverterStatus {
    /// Whether the converter can run
    #[inline]
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}
