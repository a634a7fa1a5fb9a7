//! Error types for PDF synthesis

use thiserror::Error;

/// Errors that can occur while reading or producing PDF documents
#[derive(Error, Debug)]
pub enum PdfError {
    /// lopdf could not parse or serialize a document
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error while writing a document
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document parsed but cannot be merged
    #[error("Malformed PDF: {0}")]
    Malformed(String),

    /// The document is encrypted
    #[error("PDF is encrypted")]
    Encrypted,

    /// No font with this identifier is in the catalog
    #[error("Unknown font '{0}'")]
    UnknownFont(String),

    /// A font descriptor file could not be used
    #[error("Invalid font descriptor {name}: {reason}")]
    InvalidDescriptor {
        /// Descriptor file name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Sample text must contain at least one character
    #[error("Sample text is empty")]
    EmptyText,

    /// Image data could not be decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
