//! Builtin converters
//!
//! Registered after the configured programs of a mime-type, unless disabled.

use crate::converter::{Converter, ConverterKind};
use crate::error::ConvertError;
use std::sync::Arc;
use treepdf_pdf::PdfSynthesizer;

/// Mime-types handled by [`PdfPassthrough`]
pub const PDF_MIME_TYPES: &[&str] = &["application/pdf", "application/x-pdf"];

/// Mime-types handled by [`TextConverter`]
pub const TEXT_MIME_TYPES: &[&str] = &["text/plain", "text/markdown", "text/x-markdown", "text/csv"];

/// Mime-types handled by [`ImageConverter`]
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
];

fn check_mime(converter: &str, handled: &[&str], mime_type: &str) -> Result<(), ConvertError> {
    if handled.contains(&mime_type) {
        Ok(())
    } else {
        Err(ConvertError::Unsupported {
            converter: converter.to_string(),
            mime_type: mime_type.to_string(),
        })
    }
}

/// Hands PDF documents through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfPassthrough;

impl Converter for PdfPassthrough {
    fn name(&self) -> &str {
        "builtin:pdf"
    }

    fn convert(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError> {
        check_mime(self.name(), PDF_MIME_TYPES, mime_type)?;
        Ok(data.to_vec())
    }

    fn kind(&self) -> ConverterKind {
        ConverterKind::Builtin
    }
}

/// Sets plain text on A4 pages
#[derive(Debug, Clone)]
pub struct TextConverter {
    synth: Arc<PdfSynthesizer>,
}

impl TextConverter {
    /// Text converter drawing with `synth`
    #[must_use]
    pub fn new(synth: Arc<PdfSynthesizer>) -> Self {
        Self { synth }
    }
}

impl Converter for TextConverter {
    fn name(&self) -> &str {
        "builtin:text"
    }

    fn convert(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError> {
        check_mime(self.name(), TEXT_MIME_TYPES, mime_type)?;
        let text = String::from_utf8_lossy(data);
        Ok(self.synth.text_document(text.trim_start_matches('\u{feff}'))?)
    }

    fn kind(&self) -> ConverterKind {
        ConverterKind::Builtin
    }
}

/// Places a raster image on an A4 page
#[derive(Debug, Clone)]
pub struct ImageConverter {
    synth: Arc<PdfSynthesizer>,
}

impl ImageConverter {
    /// Image converter drawing with `synth`
    #[must_use]
    pub fn new(synth: Arc<PdfSynthesizer>) -> Self {
        Self { synth }
    }
}

impl Converter for ImageConverter {
    fn name(&self) -> &str {
        "builtin:image"
    }

    fn convert(&self, data: &[u8], mime_type: &str) -> Result<Vec<u8>, ConvertError> {
        check_mime(self.name(), IMAGE_MIME_TYPES, mime_type)?;
        Ok(self.synth.image_document(data)?)
    }

    fn kind(&self) -> ConverterKind {
        ConverterKind::Builtin
    }
}

/// Every builtin converter with the mime-types it is registered for
#[must_use]
pub fn builtin_converters(synth: &Arc<PdfSynthesizer>) -> Vec<(&'static str, Arc<dyn Converter>)> {
    let pdf: Arc<dyn Converter> = Arc::new(PdfPassthrough);
    let text: Arc<dyn Converter> = Arc::new(TextConverter::new(Arc::clone(synth)));
    let image: Arc<dyn Converter> = Arc::new(ImageConverter::new(Arc::clone(synth)));

    let mut converters = Vec::new();
    for (mime_types, converter) in [(PDF_MIME_TYPES, pdf), (TEXT_MIME_TYPES, text), (IMAGE_MIME_TYPES, image)] {
        converters.extend(mime_types.iter().map(|mime| (*mime, Arc::clone(&converter))));
    }
    converters
}
