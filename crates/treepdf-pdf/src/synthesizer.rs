//! The PDF synthesizer: the one entry point the pipeline draws with

use crate::error::PdfError;
use crate::fonts::{FontCatalog, FontDescriptor};
use crate::layout;
use crate::merge::{self, LabelStyle, SourceDocument};
use crate::raster;
use crate::writer::{blank_page, A4};
use log::{debug, warn};
use std::sync::Arc;

/// Title line of every error page
pub const ERROR_TITLE: &str = "Error, caught an exception.";

/// Default font size of page labels, in points
pub const DEFAULT_LABEL_SIZE: f32 = 8.0;

/// Font choices of a synthesizer
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizerOptions {
    /// Font identifier for page labels
    pub label_font: String,
    /// Font identifier for text and error pages
    pub generated_font: String,
    /// Label font size in points
    pub label_size: f32,
}

impl Default for SynthesizerOptions {
    fn default() -> Self {
        Self {
            label_font: "helvetica".to_string(),
            generated_font: "courier".to_string(),
            label_size: DEFAULT_LABEL_SIZE,
        }
    }
}

/// Draws generated pages and merges converted documents
///
/// Fonts are resolved once at construction, so every drawing call works with
/// known fonts.
#[derive(Debug, Clone)]
pub struct PdfSynthesizer {
    catalog: Arc<FontCatalog>,
    label_font: FontDescriptor,
    generated_font: FontDescriptor,
    label_size: f32,
}

impl PdfSynthesizer {
    /// Create a synthesizer drawing with fonts from `catalog`
    ///
    /// # Errors
    ///
    /// Returns [`PdfError::UnknownFont`] if either configured font is not in
    /// the catalog.
    pub fn new(catalog: Arc<FontCatalog>, options: &SynthesizerOptions) -> Result<Self, PdfError> {
        let label_font = catalog.resolve(&options.label_font)?.clone();
        let generated_font = catalog.resolve(&options.generated_font)?.clone();
        Ok(Self {
            catalog,
            label_font,
            generated_font,
            label_size: options.label_size,
        })
    }

    /// The font catalog in use
    #[must_use]
    pub fn catalog(&self) -> &FontCatalog {
        &self.catalog
    }

    /// All fonts of the catalog, sorted by program reference
    #[must_use]
    pub fn list_fonts(&self) -> &[FontDescriptor] {
        self.catalog.fonts()
    }

    /// Render `text` on a page exactly its size plus padding
    ///
    /// The page measures `2 * padding + text width` by `2 * padding + size`
    /// with `padding = size / 4`; there are no headers, footers or breaks.
    ///
    /// # Errors
    ///
    /// Returns [`PdfError::UnknownFont`] for an unknown font and
    /// [`PdfError::EmptyText`] for text without printable characters.
    pub fn render_sample(&self, text: &str, font: &str, size: f32) -> Result<Vec<u8>, PdfError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(PdfError::Malformed(format!("invalid font size {size}")));
        }
        let font = self.catalog.resolve(font)?;
        layout::sample(font, size, text)
    }

    /// Plain text on A4 pages in the generated-pages font
    ///
    /// # Errors
    ///
    /// Returns [`PdfError`] if the document cannot be serialized.
    pub fn text_document(&self, text: &str) -> Result<Vec<u8>, PdfError> {
        layout::text_document(&self.generated_font, text)
    }

    /// An image scaled onto one A4 page
    ///
    /// # Errors
    ///
    /// Returns [`PdfError::Image`] if the data cannot be decoded.
    pub fn image_document(&self, data: &[u8]) -> Result<Vec<u8>, PdfError> {
        raster::image_document(data)
    }

    /// One-page error document listing `details` under [`ERROR_TITLE`]
    ///
    /// Never fails: if the page cannot be drawn a blank page is returned.
    #[must_use]
    pub fn error_page(&self, details: &[String]) -> Vec<u8> {
        layout::error_page(&self.generated_font, ERROR_TITLE, details).unwrap_or_else(|e| {
            warn!("Cannot draw error page, using a blank page: {e}");
            blank_page(A4)
        })
    }

    /// Concatenate documents in order, optionally labelling every page
    ///
    /// Labels read `BASENAME PAGE/PAGES` with counters per document. A
    /// document that cannot be merged is replaced by an error page so the
    /// output still has one entry per input.
    ///
    /// # Errors
    ///
    /// Returns [`PdfError`] only if the output cannot be assembled.
    pub fn merge(&self, documents: &[SourceDocument], labels: bool) -> Result<Vec<u8>, PdfError> {
        let mut loaded = Vec::with_capacity(documents.len());
        for source in documents {
            let doc = match merge::load(&source.bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Cannot merge {}, substituting an error page: {e}", source.path);
                    let page = self.error_page(&[source.path.clone(), e.to_string()]);
                    merge::load(&page).or_else(|_| merge::load(&blank_page(A4)))?
                }
            };
            loaded.push((source.path.clone(), doc));
        }

        debug!("Merging {} documents", loaded.len());
        let style = labels.then_some(LabelStyle {
            font: &self.label_font,
            size: self.label_size,
        });
        merge::merge_documents(loaded, style)
    }
}
