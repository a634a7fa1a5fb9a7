//! PDF synthesis for treepdf
//!
//! [`PdfSynthesizer`] wraps lopdf with the few drawing primitives the
//! conversion pipeline needs:
//!
//! - enumerate fonts ([`FontCatalog`], built once and cached)
//! - render a short text sample on a page sized to fit it
//! - draw plain text, image and error pages
//! - merge converted documents, stamping `BASENAME PAGE/PAGES` labels
//!
//! ```no_run
//! use std::sync::Arc;
//! use treepdf_pdf::{FontCatalog, PdfSynthesizer, SourceDocument, SynthesizerOptions};
//!
//! let synth = PdfSynthesizer::new(Arc::new(FontCatalog::default()), &SynthesizerOptions::default())
//!     .unwrap();
//! let notes = synth.text_document("hello").unwrap();
//! let merged = synth.merge(&[SourceDocument::new("notes.txt", notes)], true).unwrap();
//! std::fs::write("out.pdf", merged).unwrap();
//! ```

pub mod error;
pub mod fonts;
mod layout;
pub mod merge;
pub mod metrics;
mod raster;
pub mod synthesizer;
mod writer;

pub use error::PdfError;
pub use fonts::{FontCatalog, FontDescriptor, FontFlags, FontStyle};
pub use layout::sample_padding;
pub use merge::{page_count, validate, PageLabel, SourceDocument};
pub use metrics::Metrics;
pub use synthesizer::{PdfSynthesizer, SynthesizerOptions, ERROR_TITLE};
pub use writer::{blank_page, A4};
