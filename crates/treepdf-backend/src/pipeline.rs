//! The conversion pipeline: walk, convert, merge

use crate::chain::ConverterChain;
use crate::error::PipelineError;
use crate::report::ConversionReport;
use crate::walker::{TreeWalker, WalkOptions};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use treepdf_archive::{ArchiveLimits, FormatCatalog};
use treepdf_core::Settings;
use treepdf_pdf::{blank_page, page_count, FontCatalog, PdfSynthesizer, SourceDocument, SynthesizerOptions, A4};

/// Result of one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The combined document
    pub pdf: Vec<u8>,
    /// What was converted and what went wrong
    pub report: ConversionReport,
}

/// Converts a directory tree or archive into one labelled PDF
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use treepdf_backend::Pipeline;
/// use treepdf_core::Settings;
///
/// let pipeline = Pipeline::from_settings(&Settings::default())?;
/// let output = pipeline.run(Path::new("docs"))?;
/// std::fs::write("docs.pdf", &output.pdf)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Pipeline {
    walker: TreeWalker,
    chain: ConverterChain,
    synth: Arc<PdfSynthesizer>,
    labels: bool,
    jobs: usize,
}

impl Pipeline {
    /// Assemble a pipeline from explicit parts
    ///
    /// Labels are on and conversion is sequential until changed.
    #[must_use]
    pub fn new(walker: TreeWalker, chain: ConverterChain, synth: Arc<PdfSynthesizer>) -> Self {
        Self {
            walker,
            chain,
            synth,
            labels: true,
            jobs: 1,
        }
    }

    /// Assemble the pipeline described by `settings`
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for invalid settings and
    /// [`PipelineError::Output`] if a configured font is unknown.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        settings.validate()?;

        let catalog = Arc::new(FontCatalog::new(settings.pdf.font_dir.clone()));
        let options = SynthesizerOptions {
            label_font: settings.pdf.page_label_font.clone(),
            generated_font: settings.pdf.generated_pages_font.clone(),
            label_size: settings.pdf.label_font_size,
        };
        let synth = Arc::new(PdfSynthesizer::new(catalog, &options)?);
        let chain = ConverterChain::from_settings(&settings.converters, &synth);
        let walker = TreeWalker::new(
            FormatCatalog::default(),
            WalkOptions {
                archives: settings.archive.enabled,
                limits: ArchiveLimits::new(settings.archive.size_limit),
                max_depth: settings.archive.max_depth,
            },
        );

        Ok(Self::new(walker, chain, synth)
            .with_labels(settings.pdf.page_labels)
            .with_jobs(settings.pipeline.jobs))
    }

    /// Turn page labels on or off
    #[must_use]
    pub fn with_labels(mut self, labels: bool) -> Self {
        self.labels = labels;
        self
    }

    /// Number of leaves converted concurrently (at least 1)
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// The converter chain in use
    #[must_use]
    pub const fn chain(&self) -> &ConverterChain {
        &self.chain
    }

    /// The synthesizer in use
    #[must_use]
    pub const fn synthesizer(&self) -> &Arc<PdfSynthesizer> {
        &self.synth
    }

    /// The walker in use
    #[must_use]
    pub const fn walker(&self) -> &TreeWalker {
        &self.walker
    }

    /// Convert everything under `root` into one PDF
    ///
    /// A tree without any file yields a single blank page.
    ///
    /// # Errors
    ///
    /// Fails if `root` is missing or unreadable, if `root` is an archive that
    /// cannot be opened, or if the output cannot be assembled. Failures below
    /// the root end up as error pages and diagnostics in the report.
    pub fn run(&self, root: &Path) -> Result<PipelineOutput, PipelineError> {
        info!("Converting {}", root.display());
        let walked = self.walker.walk(root, &self.chain, &self.synth, self.jobs)?;

        let pdf = if walked.documents.is_empty() {
            warn!("Nothing to convert under {}, writing a blank page", root.display());
            self.synth
                .merge(&[SourceDocument::new("empty", blank_page(A4))], false)?
        } else {
            self.synth.merge(&walked.documents, self.labels)?
        };

        let report = ConversionReport {
            documents: walked.documents.len(),
            pages: page_count(&pdf)?,
            diagnostics: walked.diagnostics,
        };
        info!(
            "Wrote {} pages from {} documents ({} problems)",
            report.pages,
            report.documents,
            report.diagnostics.len()
        );
        Ok(PipelineOutput { pdf, report })
    }
}
