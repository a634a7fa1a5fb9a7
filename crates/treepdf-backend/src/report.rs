//! Diagnostics collected during a run

use crate::chain::Attempt;
use serde::Serialize;
use std::fmt;
use treepdf_archive::ArchiveError;

/// What went wrong for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Archive unreadable or unsupported
    CannotOpen,
    /// Archive above the soft size limit
    TooLarge,
    /// Archive above the bomb limit
    BombDetected,
    /// Archive nested deeper than allowed
    TooDeep,
    /// Converters failed before one succeeded
    ConverterFailed,
    /// Every converter failed; an error page was substituted
    ChainExhausted,
    /// A listed archive entry could not be read back; skipped
    EntryVanished,
    /// A file or directory could not be read
    Unreadable,
}

impl DiagnosticKind {
    /// Whether an error page stands in for the path in the output
    #[must_use]
    pub const fn substitutes_page(self) -> bool {
        !matches!(self, Self::ConverterFailed | Self::EntryVanished)
    }

    /// Classify an archive failure
    #[must_use]
    pub const fn from_archive_error(error: &ArchiveError) -> Self {
        match error {
            ArchiveError::TooLarge { .. } | ArchiveError::EntryTooLarge { .. } => Self::TooLarge,
            ArchiveError::BombDetected { .. } => Self::BombDetected,
            ArchiveError::PasswordProtected { .. } | ArchiveError::Io(_) => Self::Unreadable,
            ArchiveError::CannotOpen { .. }
            | ArchiveError::Corrupt { .. }
            | ArchiveError::NotOpen => Self::CannotOpen,
        }
    }

    /// Short label used on error pages
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CannotOpen => "cannot open archive",
            Self::TooLarge => "archive too large",
            Self::BombDetected => "potential archive bomb",
            Self::TooDeep => "archive nested too deeply",
            Self::ConverterFailed => "converter failed",
            Self::ChainExhausted => "no converter succeeded",
            Self::EntryVanished => "archive entry vanished",
            Self::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One problem at one logical path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Logical path (`dir/archive.zip/entry.txt`)
    pub path: String,
    /// Classification
    pub kind: DiagnosticKind,
    /// Error message
    pub message: String,
    /// Failed converter invocations, if any
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
}

impl Diagnostic {
    /// Diagnostic without converter attempts
    #[must_use]
    pub fn new<P: Into<String>, M: Into<String>>(path: P, kind: DiagnosticKind, message: M) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    /// Lines printed on the substituted error page
    #[must_use]
    pub fn page_lines(&self) -> Vec<String> {
        let mut lines = vec![self.path.clone(), format!("{}: {}", self.kind, self.message)];
        lines.extend(
            self.attempts
                .iter()
                .map(|attempt| format!("Caused by previous exception: {attempt}")),
        );
        lines
    }
}

/// Everything worth telling the user about a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    /// Documents merged into the output, error pages included
    pub documents: usize,
    /// Pages of the output
    pub pages: usize,
    /// Problems in traversal order
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionReport {
    /// Whether nothing went wrong
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Number of error pages in the output
    #[must_use]
    pub fn error_pages(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.kind.substitutes_page())
            .count()
    }
}
