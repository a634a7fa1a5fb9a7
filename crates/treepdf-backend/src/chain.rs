//! The converter chain
//!
//! Per leaf the chain moves through three stages:
//!
//! 1. the universal converter, if configured, for every mime-type
//! 2. the converters registered for the exact mime-type, in order
//! 3. the fallback converter, if configured
//!
//! The first converter whose output validates as PDF wins. No converter is
//! invoked twice for one leaf. When every stage fails the caller substitutes
//! an error page.

use crate::builtin::builtin_converters;
use crate::converter::{Converter, ConverterKind, ConverterStatus};
use crate::external::converter_from_spec;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use treepdf_core::ConverterSettings;
use treepdf_pdf::{validate, PdfSynthesizer};

/// Chain stage a converter belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Tried first for every mime-type
    Universal,
    /// Registered for one mime-type
    Specific,
    /// Tried after everything else failed
    Fallback,
}

/// One failed converter invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// Converter name
    pub converter: String,
    /// Mime-type it was asked to convert
    pub mime_type: String,
    /// Stage of the chain
    pub stage: Stage,
    /// Why it failed
    pub reason: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.stage {
            Stage::Universal => "Universal converter",
            Stage::Specific => "Converter",
            Stage::Fallback => "Fallback converter",
        };
        write!(
            f,
            "{prefix} \"{}\" has failed trying to convert mime-type \"{}\": {}",
            self.converter, self.mime_type, self.reason
        )
    }
}

/// Result of running the chain on one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A converter produced valid PDF
    Converted {
        /// Converter that succeeded
        converter: String,
        /// Validated PDF bytes
        pdf: Vec<u8>,
        /// Converters that failed before it
        attempts: Vec<Attempt>,
    },
    /// Every stage failed or nothing was configured
    Exhausted {
        /// Every failed invocation, in order
        attempts: Vec<Attempt>,
    },
}

impl ChainOutcome {
    /// Failed invocations recorded on the way
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::Converted { attempts, .. } | Self::Exhausted { attempts } => attempts,
        }
    }
}

/// Configured converter as shown by status listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainEntry {
    /// Stage of the chain
    pub stage: Stage,
    /// Mime-type for specific converters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Converter name
    pub converter: String,
    /// Converter shape
    pub kind: ConverterKind,
    /// Whether it can run here
    pub status: ConverterStatus,
}

/// Universal, mime-type specific and fallback converters
#[derive(Clone, Default)]
pub struct ConverterChain {
    universal: Option<Arc<dyn Converter>>,
    specific: BTreeMap<String, Vec<Arc<dyn Converter>>>,
    fallback: Option<Arc<dyn Converter>>,
}

impl fmt::Debug for ConverterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterChain")
            .field("universal", &self.universal.as_ref().map(|c| c.name().to_string()))
            .field(
                "specific",
                &self
                    .specific
                    .iter()
                    .map(|(mime, list)| (mime, list.iter().map(|c| c.name()).collect::<Vec<_>>()))
                    .collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

impl ConverterChain {
    /// Empty chain: every leaf is exhausted immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the universal converter
    #[must_use]
    pub fn with_universal(mut self, converter: Arc<dyn Converter>) -> Self {
        self.universal = Some(converter);
        self
    }

    /// Set the fallback converter
    #[must_use]
    pub fn with_fallback(mut self, converter: Arc<dyn Converter>) -> Self {
        self.fallback = Some(converter);
        self
    }

    /// Append a converter for one exact mime-type
    pub fn add_specific(&mut self, mime_type: &str, converter: Arc<dyn Converter>) {
        self.specific
            .entry(mime_type.to_string())
            .or_default()
            .push(converter);
    }

    /// Chain as configured: programs from settings, then the builtins
    ///
    /// Blank specs are skipped with a warning.
    #[must_use]
    pub fn from_settings(settings: &ConverterSettings, synth: &Arc<PdfSynthesizer>) -> Self {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let build = |spec: &str| {
            let converter = converter_from_spec(spec, timeout);
            if converter.is_none() {
                warn!("Ignoring blank converter spec '{spec}'");
            }
            converter
        };

        let mut chain = Self::new();
        chain.universal = settings.universal.as_deref().and_then(build);
        chain.fallback = settings.fallback.as_deref().and_then(build);
        for (mime_type, specs) in &settings.mime {
            for converter in specs.iter().filter_map(|spec| build(spec)) {
                chain.add_specific(mime_type, converter);
            }
        }
        if !settings.disable_builtin {
            for (mime_type, converter) in builtin_converters(synth) {
                chain.add_specific(mime_type, converter);
            }
        }
        chain
    }

    /// Converters registered for exactly this mime-type
    #[must_use]
    pub fn converters_for(&self, mime_type: &str) -> &[Arc<dyn Converter>] {
        self.specific.get(mime_type).map_or(&[], Vec::as_slice)
    }

    /// Run the chain on one leaf
    #[must_use]
    pub fn convert(&self, data: &[u8], mime_type: &str) -> ChainOutcome {
        let mut attempts = Vec::new();
        let stages = self
            .universal
            .iter()
            .map(|c| (Stage::Universal, c))
            .chain(self.converters_for(mime_type).iter().map(|c| (Stage::Specific, c)))
            .chain(self.fallback.iter().map(|c| (Stage::Fallback, c)));

        for (stage, converter) in stages {
            match Self::attempt(converter.as_ref(), data, mime_type) {
                Ok(pdf) => {
                    debug!("{} converted {mime_type}", converter.name());
                    return ChainOutcome::Converted {
                        converter: converter.name().to_string(),
                        pdf,
                        attempts,
                    };
                }
                Err(reason) => {
                    let attempt = Attempt {
                        converter: converter.name().to_string(),
                        mime_type: mime_type.to_string(),
                        stage,
                        reason,
                    };
                    warn!("{attempt}");
                    attempts.push(attempt);
                }
            }
        }
        ChainOutcome::Exhausted { attempts }
    }

    fn attempt(converter: &dyn Converter, data: &[u8], mime_type: &str) -> Result<Vec<u8>, String> {
        let pdf = converter
            .convert(data, mime_type)
            .map_err(|e| e.to_string())?;
        validate(&pdf).map_err(|e| {
            crate::error::ConvertError::InvalidOutput {
                converter: converter.name().to_string(),
                reason: e.to_string(),
            }
            .to_string()
        })?;
        Ok(pdf)
    }

    /// Every configured converter with its availability
    #[must_use]
    pub fn describe(&self) -> Vec<ChainEntry> {
        let entry = |stage, mime_type: Option<&str>, converter: &Arc<dyn Converter>| ChainEntry {
            stage,
            mime_type: mime_type.map(str::to_string),
            converter: converter.name().to_string(),
            kind: converter.kind(),
            status: converter.status(),
        };
        let mut entries: Vec<ChainEntry> = self
            .universal
            .iter()
            .map(|c| entry(Stage::Universal, None, c))
            .collect();
        for (mime_type, converters) in &self.specific {
            entries.extend(converters.iter().map(|c| entry(Stage::Specific, Some(mime_type), c)));
        }
        entries.extend(self.fallback.iter().map(|c| entry(Stage::Fallback, None, c)));
        entries
    }
}
