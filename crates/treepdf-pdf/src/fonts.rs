//! Font catalog
//!
//! Fonts are described by small versioned TOML descriptors, one file per font
//! program. The builtin descriptors cover the standard Type1 faces; more can
//! be dropped into a font directory:
//!
//! ```toml
//! version = 1
//! type = "core"
//! name = "Helvetica-BoldOblique"
//! flags = 96
//! metrics = "helvetica-bold"
//! ```
//!
//! The file stem is the font program reference. Trailing style markers in the
//! stem are folded into [`FontStyle`]: `helveticabi` is family `helvetica`,
//! style `BI`, identifier `helveticaBI`.

use crate::error::PdfError;
use crate::metrics::Metrics;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Descriptor layout understood by this version
pub const DESCRIPTOR_VERSION: u32 = 1;

const BUILTIN_DESCRIPTORS: [(&str, &str); 12] = [
    ("courier", include_str!("../fonts/courier.toml")),
    ("courierb", include_str!("../fonts/courierb.toml")),
    ("courierbi", include_str!("../fonts/courierbi.toml")),
    ("courieri", include_str!("../fonts/courieri.toml")),
    ("helvetica", include_str!("../fonts/helvetica.toml")),
    ("helveticab", include_str!("../fonts/helveticab.toml")),
    ("helveticabi", include_str!("../fonts/helveticabi.toml")),
    ("helveticai", include_str!("../fonts/helveticai.toml")),
    ("times", include_str!("../fonts/times.toml")),
    ("timesb", include_str!("../fonts/timesb.toml")),
    ("timesbi", include_str!("../fonts/timesbi.toml")),
    ("timesi", include_str!("../fonts/timesi.toml")),
];

/// PDF font descriptor flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FontFlags(u32);

impl FontFlags {
    /// All glyphs have the same width
    pub const MONOSPACE: u32 = 1 << 0;
    /// Glyphs have serifs
    pub const SERIF: u32 = 1 << 1;
    /// Font contains glyphs outside the standard Latin set
    pub const SYMBOLIC: u32 = 1 << 2;
    /// Font uses the standard Latin character set
    pub const NORMAL: u32 = 1 << 5;
    /// Glyphs are slanted
    pub const ITALIC: u32 = 1 << 6;

    /// Wrap raw flag bits
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flag bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `flag` is set
    #[inline]
    #[must_use]
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Names of the set capability bits
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::MONOSPACE, "monospace"),
            (Self::SERIF, "serif"),
            (Self::SYMBOLIC, "symbolic"),
            (Self::NORMAL, "normal"),
            (Self::ITALIC, "italic"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| name)
        .collect()
    }
}

/// Bold and italic markers of a font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FontStyle {
    /// Bold face
    pub bold: bool,
    /// Italic or oblique face
    pub italic: bool,
}

impl FontStyle {
    /// Style code appended to the family name: `""`, `"B"`, `"I"` or `"BI"`
    #[must_use]
    pub const fn code(self) -> &'static str {
        match (self.bold, self.italic) {
            (false, false) => "",
            (true, false) => "B",
            (false, true) => "I",
            (true, true) => "BI",
        }
    }
}

impl fmt::Display for FontStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// On-disk descriptor schema
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorFile {
    version: u32,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    flags: u32,
    metrics: Metrics,
}

/// One usable font
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FontDescriptor {
    /// Family name without style markers
    pub family: String,
    /// Style folded out of the program name
    pub style: FontStyle,
    /// Font program reference (descriptor file stem)
    pub program: String,
    /// PostScript name written as `BaseFont`
    pub base_font: String,
    /// Descriptor flag bits
    pub flags: FontFlags,
    /// Width table used for layout
    pub metrics: Metrics,
}

impl FontDescriptor {
    /// Parse a descriptor for the font program `program`
    ///
    /// # Errors
    ///
    /// Returns [`PdfError::InvalidDescriptor`] for malformed TOML, an unknown
    /// layout version or a font type that cannot be used.
    pub fn parse(program: &str, content: &str) -> Result<Self, PdfError> {
        let invalid = |reason: String| PdfError::InvalidDescriptor {
            name: program.to_string(),
            reason,
        };
        let file: DescriptorFile = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        if file.version != DESCRIPTOR_VERSION {
            return Err(invalid(format!("unsupported descriptor version {}", file.version)));
        }
        if file.kind != "core" {
            return Err(invalid(format!("unsupported font type '{}'", file.kind)));
        }

        let flags = FontFlags::from_bits(file.flags);
        let (family, style) = normalize_style(program, flags);
        Ok(Self {
            family,
            style,
            program: program.to_string(),
            base_font: file.name,
            flags,
            metrics: file.metrics,
        })
    }

    /// Identifier used in configuration: family followed by the style code
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}{}", self.family, self.style.code())
    }
}

/// Fold trailing `i` (with the italic flag) and `b` markers into a style
fn normalize_style(program: &str, flags: FontFlags) -> (String, FontStyle) {
    let mut family = program;
    let mut style = FontStyle::default();
    if flags.contains(FontFlags::ITALIC) {
        if let Some(stripped) = family.strip_suffix('i') {
            family = stripped;
            style.italic = true;
        }
    }
    if let Some(stripped) = family.strip_suffix('b') {
        if !stripped.is_empty() {
            family = stripped;
            style.bold = true;
        }
    }
    (family.to_string(), style)
}

/// Available fonts, built on first use and read-only afterwards
#[derive(Debug, Default)]
pub struct FontCatalog {
    font_dir: Option<PathBuf>,
    fonts: OnceLock<Vec<FontDescriptor>>,
}

impl FontCatalog {
    /// Catalog of the builtin fonts plus descriptors found in `font_dir`
    #[must_use]
    pub fn new(font_dir: Option<PathBuf>) -> Self {
        Self {
            font_dir,
            fonts: OnceLock::new(),
        }
    }

    /// Catalog over a fixed list of descriptors
    #[must_use]
    pub fn from_descriptors(mut fonts: Vec<FontDescriptor>) -> Self {
        fonts.sort_by(|a, b| a.program.cmp(&b.program));
        Self {
            font_dir: None,
            fonts: OnceLock::from(fonts),
        }
    }

    /// All fonts, sorted by program reference
    #[must_use]
    pub fn fonts(&self) -> &[FontDescriptor] {
        self.fonts.get_or_init(|| self.build())
    }

    /// Look a font up by identifier (`helveticaB`) or program (`helveticab`)
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&FontDescriptor> {
        let fonts = self.fonts();
        fonts
            .iter()
            .find(|font| font.id() == id)
            .or_else(|| fonts.iter().find(|font| font.program.eq_ignore_ascii_case(id)))
    }

    /// Like [`find`](Self::find) but failing for unknown identifiers
    ///
    /// # Errors
    ///
    /// Returns [`PdfError::UnknownFont`] if no font matches.
    pub fn resolve(&self, id: &str) -> Result<&FontDescriptor, PdfError> {
        self.find(id).ok_or_else(|| PdfError::UnknownFont(id.to_string()))
    }

    fn build(&self) -> Vec<FontDescriptor> {
        let mut fonts: Vec<FontDescriptor> = BUILTIN_DESCRIPTORS
            .iter()
            .filter_map(|(program, content)| match FontDescriptor::parse(program, content) {
                Ok(font) => Some(font),
                Err(e) => {
                    warn!("Skipping builtin font: {e}");
                    None
                }
            })
            .collect();

        if let Some(dir) = &self.font_dir {
            for font in scan_dir(dir) {
                if fonts.iter().any(|known| known.program == font.program) {
                    debug!("Font {} already known, ignoring {}", font.program, dir.display());
                    continue;
                }
                fonts.push(font);
            }
        }

        fonts.sort_by(|a, b| a.program.cmp(&b.program));
        debug!("Font catalog built with {} fonts", fonts.len());
        fonts
    }
}

fn scan_dir(dir: &Path) -> Vec<FontDescriptor> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read font directory {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut fonts = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(program) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let parsed = fs::read_to_string(&path)
            .map_err(PdfError::from)
            .and_then(|content| FontDescriptor::parse(program, &content));
        match parsed {
            Ok(font) => fonts.push(font),
            Err(e) => warn!("Skipping font descriptor {}: {e}", path.display()),
        }
    }
    fonts
}
