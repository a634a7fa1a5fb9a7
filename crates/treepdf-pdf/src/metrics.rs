//! Glyph widths of the standard Type1 fonts
//!
//! Widths are in thousandths of an em for the printable ASCII range. Other
//! characters are measured with the family's default width.

use serde::{Deserialize, Serialize};

const FIRST_CHAR: u8 = 32;

const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const TIMES: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

/// Width table used to measure text set in a font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metrics {
    /// Helvetica and Helvetica-Oblique
    Helvetica,
    /// Helvetica-Bold and Helvetica-BoldOblique
    HelveticaBold,
    /// Times-Roman and Times-Italic
    Times,
    /// Times-Bold and Times-BoldItalic
    TimesBold,
    /// Every Courier face
    Courier,
}

impl Metrics {
    /// Width of one WinAnsi-encoded byte, in thousandths of an em
    #[must_use]
    pub fn glyph_width(self, byte: u8) -> u16 {
        let table = match self {
            Self::Courier => return 600,
            Self::Helvetica => &HELVETICA,
            Self::HelveticaBold => &HELVETICA_BOLD,
            Self::Times => &TIMES,
            Self::TimesBold => &TIMES_BOLD,
        };
        byte.checked_sub(FIRST_CHAR)
            .and_then(|index| table.get(usize::from(index)))
            .copied()
            .unwrap_or_else(|| self.default_width())
    }

    /// Width assumed for characters outside the table
    #[must_use]
    pub const fn default_width(self) -> u16 {
        match self {
            Self::Helvetica | Self::HelveticaBold => 556,
            Self::Times | Self::TimesBold => 500,
            Self::Courier => 600,
        }
    }

    /// Width of encoded text at `size` points
    #[must_use]
    pub fn text_width(self, encoded: &[u8], size: f32) -> f32 {
        let units: u32 = encoded.iter().map(|b| u32::from(self.glyph_width(*b))).sum();
        units as f32 * size / 1000.0
    }
}

/// Encode text for a font using `WinAnsiEncoding`
///
/// Latin-1 characters map to themselves, a few common punctuation marks to
/// their WinAnsi slots, and everything else becomes `?`. Control characters
/// are dropped.
#[must_use]
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
            '\u{20ac}' => 0x80,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2026}' => 0x85,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_widths() {
        assert_eq!(Metrics::Helvetica.glyph_width(b' '), 278);
        assert_eq!(Metrics::Helvetica.glyph_width(b'W'), 944);
        assert_eq!(Metrics::HelveticaBold.glyph_width(b'~'), 584);
        assert_eq!(Metrics::Times.glyph_width(b'a'), 444);
        assert_eq!(Metrics::TimesBold.glyph_width(b'%'), 1000);
        assert_eq!(Metrics::Courier.glyph_width(b'i'), 600);
        assert_eq!(Metrics::Helvetica.glyph_width(0xe9), 556);
    }

    #[test]
    fn test_text_width() {
        let width = Metrics::Courier.text_width(b"abcd", 10.0);
        assert!((width - 24.0).abs() < f32::EPSILON);
        let width = Metrics::Helvetica.text_width(b"Hi", 12.0);
        assert!((width - (722.0 + 222.0) * 12.0 / 1000.0).abs() < 1e-4);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("abc"), b"abc");
        assert_eq!(encode_win_ansi("caf\u{e9}"), b"caf\xe9");
        assert_eq!(encode_win_ansi("a\u{2014}b"), b"a\x97b");
        assert_eq!(encode_win_ansi("\u{4e2d}\tx"), b"?x");
    }
}
