//! Generated pages: font samples, plain text and error pages

use crate::error::PdfError;
use crate::fonts::FontDescriptor;
use crate::metrics::{encode_win_ansi, Metrics};
use crate::writer::{text_line, DocumentWriter, A4};
use lopdf::{dictionary, Dictionary, ObjectId};

const FONT_KEY: &str = "F1";
const PAGE_MARGIN: f32 = 50.0;
const TEXT_SIZE: f32 = 10.0;
const TITLE_SIZE: f32 = 14.0;
const LINE_SPACING: f32 = 1.2;
const TAB: &str = "    ";

/// Greedy word wrap of text into encoded lines no wider than `max_width`
///
/// Words longer than a line are broken between characters.
pub(crate) fn wrap(text: &str, metrics: Metrics, size: f32, max_width: f32) -> Vec<Vec<u8>> {
    let glyph = |byte: u8| f32::from(metrics.glyph_width(byte)) * size / 1000.0;
    let mut lines = Vec::new();

    for raw in text.split('\n') {
        let encoded = encode_win_ansi(&raw.trim_end_matches('\r').replace('\t', TAB));
        let mut line: Vec<u8> = Vec::new();
        let mut width = 0.0;

        for word in encoded.split_inclusive(|b| *b == b' ') {
            let visible = word.strip_suffix(b" ").unwrap_or(word);
            let word_width: f32 = visible.iter().map(|b| glyph(*b)).sum();
            if width + word_width <= max_width {
                line.extend_from_slice(word);
                width += word_width + (word.len() - visible.len()) as f32 * glyph(b' ');
                continue;
            }
            if !line.is_empty() {
                lines.push(trimmed(std::mem::take(&mut line)));
                width = 0.0;
            }
            for &byte in word {
                if !line.is_empty() && width + glyph(byte) > max_width {
                    lines.push(trimmed(std::mem::take(&mut line)));
                    width = 0.0;
                }
                line.push(byte);
                width += glyph(byte);
            }
        }
        lines.push(trimmed(line));
    }
    lines
}

fn trimmed(mut line: Vec<u8>) -> Vec<u8> {
    while line.last() == Some(&b' ') {
        line.pop();
    }
    line
}

fn font_resources(font_id: ObjectId) -> Dictionary {
    dictionary! {
        "Font" => dictionary! { FONT_KEY => font_id },
    }
}

fn line_height(size: f32) -> f32 {
    size * LINE_SPACING
}

/// Padding around the text of a sample page
#[inline]
#[must_use]
pub fn sample_padding(size: f32) -> f32 {
    size / 4.0
}

/// One page exactly the size of the text plus padding on all sides
pub(crate) fn sample(font: &FontDescriptor, size: f32, text: &str) -> Result<Vec<u8>, PdfError> {
    let encoded = encode_win_ansi(text);
    if encoded.is_empty() {
        return Err(PdfError::EmptyText);
    }
    let padding = sample_padding(size);
    let width = font.metrics.text_width(&encoded, size);
    let page = (2.0 * padding + width, 2.0 * padding + size);

    let mut writer = DocumentWriter::new();
    let font_id = writer.font(font);
    // Baseline sits a descender above the bottom padding
    let operations = text_line(FONT_KEY, size, padding, padding + size * 0.2, encoded);
    writer.add_page(page, operations, font_resources(font_id))?;
    writer.finish()
}

/// Plain text set on as many A4 pages as needed
pub(crate) fn text_document(font: &FontDescriptor, text: &str) -> Result<Vec<u8>, PdfError> {
    let (page_width, page_height) = A4;
    let lines = wrap(text, font.metrics, TEXT_SIZE, page_width - 2.0 * PAGE_MARGIN);
    let step = line_height(TEXT_SIZE);
    let per_page = (((page_height - 2.0 * PAGE_MARGIN) / step).floor() as usize).max(1);

    let mut writer = DocumentWriter::new();
    let font_id = writer.font(font);
    for chunk in lines.chunks(per_page) {
        let mut operations = Vec::new();
        let mut y = page_height - PAGE_MARGIN - TEXT_SIZE;
        for line in chunk {
            if !line.is_empty() {
                operations.extend(text_line(FONT_KEY, TEXT_SIZE, PAGE_MARGIN, y, line.clone()));
            }
            y -= step;
        }
        writer.add_page(A4, operations, font_resources(font_id))?;
    }
    writer.finish()
}

/// Single A4 page: a title line followed by wrapped detail lines
///
/// Details that do not fit are cut off with a marker line.
pub(crate) fn error_page(
    font: &FontDescriptor,
    title: &str,
    details: &[String],
) -> Result<Vec<u8>, PdfError> {
    let (page_width, page_height) = A4;
    let max_width = page_width - 2.0 * PAGE_MARGIN;

    let mut writer = DocumentWriter::new();
    let font_id = writer.font(font);
    let mut operations = Vec::new();
    let mut y = page_height - PAGE_MARGIN - TITLE_SIZE;
    for line in wrap(title, font.metrics, TITLE_SIZE, max_width) {
        operations.extend(text_line(FONT_KEY, TITLE_SIZE, PAGE_MARGIN, y, line));
        y -= line_height(TITLE_SIZE);
    }
    y -= line_height(TEXT_SIZE);

    let body: Vec<Vec<u8>> = details
        .iter()
        .flat_map(|detail| wrap(detail, font.metrics, TEXT_SIZE, max_width))
        .collect();
    let room = ((y - PAGE_MARGIN) / line_height(TEXT_SIZE)).floor().max(1.0) as usize;
    let truncated = body.len() > room;
    let shown = if truncated { room - 1 } else { body.len() };
    for line in body.into_iter().take(shown) {
        if !line.is_empty() {
            operations.extend(text_line(FONT_KEY, TEXT_SIZE, PAGE_MARGIN, y, line));
        }
        y -= line_height(TEXT_SIZE);
    }
    if truncated {
        operations.extend(text_line(FONT_KEY, TEXT_SIZE, PAGE_MARGIN, y, b"[...]".to_vec()));
    }

    writer.add_page(A4, operations, font_resources(font_id))?;
    writer.finish()
}
