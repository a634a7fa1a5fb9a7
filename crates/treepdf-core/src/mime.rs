//! Mime-type detection for files found while walking a tree
//!
//! The file name decides first (this is what the storage layer of a file
//! server records), magic bytes decide for names without a known extension,
//! and a text heuristic catches extensionless plain text.

use std::path::Path;

/// Mime-type used when nothing better is known
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Mime-type of plain text
pub const TEXT_PLAIN: &str = "text/plain";

/// Number of leading bytes inspected by the content heuristics
pub const SNIFF_LEN: usize = 8192;

/// Detect the mime-type of a file from its name and leading bytes
///
/// # Examples
///
/// ```
/// use treepdf_core::mime::detect_mime_type;
///
/// assert_eq!(detect_mime_type("report.pdf", b""), "application/pdf");
/// assert_eq!(detect_mime_type("README", b"just some words\n"), "text/plain");
/// assert_eq!(detect_mime_type("blob", &[0x50, 0x4b, 0x03, 0x04, 0, 0]), "application/zip");
/// ```
#[must_use = "returns the detected mime-type"]
pub fn detect_mime_type(name: &str, head: &[u8]) -> String {
    if let Some(mime) = mime_from_name(name) {
        return mime;
    }
    let head = &head[..head.len().min(SNIFF_LEN)];
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    if looks_like_text(head) {
        return TEXT_PLAIN.to_string();
    }
    OCTET_STREAM.to_string()
}

/// Mime-type guessed from the file extension only
#[must_use = "returns the mime-type guessed from the extension"]
pub fn mime_from_name(name: &str) -> Option<String> {
    let extension = Path::new(name).extension()?.to_str()?;
    // mime_guess knows neither tgz nor tbz2
    match extension.to_ascii_lowercase().as_str() {
        "tgz" => return Some("application/x-compressed-tar".to_string()),
        "tbz" | "tbz2" => return Some("application/x-bzip-compressed-tar".to_string()),
        _ => {}
    }
    mime_guess::from_ext(extension)
        .first_raw()
        .map(ToString::to_string)
}

/// Heuristic: valid UTF-8 (allowing a cut-off trailing sequence) without NUL
/// bytes and with few control characters
fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() {
        return true;
    }
    if head.contains(&0) {
        return false;
    }
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && e.valid_up_to() + 4 > head.len(),
    };
    if !valid {
        return false;
    }
    let control = head
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c))
        .count();
    control * 100 <= head.len()
}
