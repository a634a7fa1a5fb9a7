//! Concatenating documents and stamping page labels

use crate::error::PdfError;
use crate::fonts::FontDescriptor;
use crate::metrics::encode_win_ansi;
use crate::writer::{font_dictionary, number, real, A4};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use std::fmt;

/// Resource name of the label font inside stamped pages
const LABEL_FONT_KEY: &str = "TpLabel";
/// Maximum page tree depth followed when resolving inherited attributes
const MAX_TREE_DEPTH: usize = 64;
/// Attributes a page may inherit from its ancestors
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// One converted document and the logical path it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Logical path, used for the page labels
    pub path: String,
    /// PDF bytes
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Pair a logical path with PDF bytes
    #[must_use]
    pub fn new<S: Into<String>>(path: S, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }
}

/// `BASENAME PAGE/PAGES` label of one merged page
///
/// The name is the last path segment without its final extension. Counters
/// are per source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageLabel {
    /// Basename without the final extension
    pub name: String,
    /// 1-based page number within the source document
    pub page: usize,
    /// Page count of the source document
    pub pages: usize,
}

impl PageLabel {
    /// Label for page `page` of `pages` of the document at `path`
    #[must_use]
    pub fn new(path: &str, page: usize, pages: usize) -> Self {
        let base = path.rsplit('/').next().unwrap_or(path);
        let name = match base.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => base,
        };
        Self {
            name: name.to_string(),
            page,
            pages,
        }
    }
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.page, self.pages)
    }
}

/// Font and size used to stamp labels
pub(crate) struct LabelStyle<'a> {
    pub font: &'a FontDescriptor,
    pub size: f32,
}

/// Check that bytes are a mergeable PDF and count its pages
///
/// # Errors
///
/// Returns [`PdfError`] if the bytes do not parse, the document is encrypted
/// or it has no usable pages.
pub fn validate(bytes: &[u8]) -> Result<usize, PdfError> {
    let doc = Document::load_mem(bytes)?;
    check_mergeable(&doc)
}

/// Number of pages of a PDF
///
/// # Errors
///
/// Same conditions as [`validate`].
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    validate(bytes)
}

fn check_mergeable(doc: &Document) -> Result<usize, PdfError> {
    if doc.trailer.has(b"Encrypt") {
        return Err(PdfError::Encrypted);
    }
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(PdfError::Malformed("document has no pages".to_string()));
    }
    for (number, id) in &pages {
        doc.get_dictionary(*id)
            .map_err(|e| PdfError::Malformed(format!("page {number}: {e}")))?;
    }
    Ok(pages.len())
}

/// Parse a document for merging
pub(crate) fn load(bytes: &[u8]) -> Result<Document, PdfError> {
    let doc = Document::load_mem(bytes)?;
    check_mergeable(&doc)?;
    Ok(doc)
}

/// Append documents into one, in order
///
/// `documents` must already be loaded and mergeable.
pub(crate) fn merge_documents(
    documents: Vec<(String, Document)>,
    label: Option<LabelStyle<'_>>,
) -> Result<Vec<u8>, PdfError> {
    let mut out = Document::with_version("1.5");
    let pages_id = out.new_object_id();
    let label_font = label
        .as_ref()
        .map(|style| out.add_object(font_dictionary(style.font)));
    let mut kids = Vec::new();

    for (path, mut doc) in documents {
        doc.renumber_objects_with(out.max_id + 1);
        out.max_id = out.max_id.max(doc.max_id);

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let total = page_ids.len();
        for (index, page_id) in page_ids.iter().enumerate() {
            let mut page = flatten_page(&doc, *page_id)?;
            page.set("Parent", pages_id);
            if let (Some(style), Some(font_id)) = (&label, label_font) {
                let label = PageLabel::new(&path, index + 1, total);
                stamp(&mut out, &doc, &mut page, style, font_id, &label)?;
            }
            doc.objects.insert(*page_id, Object::Dictionary(page));
            kids.push(Object::Reference(*page_id));
        }

        for (id, object) in doc.objects {
            if !is_structural(&object) {
                out.objects.insert(id, object);
            }
        }
    }

    let count = kids.len() as i64;
    let mut pages = Dictionary::new();
    pages.set("Type", "Pages");
    pages.set("Kids", kids);
    pages.set("Count", count);
    out.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", "Catalog");
    catalog.set("Pages", pages_id);
    let catalog_id = out.add_object(catalog);
    out.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    out.save_to(&mut bytes)?;
    Ok(bytes)
}

/// Page tree nodes, catalogs and cross-reference streams are rebuilt
fn is_structural(object: &Object) -> bool {
    let kind = match object {
        Object::Dictionary(dict) => dict.get(b"Type"),
        Object::Stream(stream) => stream.dict.get(b"Type"),
        _ => return false,
    };
    matches!(
        kind.and_then(Object::as_name),
        Ok(b"Pages" | b"Catalog" | b"XRef" | b"ObjStm")
    )
}

/// Page dictionary with inherited attributes copied in
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary, PdfError> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        if let Some(value) = inherited(doc, &page, key) {
            page.set(key.to_vec(), value);
        }
    }
    if !page.has(b"MediaBox") {
        page.set(
            "MediaBox",
            vec![0.into(), 0.into(), Object::Real(A4.0.into()), Object::Real(A4.1.into())],
        );
    }
    if !page.has(b"Resources") {
        page.set("Resources", Dictionary::new());
    }
    Ok(page)
}

fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Follow one level of indirection
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Visible area of a page as `(x0, y0, x1, y1)`
fn page_box(doc: &Document, page: &Dictionary) -> (f32, f32, f32, f32) {
    let read = |key: &[u8]| -> Option<(f32, f32, f32, f32)> {
        let values = resolve(doc, page.get(key).ok()?).as_array().ok()?;
        let coords: Vec<f32> = values
            .iter()
            .filter_map(|v| number(resolve(doc, v)))
            .collect();
        match coords[..] {
            [a, b, c, d] => Some((a.min(c), b.min(d), a.max(c), b.max(d))),
            _ => None,
        }
    };
    read(b"CropBox")
        .or_else(|| read(b"MediaBox"))
        .unwrap_or((0.0, 0.0, A4.0, A4.1))
}

/// Text matrix putting a label of `width` upright in the top right corner
/// as the page is displayed
///
/// `/Rotate` turns the page clockwise for display, so the corner and the
/// baseline direction are taken from the rotated box.
fn label_matrix(page_box: (f32, f32, f32, f32), rotate: i64, width: f32, size: f32) -> [f32; 6] {
    let (x0, y0, x1, y1) = page_box;
    let margin = size * 1.5;
    let (w, h) = (x1 - x0, y1 - y0);
    match rotate.rem_euclid(360) {
        90 => {
            let (vx, vy) = (h - margin - width, w - margin - size);
            [0.0, 1.0, -1.0, 0.0, x1 - vy, y0 + vx]
        }
        180 => {
            let (vx, vy) = (w - margin - width, h - margin - size);
            [-1.0, 0.0, 0.0, -1.0, x1 - vx, y1 - vy]
        }
        270 => {
            let (vx, vy) = (h - margin - width, w - margin - size);
            [0.0, -1.0, 1.0, 0.0, x0 + vy, y1 - vx]
        }
        _ => [1.0, 0.0, 0.0, 1.0, x1 - margin - width, y1 - margin - size],
    }
}

/// Wrap the page contents in `q`/`Q` and draw the label top right
fn stamp(
    out: &mut Document,
    doc: &Document,
    page: &mut Dictionary,
    style: &LabelStyle<'_>,
    font_id: ObjectId,
    label: &PageLabel,
) -> Result<(), PdfError> {
    // Resources may be shared between pages: copy before adding the font
    let mut resources = page
        .get(b"Resources")
        .ok()
        .map(|r| resolve(doc, r))
        .and_then(|r| r.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .map(|f| resolve(doc, f))
        .and_then(|f| f.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    fonts.set(LABEL_FONT_KEY, font_id);
    resources.set("Font", fonts);
    page.set("Resources", resources);

    let mut contents: Vec<Object> = match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(object @ Object::Reference(_)) => match resolve(doc, object) {
            Object::Array(items) => items.clone(),
            _ => vec![object.clone()],
        },
        _ => Vec::new(),
    };

    let text = encode_win_ansi(&label.to_string());
    let width = style.font.metrics.text_width(&text, style.size);
    let rotate = page
        .get(b"Rotate")
        .ok()
        .and_then(|r| resolve(doc, r).as_i64().ok())
        .unwrap_or(0);
    let matrix = label_matrix(page_box(doc, page), rotate, width, style.size);
    let mut operations = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
    operations.extend([
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(LABEL_FONT_KEY.as_bytes().to_vec()), real(style.size)]),
        Operation::new("Tm", matrix.iter().copied().map(real).collect()),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]);
    operations.push(Operation::new("Q", vec![]));

    let open = out.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let close = out.add_object(Stream::new(
        Dictionary::new(),
        Content { operations }.encode()?,
    ));
    contents.insert(0, Object::Reference(open));
    contents.push(Object::Reference(close));
    page.set("Contents", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_label_format() {
        assert_eq!(PageLabel::new("report.docx", 1, 3).to_string(), "report 1/3");
        assert_eq!(
            PageLabel::new("root/photos.zip/img1.jpg", 1, 1).to_string(),
            "img1 1/1"
        );
        assert_eq!(PageLabel::new("a/archive.tar.gz", 2, 2).name, "archive.tar");
        assert_eq!(PageLabel::new("notes", 1, 1).name, "notes");
        assert_eq!(PageLabel::new(".profile", 1, 1).name, ".profile");
    }

    /// Where a user space point appears once the page is turned by `rotate`
    fn displayed(page_box: (f32, f32, f32, f32), rotate: i64, (x, y): (f32, f32)) -> (f32, f32) {
        let (x0, y0, x1, y1) = page_box;
        match rotate.rem_euclid(360) {
            90 => (y - y0, x1 - x),
            180 => (x1 - x, y1 - y),
            270 => (y1 - y, x - x0),
            _ => (x - x0, y - y0),
        }
    }

    #[test]
    fn test_label_matrix_follows_rotation() {
        let page_box = (10.0, 20.0, 210.0, 120.0);
        let (width, size) = (40.0, 8.0);
        let margin = size * 1.5;
        for rotate in [0, 90, 180, 270, -90, 450] {
            let [a, b, c, d, e, f] = label_matrix(page_box, rotate, width, size);
            let (shown_w, shown_h) = if rotate.rem_euclid(180) == 90 { (100.0, 200.0) } else { (200.0, 100.0) };

            let origin = displayed(page_box, rotate, (e, f));
            assert_eq!(origin, (shown_w - margin - width, shown_h - margin - size), "rotate {rotate}");

            // Baseline runs left to right and glyphs stand upright on screen
            let start = displayed(page_box, rotate, (0.0, 0.0));
            let along = displayed(page_box, rotate, (a, b));
            let up = displayed(page_box, rotate, (c, d));
            assert_eq!((along.0 - start.0, along.1 - start.1), (1.0, 0.0), "rotate {rotate}");
            assert_eq!((up.0 - start.0, up.1 - start.1), (0.0, 1.0), "rotate {rotate}");
        }
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(validate(b"not a pdf").is_err());
        assert!(validate(b"").is_err());
    }
}
