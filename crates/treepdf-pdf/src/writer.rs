//! Building new documents page by page

use crate::error::PdfError;
use crate::fonts::FontDescriptor;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;

/// A4 portrait, in points
pub const A4: (f32, f32) = (595.28, 841.89);

/// PDF version written into generated documents
const PDF_VERSION: &str = "1.5";

/// Number operand
#[inline]
pub(crate) fn real(value: f32) -> Object {
    Object::Real(value.into())
}

/// Read a number operand (integer or real)
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Type1 font dictionary for a standard font
pub(crate) fn font_dictionary(font: &FontDescriptor) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font.as_str(),
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Operations that show one line of encoded text at a baseline position
pub(crate) fn text_line(font_key: &str, size: f32, x: f32, y: f32, encoded: Vec<u8>) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font_key.as_bytes().to_vec()), real(size)]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new("Tj", vec![Object::string_literal(encoded)]),
        Operation::new("ET", vec![]),
    ]
}

/// Incrementally assembled document with a flat page tree
pub(crate) struct DocumentWriter {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    fonts: BTreeMap<String, ObjectId>,
}

impl DocumentWriter {
    pub(crate) fn new() -> Self {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            fonts: BTreeMap::new(),
        }
    }

    /// Font object for `font`, added once per document
    pub(crate) fn font(&mut self, font: &FontDescriptor) -> ObjectId {
        if let Some(id) = self.fonts.get(&font.base_font) {
            return *id;
        }
        let id = self.doc.add_object(font_dictionary(font));
        self.fonts.insert(font.base_font.clone(), id);
        id
    }

    /// Add an image XObject; `data` must already be encoded for `filter`
    pub(crate) fn image(&mut self, width: u32, height: u32, filter: &str, data: Vec<u8>) -> ObjectId {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => filter,
        };
        self.doc.add_object(Stream::new(dict, data).with_compression(false))
    }

    /// Append a page of the given size
    pub(crate) fn add_page(
        &mut self,
        size: (f32, f32),
        operations: Vec<Operation>,
        resources: Dictionary,
    ) -> Result<(), PdfError> {
        let content = Content { operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), real(size.0), real(size.1)],
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    /// Write the page tree and catalog and serialize
    pub(crate) fn finish(mut self) -> Result<Vec<u8>, PdfError> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Smallest valid one-page document, serialized without lopdf
///
/// Used when generating a page failed; cannot fail itself.
#[must_use]
pub fn blank_page(size: (f32, f32)) -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] /Resources << >> >>",
            size.0, size.1
        ),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{body}\nendobj\n", index + 1));
    }
    let xref = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    ));
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_page_loads() {
        let doc = Document::load_mem(&blank_page(A4)).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_writer_pages() {
        let mut writer = DocumentWriter::new();
        writer.add_page((100.0, 50.0), vec![], Dictionary::new()).unwrap();
        writer.add_page(A4, vec![], Dictionary::new()).unwrap();
        let doc = Document::load_mem(&writer.finish().unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }
}
