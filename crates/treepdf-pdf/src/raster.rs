//! Raster images placed on an A4 page

use crate::error::PdfError;
use crate::writer::{real, DocumentWriter, A4};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{GenericImageView, ImageReader};
use lopdf::content::Operation;
use lopdf::dictionary;
use std::io::{Cursor, Write};

const IMAGE_KEY: &str = "Im1";
const IMAGE_MARGIN: f32 = 36.0;

/// Decode an image and place it, scaled to fit, on one A4 page
///
/// Landscape images get a landscape page. Images smaller than the printable
/// area are not enlarged. Transparency is flattened.
pub(crate) fn image_document(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(PdfError::Malformed("image has no pixels".to_string()));
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(img.to_rgb8().as_raw())?;
    let compressed = encoder.finish()?;

    let page = if width > height { (A4.1, A4.0) } else { A4 };
    let (w, h) = fit(
        (width as f32, height as f32),
        (page.0 - 2.0 * IMAGE_MARGIN, page.1 - 2.0 * IMAGE_MARGIN),
    );
    let x = (page.0 - w) / 2.0;
    let y = (page.1 - h) / 2.0;

    let mut writer = DocumentWriter::new();
    let image_id = writer.image(width, height, "FlateDecode", compressed);
    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new("cm", vec![real(w), real(0.0), real(0.0), real(h), real(x), real(y)]),
        Operation::new("Do", vec![lopdf::Object::Name(IMAGE_KEY.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ];
    let resources = dictionary! {
        "XObject" => dictionary! { IMAGE_KEY => image_id },
    };
    writer.add_page(page, operations, resources)?;
    writer.finish()
}

/// Scale `size` down to fit `area`, keeping the aspect ratio
fn fit(size: (f32, f32), area: (f32, f32)) -> (f32, f32) {
    let scale = (area.0 / size.0).min(area.1 / size.1).min(1.0);
    (size.0 * scale, size.1 * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use lopdf::Document;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_image_page() {
        let doc = Document::load_mem(&image_document(&png(40, 20)).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_not_an_image() {
        assert!(image_document(b"definitely not an image").is_err());
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit((100.0, 50.0), (500.0, 500.0)), (100.0, 50.0));
        assert_eq!(fit((1000.0, 500.0), (500.0, 500.0)), (500.0, 250.0));
        assert_eq!(fit((500.0, 1000.0), (500.0, 250.0)), (125.0, 250.0));
    }
}
