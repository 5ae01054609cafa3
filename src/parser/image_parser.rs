//! Raster image ingestion.

use super::Ingestor;
use crate::convert::IngestBudget;
use crate::detect::InputFormat;
use crate::error::{Error, Result};
use crate::model::{Bitmap, Document, Metadata, Page};

/// Ingests a raster image as a single page carrying its grayscale bitmap.
///
/// No text is produced: recognising characters in pixels is not attempted.
/// One pixel maps to one point.
#[derive(Debug, Clone, Default)]
pub struct ImageIngestor {
    _private: (),
}

impl ImageIngestor {
    /// Create a new image ingestor.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Ingestor for ImageIngestor {
    fn name(&self) -> &str {
        "image"
    }

    fn formats(&self) -> &[InputFormat] {
        &[
            InputFormat::Png,
            InputFormat::Jpeg,
            InputFormat::Gif,
            InputFormat::Bmp,
            InputFormat::Tiff,
        ]
    }

    fn ingest_with_budget(&self, data: &[u8], format: InputFormat, budget: &IngestBudget) -> Result<Document> {
        budget.check_cancelled()?;
        let decoded = image::load_from_memory(data).map_err(|e| match Error::from(e) {
            Error::Image(detail) => Error::CorruptInput {
                page: Some(1),
                detail,
            },
            other => other,
        })?;
        budget.check_cancelled()?;
        let gray = decoded.to_luma8();
        let (width, height) = gray.dimensions();
        log::debug!("Decoded {} image: {}x{} px", format, width, height);

        let bitmap = Bitmap::new(width, height, gray.into_raw()).ok_or_else(|| {
            Error::Image(format!("pixel buffer does not match {}x{}", width, height))
        })?;

        let mut page = Page::new(1, width as f32, height as f32);
        page.bitmap = Some(bitmap);

        let mut document = Document::new();
        document.metadata = Metadata::for_format(format);
        document.add_page(page);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_ingest_png() {
        let mut img = GrayImage::from_pixel(40, 20, Luma([255]));
        img.put_pixel(5, 5, Luma([0]));
        let doc = ImageIngestor::new()
            .ingest(&png_bytes(&img), InputFormat::Png)
            .unwrap();

        assert_eq!(doc.page_count(), 1);
        let page = &doc.pages[0];
        assert_eq!(page.dimensions(), (40.0, 20.0));
        assert!(page.runs.is_empty());
        let bitmap = page.bitmap.as_ref().unwrap();
        assert!(bitmap.is_ink(5, 5, 128));
        assert!(!bitmap.is_ink(6, 5, 128));
    }

    #[test]
    fn test_ingest_garbage_png() {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.extend_from_slice(&[0u8; 16]);
        assert!(ImageIngestor::new().ingest(&data, InputFormat::Png).is_err());
    }
}
