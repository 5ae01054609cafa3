//! Page-level types.

use super::{BoundingBox, Region};
use serde::{Deserialize, Serialize};

/// A single page in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Page number (1-indexed)
    pub number: u32,

    /// Page width in points (1 point = 1/72 inch)
    pub width: f32,

    /// Page height in points
    pub height: f32,

    /// Grayscale raster of the page, when the input was an image
    #[serde(skip)]
    pub bitmap: Option<Bitmap>,

    /// Positioned text runs
    pub runs: Vec<TextRun>,

    /// Horizontal and vertical ruling lines
    pub lines: Vec<RulingLine>,

    /// Placed images
    pub images: Vec<ImagePlacement>,

    /// Regions found by the segmenter (empty until segmented)
    pub regions: Vec<Region>,

    /// Whether the page was processed completely
    pub status: PageStatus,
}

impl Page {
    /// Create a new page with the given dimensions.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number,
            width,
            height,
            bitmap: None,
            runs: Vec::new(),
            lines: Vec::new(),
            images: Vec::new(),
            regions: Vec::new(),
            status: PageStatus::Complete,
        }
    }

    /// Create a new page with standard Letter size (8.5 x 11 inches).
    pub fn letter(number: u32) -> Self {
        Self::new(number, 612.0, 792.0) // 8.5 * 72, 11 * 72
    }

    /// Page bounds as a box.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(0.0, 0.0, self.width, self.height)
    }

    /// Check if the page carries no content at all.
    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty()) && self.images.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, PageStatus::Partial { .. })
    }

    /// Flag the page as partially processed. The first reason is kept.
    pub fn mark_partial(&mut self, reason: impl Into<String>) {
        if !self.is_partial() {
            self.status = PageStatus::Partial {
                reason: reason.into(),
            };
        }
    }

    /// Raw text of the page: runs sorted top-to-bottom, left-to-right,
    /// one output line per baseline.
    pub fn raw_text(&self) -> String {
        let mut runs: Vec<&TextRun> = self.runs.iter().filter(|r| !r.text.is_empty()).collect();
        runs.sort_by(|a, b| {
            a.baseline()
                .total_cmp(&b.baseline())
                .then(a.bbox.x.total_cmp(&b.bbox.x))
        });

        let mut out = String::new();
        let mut last: Option<&TextRun> = None;
        for run in runs {
            if let Some(prev) = last {
                let tolerance = prev.font_size.max(run.font_size) * 0.5;
                if (run.baseline() - prev.baseline()).abs() > tolerance {
                    out.push('\n');
                } else if !out.ends_with(' ') && !run.text.starts_with(' ') {
                    out.push(' ');
                }
            }
            out.push_str(&run.text);
            last = Some(run);
        }
        out.trim().to_string()
    }

    /// Page dimensions as a (width, height) tuple.
    pub fn dimensions(&self) -> (f32, f32) {
        (self.width, self.height)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::letter(1)
    }
}

/// Completion state of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    /// Fully processed
    #[default]
    Complete,
    /// Processed with degradation
    Partial {
        /// What was lost
        reason: String,
    },
}

/// A positioned piece of text with uniform style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Text content
    pub text: String,

    /// Bounding box; the bottom edge is the baseline
    pub bbox: BoundingBox,

    /// Font size in points
    pub font_size: f32,

    /// Font resource or base font name
    pub font_name: Option<String>,

    pub bold: bool,

    pub italic: bool,
}

impl TextRun {
    /// Create a run with regular style.
    pub fn new(text: impl Into<String>, bbox: BoundingBox, font_size: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
            font_name: None,
            bold: false,
            italic: false,
        }
    }

    /// Set the bold flag and return self.
    pub fn bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Set the font name and return self.
    pub fn with_font(mut self, name: impl Into<String>) -> Self {
        self.font_name = Some(name.into());
        self
    }

    pub fn baseline(&self) -> f32 {
        self.bbox.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Direction of a ruling line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An axis-aligned stroke used as a table separator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RulingLine {
    pub orientation: Orientation,
    /// y for horizontal lines, x for vertical lines
    pub position: f32,
    /// Start of the covered interval along the line
    pub start: f32,
    /// End of the covered interval along the line
    pub end: f32,
}

impl RulingLine {
    pub fn horizontal(y: f32, x1: f32, x2: f32) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            position: y,
            start: x1.min(x2),
            end: x1.max(x2),
        }
    }

    pub fn vertical(x: f32, y1: f32, y2: f32) -> Self {
        Self {
            orientation: Orientation::Vertical,
            position: x,
            start: y1.min(y2),
            end: y1.max(y2),
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.orientation == Orientation::Horizontal
    }

    pub fn length(&self) -> f32 {
        self.end - self.start
    }

    /// Whether the line covers the interval `[from, to]` within `tolerance`.
    pub fn covers(&self, from: f32, to: f32, tolerance: f32) -> bool {
        self.start <= from + tolerance && self.end >= to - tolerance
    }

    /// Bounding box of the stroke (zero thickness).
    pub fn bbox(&self) -> BoundingBox {
        match self.orientation {
            Orientation::Horizontal => {
                BoundingBox::new(self.start, self.position, self.length(), 0.0)
            }
            Orientation::Vertical => BoundingBox::new(self.position, self.start, 0.0, self.length()),
        }
    }
}

/// An image drawn on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlacement {
    /// Stable identifier used in figure references
    pub resource_id: String,
    /// Where the image was drawn
    pub bbox: BoundingBox,
}

impl ImagePlacement {
    pub fn new(resource_id: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            resource_id: resource_id.into(),
            bbox,
        }
    }
}

/// 8-bit grayscale raster, row-major, 0 = black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Create a bitmap; `pixels.len()` must equal `width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Pixel value; out-of-range coordinates read as white.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return u8::MAX;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Whether the pixel is darker than `threshold`.
    pub fn is_ink(&self, x: u32, y: u32, threshold: u8) -> bool {
        self.get(x, y) < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_new() {
        let page = Page::new(1, 612.0, 792.0);
        assert_eq!(page.number, 1);
        assert_eq!(page.dimensions(), (612.0, 792.0));
        assert!(page.is_blank());
        assert!(!page.is_partial());
    }

    #[test]
    fn test_mark_partial_keeps_first_reason() {
        let mut page = Page::letter(2);
        page.mark_partial("truncated content stream");
        page.mark_partial("timeout");
        assert_eq!(
            page.status,
            PageStatus::Partial {
                reason: "truncated content stream".to_string()
            }
        );
    }

    #[test]
    fn test_raw_text_orders_lines() {
        let mut page = Page::letter(1);
        page.runs.push(TextRun::new(
            "world",
            BoundingBox::new(120.0, 90.0, 30.0, 12.0),
            12.0,
        ));
        page.runs.push(TextRun::new(
            "Hello",
            BoundingBox::new(72.0, 90.0, 30.0, 12.0),
            12.0,
        ));
        page.runs.push(TextRun::new(
            "Next",
            BoundingBox::new(72.0, 110.0, 30.0, 12.0),
            12.0,
        ));
        assert_eq!(page.raw_text(), "Hello world\nNext");
    }

    #[test]
    fn test_bitmap_bounds() {
        let bitmap = Bitmap::new(2, 1, vec![0, 255]).unwrap();
        assert!(bitmap.is_ink(0, 0, 128));
        assert!(!bitmap.is_ink(1, 0, 128));
        assert!(!bitmap.is_ink(5, 5, 128));
        assert!(Bitmap::new(2, 2, vec![0]).is_none());
    }

    #[test]
    fn test_ruling_line_cover() {
        let line = RulingLine::horizontal(100.0, 200.0, 50.0);
        assert_eq!(line.start, 50.0);
        assert!(line.covers(60.0, 190.0, 1.0));
        assert!(!line.covers(40.0, 190.0, 1.0));
    }
}
