//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};

pub const PAGE_HEIGHT: f32 = 792.0;

/// Writes minimal uncompressed PDFs with a valid xref table.
///
/// Pages share two fonts: `/F1` (Helvetica) and `/F2` (Helvetica-Bold).
/// Content helpers take top-down coordinates, matching the page model.
#[derive(Debug, Default)]
pub struct PdfBuilder {
    pages: Vec<String>,
    title: Option<String>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn page(mut self, content: impl Into<String>) -> Self {
        self.pages.push(content.into());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let first_page = 5;
        let mut objects: Vec<String> = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                (0..self.pages.len())
                    .map(|i| format!("{} 0 R", first_page + 2 * i))
                    .collect::<Vec<_>>()
                    .join(" "),
                self.pages.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_string(),
        ];
        for (i, content) in self.pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                first_page + 2 * i + 1
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ));
        }
        let info = self.title.as_ref().map(|title| {
            objects.push(format!("<< /Title ({}) >>", escape(title)));
            objects.len()
        });

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        let info = info.map(|n| format!(" /Info {} 0 R", n)).unwrap_or_default();
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                info,
                xref
            )
            .as_bytes(),
        );
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// One line of regular text with its baseline at `y` from the page top.
pub fn text(x: f32, y: f32, size: f32, s: &str) -> String {
    format!(
        "BT /F1 {} Tf {} {} Td ({}) Tj ET\n",
        size,
        x,
        PAGE_HEIGHT - y,
        escape(s)
    )
}

/// One line of bold text with its baseline at `y` from the page top.
pub fn bold(x: f32, y: f32, size: f32, s: &str) -> String {
    format!(
        "BT /F2 {} Tf {} {} Td ({}) Tj ET\n",
        size,
        x,
        PAGE_HEIGHT - y,
        escape(s)
    )
}

/// A stroked line between two top-down points.
pub fn rule(x1: f32, y1: f32, x2: f32, y2: f32) -> String {
    format!(
        "{} {} m {} {} l S\n",
        x1,
        PAGE_HEIGHT - y1,
        x2,
        PAGE_HEIGHT - y2
    )
}

/// Ruled grid with the given row and column edges (top-down).
pub fn grid(xs: &[f32], ys: &[f32]) -> String {
    let (left, right) = (xs[0], xs[xs.len() - 1]);
    let (top, bottom) = (ys[0], ys[ys.len() - 1]);
    let mut out = String::new();
    for &y in ys {
        out.push_str(&rule(left, y, right, y));
    }
    for &x in xs {
        out.push_str(&rule(x, top, x, bottom));
    }
    out
}

/// Two columns of prose, `paragraphs` per column, three lines each.
pub fn two_column_page(tag: &str, paragraphs: usize) -> String {
    let mut out = String::new();
    for (column, x) in [("left", 72.0), ("right", 320.0)] {
        let mut y = 100.0;
        for p in 0..paragraphs {
            for line in 0..3 {
                let words = format!(
                    "{} {} column paragraph {} line {} has several words",
                    tag,
                    column,
                    p + 1,
                    line + 1
                );
                out.push_str(&text(x, y, 8.0, &words));
                y += 10.0;
            }
            y += 30.0;
        }
    }
    out
}

/// Encode a grayscale image as PNG. `ink` rectangles are painted black on
/// white, given as `(x, y, width, height)` in pixels.
pub fn png(width: u32, height: u32, ink: &[(u32, u32, u32, u32)]) -> Vec<u8> {
    let mut img = GrayImage::from_pixel(width, height, Luma([255]));
    for &(x, y, w, h) in ink {
        for py in y..(y + h).min(height) {
            for px in x..(x + w).min(width) {
                img.put_pixel(px, py, Luma([0]));
            }
        }
    }
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}
