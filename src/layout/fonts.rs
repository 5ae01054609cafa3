//! Font size statistics for heading detection.

use std::collections::BTreeMap;

use crate::model::{Page, TextRun};

/// Fallback body size when no text was observed.
const DEFAULT_BODY_SIZE: f32 = 12.0;

/// Font size histogram over a document.
///
/// Sizes are bucketed to 0.1pt and weighted by character count. The body
/// size is the heaviest bucket; ties go to the smaller size so the result
/// never depends on iteration order.
#[derive(Debug, Clone, Default)]
pub struct FontStatistics {
    /// Body text font size (most common)
    pub body_size: f32,
    /// Distinct heading sizes, largest first
    pub heading_sizes: Vec<f32>,
    /// Characters observed per size bucket (size * 10)
    pub size_histogram: BTreeMap<i32, usize>,
    /// Minimum size above body for a heading
    min_delta: f32,
}

impl FontStatistics {
    /// Create empty statistics with a heading threshold.
    pub fn new(heading_min_delta: f32) -> Self {
        Self {
            body_size: DEFAULT_BODY_SIZE,
            min_delta: heading_min_delta,
            ..Default::default()
        }
    }

    /// Collect statistics over every run of every page.
    pub fn from_pages(pages: &[Page], heading_min_delta: f32) -> Self {
        let mut stats = Self::new(heading_min_delta);
        for run in pages.iter().flat_map(|p| p.runs.iter()) {
            stats.add_run(run);
        }
        stats.analyze();
        stats
    }

    /// Add a font size observation weighted by `chars`.
    pub fn add_size(&mut self, size: f32, chars: usize) {
        if size <= 0.0 || chars == 0 {
            return;
        }
        let key = (size * 10.0).round() as i32;
        *self.size_histogram.entry(key).or_insert(0) += chars;
    }

    pub fn add_run(&mut self, run: &TextRun) {
        let chars = run.text.chars().filter(|c| !c.is_whitespace()).count();
        self.add_size(run.font_size, chars);
    }

    /// Calculate body size and heading sizes.
    pub fn analyze(&mut self) {
        let Some((&body_key, _)) = self
            .size_histogram
            .iter()
            .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(kb.cmp(ka)))
        else {
            self.body_size = DEFAULT_BODY_SIZE;
            self.heading_sizes.clear();
            return;
        };
        self.body_size = body_key as f32 / 10.0;

        let threshold = self.body_size + self.min_delta;
        let mut sizes: Vec<f32> = Vec::new();
        for &key in self.size_histogram.keys().rev() {
            let size = key as f32 / 10.0;
            if size < threshold {
                break;
            }
            // Sizes within half a point share a level
            if sizes.last().map_or(true, |last| last - size > 0.5) {
                sizes.push(size);
            }
        }
        self.heading_sizes = sizes;

        log::debug!(
            "Font statistics: body={:.1}pt, heading sizes={:?}",
            self.body_size,
            self.heading_sizes
        );
    }

    /// Heading level (1-6) for a font size, `None` for body text.
    pub fn heading_level(&self, font_size: f32) -> Option<u8> {
        if font_size < self.body_size + self.min_delta {
            return None;
        }
        let rank = self
            .heading_sizes
            .iter()
            .position(|&size| font_size >= size - 0.5)
            .unwrap_or(self.heading_sizes.len());
        Some((rank + 1).min(6) as u8)
    }

    /// Size relative to the body size.
    pub fn size_ratio(&self, font_size: f32) -> f32 {
        if self.body_size > 0.0 {
            font_size / self.body_size
        } else {
            1.0
        }
    }
}
