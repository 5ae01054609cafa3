//! Page segmentation.
//!
//! Partitions each page into typed, non-overlapping [`Region`]s:
//!
//! 1. Table candidates claim their runs: crossing ruling lines (lattice)
//!    and column-aligned rows (stream).
//! 2. Image placements become figures; bitmap-only pages are cut into ink
//!    blocks.
//! 3. Remaining runs are split into columns, grouped into lines and blocks,
//!    and each block is labelled heading, list item or paragraph.
//! 4. Low-confidence labels fall back to paragraph and overlapping regions
//!    are merged, the higher-priority kind winning.

mod blocks;
mod fonts;
mod lines;
mod markers;
mod raster;
mod table_detector;

pub use blocks::{classify, group_blocks, Block};
pub use fonts::FontStatistics;
pub use lines::{detect_columns, group_lines, join_runs, Column, Line};
pub use markers::{is_bullet_marker, is_list_marker, is_number_marker, parse_marker};
pub use raster::{find_ink_blocks, CutParams, PixelRect};
pub use table_detector::{lattice_candidates, StreamDetector, TableCandidate};

use serde::{Deserialize, Serialize};

use crate::convert::PageBudget;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, Page, Region, RegionKind, TextRun};
use crate::table::TableConfig;

/// Segmentation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Minimum font-size excess over body text for a heading (points)
    pub heading_min_delta: f32,
    /// Blocks longer than this many lines are never headings
    pub max_heading_lines: usize,
    /// Minimum blank gutter between text columns (points)
    pub min_gutter_width: f32,
    /// Minimum width of a text column (points)
    pub min_column_width: f32,
    /// Indentation per list nesting level (points)
    pub list_indent_step: f32,
    /// Y tolerance for grouping runs into lines (fraction of font size)
    pub line_tolerance: f32,
    /// Baseline distance, in font sizes, that starts a new paragraph
    pub paragraph_gap_factor: f32,
    /// Left-edge shift that starts a new block (points)
    pub indent_break_width: f32,
    /// Font-size change that starts a new block (points)
    pub size_change_tolerance: f32,
    /// Gray level below which bitmap pixels are ink
    pub ink_threshold: u8,
    /// Blank band separating ink blocks on bitmaps (pixels)
    pub min_cut_gap: u32,
    /// Smallest figure kept (square points)
    pub min_figure_area: f32,
    /// Images covering this share of the page and underlying text are
    /// treated as backgrounds
    pub background_image_ratio: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            heading_min_delta: 1.0,
            max_heading_lines: 3,
            min_gutter_width: 12.0,
            min_column_width: 80.0,
            list_indent_step: 18.0,
            line_tolerance: 0.3,
            paragraph_gap_factor: 1.8,
            indent_break_width: 20.0,
            size_change_tolerance: 1.0,
            ink_threshold: 128,
            min_cut_gap: 12,
            min_figure_area: 400.0,
            background_image_ratio: 0.5,
        }
    }
}

impl LayoutConfig {
    /// Set the heading size delta.
    pub fn with_heading_min_delta(mut self, delta: f32) -> Self {
        self.heading_min_delta = delta;
        self
    }

    /// Set the list indentation step.
    pub fn with_list_indent_step(mut self, step: f32) -> Self {
        self.list_indent_step = step;
        self
    }

    /// Set the minimum column gutter.
    pub fn with_min_gutter_width(mut self, width: f32) -> Self {
        self.min_gutter_width = width;
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("layout.min_gutter_width", self.min_gutter_width),
            ("layout.min_column_width", self.min_column_width),
            ("layout.list_indent_step", self.list_indent_step),
            ("layout.line_tolerance", self.line_tolerance),
            ("layout.paragraph_gap_factor", self.paragraph_gap_factor),
            ("layout.indent_break_width", self.indent_break_width),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        let non_negative = [
            ("layout.heading_min_delta", self.heading_min_delta),
            ("layout.size_change_tolerance", self.size_change_tolerance),
            ("layout.min_figure_area", self.min_figure_area),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(Error::InvalidConfig(format!("{} must not be negative", name)));
            }
        }
        if !(0.0..=1.0).contains(&self.background_image_ratio) {
            return Err(Error::InvalidConfig(
                "layout.background_image_ratio must be within [0, 1]".into(),
            ));
        }
        if self.max_heading_lines == 0 {
            return Err(Error::InvalidConfig(
                "layout.max_heading_lines must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Splits pages into regions.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: LayoutConfig,
    table: TableConfig,
    enable_tables: bool,
    threshold: f32,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl Segmenter {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            table: TableConfig::default(),
            enable_tables: true,
            threshold: 0.5,
        }
    }

    /// Set table detection thresholds and whether tables are detected.
    pub fn with_tables(mut self, config: TableConfig, enabled: bool) -> Self {
        self.table = config;
        self.enable_tables = enabled;
        self
    }

    /// Regions below this confidence are relabelled paragraphs.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Segment one page.
    ///
    /// Regions are non-overlapping and sorted top to bottom, then left to
    /// right. A page without content yields one empty paragraph covering
    /// the page. Fails only when the budget runs out or the conversion is
    /// cancelled.
    pub fn segment(&self, page: &Page, stats: &FontStatistics, budget: &PageBudget) -> Result<Vec<Region>> {
        budget.check()?;

        let mut remaining: Vec<TextRun> = page.runs.iter().filter(|r| !r.is_empty()).cloned().collect();
        let mut regions = Vec::new();

        if self.enable_tables {
            for candidate in lattice_candidates(&page.lines, self.table.line_tolerance) {
                let area = candidate.bbox.expand(self.table.line_tolerance);
                let inside = claim_runs(&mut remaining, &area);
                if inside.is_empty() {
                    log::debug!("Page {}: empty ruled frame at {:?}", page.number, candidate.bbox);
                    continue;
                }
                regions.push(self.table_region(candidate, inside));
            }
            budget.check()?;

            let stream = StreamDetector::new(&self.table).detect(&remaining);
            for candidate in stream {
                let area = candidate.bbox.expand(1.0);
                let inside = claim_runs(&mut remaining, &area);
                if !inside.is_empty() {
                    regions.push(self.table_region(candidate, inside));
                }
            }
            budget.check()?;
        }

        let page_area = page.bounds().area();
        for image in &page.images {
            let bbox = image.bbox;
            if bbox.area() < self.config.min_figure_area {
                continue;
            }
            let covers_text = remaining
                .iter()
                .any(|r| bbox.contains_point(r.bbox.center_x(), r.bbox.center_y()));
            if covers_text && bbox.area() >= page_area * self.config.background_image_ratio {
                log::debug!("Page {}: skipping background image {}", page.number, image.resource_id);
                continue;
            }
            let inside = claim_runs(&mut remaining, &bbox);
            let kind = RegionKind::Figure {
                resource_id: image.resource_id.clone(),
            };
            regions.push(Region::new(kind, bbox, 0.9).with_runs(inside));
        }

        if let Some(bitmap) = page.bitmap.as_ref().filter(|_| page.runs.is_empty()) {
            regions.extend(self.bitmap_figures(page, bitmap, budget)?);
        }

        let columns = detect_columns(&remaining, &self.config);
        let lines = group_lines(remaining, &columns, self.config.line_tolerance);
        budget.check()?;

        let mut margins = vec![f32::MAX; columns.len().max(1)];
        for line in &lines {
            margins[line.column] = margins[line.column].min(line.x());
        }
        for block in group_blocks(lines, stats, &self.config) {
            regions.push(classify(&block, stats, margins[block.column()], &self.config));
        }

        for region in &mut regions {
            if region.confidence < self.threshold && !region.kind.is_paragraph() {
                log::debug!(
                    "Page {}: {} at {:?} below threshold ({:.2} < {:.2}), relabelled paragraph",
                    page.number,
                    region.kind.name(),
                    region.bbox,
                    region.confidence,
                    self.threshold
                );
                if matches!(region.kind, RegionKind::ListItem { .. }) {
                    // Put the marker back
                    region.text = join_runs(&region.runs, self.config.line_tolerance);
                }
                region.relabel_paragraph();
            }
        }

        let mut regions = merge_overlaps(regions, self.table.row_tolerance);
        regions.sort_by(|a, b| a.bbox.y.total_cmp(&b.bbox.y).then(a.bbox.x.total_cmp(&b.bbox.x)));

        if regions.is_empty() {
            regions.push(Region::paragraph(page.bounds(), ""));
        }
        log::debug!("Page {}: {} regions", page.number, regions.len());
        Ok(regions)
    }

    fn table_region(&self, candidate: TableCandidate, runs: Vec<TextRun>) -> Region {
        let text = join_runs(&runs, self.table.row_tolerance);
        Region::new(RegionKind::Table { grid: None }, candidate.bbox, candidate.confidence)
            .with_text(text)
            .with_runs(runs)
    }

    /// Figures for ink blocks of a bitmap-only page, in page coordinates.
    fn bitmap_figures(
        &self,
        page: &Page,
        bitmap: &crate::model::Bitmap,
        budget: &PageBudget,
    ) -> Result<Vec<Region>> {
        if bitmap.width == 0 || bitmap.height == 0 {
            return Ok(Vec::new());
        }
        let params = CutParams {
            threshold: self.config.ink_threshold,
            min_gap: self.config.min_cut_gap,
            min_area: 1,
        };
        let sx = page.width / bitmap.width as f32;
        let sy = page.height / bitmap.height as f32;

        let figures = find_ink_blocks(bitmap, params, budget)?
            .into_iter()
            .map(|b| {
                BoundingBox::new(
                    b.x as f32 * sx,
                    b.y as f32 * sy,
                    b.width as f32 * sx,
                    b.height as f32 * sy,
                )
            })
            .filter(|bbox| bbox.area() >= self.config.min_figure_area)
            .enumerate()
            .map(|(k, bbox)| {
                let kind = RegionKind::Figure {
                    resource_id: format!("page{}_block{}", page.number, k + 1),
                };
                Region::new(kind, bbox, 0.7)
            })
            .collect();
        Ok(figures)
    }
}

/// Remove and return the runs whose centre lies in `area`.
fn claim_runs(runs: &mut Vec<TextRun>, area: &BoundingBox) -> Vec<TextRun> {
    let (inside, outside): (Vec<TextRun>, Vec<TextRun>) = std::mem::take(runs)
        .into_iter()
        .partition(|r| area.contains_point(r.bbox.center_x(), r.bbox.center_y()));
    *runs = outside;
    inside
}

/// Merge intersecting regions until none overlap. The higher-priority kind
/// wins; equal priorities keep the earlier region's kind.
fn merge_overlaps(mut regions: Vec<Region>, row_tolerance: f32) -> Vec<Region> {
    regions.sort_by(|a, b| {
        b.kind
            .priority()
            .cmp(&a.kind.priority())
            .then(a.bbox.y.total_cmp(&b.bbox.y))
            .then(a.bbox.x.total_cmp(&b.bbox.x))
    });

    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    for mut region in regions {
        while let Some(i) = merged.iter().position(|m| m.bbox.intersects(&region.bbox)) {
            let existing = merged.remove(i);
            region = combine(existing, region, row_tolerance);
        }
        merged.push(region);
    }
    merged
}

fn combine(a: Region, b: Region, row_tolerance: f32) -> Region {
    let (winner, loser) = if b.kind.priority() > a.kind.priority() {
        (b, a)
    } else {
        (a, b)
    };
    log::debug!(
        "Merging overlapping {} into {}",
        loser.kind.name(),
        winner.kind.name()
    );

    let bbox = winner.bbox.union(&loser.bbox);
    let mut runs = winner.runs;
    runs.extend(loser.runs);
    runs.sort_by(|x, y| {
        x.baseline()
            .total_cmp(&y.baseline())
            .then(x.bbox.x.total_cmp(&y.bbox.x))
    });

    let text = match winner.kind {
        RegionKind::Table { .. } => join_runs(&runs, row_tolerance),
        RegionKind::Figure { .. } => winner.text,
        _ => {
            let (first, second) = if winner.bbox.y <= loser.bbox.y {
                (winner.text, loser.text)
            } else {
                (loser.text, winner.text)
            };
            [first, second]
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        }
    };

    Region::new(winner.kind, bbox, winner.confidence)
        .with_text(text)
        .with_runs(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bitmap, ImagePlacement, ListMarker, RulingLine};

    fn run(text: &str, x: f32, baseline: f32, size: f32) -> TextRun {
        let width = text.chars().count() as f32 * size * 0.5;
        TextRun::new(text, BoundingBox::new(x, baseline - size, width, size), size)
    }

    fn segment(page: &Page) -> Vec<Region> {
        let stats = FontStatistics::from_pages(std::slice::from_ref(page), 1.0);
        Segmenter::default()
            .segment(page, &stats, &PageBudget::unlimited(page.number))
            .unwrap()
    }

    #[test]
    fn test_blank_page_gets_one_empty_paragraph() {
        let page = Page::letter(1);
        let regions = segment(&page);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].kind.is_paragraph());
        assert_eq!(regions[0].text, "");
        assert_eq!(regions[0].bbox, page.bounds());
    }

    #[test]
    fn test_blank_bitmap_page() {
        let mut page = Page::new(1, 40.0, 40.0);
        page.bitmap = Bitmap::new(40, 40, vec![255; 1600]);
        let regions = segment(&page);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].kind.is_paragraph());
    }

    #[test]
    fn test_bitmap_ink_becomes_figure() {
        let mut pixels = vec![255u8; 100 * 100];
        for y in 20..60 {
            for x in 10..70 {
                pixels[y * 100 + x] = 0;
            }
        }
        let mut page = Page::new(2, 100.0, 100.0);
        page.bitmap = Bitmap::new(100, 100, pixels);
        let regions = segment(&page);
        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0].kind,
            RegionKind::Figure {
                resource_id: "page2_block1".into()
            }
        );
        assert_eq!(regions[0].bbox, BoundingBox::new(10.0, 20.0, 60.0, 40.0));
    }

    #[test]
    fn test_heading_paragraph_and_list() {
        let mut page = Page::letter(1);
        page.runs = vec![
            run("Introduction", 72.0, 100.0, 24.0).bold(true),
            run("Body text runs across the page for a while.", 72.0, 130.0, 11.0),
            run("More body text in the same paragraph.", 72.0, 144.3, 11.0),
            run("• A bullet point", 72.0, 170.0, 11.0),
            run("- nested point", 90.0, 189.3, 11.0),
        ];
        let regions = segment(&page);
        let kinds: Vec<&RegionKind> = regions.iter().map(|r| &r.kind).collect();
        assert_eq!(kinds[0], &RegionKind::Heading { level: 1 });
        assert!(kinds[1].is_paragraph());
        assert_eq!(
            kinds[2],
            &RegionKind::ListItem {
                marker: ListMarker::Bullet('•'),
                depth: 0
            }
        );
        assert_eq!(
            kinds[3],
            &RegionKind::ListItem {
                marker: ListMarker::Bullet('-'),
                depth: 1
            }
        );
        assert_eq!(regions[1].text, "Body text runs across the page for a while. More body text in the same paragraph.");
    }

    #[test]
    fn test_ruled_table_claims_runs() {
        let mut page = Page::letter(1);
        page.runs = vec![
            run("Above the table.", 72.0, 60.0, 11.0),
            run("A", 76.0, 95.0, 11.0),
            run("B", 126.0, 95.0, 11.0),
            run("1", 76.0, 115.0, 11.0),
            run("2", 126.0, 115.0, 11.0),
        ];
        for y in [80.0, 100.0, 120.0] {
            page.lines.push(RulingLine::horizontal(y, 70.0, 170.0));
        }
        for x in [70.0, 120.0, 170.0] {
            page.lines.push(RulingLine::vertical(x, 80.0, 120.0));
        }
        let regions = segment(&page);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].kind.is_paragraph());
        assert!(regions[1].kind.is_table());
        assert_eq!(regions[1].runs.len(), 4);
    }

    #[test]
    fn test_tables_disabled() {
        let mut page = Page::letter(1);
        page.runs = vec![
            run("Name", 72.0, 100.0, 11.0),
            run("Age", 172.0, 100.0, 11.0),
            run("Alice", 72.0, 115.0, 11.0),
            run("30", 172.0, 115.0, 11.0),
        ];
        let stats = FontStatistics::from_pages(std::slice::from_ref(&page), 1.0);
        let regions = Segmenter::default()
            .with_tables(TableConfig::default(), false)
            .segment(&page, &stats, &PageBudget::unlimited(1))
            .unwrap();
        assert!(regions.iter().all(|r| !r.kind.is_table()));
    }

    #[test]
    fn test_low_confidence_relabelled() {
        let mut page = Page::letter(1);
        page.runs = vec![run("a) lettered item", 72.0, 100.0, 11.0)];
        let stats = FontStatistics::from_pages(std::slice::from_ref(&page), 1.0);

        let regions = Segmenter::default()
            .segment(&page, &stats, &PageBudget::unlimited(1))
            .unwrap();
        assert!(matches!(regions[0].kind, RegionKind::ListItem { .. }));

        let regions = Segmenter::default()
            .with_threshold(0.7)
            .segment(&page, &stats, &PageBudget::unlimited(1))
            .unwrap();
        assert_eq!(regions.len(), 1);
        assert!(regions[0].kind.is_paragraph());
        assert_eq!(regions[0].text, "a) lettered item");
    }

    #[test]
    fn test_image_becomes_figure_and_background_is_skipped() {
        let mut page = Page::letter(1);
        page.runs = vec![run("Caption text", 72.0, 400.0, 11.0)];
        page.images = vec![
            ImagePlacement::new("Im1", BoundingBox::new(72.0, 100.0, 200.0, 150.0)),
            ImagePlacement::new("Bg", page.bounds()),
        ];
        let regions = segment(&page);
        assert_eq!(regions.len(), 2);
        assert_eq!(
            regions[0].kind,
            RegionKind::Figure {
                resource_id: "Im1".into()
            }
        );
        assert_eq!(regions[1].text, "Caption text");
    }

    #[test]
    fn test_overlaps_merge_to_higher_priority() {
        let para = Region::paragraph(BoundingBox::new(0.0, 0.0, 100.0, 20.0), "text");
        let figure = Region::new(
            RegionKind::Figure {
                resource_id: "x".into(),
            },
            BoundingBox::new(50.0, 10.0, 100.0, 100.0),
            0.9,
        );
        let merged = merge_overlaps(vec![para, figure], 0.4);
        assert_eq!(merged.len(), 1);
        assert!(matches!(merged[0].kind, RegionKind::Figure { .. }));
        assert_eq!(merged[0].bbox, BoundingBox::from_edges(0.0, 0.0, 150.0, 110.0));
    }

    #[test]
    fn test_regions_never_overlap() {
        let mut page = Page::letter(1);
        page.runs = (0..12)
            .map(|i| run("Some words here", 72.0 + (i % 3) as f32 * 5.0, 100.0 + i as f32 * 9.0, 11.0))
            .collect();
        page.images = vec![ImagePlacement::new("Im1", BoundingBox::new(60.0, 120.0, 100.0, 40.0))];
        let regions = segment(&page);
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!a.bbox.intersects(&b.bbox), "{:?} overlaps {:?}", a.bbox, b.bbox);
            }
        }
    }

    #[test]
    fn test_expired_budget() {
        let page = Page::letter(4);
        let stats = FontStatistics::new(1.0);
        let budget = PageBudget::new(4, std::time::Duration::ZERO);
        assert!(matches!(
            Segmenter::default().segment(&page, &stats, &budget),
            Err(Error::Timeout { page: 4 })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(LayoutConfig::default().validate().is_ok());
        let config = LayoutConfig::default().with_list_indent_step(0.0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
