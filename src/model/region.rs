//! Typed page regions.

use super::{BoundingBox, TableGrid, TextRun};
use serde::{Deserialize, Serialize};

/// Identifies a region within a document: page number plus its index in
/// the page's region list. Ordered by page, then index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId {
    /// Page number (1-indexed)
    pub page: u32,
    /// Index into `Page::regions`
    pub index: usize,
}

impl RegionId {
    pub fn new(page: u32, index: usize) -> Self {
        Self { page, index }
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}r{}", self.page, self.index)
    }
}

/// Leading marker of a list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", content = "value", rename_all = "lowercase")]
pub enum ListMarker {
    /// Bullet glyph such as `•`, `-` or `*`
    Bullet(char),
    /// Arabic number, e.g. `3.` or `3)`
    Numbered(u32),
    /// Single letter, e.g. `a)`
    Lettered(char),
}

impl ListMarker {
    /// Whether the marker implies an ordered list.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, ListMarker::Bullet(_))
    }
}

/// What a region is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionKind {
    /// Body text
    Paragraph,
    /// Section heading
    Heading {
        /// Level (1 = top)
        level: u8,
    },
    /// Tabular content; `grid` is filled by the table extractor
    Table {
        grid: Option<TableGrid>,
    },
    /// Image or graphic
    Figure {
        resource_id: String,
    },
    /// One entry of a list
    ListItem {
        marker: ListMarker,
        /// Nesting depth (0 = outermost)
        depth: u8,
    },
}

impl RegionKind {
    /// Merge priority when candidate regions overlap: higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            RegionKind::Table { .. } => 4,
            RegionKind::Figure { .. } => 3,
            RegionKind::Heading { .. } => 2,
            RegionKind::ListItem { .. } => 1,
            RegionKind::Paragraph => 0,
        }
    }

    /// Short lowercase label.
    pub fn name(&self) -> &'static str {
        match self {
            RegionKind::Paragraph => "paragraph",
            RegionKind::Heading { .. } => "heading",
            RegionKind::Table { .. } => "table",
            RegionKind::Figure { .. } => "figure",
            RegionKind::ListItem { .. } => "list_item",
        }
    }

    pub fn is_paragraph(&self) -> bool {
        matches!(self, RegionKind::Paragraph)
    }

    pub fn is_table(&self) -> bool {
        matches!(self, RegionKind::Table { .. })
    }
}

/// A typed, non-overlapping area of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,

    /// Page-scoped geometry
    pub bbox: BoundingBox,

    /// Classifier confidence in `[0, 1]`
    pub confidence: f32,

    /// Text content (list markers stripped)
    pub text: String,

    /// Runs the region owns
    pub runs: Vec<TextRun>,
}

impl Region {
    /// Create a region with no text.
    pub fn new(kind: RegionKind, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            kind,
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            text: String::new(),
            runs: Vec::new(),
        }
    }

    /// A paragraph region.
    pub fn paragraph(bbox: BoundingBox, text: impl Into<String>) -> Self {
        Self::new(RegionKind::Paragraph, bbox, 1.0).with_text(text)
    }

    /// Set text and return self.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set runs and return self.
    pub fn with_runs(mut self, runs: Vec<TextRun>) -> Self {
        self.runs = runs;
        self
    }

    /// Turn the region into a plain paragraph, keeping its content.
    pub fn relabel_paragraph(&mut self) {
        self.kind = RegionKind::Paragraph;
    }

    /// The table grid, when this is an extracted table.
    pub fn grid(&self) -> Option<&TableGrid> {
        match &self.kind {
            RegionKind::Table { grid } => grid.as_ref(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.runs.is_empty()
    }
}
