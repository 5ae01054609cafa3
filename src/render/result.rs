//! Extraction statistics.

use serde::{Deserialize, Serialize};

use crate::model::ExportNode;

/// Counts of what a conversion produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Total number of pages processed
    pub page_count: u32,

    /// Pages degraded to raw text or partially recovered
    pub partial_pages: u32,

    /// Number of headings (sections)
    pub heading_count: u32,

    /// Number of paragraphs extracted
    pub paragraph_count: u32,

    /// Number of list items extracted
    pub list_item_count: u32,

    /// Number of tables extracted
    pub table_count: u32,

    /// Number of figures found
    pub figure_count: u32,

    /// Approximate word count (whitespace-separated tokens)
    pub word_count: u32,

    /// Character count (excluding whitespace)
    pub char_count: u32,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the nodes and text of an export tree.
    pub fn from_tree(tree: &ExportNode) -> Self {
        let mut stats = Self::new();
        stats.visit(tree);
        stats
    }

    fn visit(&mut self, node: &ExportNode) {
        match node {
            ExportNode::Section { title, .. } => {
                self.heading_count += 1;
                self.count_text(title);
            }
            ExportNode::Paragraph { text, .. } => {
                if !text.trim().is_empty() {
                    self.paragraph_count += 1;
                    self.count_text(text);
                }
            }
            ExportNode::ListItem { text, .. } => {
                self.list_item_count += 1;
                self.count_text(text);
            }
            ExportNode::Table { grid, .. } => {
                self.table_count += 1;
                for cell in &grid.cells {
                    self.count_text(&cell.text);
                }
            }
            ExportNode::Figure { .. } => self.figure_count += 1,
            ExportNode::Document { .. } | ExportNode::List { .. } => {}
        }
        for child in node.children() {
            self.visit(child);
        }
    }

    /// Count words and characters in text.
    fn count_text(&mut self, text: &str) {
        self.word_count += text.split_whitespace().count() as u32;
        self.char_count += text.chars().filter(|c| !c.is_whitespace()).count() as u32;
    }
}
