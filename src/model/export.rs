//! Export tree.
//!
//! The tree is built from ranked regions and walked by the renderers.
//! Nodes backed by a region carry its id; a pre-order walk visits those ids
//! in reading order.

use super::{ListMarker, RegionId, TableGrid};
use serde::{Deserialize, Serialize};

/// A node of the export tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ExportNode {
    /// Root
    Document { children: Vec<ExportNode> },

    /// Heading plus everything until the next heading of the same or a
    /// higher level
    Section {
        region: RegionId,
        level: u8,
        title: String,
        children: Vec<ExportNode>,
    },

    Paragraph { region: RegionId, text: String },

    /// Consecutive list items; nested lists live in the items' children
    List {
        ordered: bool,
        items: Vec<ExportNode>,
    },

    ListItem {
        region: RegionId,
        marker: ListMarker,
        depth: u8,
        text: String,
        children: Vec<ExportNode>,
    },

    Table { region: RegionId, grid: TableGrid },

    /// `number` counts figures document-wide, starting at 1
    Figure {
        region: RegionId,
        number: usize,
        resource_id: String,
    },
}

impl ExportNode {
    /// Direct children of this node.
    pub fn children(&self) -> &[ExportNode] {
        match self {
            ExportNode::Document { children }
            | ExportNode::Section { children, .. }
            | ExportNode::ListItem { children, .. } => children,
            ExportNode::List { items, .. } => items,
            _ => &[],
        }
    }

    /// The backing region, if any.
    pub fn region(&self) -> Option<RegionId> {
        match self {
            ExportNode::Section { region, .. }
            | ExportNode::Paragraph { region, .. }
            | ExportNode::ListItem { region, .. }
            | ExportNode::Table { region, .. }
            | ExportNode::Figure { region, .. } => Some(*region),
            ExportNode::Document { .. } | ExportNode::List { .. } => None,
        }
    }

    /// Region ids in pre-order.
    pub fn region_ids(&self) -> Vec<RegionId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<RegionId>) {
        if let Some(id) = self.region() {
            ids.push(id);
        }
        for child in self.children() {
            child.collect_ids(ids);
        }
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(ExportNode::node_count).sum::<usize>()
    }
}
