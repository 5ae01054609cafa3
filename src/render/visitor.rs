//! Visitor pattern for customizing Markdown rendering.
//!
//! The visitor pattern allows users to customize how different export
//! nodes are rendered without modifying the core rendering logic.
//!
//! # Example
//!
//! ```
//! use undoc::render::{DocumentVisitor, VisitorAction};
//! use undoc::model::TableGrid;
//!
//! struct CustomTableVisitor;
//!
//! impl DocumentVisitor for CustomTableVisitor {
//!     fn visit_table(&mut self, _grid: &TableGrid) -> VisitorAction {
//!         VisitorAction::Replace("<!-- table omitted -->\n\n".to_string())
//!     }
//! }
//! ```

use crate::model::TableGrid;

/// Action returned by visitor methods to control rendering behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VisitorAction {
    /// Continue with default rendering.
    #[default]
    Continue,

    /// Replace the element with custom output.
    Replace(String),

    /// Skip this element entirely (produce no output).
    Skip,
}

impl VisitorAction {
    /// Check if this action indicates the element should be skipped.
    pub fn should_skip(&self) -> bool {
        matches!(self, VisitorAction::Skip)
    }

    /// Get replacement content if available.
    pub fn replacement(&self) -> Option<&str> {
        match self {
            VisitorAction::Replace(s) => Some(s),
            _ => None,
        }
    }
}

/// Trait for visiting export nodes during rendering.
///
/// All methods return `VisitorAction::Continue` by default. Actions on a
/// heading apply to the heading line only; the section body is still
/// rendered.
pub trait DocumentVisitor: Send + Sync {
    /// Called before rendering a section heading.
    fn visit_heading(&mut self, text: &str, level: u8) -> VisitorAction {
        let _ = (text, level);
        VisitorAction::Continue
    }

    /// Called before rendering a paragraph.
    fn visit_paragraph(&mut self, text: &str) -> VisitorAction {
        let _ = text;
        VisitorAction::Continue
    }

    /// Called before rendering a list item line. Nested items are visited
    /// separately.
    fn visit_list_item(&mut self, text: &str, depth: u8, ordered: bool) -> VisitorAction {
        let _ = (text, depth, ordered);
        VisitorAction::Continue
    }

    /// Called before rendering a table.
    fn visit_table(&mut self, grid: &TableGrid) -> VisitorAction {
        let _ = grid;
        VisitorAction::Continue
    }

    /// Called before rendering a figure reference.
    fn visit_figure(&mut self, number: usize, resource_id: &str) -> VisitorAction {
        let _ = (number, resource_id);
        VisitorAction::Continue
    }
}

/// Visitor that skips all figures.
#[derive(Debug, Clone, Default)]
pub struct SkipFiguresVisitor;

impl DocumentVisitor for SkipFiguresVisitor {
    fn visit_figure(&mut self, _number: usize, _resource_id: &str) -> VisitorAction {
        VisitorAction::Skip
    }
}

/// Composite visitor that chains multiple visitors.
///
/// Visitors are called in order. The first visitor that returns
/// a non-Continue action determines the result.
#[derive(Default)]
pub struct CompositeVisitor {
    visitors: Vec<Box<dyn DocumentVisitor>>,
}

impl CompositeVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visitor to the chain.
    pub fn with_visitor<V: DocumentVisitor + 'static>(mut self, visitor: V) -> Self {
        self.visitors.push(Box::new(visitor));
        self
    }

    fn first_action(&mut self, mut visit: impl FnMut(&mut dyn DocumentVisitor) -> VisitorAction) -> VisitorAction {
        for visitor in &mut self.visitors {
            let action = visit(visitor.as_mut());
            if action != VisitorAction::Continue {
                return action;
            }
        }
        VisitorAction::Continue
    }
}

impl DocumentVisitor for CompositeVisitor {
    fn visit_heading(&mut self, text: &str, level: u8) -> VisitorAction {
        self.first_action(|v| v.visit_heading(text, level))
    }

    fn visit_paragraph(&mut self, text: &str) -> VisitorAction {
        self.first_action(|v| v.visit_paragraph(text))
    }

    fn visit_list_item(&mut self, text: &str, depth: u8, ordered: bool) -> VisitorAction {
        self.first_action(|v| v.visit_list_item(text, depth, ordered))
    }

    fn visit_table(&mut self, grid: &TableGrid) -> VisitorAction {
        self.first_action(|v| v.visit_table(grid))
    }

    fn visit_figure(&mut self, number: usize, resource_id: &str) -> VisitorAction {
        self.first_action(|v| v.visit_figure(number, resource_id))
    }
}
