//! Rendering module: export tree construction and output formats.

mod json;
mod markdown;
mod options;
mod result;
mod text;
mod tree;
pub mod visitor;

pub use crate::model::TableGrid;
pub use json::{to_json, JsonFormat};
pub use markdown::{escape_block_start, escape_markdown, to_markdown, MarkdownRenderer};
pub use options::{RenderOptions, TableFallback};
pub use result::ExtractionStats;
pub use text::to_text;
pub use tree::build_tree;
pub use visitor::{CompositeVisitor, DocumentVisitor, SkipFiguresVisitor, VisitorAction};
