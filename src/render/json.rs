//! JSON rendering of a conversion.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Document, ExportNode, Metadata, PageStatus, Warning};
use crate::reading_order::ReadingOrder;

use super::ExtractionStats;

/// JSON output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Pretty-printed JSON with indentation
    #[default]
    Pretty,
    /// Compact JSON without extra whitespace
    Compact,
}

impl JsonFormat {
    pub fn from_pretty(pretty: bool) -> Self {
        if pretty {
            JsonFormat::Pretty
        } else {
            JsonFormat::Compact
        }
    }
}

#[derive(Serialize)]
struct PageSummary<'a> {
    number: u32,
    width: f32,
    height: f32,
    regions: usize,
    status: &'a PageStatus,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a Metadata,
    pages: Vec<PageSummary<'a>>,
    reading_order: &'a ReadingOrder,
    tree: &'a ExportNode,
    warnings: &'a [Warning],
    stats: &'a ExtractionStats,
}

/// Serialize a conversion: metadata, per-page status, reading order, the
/// export tree, warnings and statistics.
pub fn to_json(
    document: &Document,
    order: &ReadingOrder,
    tree: &ExportNode,
    stats: &ExtractionStats,
    format: JsonFormat,
) -> Result<String> {
    let report = JsonReport {
        metadata: &document.metadata,
        pages: document
            .pages
            .iter()
            .map(|p| PageSummary {
                number: p.number,
                width: p.width,
                height: p.height,
                regions: p.regions.len(),
                status: &p.status,
            })
            .collect(),
        reading_order: order,
        tree,
        warnings: &document.warnings,
        stats,
    };

    let result = match format {
        JsonFormat::Pretty => serde_json::to_string_pretty(&report),
        JsonFormat::Compact => serde_json::to_string(&report),
    };

    result.map_err(|e| Error::Render(format!("JSON serialization error: {}", e)))
}
