//! Input ingestion.
//!
//! Every supported format is turned into a [`Document`] of uniform pages:
//! dimensions, an optional bitmap, positioned text runs, ruling lines and
//! image placements. Ingestors are pluggable through the [`Ingestor`] trait
//! and dispatched by detected [`InputFormat`].
//!
//! # Example
//!
//! ```no_run
//! use undoc::parser::IngestorRegistry;
//!
//! fn main() -> undoc::Result<()> {
//!     let data = std::fs::read("report.pdf")?;
//!     let document = IngestorRegistry::with_defaults().ingest(&data, None)?;
//!     println!("{} pages", document.page_count());
//!     Ok(())
//! }
//! ```

mod content;
mod image_parser;
mod markdown_parser;
mod normalize;
mod pdf_parser;
mod salvage;

pub use content::{decode_text_simple, is_spaceless_script_char, AVG_GLYPH_WIDTH};
pub use image_parser::ImageIngestor;
pub use markdown_parser::{MarkdownIngestor, TypesetMetrics};
pub use normalize::normalize_text;
pub use pdf_parser::PdfIngestor;

use crate::convert::IngestBudget;
use crate::detect::{detect_format, FormatHint, InputFormat};
use crate::error::{Error, Result};
use crate::model::Document;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Turns raw bytes of one or more formats into a [`Document`].
///
/// Implementations return `Ok` whenever at least one page was recovered,
/// flagging damaged pages `Partial` and recording warnings on the document.
pub trait Ingestor: Send + Sync {
    /// Get the name of this ingestor.
    fn name(&self) -> &str;

    /// Formats this ingestor accepts.
    fn formats(&self) -> &[InputFormat];

    /// Ingest bytes already identified as `format`, without time limits.
    fn ingest(&self, data: &[u8], format: InputFormat) -> Result<Document> {
        self.ingest_with_budget(data, format, &IngestBudget::unlimited())
    }

    /// Ingest under a per-page deadline and cancellation.
    ///
    /// A page that runs out of time keeps what was read so far, is marked
    /// `Partial` and gets a `Timeout` warning. Cancellation fails with
    /// [`Error::Cancelled`].
    fn ingest_with_budget(&self, data: &[u8], format: InputFormat, budget: &IngestBudget) -> Result<Document>;

    /// Check if this ingestor supports the given format.
    fn supports(&self, format: InputFormat) -> bool {
        self.formats().contains(&format)
    }
}

/// Registry mapping input formats to ingestors.
pub struct IngestorRegistry {
    ingestors: BTreeMap<InputFormat, Arc<dyn Ingestor>>,
}

impl IngestorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            ingestors: BTreeMap::new(),
        }
    }

    /// Create a registry with the built-in ingestors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PdfIngestor::new()));
        registry.register(Arc::new(ImageIngestor::new()));
        registry.register(Arc::new(MarkdownIngestor::new()));
        registry
    }

    /// Register an ingestor for all its formats, replacing earlier ones.
    pub fn register(&mut self, ingestor: Arc<dyn Ingestor>) {
        for format in ingestor.formats() {
            self.ingestors.insert(*format, ingestor.clone());
        }
    }

    /// Get the ingestor for a format.
    pub fn get(&self, format: InputFormat) -> Option<Arc<dyn Ingestor>> {
        self.ingestors.get(&format).cloned()
    }

    /// Check if a format is supported.
    pub fn supports(&self, format: InputFormat) -> bool {
        self.ingestors.contains_key(&format)
    }

    /// Get all supported formats.
    pub fn supported_formats(&self) -> Vec<InputFormat> {
        self.ingestors.keys().copied().collect()
    }

    /// Detect the format and ingest.
    pub fn ingest(&self, data: &[u8], hint: Option<&FormatHint>) -> Result<Document> {
        self.ingest_with_budget(data, hint, &IngestBudget::unlimited())
    }

    /// Detect the format and ingest under a per-page budget.
    pub fn ingest_with_budget(
        &self,
        data: &[u8],
        hint: Option<&FormatHint>,
        budget: &IngestBudget,
    ) -> Result<Document> {
        let format = detect_format(data, hint)?;
        self.ingest_as_with_budget(data, format, budget)
    }

    /// Ingest bytes of a known format.
    pub fn ingest_as(&self, data: &[u8], format: InputFormat) -> Result<Document> {
        self.ingest_as_with_budget(data, format, &IngestBudget::unlimited())
    }

    fn ingest_as_with_budget(&self, data: &[u8], format: InputFormat, budget: &IngestBudget) -> Result<Document> {
        budget.check_cancelled()?;
        let ingestor = self.get(format).ok_or_else(|| {
            Error::UnsupportedFormat(format!("no ingestor registered for {}", format))
        })?;

        log::debug!("Ingesting {} bytes as {} with '{}'", data.len(), format, ingestor.name());
        let mut document = ingestor.ingest_with_budget(data, format, budget)?;

        if document.is_empty() {
            return Err(Error::CorruptInput {
                page: None,
                detail: "no page could be recovered".to_string(),
            });
        }
        document.metadata.format = Some(format);
        document.metadata.page_count = document.page_count();
        Ok(document)
    }
}

impl Default for IngestorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
