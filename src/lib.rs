//! # undoc
//!
//! Document layout analysis and conversion to structured text.
//!
//! Pages of a PDF, a raster image or a typeset Markdown file are ingested
//! into positioned text runs, ruling lines and images, segmented into typed
//! regions (headings, paragraphs, lists, tables, figures), put into reading
//! order and exported as Markdown, plain text or JSON.
//!
//! ## Quick Start
//!
//! ```no_run
//! fn main() -> undoc::Result<()> {
//!     // Convert a file to Markdown with default options
//!     let markdown = undoc::to_markdown("report.pdf")?;
//!     println!("{}", markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Multiple inputs**: PDF, PNG/JPEG/GIF/BMP/TIFF, typeset Markdown
//! - **Layout analysis**: multi-column reading order, heading levels from
//!   font statistics, nested lists, figure placeholders
//! - **Tables**: ruled (lattice) and whitespace-aligned (stream) tables
//!   with merged cells
//! - **Partial success**: damaged or slow pages degrade instead of failing
//!   the document
//! - **Parallel processing**: pages are analysed on a rayon pool

pub mod convert;
pub mod detect;
pub mod error;
pub mod layout;
pub mod model;
pub mod parser;
pub mod reading_order;
pub mod render;
pub mod table;

// Re-export commonly used types
pub use convert::{
    CancellationToken, Conversion, ConvertOptions, Converter, IngestBudget, OutputFormat,
    ProgressEvent,
};
pub use detect::{detect_format, detect_format_from_bytes, detect_format_from_path, FormatHint, InputFormat};
pub use error::{Error, Result};
pub use layout::LayoutConfig;
pub use model::{
    BoundingBox, Cell, Document, ExportNode, ListMarker, Metadata, Page, Region, RegionId,
    RegionKind, TableGrid, TextRun, Warning, WarningKind,
};
pub use parser::{Ingestor, IngestorRegistry};
pub use reading_order::{OrderConfig, ReadingOrder};
pub use render::{JsonFormat, RenderOptions, TableFallback};
pub use table::TableConfig;

use std::path::Path;

/// Ingest a file without layout analysis.
///
/// # Example
///
/// ```no_run
/// let doc = undoc::ingest_file("scan.png").unwrap();
/// println!("Pages: {}", doc.page_count());
/// ```
pub fn ingest_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    IngestorRegistry::with_defaults().ingest(&data, FormatHint::from_path(path).as_ref())
}

/// Ingest bytes without layout analysis.
pub fn ingest_bytes(data: &[u8]) -> Result<Document> {
    IngestorRegistry::with_defaults().ingest(data, None)
}

/// Convert a file with the given options.
pub fn convert_file<P: AsRef<Path>>(path: P, options: ConvertOptions) -> Result<Conversion> {
    Converter::new(options)?.convert_file(path)
}

/// Convert bytes with the given options.
pub fn convert_bytes(data: &[u8], hint: Option<&FormatHint>, options: ConvertOptions) -> Result<Conversion> {
    Converter::new(options)?.convert(data, hint)
}

/// Convert a file to Markdown.
///
/// # Example
///
/// ```no_run
/// let markdown = undoc::to_markdown("document.pdf").unwrap();
/// std::fs::write("document.md", markdown).unwrap();
/// ```
pub fn to_markdown<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(convert_file(path, ConvertOptions::default())?.content)
}

/// Convert a file to plain text.
pub fn to_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let options = ConvertOptions::default().with_format(OutputFormat::Text);
    Ok(convert_file(path, options)?.content)
}

/// Convert a file to JSON.
pub fn to_json<P: AsRef<Path>>(path: P, format: JsonFormat) -> Result<String> {
    let render = RenderOptions {
        pretty_json: format == JsonFormat::Pretty,
        ..Default::default()
    };
    let options = ConvertOptions::default()
        .with_format(OutputFormat::Json)
        .with_render_options(render);
    Ok(convert_file(path, options)?.content)
}

/// Convert a file on the tokio blocking pool.
#[cfg(feature = "async")]
pub async fn convert_file_async<P: AsRef<Path>>(path: P, options: ConvertOptions) -> Result<Conversion> {
    let path = path.as_ref().to_path_buf();
    let data = tokio::fs::read(&path).await?;
    let hint = FormatHint::from_path(&path);
    tokio::task::spawn_blocking(move || Converter::new(options)?.convert(&data, hint.as_ref()))
        .await
        .map_err(|e| Error::Other(format!("conversion task failed: {}", e)))?
}

/// Builder for one-off conversions.
///
/// # Example
///
/// ```no_run
/// use undoc::{TableFallback, Undoc};
///
/// let markdown = Undoc::new()
///     .with_frontmatter()
///     .with_threshold(0.6)
///     .with_table_fallback(TableFallback::Html)
///     .convert("document.pdf")?
///     .content;
/// # Ok::<(), undoc::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Undoc {
    options: ConvertOptions,
}

impl Undoc {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the region confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.options = self.options.with_threshold(threshold);
        self
    }

    /// Skip table detection.
    pub fn without_tables(mut self) -> Self {
        self.options = self.options.with_tables(false);
        self
    }

    /// Set the per-page timeout in milliseconds.
    pub fn with_page_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options = self.options.with_page_timeout_ms(timeout_ms);
        self
    }

    /// Process pages one at a time.
    pub fn sequential(mut self) -> Self {
        self.options = self.options.with_max_parallel_pages(1);
        self
    }

    /// Enable frontmatter in output.
    pub fn with_frontmatter(mut self) -> Self {
        self.options.render = self.options.render.with_frontmatter(true);
        self
    }

    /// Set table fallback mode.
    pub fn with_table_fallback(mut self, fallback: TableFallback) -> Self {
        self.options.render = self.options.render.with_table_fallback(fallback);
        self
    }

    /// Set the figure path prefix.
    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.render = self.options.render.with_image_prefix(prefix);
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.options = self.options.with_format(format);
        self
    }

    /// The options collected so far.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert a file.
    pub fn convert<P: AsRef<Path>>(self, path: P) -> Result<Conversion> {
        convert_file(path, self.options)
    }

    /// Convert bytes; the format is sniffed from the content.
    pub fn convert_bytes(self, data: &[u8]) -> Result<Conversion> {
        convert_bytes(data, None, self.options)
    }
}
