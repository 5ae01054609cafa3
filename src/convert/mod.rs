//! The conversion pipeline.
//!
//! Ingestion produces pages; each page is segmented and its tables are
//! extracted on a dedicated rayon pool; reading order and export then run
//! once over the whole document.
//!
//! # Example
//!
//! ```no_run
//! use undoc::convert::{ConvertOptions, Converter, OutputFormat};
//!
//! fn main() -> undoc::Result<()> {
//!     let options = ConvertOptions::new()
//!         .with_threshold(0.6)
//!         .with_format(OutputFormat::Markdown);
//!     let conversion = Converter::new(options)?.convert_file("report.pdf")?;
//!     for warning in conversion.warnings() {
//!         eprintln!("warning: {}", warning);
//!     }
//!     println!("{}", conversion.content);
//!     Ok(())
//! }
//! ```

mod budget;
mod progress;

pub use budget::{CancellationToken, IngestBudget, PageBudget};
pub use progress::{progress_channel, ProgressEvent};

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crossbeam_channel::Sender;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::detect::FormatHint;
use crate::error::{Error, Result};
use crate::layout::{FontStatistics, LayoutConfig, Segmenter};
use crate::model::{Document, ExportNode, Page, Region, RegionKind, Warning, WarningKind};
use crate::parser::IngestorRegistry;
use crate::reading_order::{OrderConfig, ReadingOrder, ReadingOrderResolver};
use crate::render::{self, ExtractionStats, JsonFormat, RenderOptions};
use crate::table::{TableConfig, TableExtractor};

/// Options for document conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Regions classified below this confidence become paragraphs
    pub region_confidence_threshold: f32,

    /// Detect and extract tables
    pub enable_tables: bool,

    /// Per-page processing budget in milliseconds (0 expires immediately)
    pub page_timeout_ms: u64,

    /// Page worker threads (0 = rayon default)
    pub max_parallel_pages: usize,

    /// Output format
    pub output_format: OutputFormat,

    /// Segmentation thresholds
    pub layout: LayoutConfig,

    /// Table detection and extraction thresholds
    pub table: TableConfig,

    /// Reading-order thresholds
    pub order: OrderConfig,

    /// Rendering options
    pub render: RenderOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            region_confidence_threshold: 0.5,
            enable_tables: true,
            page_timeout_ms: 30_000,
            max_parallel_pages: 0,
            output_format: OutputFormat::Markdown,
            layout: LayoutConfig::default(),
            table: TableConfig::default(),
            order: OrderConfig::default(),
            render: RenderOptions::default(),
        }
    }
}

impl ConvertOptions {
    /// Create new conversion options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: ConvertOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Set the region confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.region_confidence_threshold = threshold;
        self
    }

    /// Enable or disable table detection.
    pub fn with_tables(mut self, enabled: bool) -> Self {
        self.enable_tables = enabled;
        self
    }

    /// Set the per-page timeout.
    pub fn with_page_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.page_timeout_ms = timeout_ms;
        self
    }

    /// Set the number of page worker threads.
    pub fn with_max_parallel_pages(mut self, pages: usize) -> Self {
        self.max_parallel_pages = pages;
        self
    }

    /// Set output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set segmentation thresholds.
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Set table thresholds.
    pub fn with_table_config(mut self, table: TableConfig) -> Self {
        self.table = table;
        self
    }

    /// Set reading-order thresholds.
    pub fn with_order(mut self, order: OrderConfig) -> Self {
        self.order = order;
        self
    }

    /// Set rendering options.
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render = options;
        self
    }

    /// Check every value, failing with [`Error::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.region_confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "region_confidence_threshold must be within 0.0-1.0, got {}",
                self.region_confidence_threshold
            )));
        }
        self.layout.validate()?;
        self.table.validate()?;
        self.order.validate()?;
        self.render.validate()
    }

    fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }
}

/// Output format for conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format
    #[default]
    Markdown,

    /// Plain text
    Text,

    /// JSON structure
    Json,
}

impl OutputFormat {
    /// MIME type of the output.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "text/markdown",
            OutputFormat::Text => "text/plain",
            OutputFormat::Json => "application/json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::InvalidConfig(format!("unknown output format: {}", other))),
        }
    }
}

/// Result of a conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Pages with their final regions, metadata and warnings
    pub document: Document,

    /// Rank of every region
    pub order: ReadingOrder,

    /// Export tree in reading order
    pub tree: ExportNode,

    /// Extraction statistics
    pub stats: ExtractionStats,

    /// Rendered output in the requested format
    pub content: String,

    /// Format of `content`
    pub format: OutputFormat,
}

impl Conversion {
    /// Recoverable problems, in page order.
    pub fn warnings(&self) -> &[Warning] {
        &self.document.warnings
    }

    /// Whether any page was degraded.
    pub fn is_partial(&self) -> bool {
        self.document.is_partial()
    }

    /// Render the same tree in another format.
    pub fn render(&self, format: OutputFormat, options: &RenderOptions) -> Result<String> {
        match format {
            OutputFormat::Markdown => render::to_markdown(&self.document, &self.tree, options),
            OutputFormat::Text => render::to_text(&self.tree),
            OutputFormat::Json => render::to_json(
                &self.document,
                &self.order,
                &self.tree,
                &self.stats,
                JsonFormat::from_pretty(options.pretty_json),
            ),
        }
    }
}

/// Runs the whole pipeline: ingest, segment, extract tables, order, export.
pub struct Converter {
    options: ConvertOptions,
    registry: IngestorRegistry,
    token: CancellationToken,
    progress: Option<Sender<ProgressEvent>>,
}

impl Converter {
    /// Create a converter, validating the options.
    pub fn new(options: ConvertOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            registry: IngestorRegistry::with_defaults(),
            token: CancellationToken::new(),
            progress: None,
        })
    }

    /// Replace the ingestor registry.
    pub fn with_registry(mut self, registry: IngestorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Observe an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Send progress events to `sender`.
    pub fn with_progress(mut self, sender: Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// The token this converter polls. Cancelling it aborts a running
    /// conversion with [`Error::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Convert a file, using its extension as a format hint.
    pub fn convert_file<P: AsRef<Path>>(&self, path: P) -> Result<Conversion> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let hint = FormatHint::from_path(path);
        self.convert(&data, hint.as_ref())
    }

    /// Convert bytes. The binary signature decides the format; `hint`
    /// covers inputs without one.
    pub fn convert(&self, data: &[u8], hint: Option<&FormatHint>) -> Result<Conversion> {
        self.token.check()?;
        let budget = IngestBudget::new(self.options.page_timeout()).with_token(self.token.clone());
        let document = self.registry.ingest_with_budget(data, hint, &budget)?;
        self.process(document)
    }

    /// Run segmentation, table extraction, reading order and export over
    /// an ingested document.
    ///
    /// Fails with `CorruptInput` when two pages share a number.
    pub fn process(&self, mut document: Document) -> Result<Conversion> {
        self.token.check()?;
        let mut numbers = HashSet::new();
        if let Some(page) = document.pages.iter().find(|p| !numbers.insert(p.number)) {
            return Err(Error::CorruptInput {
                page: Some(page.number),
                detail: "page number appears more than once".to_string(),
            });
        }
        let page_count = document.page_count();
        progress::emit(self.progress.as_ref(), ProgressEvent::Started { pages: page_count });

        let fonts = FontStatistics::from_pages(&document.pages, self.options.layout.heading_min_delta);
        log::debug!(
            "Body font size {:.1}pt over {} pages",
            fonts.body_size,
            page_count
        );

        let worker = PageWorker {
            segmenter: Segmenter::new(self.options.layout.clone())
                .with_tables(self.options.table.clone(), self.options.enable_tables)
                .with_threshold(self.options.region_confidence_threshold),
            extractor: TableExtractor::new(self.options.table.clone()),
            fonts: &fonts,
            timeout: self.options.page_timeout(),
            token: &self.token,
            progress: self.progress.as_ref(),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_parallel_pages)
            .build()
            .map_err(|e| Error::Other(format!("failed to start page workers: {}", e)))?;

        let pages = std::mem::take(&mut document.pages);
        let processed: Vec<(Page, Vec<Warning>)> = pool.install(|| {
            pages
                .into_par_iter()
                .map(|page| worker.run(page))
                .collect::<Result<Vec<_>>>()
        })?;

        for (page, warnings) in processed {
            document.pages.push(page);
            for warning in warnings {
                // A page that already ran out of time while being read
                // keeps a single timeout warning.
                let repeated = warning.kind == WarningKind::Timeout
                    && document
                        .warnings
                        .iter()
                        .any(|w| w.kind == WarningKind::Timeout && w.page == warning.page);
                if !repeated {
                    document.warn(warning);
                }
            }
        }

        self.finish(document)
    }

    fn finish(&self, document: Document) -> Result<Conversion> {
        let order = ReadingOrderResolver::new(self.options.order.clone()).resolve(&document);
        let tree = render::build_tree(&document, &order);

        let mut stats = ExtractionStats::from_tree(&tree);
        stats.page_count = document.page_count();
        stats.partial_pages = document.pages.iter().filter(|p| p.is_partial()).count() as u32;

        let mut conversion = Conversion {
            document,
            order,
            tree,
            stats,
            content: String::new(),
            format: self.options.output_format,
        };
        conversion.content = conversion.render(self.options.output_format, &self.options.render)?;

        progress::emit(
            self.progress.as_ref(),
            ProgressEvent::Finished {
                pages: conversion.stats.page_count,
                warnings: conversion.warnings().len(),
            },
        );
        Ok(conversion)
    }
}

/// Per-page work shared by the pool threads.
struct PageWorker<'a> {
    segmenter: Segmenter,
    extractor: TableExtractor,
    fonts: &'a FontStatistics,
    timeout: Duration,
    token: &'a CancellationToken,
    progress: Option<&'a Sender<ProgressEvent>>,
}

impl PageWorker<'_> {
    /// Process one page. Timeouts degrade the page; cancellation and other
    /// fatal errors propagate.
    fn run(&self, mut page: Page) -> Result<(Page, Vec<Warning>)> {
        let budget = PageBudget::new(page.number, self.timeout).with_token(self.token.clone());
        let mut warnings = Vec::new();

        match self.analyze(&page, &budget, &mut warnings) {
            Ok(regions) => page.regions = regions,
            Err(err @ Error::Timeout { .. }) => {
                log::warn!("Page {} degraded to raw text: {}", page.number, err);
                warnings.clear();
                warnings.push(Warning::new(Some(page.number), WarningKind::Timeout, err.to_string()));
                page.regions = vec![Region::paragraph(page.bounds(), page.raw_text())];
                page.mark_partial("timed out");
            }
            Err(err) => return Err(err),
        }

        progress::emit(
            self.progress,
            ProgressEvent::PageDone {
                page: page.number,
                partial: page.is_partial(),
            },
        );
        Ok((page, warnings))
    }

    fn analyze(&self, page: &Page, budget: &PageBudget, warnings: &mut Vec<Warning>) -> Result<Vec<Region>> {
        budget.check()?;
        let mut regions = self.segmenter.segment(page, self.fonts, budget)?;

        for region in regions.iter_mut().filter(|r| r.kind.is_table()) {
            budget.check()?;
            match self.extractor.extract(region, &page.lines) {
                Ok(grid) => region.kind = RegionKind::Table { grid: Some(grid) },
                Err(err) => {
                    let Some(warning) = Warning::from_error(Some(page.number), &err)
                        .filter(|w| w.kind == WarningKind::AmbiguousGrid)
                    else {
                        return Err(err);
                    };
                    log::debug!("Page {}: table relabelled as paragraph: {}", page.number, err);
                    region.relabel_paragraph();
                    warnings.push(warning);
                }
            }
        }
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, RulingLine, TextRun};

    fn run(text: &str, x: f32, baseline: f32, size: f32) -> TextRun {
        let width = text.chars().count() as f32 * 0.5 * size;
        TextRun::new(text, BoundingBox::new(x, baseline - size, width, size), size)
    }

    fn text_page(number: u32) -> Page {
        let mut page = Page::letter(number);
        page.runs = vec![
            run("Introduction", 72.0, 80.0, 20.0),
            run("The first paragraph of body text.", 72.0, 120.0, 10.0),
            run("It continues on a second line.", 72.0, 132.0, 10.0),
        ];
        page
    }

    fn document(pages: Vec<Page>) -> Document {
        let mut document = Document::new();
        for page in pages {
            document.add_page(page);
        }
        document
    }

    #[test]
    fn test_options_defaults_and_json() {
        let options = ConvertOptions::default();
        assert_eq!(options.region_confidence_threshold, 0.5);
        assert!(options.enable_tables);
        assert_eq!(options.page_timeout_ms, 30_000);
        assert_eq!(options.max_parallel_pages, 0);

        let options = ConvertOptions::from_json(
            r#"{"enable_tables": false, "output_format": "json", "order": {"full_width_ratio": 0.7}}"#,
        )
        .unwrap();
        assert!(!options.enable_tables);
        assert_eq!(options.output_format, OutputFormat::Json);
        assert_eq!(options.order.full_width_ratio, 0.7);
        assert_eq!(options.page_timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(matches!(
            ConvertOptions::from_json(r#"{"region_confidence_threshold": 1.5}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ConvertOptions::from_json("{not json"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(Converter::new(ConvertOptions::new().with_threshold(-0.1)).is_err());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("MD".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("docx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_process_heading_and_paragraph() {
        let converter = Converter::new(ConvertOptions::default()).unwrap();
        let conversion = converter.process(document(vec![text_page(1)])).unwrap();
        assert_eq!(
            conversion.content,
            "# Introduction\n\nThe first paragraph of body text. It continues on a second line.\n"
        );
        assert_eq!(conversion.stats.heading_count, 1);
        assert_eq!(conversion.stats.page_count, 1);
        assert!(conversion.warnings().is_empty());
    }

    #[test]
    fn test_zero_timeout_degrades_every_page() {
        let converter = Converter::new(ConvertOptions::new().with_page_timeout_ms(0)).unwrap();
        let conversion = converter
            .process(document(vec![text_page(1), text_page(2)]))
            .unwrap();

        assert!(conversion.is_partial());
        assert_eq!(conversion.stats.partial_pages, 2);
        assert_eq!(conversion.warnings().len(), 2);
        assert!(conversion
            .warnings()
            .iter()
            .all(|w| w.kind == WarningKind::Timeout));
        assert_eq!(conversion.warnings()[0].page, Some(1));
        for page in &conversion.document.pages {
            assert_eq!(page.regions.len(), 1);
            assert!(page.regions[0].text.contains("Introduction"));
        }
    }

    #[test]
    fn test_duplicate_page_numbers_rejected() {
        let converter = Converter::new(ConvertOptions::default()).unwrap();
        let result = converter.process(document(vec![text_page(1), text_page(2), text_page(1)]));
        assert!(matches!(result, Err(Error::CorruptInput { page: Some(1), .. })));
    }

    #[test]
    fn test_cancelled_before_start() {
        let converter = Converter::new(ConvertOptions::default()).unwrap();
        converter.cancellation_token().cancel();
        let result = converter.process(document(vec![text_page(1)]));
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_progress_events() {
        let (tx, rx) = progress_channel();
        let converter = Converter::new(ConvertOptions::default())
            .unwrap()
            .with_progress(tx);
        converter
            .process(document(vec![text_page(1), text_page(2)]))
            .unwrap();
        drop(converter);

        let events: Vec<ProgressEvent> = rx.iter().collect();
        assert_eq!(events.first(), Some(&ProgressEvent::Started { pages: 2 }));
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Finished { pages: 2, warnings: 0 })
        );
        let done = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::PageDone { .. }))
            .count();
        assert_eq!(done, 2);
    }

    #[test]
    fn test_ruled_table_extracted() {
        let mut page = Page::letter(1);
        for y in [100.0, 120.0, 140.0] {
            page.lines.push(RulingLine::horizontal(y, 72.0, 272.0));
        }
        for x in [72.0, 172.0, 272.0] {
            page.lines.push(RulingLine::vertical(x, 100.0, 140.0));
        }
        page.runs = vec![
            run("Name", 80.0, 115.0, 10.0),
            run("Age", 180.0, 115.0, 10.0),
            run("Alice", 80.0, 135.0, 10.0),
            run("30", 180.0, 135.0, 10.0),
        ];
        let converter = Converter::new(ConvertOptions::default()).unwrap();
        let conversion = converter.process(document(vec![page])).unwrap();
        assert_eq!(conversion.stats.table_count, 1);
        assert_eq!(
            conversion.content,
            "| Name | Age |\n| --- | --- |\n| Alice | 30 |\n"
        );
    }

    #[test]
    fn test_render_alternate_format() {
        let converter = Converter::new(ConvertOptions::default()).unwrap();
        let conversion = converter.process(document(vec![text_page(1)])).unwrap();
        let text = conversion
            .render(OutputFormat::Text, &RenderOptions::default())
            .unwrap();
        assert!(text.starts_with("Introduction\n\n"));
    }
}
