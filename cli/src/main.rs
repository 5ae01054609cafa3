//! undoc CLI - document layout conversion tool

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use undoc::convert::progress_channel;
use undoc::{Conversion, ConvertOptions, Converter, FormatHint, OutputFormat, ProgressEvent};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "undoc")]
#[command(version)]
#[command(about = "Convert PDFs, scans and typeset Markdown to structured Markdown, text, and JSON", long_about = None)]
struct Cli {
    /// Input file path or http(s) URL
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "markdown", env = "UNDOC_FORMAT")]
    format: Format,

    /// Output file (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "JSON", env = "UNDOC_CONFIG")]
    config: Option<PathBuf>,

    /// Region confidence threshold (0.0-1.0)
    #[arg(long, env = "UNDOC_THRESHOLD")]
    threshold: Option<f32>,

    /// Disable table detection
    #[arg(long)]
    no_tables: bool,

    /// Per-page time budget in milliseconds
    #[arg(long, env = "UNDOC_PAGE_TIMEOUT_MS")]
    page_timeout_ms: Option<u64>,

    /// Page worker threads (0 = one per core)
    #[arg(long, env = "UNDOC_MAX_PARALLEL_PAGES")]
    max_parallel_pages: Option<usize>,

    /// Include YAML frontmatter
    #[arg(long)]
    frontmatter: bool,

    /// Table rendering mode
    #[arg(long, value_enum, env = "UNDOC_TABLE_MODE")]
    table_mode: Option<TableMode>,

    /// Prefix for figure references
    #[arg(long, env = "UNDOC_IMAGE_PREFIX")]
    image_prefix: Option<String>,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Print extraction statistics to stderr
    #[arg(long)]
    stats: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Markdown
    Markdown,
    /// Plain text
    Text,
    /// JSON with tree, reading order and warnings
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Markdown => OutputFormat::Markdown,
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TableMode {
    /// Standard Markdown tables
    Markdown,
    /// HTML tables for tables with merged cells
    Html,
}

impl From<TableMode> for undoc::TableFallback {
    fn from(mode: TableMode) -> Self {
        match mode {
            TableMode::Markdown => undoc::TableFallback::Markdown,
            TableMode::Html => undoc::TableFallback::Html,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    let options = build_options(cli)?;
    let (data, hint) = read_source(&cli.source)?;

    let converter = Converter::new(options)?;
    let conversion = if cli.progress {
        convert_with_progress(converter, &data, hint.as_ref())?
    } else {
        converter.convert(&data, hint.as_ref())?
    };

    for warning in conversion.warnings() {
        eprintln!("{}: {}", "Warning".yellow().bold(), warning);
    }
    if cli.stats {
        print_stats(&conversion);
    }

    if let Some(path) = &cli.output {
        fs::write(path, &conversion.content)?;
        eprintln!("{} {}", "Saved to".green(), path.display());
    } else {
        print!("{}", conversion.content);
    }

    Ok(())
}

fn build_options(cli: &Cli) -> CliResult<ConvertOptions> {
    let mut options = match &cli.config {
        Some(path) => ConvertOptions::from_json_file(path)?,
        None => ConvertOptions::default(),
    };

    options.output_format = cli.format.into();
    if let Some(threshold) = cli.threshold {
        options.region_confidence_threshold = threshold;
    }
    if cli.no_tables {
        options.enable_tables = false;
    }
    if let Some(timeout) = cli.page_timeout_ms {
        options.page_timeout_ms = timeout;
    }
    if let Some(workers) = cli.max_parallel_pages {
        options.max_parallel_pages = workers;
    }
    if cli.frontmatter {
        options.render.include_frontmatter = true;
    }
    if let Some(mode) = cli.table_mode {
        options.render.table_fallback = mode.into();
    }
    if let Some(prefix) = &cli.image_prefix {
        options.render.image_prefix = prefix.clone();
    }

    options.validate()?;
    Ok(options)
}

/// Read the source bytes and derive a format hint from its name or the
/// response's content type.
fn read_source(source: &str) -> CliResult<(Vec<u8>, Option<FormatHint>)> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let rt = tokio::runtime::Runtime::new()?;
        return rt.block_on(fetch(source));
    }

    let path = Path::new(source);
    let data = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok((data, FormatHint::from_path(path)))
}

async fn fetch(url: &str) -> CliResult<(Vec<u8>, Option<FormatHint>)> {
    log::info!("Fetching {}", url);
    let response = reqwest::get(url).await?.error_for_status()?;

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let hint = mime
        .map(FormatHint::Mime)
        .filter(|h| h.format().is_some())
        .or_else(|| FormatHint::from_path(response.url().path()));

    let bytes = response.bytes().await?;
    Ok((bytes.to_vec(), hint))
}

fn convert_with_progress(
    converter: Converter,
    data: &[u8],
    hint: Option<&FormatHint>,
) -> CliResult<Conversion> {
    let (tx, rx) = progress_channel();
    let converter = converter.with_progress(tx);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Reading input...");

    let result = std::thread::scope(|scope| {
        // The sender lives in the converter; moving it into the worker
        // closes the channel when the conversion returns.
        let handle = scope.spawn(move || converter.convert(data, hint));

        for event in rx.iter() {
            match event {
                ProgressEvent::Started { pages } => {
                    pb.set_length(pages as u64);
                    pb.set_message("Analysing pages...");
                }
                ProgressEvent::PageDone { page, partial } => {
                    if partial {
                        pb.println(format!("{} page {} degraded", "Warning".yellow(), page));
                    }
                    pb.inc(1);
                }
                ProgressEvent::Finished { .. } => pb.set_message("Rendering..."),
            }
        }
        handle.join()
    });

    let conversion = result.map_err(|_| "conversion worker panicked")??;
    pb.finish_with_message("Done!");
    Ok(conversion)
}

fn print_stats(conversion: &Conversion) {
    let stats = &conversion.stats;
    eprintln!("{}", "Extraction Statistics".cyan().bold());
    eprintln!("{}", "─".repeat(40).dimmed());
    eprintln!("{}: {}", "Pages".bold(), stats.page_count);
    eprintln!("{}: {}", "Partial pages".bold(), stats.partial_pages);
    eprintln!("{}: {}", "Headings".bold(), stats.heading_count);
    eprintln!("{}: {}", "Paragraphs".bold(), stats.paragraph_count);
    eprintln!("{}: {}", "List items".bold(), stats.list_item_count);
    eprintln!("{}: {}", "Tables".bold(), stats.table_count);
    eprintln!("{}: {}", "Figures".bold(), stats.figure_count);
    eprintln!("{}: {}", "Words".bold(), stats.word_count);
    if log::log_enabled!(log::Level::Debug) {
        if let Ok(json) = serde_json::to_string(stats) {
            log::debug!("stats: {}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut config = tempfile::NamedTempFile::new().unwrap();
        write!(
            config,
            r#"{{"region_confidence_threshold": 0.7, "enable_tables": true, "page_timeout_ms": 500}}"#
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "undoc",
            "report.pdf",
            "--config",
            config.path().to_str().unwrap(),
            "--no-tables",
            "--page-timeout-ms",
            "900",
            "--table-mode",
            "html",
            "-f",
            "json",
        ])
        .unwrap();
        let options = build_options(&cli).unwrap();

        assert_eq!(options.region_confidence_threshold, 0.7);
        assert!(!options.enable_tables);
        assert_eq!(options.page_timeout_ms, 900);
        assert_eq!(options.output_format, OutputFormat::Json);
        assert_eq!(options.render.table_fallback, undoc::TableFallback::Html);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let cli = Cli::try_parse_from(["undoc", "report.pdf", "--threshold", "2.0"]).unwrap();
        assert!(build_options(&cli).is_err());
    }

    #[test]
    fn test_read_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "# Notes\n").unwrap();

        let (data, hint) = read_source(path.to_str().unwrap()).unwrap();
        assert_eq!(data, b"# Notes\n");
        assert_eq!(hint.and_then(|h| h.format()), Some(undoc::InputFormat::Markdown));

        assert!(read_source(dir.path().join("missing.pdf").to_str().unwrap()).is_err());
    }
}
