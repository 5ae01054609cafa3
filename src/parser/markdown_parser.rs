//! Markdown and plain-text ingestion.
//!
//! Text documents have no geometry of their own, so they are typeset onto
//! Letter pages with a fixed metric model: heading sizes per level, list
//! indentation per depth, pipe tables drawn as ruled grids and image
//! references placed as figures. The resulting pages go through the same
//! layout analysis as PDF pages.

use std::sync::OnceLock;

use regex::Regex;

use super::content::AVG_GLYPH_WIDTH;
use super::normalize::normalize_text;
use super::Ingestor;
use crate::convert::IngestBudget;
use crate::detect::InputFormat;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, Document, ImagePlacement, Metadata, Page, RulingLine, TextRun};

const REGULAR_FONT: &str = "Helvetica";
const BOLD_FONT: &str = "Helvetica-Bold";
const MONO_FONT: &str = "Courier";

/// Page geometry and type sizes used by the typesetter.
#[derive(Debug, Clone)]
pub struct TypesetMetrics {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub body_size: f32,
    pub code_size: f32,
    /// Font sizes for heading levels 1 to 6
    pub heading_sizes: [f32; 6],
    /// Baseline-to-baseline distance relative to font size
    pub line_factor: f32,
    /// Extra space after a paragraph
    pub paragraph_gap: f32,
    /// Indentation per list nesting level
    pub list_indent: f32,
    /// Padding inside table cells
    pub cell_padding: f32,
    pub figure_width: f32,
    pub figure_height: f32,
}

impl Default for TypesetMetrics {
    fn default() -> Self {
        Self {
            page_width: 612.0,
            page_height: 792.0,
            margin: 72.0,
            body_size: 11.0,
            code_size: 10.0,
            heading_sizes: [24.0, 20.0, 16.0, 14.0, 13.0, 12.0],
            line_factor: 1.3,
            paragraph_gap: 10.0,
            list_indent: 18.0,
            cell_padding: 4.0,
            figure_width: 240.0,
            figure_height: 160.0,
        }
    }
}

impl TypesetMetrics {
    fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    fn chars_per_width(&self, width: f32, size: f32) -> usize {
        ((width / (size * AVG_GLYPH_WIDTH)).floor() as usize).max(1)
    }
}

/// Typesets Markdown or plain text into pages.
#[derive(Debug, Clone, Default)]
pub struct MarkdownIngestor {
    metrics: TypesetMetrics,
}

impl MarkdownIngestor {
    /// Create a new ingestor with default metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom metrics.
    pub fn with_metrics(metrics: TypesetMetrics) -> Self {
        Self { metrics }
    }
}

impl Ingestor for MarkdownIngestor {
    fn name(&self) -> &str {
        "markdown"
    }

    fn formats(&self) -> &[InputFormat] {
        &[InputFormat::Markdown, InputFormat::Text]
    }

    fn ingest_with_budget(&self, data: &[u8], format: InputFormat, budget: &IngestBudget) -> Result<Document> {
        budget.check_cancelled()?;
        let text = std::str::from_utf8(data).map_err(|e| Error::CorruptInput {
            page: None,
            detail: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
        })?;
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);

        let mut typesetter = Typesetter::new(self.metrics.clone());
        let mut metadata = Metadata::for_format(format);
        match format {
            InputFormat::Markdown => {
                metadata.title = typeset_markdown(text, &mut typesetter);
            }
            _ => typeset_plain(text, &mut typesetter),
        }

        budget.check_cancelled()?;
        let mut document = Document::new();
        document.metadata = metadata;
        for page in typesetter.finish() {
            document.add_page(page);
        }
        Ok(document)
    }
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*?)(?:\s+#+)?\s*$").expect("valid regex"))
}

fn list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)([-*+]|\d{1,9}[.)]|[a-zA-Z][.)])\s+(.*)$").expect("valid regex")
    })
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^!\[([^\]]*)\]\(\s*<?([^)\s>]+)>?[^)]*\)$").expect("valid regex"))
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"))
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\|?(\s*:?-+:?\s*\|)*\s*:?-+:?\s*\|?$").expect("valid regex"))
}

fn rule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(?:-\s*){3,}|(?:\*\s*){3,}|(?:_\s*){3,})$").expect("valid regex"))
}

/// Typeset Markdown; returns the first level-1 heading as a title.
fn typeset_markdown(text: &str, ts: &mut Typesetter) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut title = None;
    let mut paragraph: Vec<String> = Vec::new();
    let mut in_code = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if in_code {
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_code = false;
                ts.gap();
            } else {
                ts.code_line(line);
            }
            i += 1;
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, ts);
            i += 1;
            continue;
        }

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            flush_paragraph(&mut paragraph, ts);
            in_code = true;
            i += 1;
            continue;
        }

        if let Some(caps) = heading_re().captures(trimmed) {
            flush_paragraph(&mut paragraph, ts);
            let level = caps[1].len() as u8;
            let heading = clean_inline(&caps[2]);
            if level == 1 && title.is_none() {
                title = Some(heading.clone());
            }
            ts.heading(level, &heading);
            i += 1;
            continue;
        }

        if paragraph.is_empty() {
            if let Some(next) = lines.get(i + 1).map(|l| l.trim()) {
                let underline = next.len() >= 2
                    && (next.chars().all(|c| c == '=') || next.chars().all(|c| c == '-'));
                if underline && !trimmed.starts_with('|') {
                    let level = if next.starts_with('=') { 1 } else { 2 };
                    let heading = clean_inline(trimmed);
                    if level == 1 && title.is_none() {
                        title = Some(heading.clone());
                    }
                    ts.heading(level, &heading);
                    i += 2;
                    continue;
                }
            }
        }

        if trimmed.starts_with('|') {
            flush_paragraph(&mut paragraph, ts);
            let mut rows = Vec::new();
            while i < lines.len() && lines[i].trim().starts_with('|') {
                let row = lines[i].trim();
                if !separator_re().is_match(row) {
                    rows.push(split_pipe_row(row));
                }
                i += 1;
            }
            ts.table(&rows);
            continue;
        }

        if let Some(caps) = image_re().captures(trimmed) {
            flush_paragraph(&mut paragraph, ts);
            ts.figure(&caps[2]);
            i += 1;
            continue;
        }

        if rule_re().is_match(trimmed) {
            flush_paragraph(&mut paragraph, ts);
            ts.gap();
            i += 1;
            continue;
        }

        if let Some(caps) = list_re().captures(line) {
            flush_paragraph(&mut paragraph, ts);
            let indent = caps[1].chars().map(|c| if c == '\t' { 4 } else { 1 }).sum::<usize>();
            let depth = (indent / 2).min(8) as u8;
            let marker = match &caps[2] {
                "-" | "*" | "+" => "\u{2022}".to_string(),
                other => other.replace(')', "."),
            };
            ts.list_item(depth, &marker, &clean_inline(&caps[3]));
            i += 1;
            continue;
        }

        let content = trimmed.trim_start_matches('>').trim();
        paragraph.push(clean_inline(content));
        i += 1;
    }

    flush_paragraph(&mut paragraph, ts);
    title
}

fn typeset_plain(text: &str, ts: &mut Typesetter) {
    let mut paragraph = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut paragraph, ts);
        } else {
            paragraph.push(normalize_text(line.trim()));
        }
    }
    flush_paragraph(&mut paragraph, ts);
}

fn flush_paragraph(paragraph: &mut Vec<String>, ts: &mut Typesetter) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join(" ");
    paragraph.clear();
    ts.paragraph(&text);
}

/// Strip inline markup: links keep their text, emphasis markers and
/// backslash escapes are removed.
fn clean_inline(text: &str) -> String {
    let text = link_re().replace_all(text, "$1");
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '*' | '`' => {}
            '_' if out.is_empty() || out.ends_with(' ') || chars.peek().map_or(true, |n| *n == ' ' || *n == '_') => {}
            c => out.push(c),
        }
    }
    normalize_text(out.trim())
}

/// Split `| a | b \| c |` into cells, honouring escaped pipes.
fn split_pipe_row(row: &str) -> Vec<String> {
    let inner = row.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = if inner.ends_with('|') && !inner.ends_with("\\|") {
        &inner[..inner.len() - 1]
    } else {
        inner
    };

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '|' {
            cells.push(clean_inline(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    cells.push(clean_inline(&current));
    cells
}

/// Greedy word wrap to `max_chars` per line.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            lines.push(head);
        }
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Places runs, rules and figures on pages top to bottom.
struct Typesetter {
    metrics: TypesetMetrics,
    pages: Vec<Page>,
    current: Page,
    y: f32,
}

impl Typesetter {
    fn new(metrics: TypesetMetrics) -> Self {
        let current = Page::new(1, metrics.page_width, metrics.page_height);
        let y = metrics.margin;
        Self {
            metrics,
            pages: Vec::new(),
            current,
            y,
        }
    }

    fn bottom(&self) -> f32 {
        self.metrics.page_height - self.metrics.margin
    }

    fn new_page(&mut self) {
        let number = self.current.number + 1;
        let next = Page::new(number, self.metrics.page_width, self.metrics.page_height);
        self.pages.push(std::mem::replace(&mut self.current, next));
        self.y = self.metrics.margin;
    }

    /// Break the page unless `height` still fits.
    fn ensure_space(&mut self, height: f32) {
        let at_top = self.y <= self.metrics.margin;
        if self.y + height > self.bottom() && !at_top {
            self.new_page();
        }
    }

    fn gap(&mut self) {
        self.y += self.metrics.paragraph_gap;
    }

    fn push_run(&mut self, text: &str, x: f32, baseline: f32, size: f32, font: &str) {
        let width = text.chars().count() as f32 * size * AVG_GLYPH_WIDTH;
        let bbox = BoundingBox::new(x, baseline - size, width, size);
        let run = TextRun::new(text, bbox, size)
            .with_font(font)
            .bold(font == BOLD_FONT);
        self.current.runs.push(run);
    }

    /// One line of text at the cursor.
    fn line(&mut self, text: &str, x: f32, size: f32, font: &str) {
        let advance = size * self.metrics.line_factor;
        self.ensure_space(advance);
        let baseline = self.y + size;
        self.push_run(text, x, baseline, size, font);
        self.y += advance;
    }

    fn paragraph(&mut self, text: &str) {
        let size = self.metrics.body_size;
        let max = self.metrics.chars_per_width(self.metrics.content_width(), size);
        for line in wrap(text, max) {
            self.line(&line, self.metrics.margin, size, REGULAR_FONT);
        }
        self.gap();
    }

    fn code_line(&mut self, text: &str) {
        let size = self.metrics.code_size;
        let max = self.metrics.chars_per_width(self.metrics.content_width(), size);
        let text = text.trim_end();
        if text.trim().is_empty() {
            self.y += size * self.metrics.line_factor;
            return;
        }
        let indent = text.len() - text.trim_start().len();
        let x = self.metrics.margin + indent as f32 * size * AVG_GLYPH_WIDTH;
        for line in wrap(text, max.saturating_sub(indent).max(1)) {
            self.line(&line, x, size, MONO_FONT);
        }
    }

    fn heading(&mut self, level: u8, text: &str) {
        let idx = usize::from(level.clamp(1, 6) - 1);
        let size = self.metrics.heading_sizes[idx];
        let max = self.metrics.chars_per_width(self.metrics.content_width(), size);
        // Keep the heading with at least one following line.
        self.ensure_space(size * self.metrics.line_factor * 2.0);
        if self.y > self.metrics.margin {
            self.gap();
        }
        for line in wrap(text, max) {
            self.line(&line, self.metrics.margin, size, BOLD_FONT);
        }
        self.y += self.metrics.paragraph_gap / 2.0;
    }

    fn list_item(&mut self, depth: u8, marker: &str, text: &str) {
        let size = self.metrics.body_size;
        let x = self.metrics.margin + f32::from(depth) * self.metrics.list_indent;
        let marker_width = (marker.chars().count() + 1) as f32 * size * AVG_GLYPH_WIDTH;
        let max = self
            .metrics
            .chars_per_width(self.metrics.page_width - self.metrics.margin - x - marker_width, size);

        let lines = wrap(text, max);
        let mut lines = lines.into_iter();
        let first = lines.next().unwrap_or_default();
        self.line(&format!("{} {}", marker, first).trim_end().to_string(), x, size, REGULAR_FONT);
        for line in lines {
            self.line(&line, x + marker_width, size, REGULAR_FONT);
        }
        self.y += self.metrics.paragraph_gap / 2.0;
    }

    /// Lay out a ruled grid; the first row is set in bold.
    fn table(&mut self, rows: &[Vec<String>]) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let size = self.metrics.body_size;
        let pad = self.metrics.cell_padding;
        let glyph = size * AVG_GLYPH_WIDTH;

        // Natural widths, scaled down to the content width when too wide.
        let mut widths: Vec<f32> = (0..columns)
            .map(|c| {
                let longest = rows
                    .iter()
                    .filter_map(|r| r.get(c))
                    .map(|t| t.chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(3);
                longest as f32 * glyph + 2.0 * pad
            })
            .collect();
        let total: f32 = widths.iter().sum();
        let available = self.metrics.content_width();
        if total > available {
            let scale = available / total;
            widths.iter_mut().for_each(|w| *w *= scale);
        }

        let left = self.metrics.margin;
        let right = left + widths.iter().sum::<f32>();
        let mut edges = vec![left];
        for w in &widths {
            let last = edges[edges.len() - 1];
            edges.push(last + w);
        }

        let line_height = size * self.metrics.line_factor;
        self.gap();
        let mut top = self.y;
        let mut segment_top = top;
        self.current.lines.push(RulingLine::horizontal(top, left, right));

        for (r, row) in rows.iter().enumerate() {
            let wrapped: Vec<Vec<String>> = (0..columns)
                .map(|c| {
                    let text = row.get(c).map(String::as_str).unwrap_or("");
                    let max = self.metrics.chars_per_width(widths[c] - 2.0 * pad, size);
                    wrap(text, max)
                })
                .collect();
            let line_count = wrapped.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let height = line_count as f32 * line_height + 2.0 * pad;

            if top + height > self.bottom() && top > self.metrics.margin {
                self.close_grid(&edges, segment_top, top);
                self.new_page();
                top = self.y;
                segment_top = top;
                self.current.lines.push(RulingLine::horizontal(top, left, right));
            }

            let font = if r == 0 && rows.len() > 1 { BOLD_FONT } else { REGULAR_FONT };
            for (c, lines) in wrapped.iter().enumerate() {
                for (k, text) in lines.iter().enumerate() {
                    let baseline = top + pad + k as f32 * line_height + size;
                    self.push_run(text, edges[c] + pad, baseline, size, font);
                }
            }

            top += height;
            self.current.lines.push(RulingLine::horizontal(top, left, right));
        }

        self.close_grid(&edges, segment_top, top);
        self.y = top;
        self.gap();
    }

    fn close_grid(&mut self, edges: &[f32], top: f32, bottom: f32) {
        for &x in edges {
            self.current.lines.push(RulingLine::vertical(x, top, bottom));
        }
    }

    fn figure(&mut self, source: &str) {
        let (w, h) = (self.metrics.figure_width, self.metrics.figure_height);
        self.ensure_space(h);
        let bbox = BoundingBox::new(self.metrics.margin, self.y, w, h);
        self.current.images.push(ImagePlacement::new(source, bbox));
        self.y += h;
        self.gap();
    }

    fn finish(mut self) -> Vec<Page> {
        self.pages.push(self.current);
        self.pages
    }
}
