//! Markdown rendering of the export tree.

use crate::error::Result;
use crate::model::{Document, ExportNode, ListMarker, TableGrid};

use super::{DocumentVisitor, RenderOptions, TableFallback, VisitorAction};

/// Render an export tree to Markdown.
pub fn to_markdown(document: &Document, tree: &ExportNode, options: &RenderOptions) -> Result<String> {
    MarkdownRenderer::new(options.clone()).render(document, tree)
}

/// Markdown renderer.
pub struct MarkdownRenderer {
    options: RenderOptions,
    visitor: Option<Box<dyn DocumentVisitor>>,
}

impl MarkdownRenderer {
    /// Create a new Markdown renderer.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            visitor: None,
        }
    }

    /// Route every node through `visitor` before default rendering.
    pub fn with_visitor<V: DocumentVisitor + 'static>(mut self, visitor: V) -> Self {
        self.visitor = Some(Box::new(visitor));
        self
    }

    /// Render a document's export tree to Markdown.
    pub fn render(mut self, document: &Document, tree: &ExportNode) -> Result<String> {
        let mut output = String::new();

        // Add frontmatter if requested
        if self.options.include_frontmatter {
            output.push_str(&document.metadata.to_yaml_frontmatter());
            output.push('\n');
        }

        self.render_node(&mut output, tree);

        let trimmed = output.trim_end();
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{}\n", trimmed))
    }

    fn visit(&mut self, f: impl FnOnce(&mut dyn DocumentVisitor) -> VisitorAction) -> VisitorAction {
        match self.visitor.as_deref_mut() {
            Some(visitor) => f(visitor),
            None => VisitorAction::Continue,
        }
    }

    /// Apply a visitor action; returns true when default rendering should
    /// proceed.
    fn apply(output: &mut String, action: VisitorAction) -> bool {
        match action {
            VisitorAction::Continue => true,
            VisitorAction::Skip => false,
            VisitorAction::Replace(content) => {
                output.push_str(&content);
                false
            }
        }
    }

    fn render_node(&mut self, output: &mut String, node: &ExportNode) {
        match node {
            ExportNode::Document { children } => {
                for child in children {
                    self.render_node(output, child);
                }
            }
            ExportNode::Section {
                level,
                title,
                children,
                ..
            } => {
                let action = self.visit(|v| v.visit_heading(title, *level));
                if Self::apply(output, action) {
                    let level = (*level).clamp(1, self.options.max_heading_level);
                    output.push_str(&"#".repeat(level as usize));
                    output.push(' ');
                    output.push_str(&escape_heading_close(&escape_block_start(&self.escape(title))));
                    output.push_str("\n\n");
                }
                for child in children {
                    self.render_node(output, child);
                }
            }
            ExportNode::Paragraph { text, .. } => {
                if text.trim().is_empty() {
                    return;
                }
                let action = self.visit(|v| v.visit_paragraph(text));
                if Self::apply(output, action) {
                    output.push_str(&escape_block_start(&self.escape(text)));
                    output.push_str("\n\n");
                }
            }
            ExportNode::List { ordered, items } => {
                for (i, item) in items.iter().enumerate() {
                    self.render_list_item(output, item, *ordered, i + 1);
                }
                if !output.ends_with("\n\n") {
                    output.push('\n');
                }
            }
            ExportNode::ListItem { .. } => self.render_list_item(output, node, false, 1),
            ExportNode::Table { grid, .. } => {
                if grid.is_empty() {
                    return;
                }
                let action = self.visit(|v| v.visit_table(grid));
                if Self::apply(output, action) {
                    self.render_table(output, grid);
                }
            }
            ExportNode::Figure {
                number,
                resource_id,
                ..
            } => {
                let action = self.visit(|v| v.visit_figure(*number, resource_id));
                if Self::apply(output, action) {
                    output.push_str(&format!(
                        "![Figure {}]({}{})\n\n",
                        number, self.options.image_prefix, resource_id
                    ));
                }
            }
        }
    }

    fn render_list_item(&mut self, output: &mut String, node: &ExportNode, ordered: bool, position: usize) {
        let ExportNode::ListItem {
            marker,
            depth,
            text,
            children,
            ..
        } = node
        else {
            return;
        };

        let action = self.visit(|v| v.visit_list_item(text, *depth, ordered));
        if Self::apply(output, action) {
            let marker = match (ordered, marker) {
                (true, ListMarker::Numbered(n)) => format!("{}.", n),
                (true, _) => format!("{}.", position),
                (false, _) => self.options.list_marker.to_string(),
            };
            output.push_str(&"  ".repeat(*depth as usize));
            output.push_str(&marker);
            output.push(' ');
            output.push_str(&self.escape(text));
            output.push('\n');
        }

        for child in children {
            if let ExportNode::List { ordered, items } = child {
                for (i, item) in items.iter().enumerate() {
                    self.render_list_item(output, item, *ordered, i + 1);
                }
            }
        }
    }

    fn escape(&self, text: &str) -> String {
        if self.options.escape_special_chars {
            escape_markdown(text)
        } else {
            text.to_string()
        }
    }

    fn render_table(&self, output: &mut String, grid: &TableGrid) {
        // Use HTML for complex tables
        if grid.has_merged_cells() && self.options.table_fallback == TableFallback::Html {
            self.render_table_html(output, grid);
            return;
        }

        // Standard Markdown table
        self.render_table_markdown(output, grid);
    }

    fn render_table_markdown(&self, output: &mut String, grid: &TableGrid) {
        let header_end = grid.header_rows.max(1);
        for r in 0..grid.rows {
            output.push('|');
            for c in 0..grid.columns {
                // Positions covered by a span render empty
                let content = grid
                    .owner_of(r, c)
                    .filter(|cell| cell.row == r && cell.col == c)
                    .map(|cell| self.cell_text(&cell.text))
                    .unwrap_or_default();
                if content.is_empty() {
                    output.push_str("  |");
                } else {
                    output.push_str(&format!(" {} |", content));
                }
            }
            output.push('\n');

            // Add separator after header row
            if r + 1 == header_end {
                output.push('|');
                output.push_str(&" --- |".repeat(grid.columns));
                output.push('\n');
            }
        }
        output.push('\n');
    }

    fn render_table_html(&self, output: &mut String, grid: &TableGrid) {
        output.push_str("<table>\n");

        // Header
        if grid.header_rows > 0 {
            output.push_str("<thead>\n");
            for r in 0..grid.header_rows.min(grid.rows) {
                self.render_html_row(output, grid, r, true);
            }
            output.push_str("</thead>\n");
        }

        // Body
        output.push_str("<tbody>\n");
        for r in grid.header_rows.min(grid.rows)..grid.rows {
            self.render_html_row(output, grid, r, false);
        }
        output.push_str("</tbody>\n");

        output.push_str("</table>\n\n");
    }

    fn render_html_row(&self, output: &mut String, grid: &TableGrid, row: usize, is_header: bool) {
        let tag = if is_header { "th" } else { "td" };
        output.push_str("<tr>");

        for cell in grid.row_cells(row) {
            let mut attrs = String::new();
            if cell.row_span > 1 {
                attrs.push_str(&format!(" rowspan=\"{}\"", cell.row_span));
            }
            if cell.col_span > 1 {
                attrs.push_str(&format!(" colspan=\"{}\"", cell.col_span));
            }

            output.push_str(&format!("<{}{}>", tag, attrs));
            output.push_str(&escape_html(cell.text.trim()));
            output.push_str(&format!("</{}>", tag));
        }

        output.push_str("</tr>\n");
    }

    fn cell_text(&self, text: &str) -> String {
        let text = text.replace('\n', " ");
        let text = text.trim();
        if self.options.escape_special_chars {
            escape_markdown(text)
        } else {
            text.replace('|', "\\|")
        }
    }
}

/// Escape special Markdown characters.
/// Only escape characters that could be misinterpreted as Markdown syntax.
/// We minimize escaping to improve readability of extracted text.
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            // Core formatting that must be escaped
            '\\' | '`' | '*' | '_' |
            // Brackets for links/images, pipe for tables
            '[' | ']' | '|' => {
                result.push('\\');
                result.push(c);
            }
            // NOT escaped (only special at line start or in specific contexts):
            // '.' '-' '!' '#' '+' '>' '(' ')' '{' '}'
            _ => result.push(c),
        }
    }
    result
}

/// Escape a marker that would open a heading, list, quote or rule when it
/// starts a line, such as `#`, `>`, `-`, `1.` or `a)`.
pub fn escape_block_start(text: &str) -> String {
    text.split('\n')
        .map(escape_line_start)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_line_start(line: &str) -> String {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];

    if body.starts_with(['#', '>', '-', '+', '*', '=']) {
        return format!("{}\\{}", indent, body);
    }

    // Ordered markers: up to nine digits or a single letter, then `.` or `)`
    // followed by a space or the end of the line.
    let head_len = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    let head = &body[..head_len];
    let is_ordinal = (!head.is_empty() && head.len() <= 9 && head.bytes().all(|b| b.is_ascii_digit()))
        || (head.len() == 1 && head.bytes().all(|b| b.is_ascii_alphabetic()));
    let rest = &body[head_len..];
    if is_ordinal && rest.starts_with(['.', ')']) {
        let after = &rest[1..];
        if after.is_empty() || after.starts_with(' ') {
            return format!("{}{}\\{}", indent, head, rest);
        }
    }
    line.to_string()
}

/// A trailing run of `#` after a space would close an ATX heading.
fn escape_heading_close(title: &str) -> String {
    let stripped = title.trim_end_matches('#');
    if stripped.len() < title.len() && stripped.ends_with(' ') {
        format!("{}\\{}", stripped, &title[stripped.len()..])
    } else {
        title.to_string()
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
