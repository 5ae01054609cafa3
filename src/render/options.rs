//! Rendering options and configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options for rendering document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Prefix for figure paths in output (e.g., "./images/")
    pub image_prefix: String,

    /// How to render tables with merged cells
    pub table_fallback: TableFallback,

    /// Maximum heading level (1-6)
    pub max_heading_level: u8,

    /// Include YAML frontmatter with metadata
    pub include_frontmatter: bool,

    /// Character to use for unordered list markers
    pub list_marker: char,

    /// Escape special Markdown characters
    pub escape_special_chars: bool,

    /// Pretty-print JSON output
    pub pretty_json: bool,
}

impl RenderOptions {
    /// Create new render options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the figure path prefix.
    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    /// Set the table fallback mode.
    pub fn with_table_fallback(mut self, fallback: TableFallback) -> Self {
        self.table_fallback = fallback;
        self
    }

    /// Set the maximum heading level.
    pub fn with_max_heading(mut self, level: u8) -> Self {
        self.max_heading_level = level.clamp(1, 6);
        self
    }

    /// Enable or disable frontmatter.
    pub fn with_frontmatter(mut self, include: bool) -> Self {
        self.include_frontmatter = include;
        self
    }

    /// Set the list marker character.
    pub fn with_list_marker(mut self, marker: char) -> Self {
        self.list_marker = marker;
        self
    }

    /// Enable or disable escaping.
    pub fn with_escaping(mut self, escape: bool) -> Self {
        self.escape_special_chars = escape;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=6).contains(&self.max_heading_level) {
            return Err(Error::InvalidConfig(format!(
                "render.max_heading_level must be within 1-6, got {}",
                self.max_heading_level
            )));
        }
        if !matches!(self.list_marker, '-' | '*' | '+') {
            return Err(Error::InvalidConfig(format!(
                "render.list_marker must be '-', '*' or '+', got {:?}",
                self.list_marker
            )));
        }
        Ok(())
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            image_prefix: String::new(),
            table_fallback: TableFallback::Markdown,
            max_heading_level: 6,
            include_frontmatter: false,
            list_marker: '-',
            escape_special_chars: true,
            pretty_json: true,
        }
    }
}

/// How to render tables that can't be expressed in simple Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFallback {
    /// Pipe tables; spanned positions render empty
    #[default]
    Markdown,
    /// HTML tables with rowspan/colspan for tables with merged cells
    Html,
}

impl std::str::FromStr for TableFallback {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(TableFallback::Markdown),
            "html" => Ok(TableFallback::Html),
            other => Err(Error::InvalidConfig(format!("unknown table mode: {}", other))),
        }
    }
}
