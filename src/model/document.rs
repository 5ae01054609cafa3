//! Document-level types.

use super::{Page, Region, RegionId};
use crate::detect::InputFormat;
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingested document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Document metadata (title, author, etc.)
    pub metadata: Metadata,

    /// Pages in the document, ordered by page number
    pub pages: Vec<Page>,

    /// Recoverable problems met while processing
    pub warnings: Vec<Warning>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a page by number (1-indexed).
    pub fn get_page(&self, page_num: u32) -> Option<&Page> {
        if page_num == 0 {
            return None;
        }
        self.pages.get((page_num - 1) as usize)
    }

    /// Add a page to the document.
    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// Record a warning.
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Look up a region by id.
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.get_page(id.page)
            .and_then(|page| page.regions.get(id.index))
    }

    /// Ids of every region, page by page.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.pages.iter().flat_map(|page| {
            (0..page.regions.len()).map(move |index| RegionId::new(page.number, index))
        })
    }

    /// Check if the document has any pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Whether any page is only partially processed.
    pub fn is_partial(&self) -> bool {
        self.pages.iter().any(Page::is_partial)
    }

    /// Get plain text content of the entire document.
    pub fn plain_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.raw_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Document subject
    pub subject: Option<String>,

    /// Keywords
    pub keywords: Option<String>,

    /// Creator application
    pub creator: Option<String>,

    /// Producer application
    pub producer: Option<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    pub modified: Option<DateTime<Utc>>,

    /// Detected input format
    pub format: Option<InputFormat>,

    /// Format version, e.g. "1.7" for PDF
    pub version: Option<String>,

    /// Total number of pages
    pub page_count: u32,
}

impl Metadata {
    /// Create metadata for a given input format.
    pub fn for_format(format: InputFormat) -> Self {
        Self {
            format: Some(format),
            ..Default::default()
        }
    }

    /// Convert metadata to YAML frontmatter format.
    pub fn to_yaml_frontmatter(&self) -> String {
        let mut lines = vec!["---".to_string()];

        if let Some(ref title) = self.title {
            lines.push(format!("title: \"{}\"", escape_yaml(title)));
        }
        if let Some(ref author) = self.author {
            lines.push(format!("author: \"{}\"", escape_yaml(author)));
        }
        if let Some(ref subject) = self.subject {
            lines.push(format!("subject: \"{}\"", escape_yaml(subject)));
        }
        if let Some(ref keywords) = self.keywords {
            lines.push(format!("keywords: \"{}\"", escape_yaml(keywords)));
        }
        if let Some(ref creator) = self.creator {
            lines.push(format!("creator: \"{}\"", escape_yaml(creator)));
        }
        if let Some(ref producer) = self.producer {
            lines.push(format!("producer: \"{}\"", escape_yaml(producer)));
        }
        if let Some(ref created) = self.created {
            lines.push(format!("created: {}", created.to_rfc3339()));
        }
        if let Some(ref modified) = self.modified {
            lines.push(format!("modified: {}", modified.to_rfc3339()));
        }
        if let Some(format) = self.format {
            lines.push(format!("format: \"{}\"", format.mime_type()));
        }
        if let Some(ref version) = self.version {
            lines.push(format!("version: \"{}\"", escape_yaml(version)));
        }

        lines.push(format!("pages: {}", self.page_count));

        lines.push("---".to_string());
        lines.push(String::new());

        lines.join("\n")
    }
}

/// Escape special characters for YAML strings.
fn escape_yaml(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Category of a recoverable problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Part of the input could not be parsed
    CorruptInput,
    /// A page ran out of time
    Timeout,
    /// A table region had no usable grid
    AmbiguousGrid,
}

/// A recoverable problem attached to a conversion result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Affected page (1-indexed), if page-specific
    pub page: Option<u32>,
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(page: Option<u32>, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            page,
            kind,
            message: message.into(),
        }
    }

    /// Downgrade a page-scoped error; `None` for fatal errors.
    pub fn from_error(page: Option<u32>, err: &Error) -> Option<Self> {
        err.warning_kind()
            .map(|kind| Warning::new(page, kind, err.to_string()))
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(page) => write!(f, "page {}: {}", page, self.message),
            None => f.write_str(&self.message),
        }
    }
}
