//! Error types for undoc.
//!
//! Errors fall into two groups. Document-scoped errors (`UnsupportedFormat`,
//! `Cancelled`, configuration and I/O failures) abort a conversion.
//! Page-scoped errors (`CorruptInput`, `Timeout`, grid failures) are
//! recovered where they occur and surface as [`Warning`]s on the result.
//!
//! [`Warning`]: crate::model::Warning

use std::io;
use thiserror::Error;

use crate::model::WarningKind;

/// Result type alias for undoc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during document conversion.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte signature matches no known input format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Structural parsing failed part way through the input.
    #[error("Corrupt input{}: {detail}", page_suffix(.page))]
    CorruptInput {
        /// Affected page (1-indexed), if known
        page: Option<u32>,
        /// What went wrong
        detail: String,
    },

    /// Table boundary detection produced an unusable grid.
    #[error("Ambiguous table grid: {rows} rows x {columns} columns")]
    AmbiguousGrid {
        /// Detected row count
        rows: usize,
        /// Detected column count
        columns: usize,
    },

    /// A table grid has overlapping or uncovered cells.
    #[error("Invalid table grid: {0}")]
    InvalidGrid(String),

    /// The conversion was cancelled through its cancellation token.
    #[error("Conversion cancelled")]
    Cancelled,

    /// A page exceeded its processing budget.
    #[error("Page {page} exceeded its time budget")]
    Timeout {
        /// Affected page (1-indexed)
        page: u32,
    },

    /// Error reported by the PDF object layer.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// Error decoding raster input.
    #[error("Image decoding error: {0}")]
    Image(String),

    /// Error during rendering (Markdown, text, JSON).
    #[error("Rendering error: {0}")]
    Render(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

fn page_suffix(page: &Option<u32>) -> String {
    page.map(|p| format!(" (page {})", p)).unwrap_or_default()
}

impl Error {
    /// Page-scoped errors can be downgraded to warnings.
    pub fn warning_kind(&self) -> Option<WarningKind> {
        match self {
            Error::CorruptInput { .. } => Some(WarningKind::CorruptInput),
            Error::Timeout { .. } => Some(WarningKind::Timeout),
            Error::AmbiguousGrid { .. } | Error::InvalidGrid(_) => {
                Some(WarningKind::AmbiguousGrid)
            }
            _ => None,
        }
    }

    /// Whether this error aborts the whole document.
    pub fn is_fatal(&self) -> bool {
        self.warning_kind().is_none()
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Error::Io(e),
            image::ImageError::Unsupported(e) => Error::UnsupportedFormat(e.to_string()),
            _ => Error::Image(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
