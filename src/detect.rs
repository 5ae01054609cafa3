//! Input format detection.
//!
//! Binary formats are recognised by their magic bytes. Anything else must be
//! UTF-8 text to be accepted; text is classified as Markdown or plain text
//! from the declared hint or from its content.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Formats the ingestors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Portable Document Format
    Pdf,
    /// PNG raster image
    Png,
    /// JPEG raster image
    Jpeg,
    /// GIF raster image
    Gif,
    /// Windows bitmap
    Bmp,
    /// TIFF raster image
    Tiff,
    /// Markdown text
    Markdown,
    /// Plain UTF-8 text
    Text,
}

impl InputFormat {
    /// Whether the format carries pixels rather than text.
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            InputFormat::Png
                | InputFormat::Jpeg
                | InputFormat::Gif
                | InputFormat::Bmp
                | InputFormat::Tiff
        )
    }

    /// Whether the format is identified by a magic-byte signature.
    pub fn has_signature(&self) -> bool {
        !matches!(self, InputFormat::Markdown | InputFormat::Text)
    }

    /// Map a file extension (without dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(InputFormat::Pdf),
            "png" => Some(InputFormat::Png),
            "jpg" | "jpeg" => Some(InputFormat::Jpeg),
            "gif" => Some(InputFormat::Gif),
            "bmp" => Some(InputFormat::Bmp),
            "tif" | "tiff" => Some(InputFormat::Tiff),
            "md" | "markdown" => Some(InputFormat::Markdown),
            "txt" | "text" => Some(InputFormat::Text),
            _ => None,
        }
    }

    /// Map a MIME type (parameters ignored) to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(InputFormat::Pdf),
            "image/png" => Some(InputFormat::Png),
            "image/jpeg" | "image/jpg" => Some(InputFormat::Jpeg),
            "image/gif" => Some(InputFormat::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(InputFormat::Bmp),
            "image/tiff" => Some(InputFormat::Tiff),
            "text/markdown" | "text/x-markdown" => Some(InputFormat::Markdown),
            "text/plain" => Some(InputFormat::Text),
            _ => None,
        }
    }

    /// Canonical MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            InputFormat::Pdf => "application/pdf",
            InputFormat::Png => "image/png",
            InputFormat::Jpeg => "image/jpeg",
            InputFormat::Gif => "image/gif",
            InputFormat::Bmp => "image/bmp",
            InputFormat::Tiff => "image/tiff",
            InputFormat::Markdown => "text/markdown",
            InputFormat::Text => "text/plain",
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InputFormat::Pdf => "PDF",
            InputFormat::Png => "PNG",
            InputFormat::Jpeg => "JPEG",
            InputFormat::Gif => "GIF",
            InputFormat::Bmp => "BMP",
            InputFormat::Tiff => "TIFF",
            InputFormat::Markdown => "Markdown",
            InputFormat::Text => "text",
        };
        f.write_str(name)
    }
}

/// A caller-declared format: either a MIME type or a file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatHint {
    /// MIME type, e.g. `application/pdf`
    Mime(String),
    /// File extension, e.g. `pdf`
    Extension(String),
}

impl FormatHint {
    /// Build a hint from a path's extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FormatHint::Extension(e.to_string()))
    }

    /// Resolve the hint to a known format.
    pub fn format(&self) -> Option<InputFormat> {
        match self {
            FormatHint::Mime(m) => InputFormat::from_mime(m),
            FormatHint::Extension(e) => InputFormat::from_extension(e),
        }
    }
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_MAGIC_LEN: usize = 5;
const VERSION_LEN: usize = 3; // e.g., "1.7"

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF_MAGIC: &[u8] = b"GIF8";
const BMP_MAGIC: &[u8] = b"BM";
const TIFF_LE_MAGIC: &[u8] = b"II*\0";
const TIFF_BE_MAGIC: &[u8] = b"MM\0*";

/// How many bytes of text are inspected when classifying Markdown.
const TEXT_PROBE_LEN: usize = 64 * 1024;

/// Identify a binary format from its signature.
pub fn sniff_signature(data: &[u8]) -> Option<InputFormat> {
    if data.starts_with(PDF_MAGIC) {
        Some(InputFormat::Pdf)
    } else if data.starts_with(PNG_MAGIC) {
        Some(InputFormat::Png)
    } else if data.starts_with(JPEG_MAGIC) {
        Some(InputFormat::Jpeg)
    } else if data.starts_with(GIF_MAGIC) {
        Some(InputFormat::Gif)
    } else if data.starts_with(TIFF_LE_MAGIC) || data.starts_with(TIFF_BE_MAGIC) {
        Some(InputFormat::Tiff)
    } else if data.len() >= 14 && data.starts_with(BMP_MAGIC) {
        Some(InputFormat::Bmp)
    } else {
        None
    }
}

/// Detect the input format from bytes and an optional declared hint.
///
/// Signatures win over hints. Text formats need valid UTF-8 without NUL
/// bytes. Everything else is `UnsupportedFormat`.
pub fn detect_format(data: &[u8], hint: Option<&FormatHint>) -> Result<InputFormat> {
    let declared = hint.and_then(|h| h.format());

    if let Some(format) = sniff_signature(data) {
        if format == InputFormat::Pdf {
            validate_pdf_header(data)?;
        }
        if let Some(declared) = declared {
            if declared != format {
                log::warn!(
                    "Declared format {} contradicts {} signature; using the signature",
                    declared,
                    format
                );
            }
        }
        return Ok(format);
    }

    if let Some(declared) = declared {
        if declared.has_signature() {
            return Err(Error::UnsupportedFormat(format!(
                "declared {} but the {} signature is missing",
                declared, declared
            )));
        }
    }

    if !is_text(data) {
        return Err(Error::UnsupportedFormat(
            "byte signature matches no known format".to_string(),
        ));
    }

    match declared {
        Some(format) => Ok(format),
        None => {
            let probe = &data[..data.len().min(TEXT_PROBE_LEN)];
            let text = String::from_utf8_lossy(probe);
            if looks_like_markdown(&text) {
                Ok(InputFormat::Markdown)
            } else {
                Ok(InputFormat::Text)
            }
        }
    }
}

/// Detect format from bytes alone.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<InputFormat> {
    detect_format(data, None)
}

/// Detect format from a file, using its extension as the hint.
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<InputFormat> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = BufReader::new(file).take(TEXT_PROBE_LEN as u64);
    let mut head = Vec::new();
    reader.read_to_end(&mut head)?;
    let hint = FormatHint::from_path(path);
    detect_format(&head, hint.as_ref())
}

/// Extract the version from a PDF header (e.g. "1.7").
pub fn pdf_version(data: &[u8]) -> Option<String> {
    if data.len() < PDF_MAGIC_LEN + VERSION_LEN || !data.starts_with(PDF_MAGIC) {
        return None;
    }
    let version_bytes = &data[PDF_MAGIC_LEN..PDF_MAGIC_LEN + VERSION_LEN];
    let version = String::from_utf8_lossy(version_bytes).to_string();
    is_valid_version(&version).then_some(version)
}

fn validate_pdf_header(data: &[u8]) -> Result<()> {
    match pdf_version(data) {
        Some(_) => Ok(()),
        None => Err(Error::UnsupportedFormat(
            "PDF signature without a valid version".to_string(),
        )),
    }
}

/// Check if a version string is valid.
fn is_valid_version(version: &str) -> bool {
    if version.len() != 3 {
        return false;
    }

    let chars: Vec<char> = version.chars().collect();
    chars[0].is_ascii_digit() && chars[1] == '.' && chars[2].is_ascii_digit()
}

fn is_text(data: &[u8]) -> bool {
    if data.is_empty() || data.contains(&0) {
        return false;
    }
    let probe = &data[..data.len().min(TEXT_PROBE_LEN)];
    match std::str::from_utf8(probe) {
        Ok(_) => true,
        // A multi-byte sequence cut by the probe window is still text.
        Err(e) => e.error_len().is_none() && e.valid_up_to() + 4 > probe.len(),
    }
}

/// Markdown structure: ATX headings, pipe tables, list markers, images.
fn looks_like_markdown(text: &str) -> bool {
    let mut signals = 0;
    for line in text.lines().take(400) {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') && trimmed.trim_start_matches('#').starts_with(' ') {
            signals += 2;
        } else if trimmed.starts_with('|') && trimmed.trim_end().ends_with('|') {
            signals += 1;
        } else if trimmed.starts_with("![") || trimmed.starts_with("```") {
            signals += 2;
        } else if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
            signals += 1;
        }
        if signals >= 2 {
            return true;
        }
    }
    false
}

/// Check if bytes carry any recognised format.
pub fn is_supported_bytes(data: &[u8]) -> bool {
    detect_format_from_bytes(data).is_ok()
}
