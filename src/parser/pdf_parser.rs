//! PDF ingestion using lopdf.

use std::collections::{HashMap, HashSet};

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use super::content::{decode_content, interpret, PageResources};
use super::salvage;
use super::Ingestor;
use crate::convert::{IngestBudget, PageBudget};
use crate::detect::{pdf_version, InputFormat};
use crate::error::{Error, Result};
use crate::model::{Document, Metadata, Page, Warning, WarningKind};

/// Letter size, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Depth limit when following `/Parent` links for inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// PDF ingestor.
///
/// Loads the object graph with lopdf and interprets each page's content
/// stream. Files lopdf cannot load are handed to the salvage scanner.
#[derive(Debug, Clone, Default)]
pub struct PdfIngestor {
    _private: (),
}

impl PdfIngestor {
    /// Create a new PDF ingestor.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Ingestor for PdfIngestor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn formats(&self) -> &[InputFormat] {
        &[InputFormat::Pdf]
    }

    fn ingest_with_budget(&self, data: &[u8], _format: InputFormat, budget: &IngestBudget) -> Result<Document> {
        match LopdfDocument::load_mem(data) {
            Ok(doc) => {
                let document = PdfReader::new(&doc).read(budget)?;
                if document.is_empty() {
                    log::warn!("Object layer yielded no pages; salvaging");
                    return salvage::salvage(data, budget);
                }
                Ok(document)
            }
            Err(lopdf::Error::Decryption(_)) => Err(Error::UnsupportedFormat(
                "encrypted PDF documents are not supported".to_string(),
            )),
            Err(e) => {
                log::warn!("PDF object layer failed ({}); salvaging", e);
                budget.check_cancelled()?;
                let mut document = salvage::salvage(data, budget)?;
                if document.metadata.version.is_none() {
                    document.metadata.version = pdf_version(data);
                }
                Ok(document)
            }
        }
    }
}

/// Reads pages and metadata from a loaded document.
struct PdfReader<'a> {
    doc: &'a LopdfDocument,
}

impl<'a> PdfReader<'a> {
    fn new(doc: &'a LopdfDocument) -> Self {
        Self { doc }
    }

    fn read(&self, budget: &IngestBudget) -> Result<Document> {
        let mut document = Document::new();
        document.metadata = self.extract_metadata();

        let page_ids = self.doc.get_pages();
        for (&page_num, &page_id) in page_ids.iter() {
            let page = self.read_page(page_num, page_id, &budget.page(page_num), &mut document)?;
            document.add_page(page);
        }

        if let Some(declared) = self.declared_page_count() {
            add_missing_pages(&mut document, declared, self.page_references());
        }

        document.metadata.page_count = document.page_count();
        Ok(document)
    }

    /// Extract document metadata.
    fn extract_metadata(&self) -> Metadata {
        let mut metadata = Metadata::for_format(InputFormat::Pdf);
        metadata.version = Some(self.doc.version.to_string());

        if let Ok(info) = self.doc.trailer.get(b"Info") {
            let info_dict = match info {
                Object::Reference(r) => self.doc.get_dictionary(*r).ok(),
                Object::Dictionary(d) => Some(d),
                _ => None,
            };
            if let Some(info_dict) = info_dict {
                metadata.title = get_string_from_dict(info_dict, b"Title");
                metadata.author = get_string_from_dict(info_dict, b"Author");
                metadata.subject = get_string_from_dict(info_dict, b"Subject");
                metadata.keywords = get_string_from_dict(info_dict, b"Keywords");
                metadata.creator = get_string_from_dict(info_dict, b"Creator");
                metadata.producer = get_string_from_dict(info_dict, b"Producer");

                if let Some(date_str) = get_string_from_dict(info_dict, b"CreationDate") {
                    metadata.created = parse_pdf_date(&date_str);
                }
                if let Some(date_str) = get_string_from_dict(info_dict, b"ModDate") {
                    metadata.modified = parse_pdf_date(&date_str);
                }
            }
        }

        metadata
    }

    /// `/Count` of the root page tree node.
    fn declared_page_count(&self) -> Option<u32> {
        let catalog = self.doc.catalog().ok()?;
        let pages = self.resolve_dict(catalog.get(b"Pages").ok()?)?;
        let count = pages.get(b"Count").ok()?.as_i64().ok()?;
        u32::try_from(count).ok()
    }

    /// Page references in the page tree, counting kids that fail to load.
    fn page_references(&self) -> u32 {
        let Some(root) = self
            .doc
            .catalog()
            .ok()
            .and_then(|c| c.get(b"Pages").ok())
            .and_then(|p| p.as_reference().ok())
        else {
            return self.doc.get_pages().len() as u32;
        };
        let mut seen = HashSet::new();
        self.count_leaves(root, &mut seen, 0)
    }

    fn count_leaves(&self, id: ObjectId, seen: &mut HashSet<ObjectId>, depth: usize) -> u32 {
        if depth > MAX_INHERITANCE_DEPTH || !seen.insert(id) {
            return 0;
        }
        let Ok(node) = self.doc.get_dictionary(id) else {
            // A dangling kid still stands for a page.
            return 1;
        };
        let is_tree_node = node
            .get(b"Type")
            .and_then(|t| t.as_name_str())
            .is_ok_and(|t| t == "Pages");
        if !is_tree_node {
            return 1;
        }
        node.get(b"Kids")
            .and_then(|k| k.as_array())
            .map(|kids| {
                kids.iter()
                    .filter_map(|kid| kid.as_reference().ok())
                    .map(|kid| self.count_leaves(kid, seen, depth + 1))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Build one page. Damage and timeouts are recorded on the page and the
    /// document; only cancellation fails the read.
    fn read_page(
        &self,
        page_num: u32,
        page_id: ObjectId,
        budget: &PageBudget,
        document: &mut Document,
    ) -> Result<Page> {
        budget.check_cancelled()?;
        let media_box = self.media_box(page_id);
        let width = media_box[2] - media_box[0];
        let height = media_box[3] - media_box[1];
        let mut page = Page::new(page_num, width, height);

        let resources = self.page_resources(page_id);
        let (data, missing) = self.page_content(page_id, budget)?;
        if let Some(detail) = missing {
            corrupt(&mut page, document, detail);
        }

        if !data.is_empty() {
            let (content, truncated) = decode_content(&data);
            if truncated {
                corrupt(&mut page, document, "content stream is truncated".to_string());
            }
            if let Some(content) = content {
                let drawn = interpret(&content, &resources, page_num, media_box[3], budget)?;
                if drawn.timed_out {
                    timed_out(&mut page, document);
                }
                page.runs = drawn.runs;
                page.lines = drawn.lines;
                page.images = drawn.images;
            }
        }

        log::debug!(
            "Page {}: {} runs, {} rules, {} images",
            page_num,
            page.runs.len(),
            page.lines.len(),
            page.images.len()
        );
        Ok(page)
    }

    /// MediaBox, following `/Parent` for inherited values.
    fn media_box(&self, page_id: ObjectId) -> [f32; 4] {
        let found = self.inherited(page_id, b"MediaBox").and_then(|obj| {
            let array = match obj {
                Object::Reference(r) => self.doc.get_object(*r).ok()?.as_array().ok()?,
                other => other.as_array().ok()?,
            };
            if array.len() < 4 {
                return None;
            }
            let mut out = [0.0f32; 4];
            for (slot, value) in out.iter_mut().zip(array.iter()) {
                *slot = value.as_float().ok()?;
            }
            Some(out)
        });

        match found {
            Some(b) if b[2] > b[0] && b[3] > b[1] => b,
            _ => DEFAULT_MEDIA_BOX,
        }
    }

    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
        let mut dict = self.doc.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
            dict = self.doc.get_dictionary(parent).ok()?;
        }
        None
    }

    fn resolve_dict(&self, obj: &'a Object) -> Option<&'a Dictionary> {
        match obj {
            Object::Reference(r) => self.doc.get_dictionary(*r).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    fn page_resources(&self, page_id: ObjectId) -> PageResources<'a> {
        let mut resources = PageResources {
            doc: Some(self.doc),
            ..Default::default()
        };

        if let Ok(fonts) = self.doc.get_page_fonts(page_id) {
            let mut base_fonts = HashMap::new();
            for (name, font) in &fonts {
                let base_font = font
                    .get(b"BaseFont")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|n| String::from_utf8_lossy(n).to_string())
                    .unwrap_or_else(|| String::from_utf8_lossy(name).to_string());
                base_fonts.insert(name.clone(), base_font);
            }
            resources.base_fonts = base_fonts;
            resources.fonts = fonts;
        }

        resources.images = self.image_names(page_id);
        resources
    }

    /// Names of image XObjects available to the page.
    fn image_names(&self, page_id: ObjectId) -> HashSet<Vec<u8>> {
        let mut names = HashSet::new();
        let Some(res_dict) = self
            .inherited(page_id, b"Resources")
            .and_then(|obj| self.resolve_dict(obj))
        else {
            return names;
        };
        let Some(xobjects) = res_dict
            .get(b"XObject")
            .ok()
            .and_then(|obj| self.resolve_dict(obj))
        else {
            return names;
        };

        for (name, obj) in xobjects.iter() {
            let is_image = obj
                .as_reference()
                .ok()
                .and_then(|r| self.doc.get_object(r).ok())
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|s| s.as_name_str().ok())
                == Some("Image");
            if is_image {
                names.insert(name.clone());
            }
        }
        names
    }

    /// Concatenated, decompressed content streams plus a description of
    /// anything that could not be read.
    ///
    /// Streams after the first are skipped once the budget expires.
    fn page_content(&self, page_id: ObjectId, budget: &PageBudget) -> Result<(Vec<u8>, Option<String>)> {
        let Ok(page_dict) = self.doc.get_dictionary(page_id) else {
            return Ok((Vec::new(), Some("page dictionary is unreadable".to_string())));
        };
        let Ok(contents) = page_dict.get(b"Contents") else {
            // A page without content is blank, not damaged.
            return Ok((Vec::new(), None));
        };

        let refs: Vec<ObjectId> = match contents {
            Object::Reference(r) => vec![*r],
            Object::Array(arr) => arr.iter().filter_map(|o| o.as_reference().ok()).collect(),
            _ => return Ok((Vec::new(), Some("invalid /Contents entry".to_string()))),
        };

        let mut data = Vec::new();
        let mut problems = Vec::new();
        for (i, r) in refs.into_iter().enumerate() {
            match budget.check_progress(i) {
                Ok(()) => {}
                Err(Error::Timeout { .. }) => break,
                Err(err) => return Err(err),
            }
            match self.doc.get_object(r) {
                Ok(Object::Stream(s)) => match s.decompressed_content() {
                    Ok(bytes) => data.extend_from_slice(&bytes),
                    Err(_) if s.dict.get(b"Filter").is_err() => {
                        data.extend_from_slice(&s.content)
                    }
                    Err(e) => problems.push(format!("stream {} {}: {}", r.0, r.1, e)),
                },
                Ok(_) => problems.push(format!("object {} {} is not a stream", r.0, r.1)),
                Err(e) => problems.push(format!("stream {} {} is missing: {}", r.0, r.1, e)),
            }
            data.push(b'\n');
        }

        let problem = (!problems.is_empty()).then(|| problems.join("; "));
        Ok((data, problem))
    }
}

fn corrupt(page: &mut Page, document: &mut Document, detail: String) {
    let err = Error::CorruptInput {
        page: Some(page.number),
        detail,
    };
    page.mark_partial(err.to_string());
    if let Some(warning) = Warning::from_error(Some(page.number), &err) {
        document.warn(warning);
    }
}

/// Record that a page ran out of time while its content was read.
pub(super) fn timed_out(page: &mut Page, document: &mut Document) {
    let err = Error::Timeout { page: page.number };
    page.mark_partial(err.to_string());
    if let Some(warning) = Warning::from_error(Some(page.number), &err) {
        document.warn(warning);
    }
}

/// Append placeholder pages for page references that could not be read.
///
/// `declared` is the tree's `/Count`, `referenced` the page references that
/// actually exist in the file. Placeholders never exceed either.
pub(super) fn add_missing_pages(document: &mut Document, declared: u32, referenced: u32) {
    let recovered = document.page_count();
    let expected = declared.min(referenced);
    if expected <= recovered {
        if declared > expected {
            log::debug!(
                "Page tree declares {} pages but references {}",
                declared,
                referenced
            );
        }
        return;
    }

    let (width, height) = document
        .pages
        .last()
        .map(|p| (p.width, p.height))
        .unwrap_or((DEFAULT_MEDIA_BOX[2], DEFAULT_MEDIA_BOX[3]));

    for number in recovered + 1..=expected {
        let mut page = Page::new(number, width, height);
        let message = format!(
            "page {} of {} referenced pages could not be recovered",
            number, expected
        );
        page.mark_partial(message.clone());
        document.warn(Warning::new(Some(number), WarningKind::CorruptInput, message));
        document.add_page(page);
    }
}

/// Helper to get a string from a PDF dictionary.
fn get_string_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key).ok().and_then(|obj| match obj {
        Object::String(bytes, _) => {
            let text = super::decode_text_simple(bytes);
            let text = text.trim_end_matches('\0').trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Object::Name(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    })
}

/// Parse a PDF date string (D:YYYYMMDDHHmmSSOHH'mm').
pub(super) fn parse_pdf_date(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = s.strip_prefix("D:").unwrap_or(s);

    if s.len() < 4 {
        return None;
    }

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(1);
    let day: u32 = s.get(6..8).and_then(|d| d.parse().ok()).unwrap_or(1);
    let hour: u32 = s.get(8..10).and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute: u32 = s.get(10..12).and_then(|m| m.parse().ok()).unwrap_or(0);
    let second: u32 = s.get(12..14).and_then(|s| s.parse().ok()).unwrap_or(0);

    let naive = chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))?;

    // Timezone suffix: Z, or +HH'mm / -HH'mm
    let offset_minutes = match s.get(14..15) {
        Some(sign @ ("+" | "-")) => {
            let hours: i64 = s.get(15..17).and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i64 = s
                .get(18..20)
                .and_then(|m| m.parse().ok())
                .unwrap_or(0);
            let total = hours * 60 + minutes;
            if sign == "+" {
                total
            } else {
                -total
            }
        }
        _ => 0,
    };

    let utc = naive - chrono::Duration::minutes(offset_minutes);
    Some(chrono::DateTime::from_naive_utc_and_offset(utc, chrono::Utc))
}
