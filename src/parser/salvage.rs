//! Recovery of pages from PDFs the object layer cannot load.
//!
//! Scans the raw bytes for `N G obj` blocks, so a missing xref table, a
//! truncated body or a broken trailer does not lose what precedes the damage.
//! Streams are inflated with flate2 as far as their data goes.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::OnceLock;

use flate2::read::ZlibDecoder;
use regex::bytes::Regex;

use super::content::{decode_content, interpret, PageResources};
use super::pdf_parser::{add_missing_pages, parse_pdf_date, timed_out};
use crate::convert::{IngestBudget, PageBudget};
use crate::detect::{pdf_version, InputFormat};
use crate::error::{Error, Result};
use crate::model::{Document, Metadata, Page, Warning};

type ObjectKey = (u32, u16);

const INFLATE_CHUNK: usize = 4096;

/// Inflate chunks read between budget checkpoints.
const CHUNKS_PER_CHECK: usize = 64;

/// A raw indirect object as found in the file.
#[derive(Debug)]
struct RawObject {
    dict: Vec<u8>,
    stream: Option<Vec<u8>>,
    /// `endobj` or `endstream` was never reached
    truncated: bool,
}

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?-u)(\d+)\s+(\d+)\s+obj\b").expect("valid regex"))
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?-u)(\d+)\s+(\d+)\s+R\b").expect("valid regex"))
}

fn named_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?-u)/([A-Za-z0-9_.+\-]+)\s+(\d+)\s+(\d+)\s+R\b").expect("valid regex")
    })
}

/// Recover what can be read from a damaged PDF.
///
/// Fails with `CorruptInput` only when no page object is found at all, and
/// with `Cancelled` when the budget's token is set.
pub fn salvage(data: &[u8], budget: &IngestBudget) -> Result<Document> {
    let objects = scan_objects(data);
    log::debug!("Salvage scan found {} objects", objects.len());

    let mut document = Document::new();
    document.metadata = salvage_metadata(&objects);
    document.metadata.version = pdf_version(data);

    let (page_keys, dangling) = page_order(&objects);
    if page_keys.is_empty() {
        return Err(Error::CorruptInput {
            page: None,
            detail: "no page objects found".to_string(),
        });
    }

    for (index, key) in page_keys.iter().enumerate() {
        let number = index as u32 + 1;
        if let Some(object) = objects.get(key) {
            let page = salvage_page(number, object, &objects, &budget.page(number), &mut document)?;
            document.add_page(page);
        }
    }

    if let Some(declared) = declared_count(&objects) {
        let referenced = u32::try_from(page_keys.len()).unwrap_or(u32::MAX).saturating_add(dangling);
        add_missing_pages(&mut document, declared, referenced);
    }

    document.metadata.page_count = document.page_count();
    Ok(document)
}

/// Every `N G obj` block, later definitions replacing earlier ones.
fn scan_objects(data: &[u8]) -> HashMap<ObjectKey, RawObject> {
    let mut objects = HashMap::new();
    let headers: Vec<_> = object_re().captures_iter(data).collect();

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(num), Some(gen)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Some(num), Some(gen)) = (parse_num::<u32>(num.as_bytes()), parse_num::<u16>(gen.as_bytes()))
        else {
            continue;
        };

        let start = whole.end();
        let limit = headers
            .get(i + 1)
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(data.len());
        let body = &data[start..limit];
        objects.insert((num, gen), parse_body(body));
    }
    objects
}

fn parse_body(body: &[u8]) -> RawObject {
    let Some(stream_at) = find(body, b"stream") else {
        let end = find(body, b"endobj");
        return RawObject {
            dict: body[..end.unwrap_or(body.len())].to_vec(),
            stream: None,
            truncated: end.is_none(),
        };
    };

    let dict = body[..stream_at].to_vec();
    let mut data_start = stream_at + b"stream".len();
    if body.get(data_start) == Some(&b'\r') {
        data_start += 1;
    }
    if body.get(data_start) == Some(&b'\n') {
        data_start += 1;
    }
    let rest = &body[data_start.min(body.len())..];

    let declared_len = dict_integer(&dict, b"Length").map(|l| l as usize);
    let (stream, truncated) = match find(rest, b"endstream") {
        Some(end) => {
            let raw = &rest[..end];
            let raw = match declared_len {
                Some(len) if len <= raw.len() => &raw[..len],
                _ => trim_eol(raw),
            };
            (raw.to_vec(), false)
        }
        None => (rest.to_vec(), true),
    };

    RawObject {
        dict,
        stream: Some(stream),
        truncated,
    }
}

/// Page objects in page-tree order when the tree is readable, otherwise in
/// file order, plus the number of tree kids whose object is missing.
fn page_order(objects: &HashMap<ObjectKey, RawObject>) -> (Vec<ObjectKey>, u32) {
    let mut pages: Vec<ObjectKey> = objects
        .iter()
        .filter(|(_, o)| dict_type(&o.dict).as_deref() == Some("Page"))
        .map(|(k, _)| *k)
        .collect();
    pages.sort();

    if let Some(root) = root_pages_node(objects) {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        let mut dangling = 0;
        walk_kids(root, objects, &mut ordered, &mut seen, &mut dangling, 0);
        let known: HashSet<ObjectKey> = ordered.iter().copied().collect();
        // Pages not reachable through the tree go last.
        ordered.extend(pages.into_iter().filter(|k| !known.contains(k)));
        return (ordered, dangling);
    }
    (pages, 0)
}

fn walk_kids(
    key: ObjectKey,
    objects: &HashMap<ObjectKey, RawObject>,
    out: &mut Vec<ObjectKey>,
    seen: &mut HashSet<ObjectKey>,
    dangling: &mut u32,
    depth: usize,
) {
    if depth > 32 || !seen.insert(key) {
        return;
    }
    let Some(object) = objects.get(&key) else {
        *dangling += 1;
        return;
    };
    match dict_type(&object.dict).as_deref() {
        Some("Page") => out.push(key),
        Some("Pages") => {
            if let Some(kids) = dict_array(&object.dict, b"Kids") {
                for kid in references(&kids) {
                    walk_kids(kid, objects, out, seen, dangling, depth + 1);
                }
            }
        }
        _ => {}
    }
}

/// The `/Pages` node without a `/Parent`.
fn root_pages_node(objects: &HashMap<ObjectKey, RawObject>) -> Option<ObjectKey> {
    let mut roots: Vec<ObjectKey> = objects
        .iter()
        .filter(|(_, o)| {
            dict_type(&o.dict).as_deref() == Some("Pages") && find(&o.dict, b"/Parent").is_none()
        })
        .map(|(k, _)| *k)
        .collect();
    roots.sort();
    roots.first().copied()
}

fn declared_count(objects: &HashMap<ObjectKey, RawObject>) -> Option<u32> {
    let root = root_pages_node(objects)?;
    let count = dict_integer(&objects.get(&root)?.dict, b"Count")?;
    u32::try_from(count).ok()
}

fn salvage_page(
    number: u32,
    object: &RawObject,
    objects: &HashMap<ObjectKey, RawObject>,
    budget: &PageBudget,
    document: &mut Document,
) -> Result<Page> {
    budget.check_cancelled()?;
    let media_box = dict_array(&object.dict, b"MediaBox")
        .and_then(|a| parse_numbers(&a))
        .filter(|n| n.len() >= 4 && n[2] > n[0] && n[3] > n[1])
        .unwrap_or_else(|| vec![0.0, 0.0, 612.0, 792.0]);
    let mut page = Page::new(number, media_box[2] - media_box[0], media_box[3] - media_box[1]);

    let mut problems = Vec::new();
    if object.truncated {
        problems.push("page object is truncated".to_string());
    }

    let content_keys = match dict_value(&object.dict, b"Contents") {
        Some(value) => references(&value),
        None => Vec::new(),
    };

    let mut data = Vec::new();
    let mut out_of_time = false;
    for key in content_keys {
        match objects.get(&key) {
            Some(RawObject {
                dict,
                stream: Some(raw),
                truncated,
            }) => {
                let inflated = decode_stream(dict, raw, budget)?;
                if inflated.timed_out {
                    out_of_time = true;
                } else if *truncated || !inflated.complete {
                    problems.push(format!("content stream {} {} is truncated", key.0, key.1));
                }
                data.extend_from_slice(&inflated.bytes);
                data.push(b'\n');
                if out_of_time {
                    break;
                }
            }
            _ => problems.push(format!("content stream {} {} is missing", key.0, key.1)),
        }
    }

    if !data.is_empty() {
        let resources = salvage_resources(&object.dict, objects);
        let (content, truncated) = decode_content(&data);
        if truncated && problems.is_empty() && !out_of_time {
            problems.push("content stream does not decode completely".to_string());
        }
        if let Some(content) = content {
            let drawn = interpret(&content, &resources, number, media_box[3], budget)?;
            out_of_time |= drawn.timed_out;
            page.runs = drawn.runs;
            page.lines = drawn.lines;
            page.images = drawn.images;
        }
    }

    if out_of_time {
        timed_out(&mut page, document);
    }

    if !problems.is_empty() {
        let err = Error::CorruptInput {
            page: Some(number),
            detail: problems.join("; "),
        };
        page.mark_partial(err.to_string());
        if let Some(warning) = Warning::from_error(Some(number), &err) {
            document.warn(warning);
        }
    }
    Ok(page)
}

/// Font base names and image XObject names from the page's resources.
fn salvage_resources<'a>(
    page_dict: &[u8],
    objects: &HashMap<ObjectKey, RawObject>,
) -> PageResources<'a> {
    let mut resources = PageResources::default();

    let res_dict = match dict_value(page_dict, b"Resources") {
        Some(value) if value.starts_with(b"<<") => value,
        Some(value) => references(&value)
            .first()
            .and_then(|k| objects.get(k))
            .map(|o| o.dict.clone())
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let font_entries = resource_entries(&res_dict, b"Font", objects);
    for (name, key) in font_entries {
        if let Some(base) = objects
            .get(&key)
            .and_then(|o| dict_value(&o.dict, b"BaseFont"))
        {
            let base = String::from_utf8_lossy(base.strip_prefix(b"/").unwrap_or(&base[..]));
            resources.base_fonts.insert(name, base.trim().to_string());
        }
    }

    for (name, key) in resource_entries(&res_dict, b"XObject", objects) {
        let is_image = objects
            .get(&key)
            .and_then(|o| dict_value(&o.dict, b"Subtype"))
            .is_some_and(|v| v.starts_with(b"/Image"));
        if is_image {
            resources.images.insert(name);
        }
    }
    resources
}

/// `/Name N G R` pairs of a resource sub-dictionary, inline or referenced.
fn resource_entries(
    res_dict: &[u8],
    key: &[u8],
    objects: &HashMap<ObjectKey, RawObject>,
) -> Vec<(Vec<u8>, ObjectKey)> {
    let sub = match dict_value(res_dict, key) {
        Some(value) if value.starts_with(b"<<") => value,
        Some(value) => references(&value)
            .first()
            .and_then(|k| objects.get(k))
            .map(|o| o.dict.clone())
            .unwrap_or_default(),
        None => return Vec::new(),
    };

    named_reference_re()
        .captures_iter(&sub)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_bytes().to_vec();
            let num = parse_num::<u32>(caps.get(2)?.as_bytes())?;
            let gen = parse_num::<u16>(caps.get(3)?.as_bytes())?;
            Some((name, (num, gen)))
        })
        .collect()
}

/// A decoded stream.
#[derive(Debug, Default)]
struct Inflated {
    bytes: Vec<u8>,
    /// Decoding reached the end of the data
    complete: bool,
    /// The page budget expired first
    timed_out: bool,
}

/// Decode a stream, stopping early when the budget expires.
fn decode_stream(dict: &[u8], raw: &[u8], budget: &PageBudget) -> Result<Inflated> {
    if find(dict, b"/FlateDecode").is_none() && find(dict, b"/Fl").is_none() {
        return Ok(Inflated {
            bytes: raw.to_vec(),
            complete: true,
            timed_out: false,
        });
    }

    let mut decoder = ZlibDecoder::new(raw);
    let mut out = Inflated::default();
    let mut buf = [0u8; INFLATE_CHUNK];
    for chunk in 0usize.. {
        if chunk % CHUNKS_PER_CHECK == 0 {
            match budget.check_progress(chunk) {
                Ok(()) => {}
                Err(Error::Timeout { .. }) => {
                    log::debug!("Inflate stopped at the page deadline after {} bytes", out.bytes.len());
                    out.timed_out = true;
                    return Ok(out);
                }
                Err(err) => return Err(err),
            }
        }
        match decoder.read(&mut buf) {
            Ok(0) => {
                out.complete = true;
                break;
            }
            Ok(n) => out.bytes.extend_from_slice(&buf[..n]),
            Err(e) => {
                log::debug!("Inflate stopped after {} bytes: {}", out.bytes.len(), e);
                break;
            }
        }
    }
    Ok(out)
}

fn salvage_metadata(objects: &HashMap<ObjectKey, RawObject>) -> Metadata {
    let mut metadata = Metadata::for_format(InputFormat::Pdf);
    let mut keys: Vec<&ObjectKey> = objects.keys().collect();
    keys.sort();

    let info = keys.into_iter().filter_map(|k| objects.get(k)).find(|o| {
        o.stream.is_none()
            && (find(&o.dict, b"/Producer").is_some() || find(&o.dict, b"/Title").is_some())
            && dict_type(&o.dict).is_none()
    });

    if let Some(info) = info {
        metadata.title = dict_string(&info.dict, b"Title");
        metadata.author = dict_string(&info.dict, b"Author");
        metadata.subject = dict_string(&info.dict, b"Subject");
        metadata.keywords = dict_string(&info.dict, b"Keywords");
        metadata.creator = dict_string(&info.dict, b"Creator");
        metadata.producer = dict_string(&info.dict, b"Producer");
        metadata.created = dict_string(&info.dict, b"CreationDate").and_then(|d| parse_pdf_date(&d));
        metadata.modified = dict_string(&info.dict, b"ModDate").and_then(|d| parse_pdf_date(&d));
    }
    metadata
}

// Minimal dictionary scanning over raw bytes.

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Position just after `/key` when followed by a delimiter.
fn key_position(dict: &[u8], key: &[u8]) -> Option<usize> {
    let mut needle = Vec::with_capacity(key.len() + 1);
    needle.push(b'/');
    needle.extend_from_slice(key);

    let mut from = 0;
    while let Some(pos) = find(&dict[from..], &needle) {
        let end = from + pos + needle.len();
        match dict.get(end) {
            Some(c) if c.is_ascii_alphanumeric() => from = end,
            _ => return Some(end),
        }
    }
    None
}

/// Raw text of the value following `/key`: a name, a number or reference,
/// an array, a dictionary or a string.
fn dict_value(dict: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    let start = key_position(dict, key)?;
    let rest = &dict[start..];
    let offset = rest.iter().position(|c| !c.is_ascii_whitespace())?;
    let rest = &rest[offset..];

    let end = match rest.first()? {
        b'[' => balanced(rest, b'[', b']')?,
        b'<' if rest.get(1) == Some(&b'<') => balanced_dict(rest)?,
        b'(' => balanced(rest, b'(', b')')?,
        b'/' => {
            1 + rest[1..]
                .iter()
                .position(|c| c.is_ascii_whitespace() || b"/[]<>()".contains(c))
                .unwrap_or(rest.len() - 1)
        }
        _ => {
            // Number or `N G R`
            let m = reference_re().find(rest).filter(|m| m.start() == 0);
            match m {
                Some(m) => m.end(),
                None => rest
                    .iter()
                    .position(|c| c.is_ascii_whitespace() || b"/[]<>".contains(c))
                    .unwrap_or(rest.len()),
            }
        }
    };
    Some(rest[..end].to_vec())
}

fn balanced(data: &[u8], open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, &c) in data.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == b'\\' && open == b'(' {
            escaped = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i + 1);
            }
        }
    }
    None
}

fn balanced_dict(data: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i + 1 < data.len() {
        if &data[i..i + 2] == b"<<" {
            depth += 1;
            i += 2;
        } else if &data[i..i + 2] == b">>" {
            depth = depth.checked_sub(1)?;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

fn dict_type(dict: &[u8]) -> Option<String> {
    let value = dict_value(dict, b"Type")?;
    let name = value.strip_prefix(b"/")?;
    Some(String::from_utf8_lossy(name).to_string())
}

fn dict_integer(dict: &[u8], key: &[u8]) -> Option<i64> {
    let value = dict_value(dict, key)?;
    if reference_re().is_match(&value) {
        return None;
    }
    parse_num(&value)
}

fn dict_array(dict: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    dict_value(dict, key).filter(|v| v.starts_with(b"["))
}

fn dict_string(dict: &[u8], key: &[u8]) -> Option<String> {
    let value = dict_value(dict, key)?;
    let inner = value.strip_prefix(b"(")?.strip_suffix(b")")?;
    let mut out = Vec::with_capacity(inner.len());
    let mut iter = inner.iter();
    while let Some(&c) = iter.next() {
        if c == b'\\' {
            match iter.next() {
                Some(b'n') => out.push(b'\n'),
                Some(b'r') => out.push(b'\r'),
                Some(b't') => out.push(b'\t'),
                Some(&other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    let text = super::decode_text_simple(&out).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn references(value: &[u8]) -> Vec<ObjectKey> {
    reference_re()
        .captures_iter(value)
        .filter_map(|caps| {
            Some((
                parse_num::<u32>(caps.get(1)?.as_bytes())?,
                parse_num::<u16>(caps.get(2)?.as_bytes())?,
            ))
        })
        .collect()
}

fn parse_numbers(array: &[u8]) -> Option<Vec<f32>> {
    let inner = array.strip_prefix(b"[")?.strip_suffix(b"]")?;
    std::str::from_utf8(inner)
        .ok()?
        .split_whitespace()
        .map(|t| t.parse::<f32>().ok())
        .collect()
}

fn parse_num<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

fn trim_eol(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b'\n' || data[end - 1] == b'\r') {
        end -= 1;
    }
    &data[..end]
}
