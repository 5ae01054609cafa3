//! Content stream interpretation.
//!
//! Walks the operators of a page content stream and produces positioned text
//! runs, ruling lines and image placements in top-left page coordinates.

use std::collections::{BTreeMap, HashMap, HashSet};

use lopdf::content::Content;
use lopdf::{Dictionary, Document as LopdfDocument, Object};

use super::normalize::normalize_text;
use crate::convert::PageBudget;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, ImagePlacement, RulingLine, TextRun};

/// Glyph advance relative to the font size when no metrics are available.
pub const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Shortest stroke kept as a ruling line.
const MIN_RULE_LENGTH: f32 = 4.0;

/// Thickest filled rectangle still treated as a line.
const MAX_RULE_THICKNESS: f32 = 2.0;

/// Tolerance for treating a segment as axis-aligned.
const AXIS_TOLERANCE: f32 = 0.5;

/// How many shorter prefixes are tried when a stream fails to decode.
const MAX_DECODE_RETRIES: usize = 16;

/// Operators interpreted between budget checkpoints.
const BUDGET_CHECK_INTERVAL: usize = 256;

/// TJ adjustment (thousandths of an em) that reads as a word space.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// What a page's content stream may refer to.
#[derive(Default)]
pub struct PageResources<'a> {
    /// Loaded document, used for font encodings
    pub doc: Option<&'a LopdfDocument>,
    /// Font dictionaries by resource name
    pub fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    /// BaseFont names by resource name
    pub base_fonts: HashMap<Vec<u8>, String>,
    /// Names of image XObjects
    pub images: HashSet<Vec<u8>>,
}

/// Everything drawn on a page.
#[derive(Debug, Default)]
pub struct PageContent {
    pub runs: Vec<TextRun>,
    pub lines: Vec<RulingLine>,
    pub images: Vec<ImagePlacement>,
    /// The page budget expired before the last operator
    pub timed_out: bool,
}

/// Decode a content stream, falling back to the longest decodable prefix.
///
/// Returns the operations and whether anything had to be dropped.
pub fn decode_content(data: &[u8]) -> (Option<Content>, bool) {
    if let Ok(content) = Content::decode(data) {
        return (Some(content), false);
    }

    let mut end = data.len();
    for _ in 0..MAX_DECODE_RETRIES {
        let Some(cut) = last_boundary(&data[..end.saturating_sub(1)]) else {
            break;
        };
        if let Ok(content) = Content::decode(&data[..cut]) {
            log::debug!("Recovered {} of {} content bytes", cut, data.len());
            return (Some(content), true);
        }
        end = cut;
    }
    (None, true)
}

/// Position just past the last `ET` operator or line break.
fn last_boundary(data: &[u8]) -> Option<usize> {
    let et = data.windows(2).rposition(|w| w == b"ET").map(|i| i + 2);
    let newline = data.iter().rposition(|&b| b == b'\n');
    et.into_iter().chain(newline).max().filter(|&p| p > 0)
}

/// Interpret decoded operations for one page.
///
/// Stops early when the budget expires, keeping what was drawn so far.
/// Fails only on cancellation.
pub fn interpret(
    content: &Content,
    resources: &PageResources<'_>,
    page_number: u32,
    page_height: f32,
    budget: &PageBudget,
) -> Result<PageContent> {
    let mut interpreter = Interpreter::new(resources, page_number, page_height);
    for (i, op) in content.operations.iter().enumerate() {
        if i % BUDGET_CHECK_INTERVAL == 0 {
            match budget.check_progress(i) {
                Ok(()) => {}
                Err(Error::Timeout { .. }) => {
                    log::debug!(
                        "Page {}: stopped after {} of {} operators",
                        page_number,
                        i,
                        content.operations.len()
                    );
                    interpreter.out.timed_out = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        interpreter.apply(&op.operator, &op.operands);
    }
    Ok(interpreter.out)
}

/// Affine transform in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::translation(0.0, 0.0)
    }
}

impl Matrix {
    fn translation(tx: f32, ty: f32) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: tx,
            f: ty,
        }
    }

    fn from_operands(ops: &[Object]) -> Option<Self> {
        if ops.len() < 6 {
            return None;
        }
        Some(Self {
            a: get_number(&ops[0])?,
            b: get_number(&ops[1])?,
            c: get_number(&ops[2])?,
            d: get_number(&ops[3])?,
            e: get_number(&ops[4])?,
            f: get_number(&ops[5])?,
        })
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    fn horizontal_scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font_key: Vec<u8>,
    font_size: f32,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::default(),
            font_key: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
        }
    }
}

struct Interpreter<'r, 'a> {
    resources: &'r PageResources<'a>,
    page_number: u32,
    page_height: f32,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    in_text: bool,
    segments: Vec<(f32, f32, f32, f32)>,
    rects: Vec<(f32, f32, f32, f32)>,
    current: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
    out: PageContent,
}

impl<'r, 'a> Interpreter<'r, 'a> {
    fn new(resources: &'r PageResources<'a>, page_number: u32, page_height: f32) -> Self {
        Self {
            resources,
            page_number,
            page_height,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Matrix::default(),
            line_matrix: Matrix::default(),
            in_text: false,
            segments: Vec::new(),
            rects: Vec::new(),
            current: None,
            subpath_start: None,
            out: PageContent::default(),
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.in_text = true;
                self.text_matrix = Matrix::default();
                self.line_matrix = Matrix::default();
            }
            "ET" => self.in_text = false,
            "Tf" => {
                if operands.len() >= 2 {
                    if let Object::Name(name) = &operands[0] {
                        self.state.font_key = name.clone();
                    }
                    self.state.font_size = get_number(&operands[1]).unwrap_or(12.0);
                }
            }
            "TL" => {
                if let Some(tl) = operands.first().and_then(get_number) {
                    self.state.leading = tl;
                }
            }
            "Td" | "TD" => {
                if operands.len() >= 2 {
                    let tx = get_number(&operands[0]).unwrap_or(0.0);
                    let ty = get_number(&operands[1]).unwrap_or(0.0);
                    if operator == "TD" {
                        self.state.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    let text = self.decode(bytes);
                    self.show_text(text, 0.0);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show_array(items);
                }
            }
            "'" | "\"" => {
                self.next_line();
                let idx = if operator == "\"" { 2 } else { 0 };
                if let Some(Object::String(bytes, _)) = operands.get(idx) {
                    let text = self.decode(bytes);
                    self.show_text(text, 0.0);
                }
            }
            "m" => {
                if let Some((x, y)) = point(operands) {
                    let p = self.state.ctm.apply(x, y);
                    self.current = Some(p);
                    self.subpath_start = Some(p);
                }
            }
            "l" => {
                if let (Some((x, y)), Some(from)) = (point(operands), self.current) {
                    let to = self.state.ctm.apply(x, y);
                    self.segments.push((from.0, from.1, to.0, to.1));
                    self.current = Some(to);
                }
            }
            "h" => {
                if let (Some(from), Some(start)) = (self.current, self.subpath_start) {
                    self.segments.push((from.0, from.1, start.0, start.1));
                    self.current = Some(start);
                }
            }
            "re" => self.add_rect(operands),
            "S" | "s" | "B" | "B*" | "b" | "b*" => {
                if operator == "s" || operator == "b" || operator == "b*" {
                    self.apply("h", &[]);
                }
                self.stroke_path();
            }
            "f" | "F" | "f*" => self.fill_path(),
            "n" => self.clear_path(),
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.place_image(name);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.state.leading > 0.0 {
            self.state.leading
        } else {
            self.state.font_size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if let (Some(doc), Some(font)) = (
            self.resources.doc,
            self.resources.fonts.get(&self.state.font_key),
        ) {
            if let Ok(encoding) = font.get_font_encoding(doc) {
                if let Ok(text) = LopdfDocument::decode_text(&encoding, bytes) {
                    return text;
                }
            }
        }
        decode_text_simple(bytes)
    }

    fn show_array(&mut self, items: &[Object]) {
        let mut combined = String::new();
        let mut extra = 0.0;
        for item in items {
            match item {
                Object::String(bytes, _) => combined.push_str(&self.decode(bytes)),
                Object::Integer(_) | Object::Real(_) => {
                    let adjustment = -get_number(item).unwrap_or(0.0);
                    extra += adjustment / 1000.0;
                    if adjustment > TJ_SPACE_THRESHOLD
                        && !combined.is_empty()
                        && !combined.ends_with(' ')
                        && !combined.chars().last().is_some_and(is_spaceless_script_char)
                    {
                        combined.push(' ');
                    }
                }
                _ => {}
            }
        }
        self.show_text(combined, extra);
    }

    /// Emit a run at the current text position and advance past it.
    /// `extra_ems` is additional advance from TJ adjustments.
    fn show_text(&mut self, text: String, extra_ems: f32) {
        if !self.in_text {
            return;
        }
        let size = self.state.font_size;
        let chars = text.chars().count() as f32;
        let advance = (chars * AVG_GLYPH_WIDTH + extra_ems) * size;

        let render = self.text_matrix.then(&self.state.ctm);
        let (x, y) = render.apply(0.0, 0.0);
        let effective_size = size * render.vertical_scale();
        let width = advance.max(0.0) * render.horizontal_scale();

        self.text_matrix = Matrix::translation(advance, 0.0).then(&self.text_matrix);

        let text = normalize_text(&text);
        if text.trim().is_empty() || effective_size <= 0.0 {
            return;
        }

        let baseline = self.page_height - y;
        let bbox = BoundingBox::new(x, baseline - effective_size, width, effective_size);
        let font_name = self
            .resources
            .base_fonts
            .get(&self.state.font_key)
            .cloned()
            .unwrap_or_else(|| String::from_utf8_lossy(&self.state.font_key).to_string());
        let lower = font_name.to_lowercase();

        let mut run = TextRun::new(text, bbox, effective_size).with_font(font_name);
        run.bold = lower.contains("bold") || lower.contains("black") || lower.contains("heavy");
        run.italic = lower.contains("italic") || lower.contains("oblique");
        self.out.runs.push(run);
    }

    fn add_rect(&mut self, operands: &[Object]) {
        if operands.len() < 4 {
            return;
        }
        let nums: Vec<f32> = operands.iter().take(4).filter_map(get_number).collect();
        if nums.len() < 4 {
            return;
        }
        let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
        let ctm = self.state.ctm;
        let p0 = ctm.apply(x, y);
        let p1 = ctm.apply(x + w, y);
        let p2 = ctm.apply(x + w, y + h);
        let p3 = ctm.apply(x, y + h);
        self.segments.push((p0.0, p0.1, p1.0, p1.1));
        self.segments.push((p1.0, p1.1, p2.0, p2.1));
        self.segments.push((p2.0, p2.1, p3.0, p3.1));
        self.segments.push((p3.0, p3.1, p0.0, p0.1));
        self.rects.push((
            p0.0.min(p2.0),
            p0.1.min(p2.1),
            p0.0.max(p2.0),
            p0.1.max(p2.1),
        ));
        self.current = Some(p0);
        self.subpath_start = Some(p0);
    }

    fn stroke_path(&mut self) {
        let segments = std::mem::take(&mut self.segments);
        for (x1, y1, x2, y2) in segments {
            self.push_segment(x1, y1, x2, y2);
        }
        self.clear_path();
    }

    /// Only thin filled rectangles count as rules.
    fn fill_path(&mut self) {
        let rects = std::mem::take(&mut self.rects);
        for (left, bottom, right, top) in rects {
            let (w, h) = (right - left, top - bottom);
            if h <= MAX_RULE_THICKNESS && w >= MIN_RULE_LENGTH {
                let y = (top + bottom) / 2.0;
                self.push_segment(left, y, right, y);
            } else if w <= MAX_RULE_THICKNESS && h >= MIN_RULE_LENGTH {
                let x = (left + right) / 2.0;
                self.push_segment(x, bottom, x, top);
            }
        }
        self.clear_path();
    }

    fn clear_path(&mut self) {
        self.segments.clear();
        self.rects.clear();
        self.current = None;
        self.subpath_start = None;
    }

    fn push_segment(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let (y1, y2) = (self.page_height - y1, self.page_height - y2);
        if (y1 - y2).abs() <= AXIS_TOLERANCE && (x2 - x1).abs() >= MIN_RULE_LENGTH {
            self.out
                .lines
                .push(RulingLine::horizontal((y1 + y2) / 2.0, x1, x2));
        } else if (x1 - x2).abs() <= AXIS_TOLERANCE && (y2 - y1).abs() >= MIN_RULE_LENGTH {
            self.out
                .lines
                .push(RulingLine::vertical((x1 + x2) / 2.0, y1, y2));
        }
    }

    fn place_image(&mut self, name: &[u8]) {
        if !self.resources.images.contains(name) {
            return;
        }
        let ctm = self.state.ctm;
        let corners = [
            ctm.apply(0.0, 0.0),
            ctm.apply(1.0, 0.0),
            ctm.apply(0.0, 1.0),
            ctm.apply(1.0, 1.0),
        ];
        let min_x = corners.iter().map(|p| p.0).fold(f32::MAX, f32::min);
        let max_x = corners.iter().map(|p| p.0).fold(f32::MIN, f32::max);
        let min_y = corners.iter().map(|p| p.1).fold(f32::MAX, f32::min);
        let max_y = corners.iter().map(|p| p.1).fold(f32::MIN, f32::max);

        let bbox = BoundingBox::from_edges(
            min_x,
            self.page_height - max_y,
            max_x,
            self.page_height - min_y,
        );
        let resource_id = format!(
            "page{}_{}",
            self.page_number,
            String::from_utf8_lossy(name)
        );
        self.out.images.push(ImagePlacement::new(resource_id, bbox));
    }
}

fn point(operands: &[Object]) -> Option<(f32, f32)> {
    Some((
        operands.first().and_then(get_number)?,
        operands.get(1).and_then(get_number)?,
    ))
}

/// Helper to extract number from PDF object.
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Scripts written without spaces between words (Chinese, Japanese).
/// Hangul is excluded: Korean uses word spaces.
pub fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x20000..=0x2EBEF).contains(&code)
        || (0x3040..=0x30FF).contains(&code)
        || (0x3000..=0x303F).contains(&code)
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_stream(stream: &[u8], resources: &PageResources<'_>) -> PageContent {
        let (content, truncated) = decode_content(stream);
        assert!(!truncated);
        interpret(&content.unwrap(), resources, 1, 792.0, &PageBudget::unlimited(1)).unwrap()
    }

    fn many_runs(count: usize) -> Vec<u8> {
        let mut stream = String::new();
        for i in 0..count {
            stream.push_str(&format!("BT /F1 10 Tf 72 {} Td (row {}) Tj ET\n", 700 - i % 600, i));
        }
        stream.into_bytes()
    }

    #[test]
    fn test_expired_budget_keeps_prefix() {
        let (content, _) = decode_content(&many_runs(200));
        let content = content.unwrap();
        let budget = PageBudget::new(1, std::time::Duration::ZERO);

        let drawn = interpret(&content, &PageResources::default(), 1, 792.0, &budget).unwrap();
        assert!(drawn.timed_out);
        assert!(!drawn.runs.is_empty());
        assert!(drawn.runs.len() < 200);
    }

    #[test]
    fn test_cancelled_interpretation_fails() {
        let (content, _) = decode_content(&many_runs(3));
        let token = crate::convert::CancellationToken::new();
        token.cancel();
        let budget = PageBudget::unlimited(1).with_token(token);

        let result = interpret(&content.unwrap(), &PageResources::default(), 1, 792.0, &budget);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_text_position_flipped() {
        let content = run_stream(
            b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET",
            &PageResources::default(),
        );
        assert_eq!(content.runs.len(), 1);
        let run = &content.runs[0];
        assert_eq!(run.text, "Hello");
        assert_eq!(run.bbox.x, 72.0);
        assert_eq!(run.baseline(), 92.0);
        assert_eq!(run.bbox.width, 30.0);
    }

    #[test]
    fn test_consecutive_tj_advance() {
        let content = run_stream(
            b"BT /F1 10 Tf 100 500 Td (ab) Tj (cd) Tj ET",
            &PageResources::default(),
        );
        assert_eq!(content.runs.len(), 2);
        assert_eq!(content.runs[1].bbox.x, 110.0);
    }

    #[test]
    fn test_tj_array_inserts_space() {
        let content = run_stream(
            b"BT /F1 12 Tf 0 0 Td [(Hello) -300 (World)] TJ ET",
            &PageResources::default(),
        );
        assert_eq!(content.runs[0].text, "Hello World");
    }

    #[test]
    fn test_leading_and_next_line() {
        let content = run_stream(
            b"BT /F1 10 Tf 14 TL 50 700 Td (one) Tj T* (two) Tj ET",
            &PageResources::default(),
        );
        assert_eq!(content.runs.len(), 2);
        assert_eq!(content.runs[1].baseline() - content.runs[0].baseline(), 14.0);
    }

    #[test]
    fn test_rect_stroke_becomes_rules() {
        let content = run_stream(b"1 w 100 100 200 50 re S", &PageResources::default());
        let horizontal = content.lines.iter().filter(|l| l.is_horizontal()).count();
        let vertical = content.lines.len() - horizontal;
        assert_eq!(horizontal, 2);
        assert_eq!(vertical, 2);
        assert!(content
            .lines
            .iter()
            .any(|l| l.is_horizontal() && l.position == 642.0));
    }

    #[test]
    fn test_thin_fill_is_rule_and_box_fill_is_not() {
        let content = run_stream(
            b"100 100 200 1 re f 100 200 200 80 re f",
            &PageResources::default(),
        );
        assert_eq!(content.lines.len(), 1);
        assert!(content.lines[0].is_horizontal());
    }

    #[test]
    fn test_image_placement_via_ctm() {
        let mut resources = PageResources::default();
        resources.images.insert(b"Im1".to_vec());
        let content = run_stream(b"q 200 0 0 100 50 600 cm /Im1 Do Q /Fm0 Do", &resources);
        assert_eq!(content.images.len(), 1);
        let image = &content.images[0];
        assert_eq!(image.resource_id, "page1_Im1");
        assert_eq!(image.bbox, BoundingBox::new(50.0, 92.0, 200.0, 100.0));
    }

    #[test]
    fn test_bold_from_base_font() {
        let mut resources = PageResources::default();
        resources
            .base_fonts
            .insert(b"F2".to_vec(), "Helvetica-Bold".to_string());
        let content = run_stream(b"BT /F2 18 Tf 72 720 Td (Title) Tj ET", &resources);
        assert!(content.runs[0].bold);
        assert!(!content.runs[0].italic);
    }

    #[test]
    fn test_decode_text_simple() {
        assert_eq!(decode_text_simple(b"abc"), "abc");
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x41]), "A");
        assert_eq!(decode_text_simple(&[0xE9]), "é");
    }

    #[test]
    fn test_spaceless_script() {
        assert!(is_spaceless_script_char('中'));
        assert!(is_spaceless_script_char('ひ'));
        assert!(!is_spaceless_script_char('한'));
        assert!(!is_spaceless_script_char('a'));
    }
}
