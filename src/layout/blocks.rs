//! Grouping lines into blocks and labelling them.

use crate::model::{BoundingBox, ListMarker, Region, RegionKind};

use super::fonts::FontStatistics;
use super::lines::Line;
use super::markers::parse_marker;
use super::LayoutConfig;

/// Consecutive lines of one column that read as a unit.
#[derive(Debug, Clone)]
pub struct Block {
    pub lines: Vec<Line>,
}

impl Block {
    fn first(&self) -> &Line {
        &self.lines[0]
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::enclosing(self.lines.iter().map(|l| &l.bbox)).unwrap_or_default()
    }

    pub fn column(&self) -> usize {
        self.first().column
    }

    /// Text of the block, lines joined with spaces.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            let line_text = line.text();
            if line_text.is_empty() {
                continue;
            }
            if !text.is_empty() {
                // Rejoin words hyphenated across lines
                if text.ends_with('-') && line_text.starts_with(char::is_lowercase) {
                    text.pop();
                } else {
                    text.push(' ');
                }
            }
            text.push_str(&line_text);
        }
        text
    }
}

/// Group lines (ordered by column, then baseline) into blocks.
pub fn group_blocks(lines: Vec<Line>, stats: &FontStatistics, config: &LayoutConfig) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();

    for line in lines.into_iter().filter(|l| !l.is_empty()) {
        let start_new = match blocks.last() {
            Some(block) => should_break_block(block, &line, stats, config),
            None => true,
        };
        if start_new {
            blocks.push(Block { lines: vec![line] });
        } else if let Some(block) = blocks.last_mut() {
            block.lines.push(line);
        }
    }

    log::debug!("Grouped lines into {} blocks", blocks.len());
    blocks
}

/// Determine if a new block should start before `curr`.
fn should_break_block(
    block: &Block,
    curr: &Line,
    stats: &FontStatistics,
    config: &LayoutConfig,
) -> bool {
    let first = block.first();
    let prev = &block.lines[block.lines.len() - 1];

    // Blocks never cross a gutter
    if curr.column != prev.column {
        return true;
    }

    // Headings and body text never share a block
    if stats.heading_level(curr.font_size) != stats.heading_level(prev.font_size) {
        return true;
    }

    // Large spacing indicates new paragraph
    let spacing = curr.baseline - prev.baseline;
    if spacing > prev.font_size.max(curr.font_size) * config.paragraph_gap_factor {
        return true;
    }

    // Significant font size change
    if (prev.font_size - curr.font_size).abs() > config.size_change_tolerance {
        return true;
    }

    // Every list marker opens an item
    if parse_marker(&curr.text()).is_some() {
        return true;
    }

    let dx = curr.x() - first.x();
    if parse_marker(&first.text()).is_some() {
        // Item continuation lines hang right of the marker
        return dx <= 1.0 || dx > config.list_indent_step * 2.0;
    }

    if block.lines.len() == 1 {
        // A first-line indent is allowed
        return dx > config.indent_break_width || -dx > config.indent_break_width * 2.0;
    }
    (curr.x() - prev.x()).abs() > config.indent_break_width
}

/// Label a block.
///
/// `margin` is the left edge of body text in the block's column and anchors
/// list nesting depth.
pub fn classify(block: &Block, stats: &FontStatistics, margin: f32, config: &LayoutConfig) -> Region {
    let bbox = block.bbox();
    let runs: Vec<_> = block.lines.iter().flat_map(|l| l.runs.iter().cloned()).collect();
    let text = block.text();
    let first = block.first();

    if let Some(level) = stats.heading_level(first.font_size) {
        if block.lines.len() <= config.max_heading_lines {
            let ratio = stats.size_ratio(first.font_size);
            let bold = block.lines.iter().all(Line::is_bold);
            let confidence =
                0.5 + 0.3 * ((ratio - 1.0) / 0.5).clamp(0.0, 1.0) + if bold { 0.2 } else { 0.0 };
            log::debug!("Heading L{} (ratio {:.2}, conf {:.2}): {:?}", level, ratio, confidence, text);
            return Region::new(RegionKind::Heading { level }, bbox, confidence)
                .with_text(text)
                .with_runs(runs);
        }
    }

    if let Some((marker, rest)) = parse_marker(&text) {
        let indent = (first.x() - margin).max(0.0);
        let depth = (indent / config.list_indent_step).round().min(8.0) as u8;
        let confidence = match marker {
            ListMarker::Bullet(_) => 0.85,
            ListMarker::Numbered(_) => 0.8,
            ListMarker::Lettered(_) => 0.6,
        };
        let rest = rest.to_string();
        return Region::new(RegionKind::ListItem { marker, depth }, bbox, confidence)
            .with_text(rest)
            .with_runs(runs);
    }

    Region::new(RegionKind::Paragraph, bbox, 0.9)
        .with_text(text)
        .with_runs(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextRun;

    fn line(text: &str, x: f32, baseline: f32, size: f32) -> Line {
        let width = text.chars().count() as f32 * size * 0.5;
        let run = TextRun::new(text, BoundingBox::new(x, baseline - size, width, size), size);
        Line::from_runs(vec![run], 0).unwrap()
    }

    fn stats() -> FontStatistics {
        let mut stats = FontStatistics::new(1.0);
        stats.add_size(11.0, 1000);
        stats.add_size(24.0, 20);
        stats.add_size(16.0, 20);
        stats.analyze();
        stats
    }

    fn blocks(lines: Vec<Line>) -> Vec<Block> {
        group_blocks(lines, &stats(), &LayoutConfig::default())
    }

    #[test]
    fn test_paragraph_lines_join() {
        let b = blocks(vec![
            line("The first line of", 72.0, 100.0, 11.0),
            line("a paragraph.", 72.0, 114.3, 11.0),
        ]);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].text(), "The first line of a paragraph.");
    }

    #[test]
    fn test_gap_breaks_paragraphs() {
        let b = blocks(vec![
            line("One.", 72.0, 100.0, 11.0),
            line("Two.", 72.0, 124.3, 11.0),
        ]);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_heading_separate_from_body() {
        let b = blocks(vec![
            line("Title", 72.0, 100.0, 24.0),
            line("Body text.", 72.0, 118.0, 11.0),
        ]);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_list_items_split_with_hanging_continuation() {
        let b = blocks(vec![
            line("• first item that", 72.0, 100.0, 11.0),
            line("wraps", 83.0, 114.3, 11.0),
            line("• second", 72.0, 133.6, 11.0),
            line("After the list.", 72.0, 152.9, 11.0),
        ]);
        assert_eq!(b.len(), 3);
        assert_eq!(b[0].text(), "• first item that wraps");
    }

    #[test]
    fn test_hyphenated_words_rejoin() {
        let b = blocks(vec![
            line("an exam-", 72.0, 100.0, 11.0),
            line("ple here", 72.0, 114.3, 11.0),
        ]);
        assert_eq!(b[0].text(), "an example here");
    }

    #[test]
    fn test_classify_heading() {
        let b = blocks(vec![line("Title", 72.0, 100.0, 24.0)]);
        let region = classify(&b[0], &stats(), 72.0, &LayoutConfig::default());
        assert_eq!(region.kind, RegionKind::Heading { level: 1 });
        assert!(region.confidence >= 0.8);

        let b = blocks(vec![line("Section", 72.0, 100.0, 16.0)]);
        let region = classify(&b[0], &stats(), 72.0, &LayoutConfig::default());
        assert_eq!(region.kind, RegionKind::Heading { level: 2 });
    }

    #[test]
    fn test_classify_list_depth() {
        let config = LayoutConfig::default();
        let b = blocks(vec![line("- nested item", 108.0, 100.0, 11.0)]);
        let region = classify(&b[0], &stats(), 72.0, &config);
        assert_eq!(
            region.kind,
            RegionKind::ListItem {
                marker: ListMarker::Bullet('-'),
                depth: 2
            }
        );
        assert_eq!(region.text, "nested item");
    }

    #[test]
    fn test_classify_paragraph() {
        let b = blocks(vec![line("Plain words.", 72.0, 100.0, 11.0)]);
        let region = classify(&b[0], &stats(), 72.0, &LayoutConfig::default());
        assert!(region.kind.is_paragraph());
        assert_eq!(region.runs.len(), 1);
    }
}
