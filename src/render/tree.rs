//! Building the export tree from ranked regions.

use crate::model::{Document, ExportNode, ListMarker, RegionId, RegionKind};
use crate::reading_order::ReadingOrder;

/// Build the export tree: regions in rank order, sections nested by heading
/// level, consecutive list items grouped into (nested) lists.
///
/// Tables without a grid become paragraphs. Figures are numbered from 1 in
/// reading order.
pub fn build_tree(document: &Document, order: &ReadingOrder) -> ExportNode {
    let mut builder = TreeBuilder::default();
    for &id in order.sequence() {
        if let Some(region) = document.region(id) {
            builder.push_region(id, &region.kind, &region.text);
        }
    }
    builder.finish()
}

struct OpenSection {
    region: RegionId,
    level: u8,
    title: String,
    children: Vec<ExportNode>,
}

struct ListEntry {
    region: RegionId,
    marker: ListMarker,
    depth: u8,
    text: String,
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<ExportNode>,
    sections: Vec<OpenSection>,
    pending_items: Vec<ListEntry>,
    figures: usize,
}

impl TreeBuilder {
    fn push_region(&mut self, region: RegionId, kind: &RegionKind, text: &str) {
        if let RegionKind::ListItem { marker, depth } = kind {
            self.pending_items.push(ListEntry {
                region,
                marker: marker.clone(),
                depth: *depth,
                text: text.to_string(),
            });
            return;
        }
        self.flush_list();

        match kind {
            RegionKind::Heading { level } => {
                self.close_sections(*level);
                self.sections.push(OpenSection {
                    region,
                    level: *level,
                    title: text.to_string(),
                    children: Vec::new(),
                });
            }
            RegionKind::Table { grid: Some(grid) } => self.push(ExportNode::Table {
                region,
                grid: grid.clone(),
            }),
            RegionKind::Figure { resource_id } => {
                self.figures += 1;
                self.push(ExportNode::Figure {
                    region,
                    number: self.figures,
                    resource_id: resource_id.clone(),
                });
            }
            RegionKind::Table { grid: None } | RegionKind::Paragraph => {
                self.push(ExportNode::Paragraph {
                    region,
                    text: text.to_string(),
                })
            }
            RegionKind::ListItem { .. } => {}
        }
    }

    fn push(&mut self, node: ExportNode) {
        match self.sections.last_mut() {
            Some(section) => section.children.push(node),
            None => self.root.push(node),
        }
    }

    /// Close open sections at `level` or deeper.
    fn close_sections(&mut self, level: u8) {
        while self.sections.last().is_some_and(|s| s.level >= level) {
            if let Some(section) = self.sections.pop() {
                self.push(ExportNode::Section {
                    region: section.region,
                    level: section.level,
                    title: section.title,
                    children: section.children,
                });
            }
        }
    }

    fn flush_list(&mut self) {
        if self.pending_items.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.pending_items);
        for list in build_lists(&items) {
            self.push(list);
        }
    }

    fn finish(mut self) -> ExportNode {
        self.flush_list();
        self.close_sections(0);
        ExportNode::Document {
            children: self.root,
        }
    }
}

/// Group list entries into lists. Entries deeper than the first entry
/// become children of the preceding shallower entry; a change between
/// ordered and unordered markers starts a new list.
fn build_lists(items: &[ListEntry]) -> Vec<ExportNode> {
    let mut lists: Vec<ExportNode> = Vec::new();
    let Some(first) = items.first() else {
        return lists;
    };
    let base = first.depth;

    let mut i = 0;
    while i < items.len() {
        let mut end = i + 1;
        while end < items.len() && items[end].depth > base {
            end += 1;
        }

        let entry = &items[i];
        let ordered = entry.marker.is_ordered();
        let node = ExportNode::ListItem {
            region: entry.region,
            marker: entry.marker.clone(),
            depth: entry.depth,
            text: entry.text.clone(),
            children: build_lists(&items[i + 1..end]),
        };
        match lists.last_mut() {
            Some(ExportNode::List { ordered: o, items }) if *o == ordered => items.push(node),
            _ => lists.push(ExportNode::List {
                ordered,
                items: vec![node],
            }),
        }
        i = end;
    }
    lists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, Page, Region, TableGrid};
    use crate::reading_order::ReadingOrderResolver;

    fn doc(regions: Vec<Region>) -> (Document, ReadingOrder) {
        let mut page = Page::letter(1);
        // Stack regions vertically in the given order
        page.regions = regions
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.bbox = BoundingBox::new(72.0, 50.0 + i as f32 * 30.0, 400.0, 20.0);
                r
            })
            .collect();
        let mut document = Document::new();
        document.add_page(page);
        let order = ReadingOrderResolver::default().resolve(&document);
        (document, order)
    }

    fn region(kind: RegionKind, text: &str) -> Region {
        Region::new(kind, BoundingBox::default(), 1.0).with_text(text)
    }

    fn item(depth: u8, marker: ListMarker, text: &str) -> Region {
        region(RegionKind::ListItem { marker, depth }, text)
    }

    #[test]
    fn test_sections_nest_by_level() {
        let (document, order) = doc(vec![
            region(RegionKind::Heading { level: 1 }, "Title"),
            region(RegionKind::Paragraph, "intro"),
            region(RegionKind::Heading { level: 2 }, "Part"),
            region(RegionKind::Paragraph, "body"),
            region(RegionKind::Heading { level: 1 }, "Next"),
        ]);
        let tree = build_tree(&document, &order);
        let top = tree.children();
        assert_eq!(top.len(), 2);
        let ExportNode::Section { title, children, .. } = &top[0] else {
            panic!("expected section");
        };
        assert_eq!(title, "Title");
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], ExportNode::Section { level: 2, .. }));
    }

    #[test]
    fn test_lists_nest_by_depth() {
        let (document, order) = doc(vec![
            item(0, ListMarker::Bullet('-'), "a"),
            item(1, ListMarker::Bullet('-'), "a.1"),
            item(1, ListMarker::Bullet('-'), "a.2"),
            item(0, ListMarker::Bullet('-'), "b"),
            item(0, ListMarker::Numbered(1), "one"),
        ]);
        let tree = build_tree(&document, &order);
        let top = tree.children();
        assert_eq!(top.len(), 2);
        let ExportNode::List { ordered: false, items } = &top[0] else {
            panic!("expected unordered list");
        };
        assert_eq!(items.len(), 2);
        let nested = items[0].children();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].children().len(), 2);
        assert!(matches!(&top[1], ExportNode::List { ordered: true, .. }));
    }

    #[test]
    fn test_table_without_grid_is_paragraph_and_figures_numbered() {
        let (document, order) = doc(vec![
            region(RegionKind::Table { grid: None }, "a b"),
            region(
                RegionKind::Table {
                    grid: Some(TableGrid::from_rows(vec![vec!["x"]])),
                },
                "x",
            ),
            region(RegionKind::Figure { resource_id: "f1".into() }, ""),
            region(RegionKind::Figure { resource_id: "f2".into() }, ""),
        ]);
        let tree = build_tree(&document, &order);
        let top = tree.children();
        assert!(matches!(&top[0], ExportNode::Paragraph { text, .. } if text == "a b"));
        assert!(matches!(&top[1], ExportNode::Table { .. }));
        assert!(matches!(&top[3], ExportNode::Figure { number: 2, .. }));
    }

    #[test]
    fn test_preorder_matches_rank_order() {
        let (document, order) = doc(vec![
            region(RegionKind::Heading { level: 1 }, "T"),
            item(0, ListMarker::Bullet('-'), "a"),
            item(1, ListMarker::Bullet('-'), "b"),
            region(RegionKind::Paragraph, "p"),
        ]);
        let tree = build_tree(&document, &order);
        assert_eq!(tree.region_ids(), order.sequence().to_vec());
    }
}
