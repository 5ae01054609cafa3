//! Plain text rendering of the export tree.

use crate::error::Result;
use crate::model::{ExportNode, TableGrid};

/// Render an export tree to plain text.
///
/// Headings and paragraphs become blocks separated by blank lines, list
/// items keep a two-space indent per depth, table rows are tab-separated
/// and figures become `[Figure N]` placeholders.
pub fn to_text(tree: &ExportNode) -> Result<String> {
    let mut blocks = Vec::new();
    collect(tree, &mut blocks);
    Ok(blocks.join("\n\n"))
}

fn collect(node: &ExportNode, blocks: &mut Vec<String>) {
    match node {
        ExportNode::Document { children } => {
            for child in children {
                collect(child, blocks);
            }
        }
        ExportNode::Section { title, children, .. } => {
            blocks.push(title.trim().to_string());
            for child in children {
                collect(child, blocks);
            }
        }
        ExportNode::Paragraph { text, .. } => {
            let text = text.trim();
            if !text.is_empty() {
                blocks.push(text.to_string());
            }
        }
        ExportNode::List { .. } | ExportNode::ListItem { .. } => {
            let mut lines = Vec::new();
            list_lines(node, &mut lines);
            if !lines.is_empty() {
                blocks.push(lines.join("\n"));
            }
        }
        ExportNode::Table { grid, .. } => {
            if !grid.is_empty() {
                blocks.push(table_text(grid));
            }
        }
        ExportNode::Figure { number, .. } => blocks.push(format!("[Figure {}]", number)),
    }
}

fn list_lines(node: &ExportNode, lines: &mut Vec<String>) {
    if let ExportNode::ListItem { depth, text, .. } = node {
        lines.push(format!("{}{}", "  ".repeat(*depth as usize), text.trim()));
    }
    for child in node.children() {
        list_lines(child, lines);
    }
}

fn table_text(grid: &TableGrid) -> String {
    (0..grid.rows)
        .map(|r| {
            (0..grid.columns)
                .map(|c| match grid.owner_of(r, c) {
                    Some(cell) if cell.row == r && cell.col == c => cell.text.replace('\n', " "),
                    _ => String::new(),
                })
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListMarker, RegionId};

    #[test]
    fn test_to_text() {
        let tree = ExportNode::Document {
            children: vec![
                ExportNode::Section {
                    region: RegionId::new(1, 0),
                    level: 1,
                    title: "Title".into(),
                    children: vec![ExportNode::Paragraph {
                        region: RegionId::new(1, 1),
                        text: "Hello, world!".into(),
                    }],
                },
                ExportNode::List {
                    ordered: false,
                    items: vec![ExportNode::ListItem {
                        region: RegionId::new(1, 2),
                        marker: ListMarker::Bullet('•'),
                        depth: 1,
                        text: "item".into(),
                        children: vec![],
                    }],
                },
                ExportNode::Table {
                    region: RegionId::new(1, 3),
                    grid: TableGrid::from_rows(vec![vec!["a", "b"], vec!["1", "2"]]),
                },
            ],
        };

        let text = to_text(&tree).unwrap();
        assert_eq!(text, "Title\n\nHello, world!\n\n  item\n\na\tb\n1\t2");
    }

    #[test]
    fn test_empty_tree() {
        let tree = ExportNode::Document { children: vec![] };
        assert_eq!(to_text(&tree).unwrap(), "");
    }
}
