//! Exported Markdown, ingested again, keeps its structure.

mod common;

use common::{bold, grid, text, PdfBuilder};
use undoc::{Conversion, ConvertOptions, Converter, FormatHint};

fn kinds(conversion: &Conversion) -> Vec<&'static str> {
    conversion
        .order
        .sequence()
        .iter()
        .filter_map(|&id| conversion.document.region(id))
        .map(|r| r.kind.name())
        .collect()
}

fn report_pdf() -> Vec<u8> {
    let mut content = String::new();
    content.push_str(&bold(72.0, 80.0, 20.0, "Quarterly Report"));
    content.push_str(&text(72.0, 104.0, 10.0, "Sales grew in every region during the quarter."));
    content.push_str(&grid(&[72.0, 172.0, 272.0], &[132.0, 152.0, 172.0]));
    content.push_str(&text(80.0, 147.0, 10.0, "Region"));
    content.push_str(&text(180.0, 147.0, 10.0, "Sales"));
    content.push_str(&text(80.0, 167.0, 10.0, "North"));
    content.push_str(&text(180.0, 167.0, 10.0, "120"));
    PdfBuilder::new().page(content).build()
}

#[test]
fn test_heading_paragraph_table_roundtrip() {
    let converter = Converter::new(ConvertOptions::default()).unwrap();

    let original = converter.convert(&report_pdf(), None).unwrap();
    assert_eq!(kinds(&original), vec!["heading", "paragraph", "table"]);
    assert_eq!(
        original.content,
        "# Quarterly Report\n\n\
         Sales grew in every region during the quarter.\n\n\
         | Region | Sales |\n| --- | --- |\n| North | 120 |\n"
    );

    let hint = FormatHint::Extension("md".into());
    let reparsed = converter
        .convert(original.content.as_bytes(), Some(&hint))
        .unwrap();
    assert_eq!(kinds(&reparsed), kinds(&original));
    assert_eq!(reparsed.content, original.content);
}

#[test]
fn test_markdown_source_roundtrip() {
    let source = "# Guide\n\nIntro paragraph.\n\n## Steps\n\n1. first step\n2. second step\n\n\
| Option | Default |\n| --- | --- |\n| depth | 3 |\n";
    let converter = Converter::new(ConvertOptions::default()).unwrap();
    let hint = FormatHint::Extension("md".into());

    let once = converter.convert(source.as_bytes(), Some(&hint)).unwrap();
    let twice = converter.convert(once.content.as_bytes(), Some(&hint)).unwrap();

    assert_eq!(
        kinds(&once),
        vec!["heading", "paragraph", "heading", "list_item", "list_item", "table"]
    );
    assert_eq!(once.content, twice.content);
}

#[test]
fn test_escaped_block_markers_stay_paragraphs() {
    let source = "Plain text.\n\n\\# not a heading\n\n\\> not a quote\n";
    let converter = Converter::new(ConvertOptions::default()).unwrap();
    let hint = FormatHint::Extension("md".into());

    let once = converter.convert(source.as_bytes(), Some(&hint)).unwrap();
    assert_eq!(kinds(&once), vec!["paragraph", "paragraph", "paragraph"]);
    assert_eq!(once.content, source);

    let twice = converter.convert(once.content.as_bytes(), Some(&hint)).unwrap();
    assert_eq!(kinds(&twice), kinds(&once));
    assert_eq!(twice.content, once.content);
}

#[test]
fn test_relabelled_list_items_roundtrip() {
    let source = b"Intro text.\n\n- alpha item\n- beta item\n";
    let converter = Converter::new(ConvertOptions::new().with_threshold(0.95)).unwrap();
    let hint = FormatHint::Extension("md".into());

    let once = converter.convert(source, Some(&hint)).unwrap();
    assert_eq!(kinds(&once), vec!["paragraph", "paragraph", "paragraph"]);

    let twice = converter.convert(once.content.as_bytes(), Some(&hint)).unwrap();
    assert_eq!(kinds(&twice), kinds(&once));
    assert_eq!(twice.content, once.content);
}
