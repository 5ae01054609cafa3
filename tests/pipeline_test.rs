//! End-to-end tests for the conversion pipeline.

mod common;

use common::{bold, png, text, two_column_page, PdfBuilder};
use undoc::{
    CancellationToken, ConvertOptions, Converter, Error, FormatHint, InputFormat, OutputFormat,
    RegionKind, WarningKind,
};

fn convert(data: &[u8], options: ConvertOptions) -> undoc::Result<undoc::Conversion> {
    Converter::new(options)?.convert(data, None)
}

fn sample_pdf() -> Vec<u8> {
    let first = [
        bold(72.0, 80.0, 18.0, "Annual Summary"),
        text(72.0, 110.0, 8.0, "The year closed with steady growth across every region."),
        text(72.0, 120.0, 8.0, "Details follow in the sections below."),
    ]
    .concat();
    PdfBuilder::new()
        .title("Annual Summary")
        .page(first)
        .page(two_column_page("second", 2))
        .page(two_column_page("third", 1))
        .build()
}

#[test]
fn test_pdf_to_markdown() {
    let conversion = convert(&sample_pdf(), ConvertOptions::default()).unwrap();

    assert!(conversion.content.starts_with("# Annual Summary\n\n"));
    assert!(conversion
        .content
        .contains("The year closed with steady growth across every region. Details follow"));
    assert_eq!(conversion.document.metadata.title.as_deref(), Some("Annual Summary"));
    assert_eq!(conversion.stats.page_count, 3);
    assert!(conversion.warnings().is_empty());
    assert!(!conversion.is_partial());
}

#[test]
fn test_conversions_are_deterministic() {
    let data = sample_pdf();
    let first = convert(&data, ConvertOptions::default()).unwrap();
    let second = convert(&data, ConvertOptions::default()).unwrap();
    let sequential = convert(&data, ConvertOptions::new().with_max_parallel_pages(1)).unwrap();
    let wide = convert(&data, ConvertOptions::new().with_max_parallel_pages(4)).unwrap();

    assert_eq!(first.content, second.content);
    assert_eq!(first.content, sequential.content);
    assert_eq!(first.content, wide.content);
    assert_eq!(first.order, sequential.order);

    let json = |c: &undoc::Conversion| c.render(OutputFormat::Json, &Default::default()).unwrap();
    assert_eq!(json(&first), json(&wide));
}

#[test]
fn test_two_columns_read_left_first() {
    let data = PdfBuilder::new().page(two_column_page("doc", 2)).build();
    let conversion = convert(&data, ConvertOptions::default()).unwrap();
    let document = &conversion.document;

    let mut left = Vec::new();
    let mut right = Vec::new();
    for id in document.region_ids() {
        let region = document.region(id).unwrap();
        let rank = conversion.order.rank(id).unwrap();
        if region.bbox.right() < 300.0 {
            left.push(rank);
        } else if region.bbox.x > 300.0 {
            right.push(rank);
        } else {
            panic!("region spans both columns: {:?}", region.bbox);
        }
    }

    assert_eq!(left.len(), 2);
    assert_eq!(right.len(), 2);
    let last_left = left.iter().max().unwrap();
    let first_right = right.iter().min().unwrap();
    assert!(last_left < first_right);

    let left_text = conversion.content.find("doc left column paragraph 2").unwrap();
    let right_text = conversion.content.find("doc right column paragraph 1").unwrap();
    assert!(left_text < right_text);
}

#[test]
fn test_blank_image_yields_empty_paragraph() {
    let conversion = convert(&png(120, 90, &[]), ConvertOptions::default()).unwrap();

    assert_eq!(conversion.document.pages.len(), 1);
    let regions = &conversion.document.pages[0].regions;
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].kind, RegionKind::Paragraph);
    assert!(regions[0].text.is_empty());
    assert_eq!(conversion.content, "");
}

#[test]
fn test_image_ink_becomes_figure() {
    let data = png(200, 150, &[(20, 30, 60, 40)]);
    let options = ConvertOptions::new()
        .with_render_options(undoc::RenderOptions::new().with_image_prefix("assets/"));
    let conversion = convert(&data, options).unwrap();

    assert_eq!(conversion.stats.figure_count, 1);
    assert_eq!(conversion.content, "![Figure 1](assets/page1_block1)\n");
}

#[test]
fn test_signature_beats_declared_format() {
    let hint = FormatHint::Extension("pdf".into());
    let conversion = Converter::new(ConvertOptions::default())
        .unwrap()
        .convert(&png(50, 50, &[]), Some(&hint))
        .unwrap();
    assert_eq!(conversion.document.metadata.format, Some(InputFormat::Png));
}

#[test]
fn test_unknown_bytes_rejected() {
    let result = convert(b"\x00\x01\x02\x03binary", ConvertOptions::default());
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}

#[test]
fn test_truncated_pdf_is_partial_success() {
    let data = PdfBuilder::new()
        .page(text(72.0, 100.0, 11.0, "First page text survives"))
        .page(text(72.0, 100.0, 11.0, "Second page text is lost"))
        .build();
    // Cut inside the second page object; xref and trailer go with it.
    let second_page = data
        .windows(7)
        .position(|w| w == b"7 0 obj")
        .unwrap();
    let truncated = &data[..second_page + 40];

    let conversion = convert(truncated, ConvertOptions::default()).unwrap();

    assert!(conversion.content.contains("First page text survives"));
    assert!(conversion.is_partial());
    assert!(conversion
        .warnings()
        .iter()
        .any(|w| w.kind == WarningKind::CorruptInput && w.page == Some(2)));
    assert!(conversion.stats.partial_pages >= 1);
}

#[test]
fn test_oversized_page_count_is_capped() {
    let data = PdfBuilder::new()
        .page(text(72.0, 100.0, 11.0, "Only page"))
        .build();
    let data = String::from_utf8(data)
        .unwrap()
        .replace("/Count 1", "/Count 300000")
        .into_bytes();

    let conversion = convert(&data, ConvertOptions::default()).unwrap();

    assert_eq!(conversion.stats.page_count, 1);
    assert_eq!(conversion.document.pages.len(), 1);
    assert!(conversion.content.contains("Only page"));
}

fn long_page(lines: usize) -> String {
    (0..lines)
        .map(|i| text(72.0, 60.0 + (i % 60) as f32 * 11.0, 8.0, &format!("line {} of a long page", i)))
        .collect()
}

#[test]
fn test_ingestion_timeout_keeps_page_prefix() {
    let data = PdfBuilder::new().page(long_page(400)).build();
    let options = ConvertOptions::new().with_page_timeout_ms(0);
    let conversion = convert(&data, options).unwrap();

    let page = &conversion.document.pages[0];
    assert!(page.is_partial());
    assert!(!page.runs.is_empty());
    assert!(page.runs.len() < 400);
    let timeouts: Vec<_> = conversion
        .warnings()
        .iter()
        .filter(|w| w.kind == WarningKind::Timeout)
        .map(|w| w.page)
        .collect();
    assert_eq!(timeouts, vec![Some(1)]);
    assert!(conversion.content.contains("line 0 of a long page"));
}

#[test]
fn test_ingestion_observes_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let budget = undoc::convert::IngestBudget::unlimited().with_token(token);
    let result = undoc::IngestorRegistry::with_defaults().ingest_with_budget(
        &PdfBuilder::new().page(long_page(10)).build(),
        None,
        &budget,
    );
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_page_timeout_degrades_to_raw_text() {
    let options = ConvertOptions::new().with_page_timeout_ms(0);
    let conversion = convert(&sample_pdf(), options).unwrap();

    assert_eq!(conversion.stats.partial_pages, 3);
    let timeouts: Vec<_> = conversion
        .warnings()
        .iter()
        .filter(|w| w.kind == WarningKind::Timeout)
        .map(|w| w.page)
        .collect();
    assert_eq!(timeouts, vec![Some(1), Some(2), Some(3)]);
    assert!(conversion.content.contains("Annual Summary"));
    assert_eq!(conversion.stats.heading_count, 0);
}

#[test]
fn test_cancellation_aborts_conversion() {
    let token = CancellationToken::new();
    let converter = Converter::new(ConvertOptions::default())
        .unwrap()
        .with_cancellation(token.clone());
    token.cancel();

    let result = converter.convert(&sample_pdf(), None);
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_low_confidence_regions_become_paragraphs() {
    let source = b"Intro text.\n\n- alpha item\n- beta item\n";
    let hint = FormatHint::Extension("md".into());

    let default = Converter::new(ConvertOptions::default())
        .unwrap()
        .convert(source, Some(&hint))
        .unwrap();
    assert_eq!(default.stats.list_item_count, 2);

    let strict = Converter::new(ConvertOptions::new().with_threshold(0.95))
        .unwrap()
        .convert(source, Some(&hint))
        .unwrap();
    assert_eq!(strict.stats.list_item_count, 0);
    assert!(strict.stats.paragraph_count >= 2);
    assert!(strict.content.contains("alpha item"));
}

#[test]
fn test_nested_list_depth() {
    let source = b"- alpha item\n  - nested item\n- beta item\n";
    let conversion = Converter::new(ConvertOptions::default())
        .unwrap()
        .convert(source, Some(&FormatHint::Extension("md".into())))
        .unwrap();

    assert_eq!(conversion.content, "- alpha item\n  - nested item\n- beta item\n");
    let depths: Vec<u8> = conversion
        .document
        .pages[0]
        .regions
        .iter()
        .filter_map(|r| match r.kind {
            RegionKind::ListItem { depth, .. } => Some(depth),
            _ => None,
        })
        .collect();
    assert_eq!(depths, vec![0, 1, 0]);
}

#[test]
fn test_markdown_figure_placeholder() {
    let source = b"Before the chart.\n\n![chart](img/chart.png)\n\nAfter the chart.\n";
    let conversion = Converter::new(ConvertOptions::default())
        .unwrap()
        .convert(source, Some(&FormatHint::Extension("md".into())))
        .unwrap();

    assert_eq!(
        conversion.content,
        "Before the chart.\n\n![Figure 1](img/chart.png)\n\nAfter the chart.\n"
    );
}

#[test]
fn test_text_and_json_formats() {
    let data = sample_pdf();
    let text = convert(&data, ConvertOptions::new().with_format(OutputFormat::Text)).unwrap();
    assert!(text.content.starts_with("Annual Summary\n\n"));
    assert!(!text.content.contains('#'));

    let json = convert(&data, ConvertOptions::new().with_format(OutputFormat::Json)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json.content).unwrap();
    assert_eq!(value["stats"]["page_count"], 3);
    assert_eq!(value["pages"].as_array().unwrap().len(), 3);
    assert_eq!(value["tree"]["node"], "document");
}

#[test]
fn test_convert_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.pdf");
    std::fs::write(&path, sample_pdf()).unwrap();

    let markdown = undoc::to_markdown(&path).unwrap();
    assert!(markdown.starts_with("# Annual Summary"));
}
