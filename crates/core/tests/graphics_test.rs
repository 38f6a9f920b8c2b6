//! Graphics-state engine driven from real page content.

mod common;

use common::{single_page_pdf, three_page_pdf};
use folio_core::document::PDFDocument;
use folio_core::interp::{
    FontMetrics, NullRenderer, PageFontMetrics, TextRunCollector, UniformMetrics, render_page,
};
use std::rc::Rc;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn runs_of(content: &[u8], media_box: &str) -> TextRunCollector {
    let doc = PDFDocument::new(single_page_pdf(content, media_box)).expect("fixture parses");
    let metrics = Rc::new(PageFontMetrics::load(&doc, 1));
    let mut collector = TextRunCollector::new();
    render_page(&doc, 1, metrics, &mut collector).expect("page renders");
    collector
}

#[test]
fn test_text_run_device_position() {
    let collector = runs_of(
        b"1 0 0 1 100 200 cm BT /F1 12 Tf (Hi) Tj ET",
        "[0 0 612 792]",
    );
    assert_eq!(collector.runs.len(), 1);
    let run = &collector.runs[0];
    assert_eq!(run.text_lossy(), "Hi");
    assert_eq!(run.origin, (100.0, 200.0));
    assert_eq!(run.font.as_deref(), Some("F1"));
    assert_eq!(run.font_size, 12.0);
    // (722 + 278) / 1000 * 12
    assert!(approx(run.width, 12.0));
}

#[test]
fn test_media_box_origin_is_subtracted() {
    let collector = runs_of(
        b"BT /F1 10 Tf 150 250 Td (H) Tj ET",
        "[50 50 662 842]",
    );
    assert_eq!(collector.runs[0].origin, (100.0, 200.0));
}

#[test]
fn test_save_restore_scopes_ctm() {
    let collector = runs_of(
        b"q 2 0 0 2 0 0 cm BT /F1 10 Tf 10 10 Td (H) Tj ET Q BT /F1 10 Tf 10 10 Td (H) Tj ET",
        "[0 0 612 792]",
    );
    let origins: Vec<_> = collector.runs.iter().map(|r| r.origin).collect();
    assert_eq!(origins, vec![(20.0, 20.0), (10.0, 10.0)]);
}

#[test]
fn test_successive_runs_advance() {
    let collector = runs_of(
        b"BT /F1 10 Tf 0 0 Td (H) Tj (i) Tj [(H) 500 (i)] TJ ET",
        "[0 0 612 792]",
    );
    let xs: Vec<f64> = collector.runs.iter().map(|r| r.origin.0).collect();
    // H = 7.22, i = 2.78, kerning -5.0
    let expected = [0.0, 7.22, 10.0, 12.22];
    assert_eq!(xs.len(), expected.len());
    for (x, e) in xs.iter().zip(expected) {
        assert!(approx(*x, e), "{x} != {e}");
    }
}

#[test]
fn test_rotated_text_matrix() {
    let collector = runs_of(
        b"BT /F1 10 Tf 0 1 -1 0 300 400 Tm (Hi) Tj (H) Tj ET",
        "[0 0 612 792]",
    );
    assert_eq!(collector.runs[0].origin, (300.0, 400.0));
    // The advance runs up the page.
    let second = collector.runs[1].origin;
    assert!(approx(second.0, 300.0));
    assert!(approx(second.1, 410.0));
}

#[test]
fn test_page_font_metrics_from_document() {
    let doc = PDFDocument::new(three_page_pdf()).expect("fixture parses");
    let metrics = PageFontMetrics::load(&doc, 2);
    assert_eq!(metrics.glyph_width("F1", b'H'), 722.0);
    assert_eq!(metrics.glyph_width("F1", b'i'), 278.0);
    // Outside FirstChar..LastChar: FontDescriptor MissingWidth.
    assert_eq!(metrics.glyph_width("F1", b'z'), 500.0);
}

#[test]
fn test_final_state_is_returned() {
    let doc = PDFDocument::new(three_page_pdf()).expect("fixture parses");
    let state = render_page(&doc, 3, Rc::new(UniformMetrics(0.0)), &mut NullRenderer)
        .expect("page renders");
    // Text state set inside BT/ET is visible afterwards.
    assert_eq!(state.text.font_name(), Some("F1"));
    assert_eq!(state.text.font_size, 12.0);
    assert_eq!(state.text.line_matrix, (1.0, 0.0, 0.0, 1.0, 72.0, 700.0));
}
