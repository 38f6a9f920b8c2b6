//! Benchmarks for document opening, object resolution, saving and page
//! rendering over in-memory fixtures.

#[path = "../tests/common/mod.rs"]
mod fixtures;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::rc::Rc;

use folio_core::document::{OpenOptions, PDFDocument, Permissions, SaveOptions};
use folio_core::interp::{NullRenderer, PageFontMetrics, render_page};
use folio_core::model::PDFObject;

/// `three_page_pdf` grown to `pages` pages and saved as one revision.
fn multi_page_pdf(pages: usize) -> Vec<u8> {
    let mut doc = PDFDocument::new(fixtures::three_page_pdf()).expect("fixture parses");
    while doc.page_count() < pages {
        doc.duplicate_page(1).expect("duplicate page");
    }
    doc.save(&SaveOptions::full()).expect("save").to_vec()
}

fn bench_document_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_open");

    for pages in [3, 50, 500] {
        let data = multi_page_pdf(pages);
        group.bench_with_input(BenchmarkId::from_parameter(pages), &data, |b, data| {
            b.iter(|| PDFDocument::new(black_box(data.clone())).expect("open"))
        });
    }

    let encrypted = fixtures::encrypted_pdf("owner", "user", Permissions::ALL);
    let options = OpenOptions::default().with_user_password("user");
    group.bench_function("encrypted", |b| {
        b.iter(|| PDFDocument::open(black_box(encrypted.clone()), &options).expect("open"))
    });

    group.finish();
}

/// Resolve every object from a cold cache.
fn bench_document_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_resolve");

    let data = multi_page_pdf(50);
    group.bench_function("all_objects", |b| {
        b.iter(|| {
            let doc = PDFDocument::new(data.clone()).expect("open");
            for objid in doc.object_ids() {
                black_box(doc.getobj(objid));
            }
        })
    });
    group.bench_function("page_walk", |b| {
        let doc = PDFDocument::new(data.clone()).expect("open");
        b.iter(|| black_box(doc.page_ids()).len())
    });

    group.finish();
}

fn bench_document_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_save");
    let data = multi_page_pdf(50);

    group.bench_function("incremental_info_edit", |b| {
        b.iter(|| {
            let mut doc = PDFDocument::new(data.clone()).expect("open");
            doc.set_info("Title", PDFObject::String(b"Benchmark".to_vec()));
            doc.save(&SaveOptions::incremental()).expect("save")
        })
    });
    group.bench_function("full_rewrite", |b| {
        b.iter(|| {
            let mut doc = PDFDocument::new(data.clone()).expect("open");
            doc.save(&SaveOptions::full()).expect("save")
        })
    });

    group.finish();
}

fn bench_render_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_page");

    let mut content = Vec::new();
    for i in 0..200 {
        content.extend_from_slice(
            format!("q 1 0 0 1 {i} 0 cm BT /F1 12 Tf 72 700 Td [(Hello) -250 (world)] TJ ET Q\n")
                .as_bytes(),
        );
    }
    let doc = PDFDocument::new(fixtures::single_page_pdf(&content, "[0 0 612 792]"))
        .expect("open");
    let metrics = Rc::new(PageFontMetrics::load(&doc, 1));

    group.bench_function("text_blocks_200", |b| {
        b.iter(|| {
            let mut renderer = NullRenderer;
            render_page(&doc, 1, metrics.clone(), &mut renderer).expect("render")
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_document_open,
    bench_document_resolve,
    bench_document_save,
    bench_render_page
);
criterion_main!(benches);
