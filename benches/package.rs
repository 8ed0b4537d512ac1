//! Benchmarks for building and loading packages.
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};

use quire::{MemoryStore, PackageBuilder, load, read_epub_from_reader};

const CHAPTERS: usize = 50;

fn chapter_markdown(n: usize) -> String {
    let mut md = format!("# Chapter {}\n\n", n);
    for section in 1..=5 {
        md.push_str(&format!("## Section {}.{}\n\n", n, section));
        for _ in 0..10 {
            md.push_str("Lorem ipsum dolor sit amet, *consectetur* adipiscing elit. ");
        }
        md.push_str("\n\n");
    }
    md
}

fn sample_builder() -> PackageBuilder {
    let mut builder = PackageBuilder::new();
    builder.metadata_mut().set_identifier("urn:uuid:bench", None);
    builder.metadata_mut().add_title("Benchmark Book");
    builder.add_css("css/book.css", "body { margin: 0 }").unwrap();

    let mut spine = Vec::with_capacity(CHAPTERS);
    for n in 1..=CHAPTERS {
        let id = builder
            .add_markdown_item(&format!("text/ch{:03}.xhtml", n), &chapter_markdown(n))
            .unwrap()
            .id()
            .to_string();
        spine.push(id);
    }
    builder.set_spine_order(&spine).unwrap();
    builder.generate_toc_from_spine(2).unwrap();
    builder
}

fn sample_store() -> MemoryStore {
    sample_builder().build().unwrap()
}

fn sample_epub() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    sample_builder().write_epub_to_writer(&mut out).unwrap();
    out.into_inner()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    group.bench_function("markdown_chapters", |b| {
        b.iter(|| black_box(sample_builder()))
    });

    let mut builder = sample_builder();
    group.bench_function("render_store", |b| {
        b.iter(|| black_box(builder.build().unwrap()))
    });

    group.bench_function("write_zip", |b| {
        b.iter(|| {
            let mut out = Cursor::new(Vec::new());
            builder.write_epub_to_writer(&mut out).unwrap();
            black_box(out.into_inner())
        })
    });

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    let store = sample_store();
    group.bench_function("memory_store", |b| {
        b.iter(|| black_box(load(store.clone()).unwrap()))
    });

    let epub = sample_epub();
    group.bench_function("zip_archive", |b| {
        b.iter(|| black_box(read_epub_from_reader(Cursor::new(epub.clone())).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_load);
criterion_main!(benches);
