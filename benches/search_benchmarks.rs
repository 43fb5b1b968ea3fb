//! Criterion benchmarks for tokenizer, codec, and search engine core
//! operations.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the core operations in isolation, using
//! synthetic corpora so results are reproducible across machines.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::tempdir;

use pptsearch::codec::encode_token;
use pptsearch::index::builder::{build_index, BuildOptions};
use pptsearch::index::IndexReader;
use pptsearch::search::{search, SearchOptions};
use pptsearch::tokenize;

// ─── Synthetic corpus generation ──────────────────────────────────────

fn synthetic_source(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        out.push_str(&format!(
            "int compute_{i}(int x, int y) {{ return x * {i} + y - {i}; }}\n"
        ));
    }
    out
}

fn build_synthetic_index(num_files: usize, lines_per_file: usize) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let source = synthetic_source(lines_per_file);
    for i in 0..num_files {
        std::fs::write(dir.path().join(format!("f{i}.cc")), &source).unwrap();
    }
    let out = dir.path().join("bench.idx");
    build_index(dir.path(), &out, &BuildOptions { workers: 4, ..Default::default() }).unwrap();
    (dir, out)
}

// ─── Tokenizer benchmarks ──────────────────────────────────────────────

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");

    let short_line = "int compute(int x, int y) { return x * 2 + y; }\n";
    let long_source = synthetic_source(200);

    group.bench_function("short_line", |b| {
        b.iter(|| pptsearch::tokenize("bench.cc", black_box(short_line.as_bytes())))
    });

    group.bench_function("200_line_file", |b| {
        b.iter(|| tokenize("bench.cc", black_box(long_source.as_bytes())))
    });

    group.finish();
}

// ─── Codec benchmarks ──────────────────────────────────────────────────

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    group.bench_function("encode_1000_small_ids", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(2000);
            for id in 0..1000u32 {
                encode_token(black_box(id), &mut buf).unwrap();
            }
            black_box(buf.len());
        })
    });

    group.bench_function("encode_1000_large_ids", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(4000);
            for id in 0..1000u32 {
                encode_token(black_box(id * 10_000 + 1), &mut buf).unwrap();
            }
            black_box(buf.len());
        })
    });

    group.finish();
}

// ─── Index build benchmarks ─────────────────────────────────────────

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    group.sample_size(10);

    for &num_files in &[10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("build", num_files), &num_files, |b, &num_files| {
            b.iter(|| {
                let dir = tempdir().unwrap();
                let source = synthetic_source(20);
                for i in 0..num_files {
                    std::fs::write(dir.path().join(format!("f{i}.cc")), &source).unwrap();
                }
                let out = dir.path().join("bench.idx");
                build_index(dir.path(), &out, &BuildOptions { workers: 4, ..Default::default() }).unwrap();
                black_box(out);
            })
        });
    }

    group.finish();
}

// ─── Search benchmarks ──────────────────────────────────────────────

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(20);

    for &num_files in &[10, 100] {
        let (dir, out) = build_synthetic_index(num_files, 50);
        let reader = IndexReader::open(&out).unwrap();

        group.bench_with_input(BenchmarkId::new("query_common_identifier", num_files), &reader, |b, reader| {
            b.iter(|| {
                let results = search(
                    reader,
                    dir.path(),
                    black_box("return x"),
                    &SearchOptions { workers: 4, ..Default::default() },
                )
                .unwrap();
                black_box(results.num_matches);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_codec, bench_index_build, bench_search);
criterion_main!(benches);
