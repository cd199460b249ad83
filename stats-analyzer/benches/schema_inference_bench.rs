//! Benchmarks for schema inference and load rendering.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use stats_analyzer::load::loader::render_row;
use stats_analyzer::schema::{parse_value, SchemaInferenceEngine};
use std::hint::black_box;
use std::time::Duration;

fn synthetic_rows(count: usize) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "order_id".to_string(),
        "customer".to_string(),
        "amount".to_string(),
        "quantity".to_string(),
        "ordered_at".to_string(),
        "note".to_string(),
    ]];
    for i in 0..count {
        rows.push(vec![
            (i + 1).to_string(),
            format!("customer_{}", i % 97),
            format!("{}.{:02}", i % 500, i % 100),
            (i % 12).to_string(),
            format!("2024-{:02}-{:02} {:02}:15:00", i % 12 + 1, i % 28 + 1, i % 24),
            if i % 7 == 0 { String::new() } else { format!("note {i}") },
        ]);
    }
    rows
}

fn bench_parse_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_value");
    for raw in ["", "12345", "-3.25", "2024-05-06", "2024-05-06 07:08:09.123", "plain text"] {
        group.bench_with_input(BenchmarkId::from_parameter(raw), &raw, |b, raw| {
            b.iter(|| parse_value(black_box(raw)));
        });
    }
    group.finish();
}

fn bench_infer(c: &mut Criterion) {
    let mut group = c.benchmark_group("infer");
    group.measurement_time(Duration::from_secs(8));

    for size in [100, 1_000, 10_000, 50_000] {
        let rows = synthetic_rows(size);
        let engine = SchemaInferenceEngine::builder().sample_size(size).build();
        group.bench_with_input(BenchmarkId::new("rows", size), &rows, |b, rows| {
            b.iter(|| engine.infer(black_box(rows)));
        });
    }
    group.finish();
}

fn bench_render_rows(c: &mut Criterion) {
    let rows = synthetic_rows(1_000);
    let manifest = SchemaInferenceEngine::new().infer(&rows).unwrap();

    c.bench_function("render_1000_rows", |b| {
        b.iter(|| {
            for (i, row) in rows[1..].iter().enumerate() {
                black_box(render_row(&manifest, Some(i as u64 + 1), row, true));
            }
        });
    });
}

criterion_group!(benches, bench_parse_value, bench_infer, bench_render_rows);
criterion_main!(benches);
