//! Identifier benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use entistore_core::{Identifier, IdentifierGenerator};
use rand::Rng;

/// Benchmark generation at a single instant and across instants.
fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    group.throughput(Throughput::Elements(1));

    group.bench_function("same_instant", |b| {
        let generator = IdentifierGenerator::new();
        b.iter(|| black_box(generator.next_identity_at(1_700_000_000_000).unwrap()));
    });
    group.bench_function("now", |b| {
        let generator = IdentifierGenerator::new();
        b.iter(|| black_box(generator.next_identity_now().unwrap()));
    });
    group.finish();
}

/// Benchmark hex formatting and parsing.
fn bench_codec(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let ids: Vec<Identifier> = (0..256)
        .map(|_| Identifier::encode(rng.gen(), rng.gen_range(1..=i32::MAX)))
        .collect();
    let hex: Vec<String> = ids.iter().map(Identifier::to_string).collect();

    let mut group = c.benchmark_group("identifier_codec");
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(id.decode());
            }
        });
    });
    group.bench_function("parse_hex", |b| {
        b.iter(|| {
            for s in &hex {
                black_box(Identifier::parse_hex(s).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_generate, bench_codec);
criterion_main!(benches);
