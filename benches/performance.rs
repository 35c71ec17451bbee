use criterion::{
    criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use rand::prelude::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::hint::black_box;

use batchmap::SkipList;

const DATASET_SIZE: u64 = 65_536;

/// Pre-populates a list with `DATASET_SIZE` keys in sorted batches.
fn setup_list() -> SkipList<u64, u64> {
    let list = SkipList::default();
    for chunk in 0..(DATASET_SIZE / 1024) {
        let base = chunk * 1024;
        let batch: Vec<(u64, u64)> = (base..base + 1024).map(|k| (k, k * 2)).collect();
        list.insert(batch);
    }
    list
}

/// --- Batched Insert Benchmark ---
///
/// Inserts the same dataset through different batch sizes; larger batches
/// amortize the descent from the head across more keys.
fn bench_batched_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Batched Insert");
    for &batch_size in &[16usize, 256, 4096] {
        group.throughput(Throughput::Elements(DATASET_SIZE));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                let batches: Vec<Vec<(u64, u64)>> = (0..DATASET_SIZE as usize)
                    .map(|k| (k as u64, k as u64))
                    .collect::<Vec<_>>()
                    .chunks(size)
                    .map(|chunk| chunk.to_vec())
                    .collect();
                b.iter_batched(
                    || batches.clone(),
                    |batches| {
                        let list: SkipList<u64, u64> = SkipList::default();
                        for batch in batches {
                            black_box(list.insert(batch));
                        }
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

/// --- Batched Get Benchmark ---
fn bench_batched_get(c: &mut Criterion) {
    let list = setup_list();
    let mut rng = StdRng::seed_from_u64(42);

    let mut group = c.benchmark_group("Batched Get");
    for &batch_size in &[16usize, 256, 4096] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                let mut keys: Vec<u64> = (0..size)
                    .map(|_| rng.random_range(0..DATASET_SIZE))
                    .collect();
                keys.sort_unstable();
                b.iter(|| black_box(list.get(&keys, u64::MAX)));
            },
        );
    }
    group.finish();
}

/// --- Full Scan Benchmark ---
fn bench_scan_all(c: &mut Criterion) {
    let list = setup_list();

    let mut group = c.benchmark_group("Scan");
    group.throughput(Throughput::Elements(DATASET_SIZE));
    group.bench_function("scan_all", |b| {
        b.iter(|| {
            let mut count = 0u64;
            list.scan_all(|k, v| {
                black_box((k, v));
                count += 1;
            });
            black_box(count)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_batched_insert,
    bench_batched_get,
    bench_scan_all
);
criterion_main!(benches);
