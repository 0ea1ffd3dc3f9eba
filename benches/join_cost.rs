use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io;
use voicebank::joincost::precompute::left_unit_count;
use voicebank::joincost::{
    Bucket, JoinCostTableWriter, JoinFeatures, JoinWeights, RetentionPolicy, precompute,
    score_bucket,
};

const POLICY: RetentionPolicy = RetentionPolicy {
    percent: 10,
    min: 20,
};

/// Twelve mel-cepstral coefficients plus F0, like a typical frame timeline.
const WIDTH: usize = 13;

fn join_features(units: usize, seed: u64) -> JoinFeatures {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut frame = || {
        let mut values: Vec<f32> = (0..WIDTH - 1).map(|_| rng.f32() * 2.0 - 1.0).collect();
        values.push(80.0 + rng.f32() * 200.0);
        values
    };
    let left = (0..units).map(|_| frame()).collect();
    let right = (0..units).map(|_| frame()).collect();
    JoinFeatures::new(
        JoinWeights::uniform(WIDTH).expect("uniform weights"),
        left,
        right,
    )
    .expect("join features")
}

/// `count` buckets of `size` left and `size` right units, interleaved the
/// way half-phones are in a unit table.
fn buckets(count: usize, size: usize) -> Vec<Bucket> {
    (0..count)
        .map(|b| {
            let base = (b * size * 2) as u32;
            Bucket {
                phone: format!("p{b}"),
                left: (0..size as u32).map(|i| base + 2 * i).collect(),
                right: (0..size as u32).map(|i| base + 2 * i + 1).collect(),
            }
        })
        .collect()
}

fn bench_score_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_bucket");
    for size in [100, 500, 2000] {
        let bucket = buckets(1, size).remove(0);
        let cost = join_features(size * 2, 1);
        group.throughput(Throughput::Elements(bucket.evaluations() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bucket, |b, bucket| {
            b.iter(|| score_bucket(black_box(bucket), &cost, POLICY));
        });
    }
    group.finish();
}

fn bench_precompute_workers(c: &mut Criterion) {
    let buckets = buckets(40, 300);
    let cost = join_features(40 * 300 * 2, 2);
    let evaluations: usize = buckets.iter().map(Bucket::evaluations).sum();

    let mut group = c.benchmark_group("precompute");
    group.sample_size(10);
    group.throughput(Throughput::Elements(evaluations as u64));
    for workers in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let mut writer =
                        JoinCostTableWriter::new(io::sink(), left_unit_count(&buckets))
                            .expect("writer");
                    precompute(&buckets, &cost, POLICY, workers, &mut writer).expect("precompute");
                    writer.close().expect("close")
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_score_bucket, bench_precompute_workers);
criterion_main!(benches);
