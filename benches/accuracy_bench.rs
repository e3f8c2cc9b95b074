use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use gpu_fft_accuracy::reference::{ReferenceKey, ReferenceProvider};
use gpu_fft_accuracy::sim::{SimDevice, SimEngine};
use gpu_fft_accuracy::{
    AccuracyTest, HarnessConfig, ProblemDescription, ReferenceCache, RustFftReference,
    TransformKind,
};

/// Transform lengths swept by every benchmark group.
const SIZES: &[usize] = &[64, 1_024, 16_384, 262_144];

const DEVICE_BYTES: u64 = 1 << 30;

fn problem(n: usize, kind: TransformKind) -> ProblemDescription {
    ProblemDescription::builder([n], kind)
        .build()
        .expect("benchmark problems are valid")
}

// ── Reference ─────────────────────────────────────────────────────────────────

/// Host reference cost: seeded input generation, rustfft and both norms.
fn bench_reference(c: &mut Criterion) {
    let provider = RustFftReference::default();
    let mut group = c.benchmark_group("reference");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for &n in SIZES {
        let key = ReferenceKey::of(&problem(n, TransformKind::ComplexForward));
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &key, |b, key| {
            b.iter(|| provider.compute(black_box(key)));
        });
    }

    group.finish();
}

// ── Invocation ────────────────────────────────────────────────────────────────

/// One full invocation against the simulated engine with a warm reference.
///
/// The cache is filled before timing so only layout, transfers, execution
/// and validation are measured.
fn bench_invocation(c: &mut Criterion) {
    let engine = SimEngine::new(SimDevice::new(DEVICE_BYTES));
    let test = AccuracyTest::new(&engine, HarnessConfig::default());
    let mut group = c.benchmark_group("invocation");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for kind in [TransformKind::ComplexForward, TransformKind::RealForward] {
        for &n in SIZES {
            let p = problem(n, kind);
            let cache = ReferenceCache::new(RustFftReference::default());
            cache.get(&p).get();
            group.throughput(Throughput::Elements(n as u64));
            group.bench_with_input(BenchmarkId::new(format!("{kind:?}"), n), &p, |b, p| {
                b.iter(|| test.run_cached(black_box(p), &cache));
            });
        }
    }

    group.finish();
}

// ── Cold ──────────────────────────────────────────────────────────────────────

/// Invocation including the reference computation, as seen by the first
/// problem of each shape.
fn bench_cold(c: &mut Criterion) {
    let engine = SimEngine::new(SimDevice::new(DEVICE_BYTES));
    let test = AccuracyTest::new(&engine, HarnessConfig::default());
    let mut group = c.benchmark_group("cold");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for &n in SIZES {
        let p = problem(n, TransformKind::ComplexForward);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &p, |b, p| {
            b.iter_batched(
                || ReferenceCache::new(RustFftReference::default()),
                |cache| test.run_cached(black_box(p), &cache),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reference, bench_invocation, bench_cold);
criterion_main!(benches);
