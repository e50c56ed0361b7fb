//! Criterion benchmarks for OptLab hot paths.
//!
//! Benchmarks:
//! 1. Full `apply_loop` replay over a synthetic multi-asset table
//! 2. Grid extraction over a three-axis space
//! 3. Result pool cut after a large batch

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use optlab_core::{
    apply_loop, CashPlan, Cost, Extraction, LoopOptions, ParamValue, PriceTable, ResultPool,
    SignalMatrix, Space,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_tables(n_dates: usize, n_assets: usize) -> (PriceTable, SignalMatrix) {
    let base = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    let dates: Vec<NaiveDate> = (0..n_dates).map(|i| base + Duration::days(i as i64)).collect();
    let columns: Vec<String> = (0..n_assets).map(|j| format!("A{j}")).collect();
    let prices = (0..n_dates)
        .map(|i| {
            (0..n_assets)
                .map(|j| 100.0 + ((i + j) as f64 * 0.1).sin() * 10.0)
                .collect()
        })
        .collect();
    let signals = (0..n_dates)
        .map(|i| {
            (0..n_assets)
                .map(|j| ((i * 7 + j * 3) as f64 * 0.37).sin() * 0.5)
                .collect()
        })
        .collect();
    (
        PriceTable::new(dates.clone(), columns.clone(), prices).unwrap(),
        SignalMatrix::new(dates, columns, signals).unwrap(),
    )
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_apply_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_loop");
    for &(n_dates, n_assets) in &[(252, 5), (2520, 20)] {
        let (prices, signals) = make_tables(n_dates, n_assets);
        let plan = CashPlan::single(prices.dates()[0], 1_000_000.0).unwrap();
        let cost = Cost::default();
        let options = LoopOptions::with_lot_size(100.0);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{n_dates}x{n_assets}")),
            &(prices, signals),
            |b, (prices, signals)| {
                b.iter(|| {
                    apply_loop(
                        black_box(signals),
                        black_box(prices),
                        Some(&cost),
                        Some(&plan),
                        &options,
                    )
                    .unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_grid_extract(c: &mut Criterion) {
    let space = Space::new(
        &[
            vec![ParamValue::Int(1), ParamValue::Int(100)],
            vec![ParamValue::Float(0.0), ParamValue::Float(1.0)],
            vec!["a".into(), "b".into(), "c".into()],
        ],
        &[],
    )
    .unwrap();
    c.bench_function("grid_extract_3d", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(0);
            space
                .extract(&[1.0, 0.01, 1.0], Extraction::Interval, &mut rng)
                .unwrap()
                .count()
        })
    });
}

fn bench_pool_cut(c: &mut Criterion) {
    c.bench_function("pool_cut_100k", |b| {
        b.iter(|| {
            let mut pool = ResultPool::new(100);
            for i in 0..100_000u32 {
                pool.in_pool(i, ((i as f64) * 0.618).sin());
            }
            pool.cut(true);
            black_box(pool.len())
        })
    });
}

criterion_group!(benches, bench_apply_loop, bench_grid_extract, bench_pool_cut);
criterion_main!(benches);
