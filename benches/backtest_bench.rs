//! Performance benchmarks for the recession backtester.
//!
//! Run with: cargo bench

use chrono::{Days, Months, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use recession_backtest::adapter::ModelRegistry;
use recession_backtest::backtest::{BacktestConfig, Backtester};
use recession_backtest::data::ObservationSeries;
use recession_backtest::labels::{derive_horizon_flags, label_series, LabelConfig};
use recession_backtest::models::standard_classifiers;
use recession_backtest::search::{grid_search, Deadline, SearchSettings};
use recession_backtest::types::{Horizon, ModelKind};
use recession_backtest::walkforward::default_schedule;

/// Generate a feature matrix with a label that loosely follows the first
/// feature.
fn generate_matrix(rows: usize) -> (Array2<f64>, Array1<u8>) {
    let x = Array2::from_shape_fn((rows, 3), |(i, j)| {
        let t = i as f64;
        match j {
            0 => (t * 0.07).sin(),
            1 => (t * 0.013).cos(),
            _ => (t * 0.31).sin() * 0.5,
        }
    });
    let y = x
        .rows()
        .into_iter()
        .map(|r| u8::from(r[0] + 0.3 * r[2] > 0.6))
        .collect();
    (x, y)
}

/// Monthly observations covering the six default windows, labeled from
/// the NBER table.
fn generate_monthly_series() -> ObservationSeries {
    let start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let n = 52 * 12;
    let dates: Vec<NaiveDate> = (0..n)
        .filter_map(|i| start.checked_add_months(Months::new(i)))
        .collect();
    let columns: Vec<(String, Vec<f64>)> = (0..3)
        .map(|k| {
            let values: Vec<f64> = (0..dates.len())
                .map(|i| ((i as f64) * (0.05 + 0.04 * k as f64)).sin())
                .collect();
            (format!("f{}", k), values)
        })
        .collect();

    let base = ObservationSeries::new(dates, columns).unwrap();
    let config = LabelConfig {
        rows_per_year: 12,
        ..Default::default()
    };
    label_series(&base, &config).unwrap()
}

/// Benchmark the nested hyperparameter search of each model family.
fn bench_search(c: &mut Criterion) {
    let (x, y) = generate_matrix(120);
    let settings = SearchSettings::default();

    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);

    for classifier in standard_classifiers() {
        group.bench_with_input(
            BenchmarkId::new("model", classifier.kind()),
            &classifier,
            |b, classifier| {
                b.iter(|| {
                    grid_search(
                        classifier.as_ref(),
                        black_box(x.view()),
                        black_box(y.view()),
                        &settings,
                        &Deadline::unlimited(),
                    )
                })
            },
        );
    }

    group.finish();
}

/// Benchmark label derivation on a daily-sized table.
fn bench_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("labels");

    let start = NaiveDate::from_ymd_opt(1960, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..15_000u64)
        .filter_map(|i| start.checked_add_days(Days::new(i)))
        .collect();
    let recession: Vec<u8> = (0..dates.len()).map(|i| u8::from(i % 2_000 < 150)).collect();

    for offset in [126, 253, 506] {
        group.bench_with_input(BenchmarkId::new("horizon_flags", offset), &offset, |b, &offset| {
            b.iter(|| derive_horizon_flags(black_box(&recession), offset))
        });
    }

    let base = ObservationSeries::new(dates, vec![("x".to_string(), vec![0.0; 15_000])])
        .unwrap();
    group.bench_function("label_series", |b| {
        b.iter(|| label_series(black_box(&base), &LabelConfig::default()))
    });

    group.finish();
}

/// Benchmark a full backtest over the default schedule.
fn bench_backtest(c: &mut Criterion) {
    let data = generate_monthly_series();
    let config = BacktestConfig {
        features: vec!["f0".into(), "f1".into(), "f2".into()],
        horizons: vec![Horizon::Within12Months],
        ..Default::default()
    };

    let mut group = c.benchmark_group("backtest");
    group.sample_size(10);

    for (name, models) in [
        ("fast_models", vec![ModelKind::NaiveBayes, ModelKind::ElasticNet]),
        ("all_models", ModelKind::ADAPTERS.to_vec()),
    ] {
        let backtester = Backtester::new(
            config.clone(),
            ModelRegistry::with_models(&models),
            default_schedule(),
        )
        .unwrap();

        group.bench_function(name, |b| b.iter(|| backtester.run(black_box(&data))));
    }

    group.finish();
}

criterion_group!(benches, bench_search, bench_labels, bench_backtest);

criterion_main!(benches);
