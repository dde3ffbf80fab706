//! Example: Walk-Forward Recession Backtest
//!
//! Builds a synthetic monthly table, labels it from the NBER recession
//! table and backtests three model families over the six historical test
//! windows:
//! 1. Hyperparameters are chosen inside each cross-validation period
//! 2. The chosen configuration predicts the following out-of-sample period
//! 3. Models are refitted on all earlier rows as the period advances
//!
//! Run with: cargo run --example walkforward

use chrono::{Months, NaiveDate};
use recession_backtest::adapter::ModelRegistry;
use recession_backtest::aggregate::aggregate_model;
use recession_backtest::backtest::{BacktestConfig, Backtester};
use recession_backtest::data::ObservationSeries;
use recession_backtest::labels::{label_series, LabelConfig};
use recession_backtest::types::{Horizon, ModelKind};
use recession_backtest::walkforward::default_schedule;

/// Synthetic indicators that turn down ahead of each NBER recession.
fn generate_synthetic_data() -> ObservationSeries {
    let start = NaiveDate::from_ymd_opt(1965, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..57 * 12)
        .filter_map(|i| start.checked_add_months(Months::new(i)))
        .collect();

    let monthly = LabelConfig {
        rows_per_year: 12,
        ..Default::default()
    };
    let placeholder = ObservationSeries::new(dates.clone(), vec![]).unwrap();
    let labeled = label_series(&placeholder, &monthly).unwrap();
    let ahead = labeled.column("Recession_within_12mo").unwrap().to_vec();

    // The spread inverts in the year before a recession; payrolls weaken.
    let n = dates.len();
    let spread: Vec<f64> = (0..n)
        .map(|i| {
            let lead = ahead.get(i + 12).copied().unwrap_or(0.0);
            1.5 - 2.0 * lead + ((i as f64) * 0.4).sin() * 0.4
        })
        .collect();
    let payrolls: Vec<f64> = (0..n)
        .map(|i| {
            let lead = ahead.get(i + 6).copied().unwrap_or(0.0);
            0.8 - 1.2 * lead + ((i as f64) * 0.9).cos() * 0.3
        })
        .collect();

    let base = ObservationSeries::new(
        dates,
        vec![
            ("3M_10Y_Treasury_Spread".to_string(), spread),
            ("Payrolls_3mo_vs_12mo".to_string(), payrolls),
        ],
    )
    .unwrap();
    label_series(&base, &monthly).unwrap()
}

fn main() {
    println!("=== Walk-Forward Recession Backtest ===\n");

    let data = generate_synthetic_data();
    println!(
        "Observations: {} ({} to {})",
        data.len(),
        data.first_date().unwrap(),
        data.last_date().unwrap()
    );

    let config = BacktestConfig {
        features: vec![
            "3M_10Y_Treasury_Spread".to_string(),
            "Payrolls_3mo_vs_12mo".to_string(),
        ],
        horizons: vec![Horizon::Within6Months, Horizon::Within12Months],
        ..Default::default()
    };
    let registry = ModelRegistry::with_models(&[
        ModelKind::ElasticNet,
        ModelKind::NaiveBayes,
        ModelKind::Knn,
    ]);

    let backtester = Backtester::new(config, registry, default_schedule()).unwrap();
    let report = backtester.run(&data).unwrap();

    println!(
        "\nWindows completed: {}/{}",
        report.summary.windows_completed, report.summary.windows_run
    );
    for failure in &report.summary.window_failures {
        println!("  {} failed during {}: {}", failure.test, failure.stage, failure.message);
    }

    println!("\nSelected configurations (12 month horizon):");
    for (test, by_output) in &report.optimal_params {
        if let Some(by_model) = by_output.get(&Horizon::Within12Months) {
            for (model, config) in by_model {
                println!("  {} {:<16} {}", test, model.to_string(), config.key());
            }
        }
    }

    println!("\nOut-of-sample Brier scores (12 month horizon):");
    for (test, by_output) in &report.prediction_errors {
        if let Some(by_model) = by_output.get(&Horizon::Within12Months) {
            for (model, errors) in by_model {
                println!(
                    "  {} {:<16} brier={:.4} mismatches={}/{}",
                    test,
                    model.to_string(),
                    errors.brier_score,
                    errors.mismatches,
                    errors.observations
                );
            }
        }
    }

    for model in report.models() {
        let table = aggregate_model(&report.full_predictions, model).unwrap();
        println!(
            "\n{}: {} rows across {} tests",
            model,
            table.rows.len(),
            table.segments.len()
        );
    }
}
