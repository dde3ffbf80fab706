//! End-to-end runs driven by a [`RunConfig`].

use tracing::{info, warn};

use crate::adapter::ModelRegistry;
use crate::aggregate::ModelTable;
use crate::backtest::{BacktestReport, Backtester};
use crate::config::RunConfig;
use crate::data::ObservationSeries;
use crate::error::Result;
use crate::export::ResultStore;
use crate::metadata::RunManifest;
use crate::types::ModelKind;

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: BacktestReport,
    pub manifest: RunManifest,
    pub tables: Vec<ModelTable>,
}

/// Load the configured data, run every window and persist the results.
pub fn run(config: &RunConfig) -> Result<RunOutput> {
    config.validate()?;
    let data = config.load_observations()?;
    run_with(config, config.registry(), &data)
}

/// Run on already loaded observations with an explicit model registry.
///
/// The data file is checksummed into the manifest when it exists.
pub fn run_with(
    config: &RunConfig,
    registry: ModelRegistry,
    data: &ObservationSeries,
) -> Result<RunOutput> {
    let backtest_config = config.to_backtest_config()?;
    let mut models = registry.kinds();
    if backtest_config.ensemble {
        models.push(ModelKind::WeightedAverage);
    }

    let mut manifest = RunManifest::begin(&backtest_config, &config.windows, &models);
    if config.data.path.exists() {
        manifest = manifest.with_data_file(&config.data.path);
    }
    info!("Run {} started", manifest.run_id);

    let backtester = Backtester::new(backtest_config, registry, config.windows.clone())?;
    let report = backtester.run(data)?;

    let store = ResultStore::new(&config.output.dir);
    store.save_report(&report)?;
    let tables = if config.output.tables {
        store.save_tables(&report.full_predictions)?
    } else {
        Vec::new()
    };

    manifest.finish(report.summary.clone());
    store.save_manifest(&manifest)?;

    if !report.summary.is_clean() {
        warn!(
            "Run {} finished with {} window failures and {} pair failures",
            manifest.run_id,
            report.summary.window_failures.len(),
            report.summary.pair_failures.len()
        );
    }

    Ok(RunOutput {
        report,
        manifest,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{FULL_PREDICTIONS, RUN_MANIFEST};
    use crate::labels::RecessionEpisode;
    use crate::types::Horizon;
    use crate::walkforward::TestWindow;
    use chrono::{Months, NaiveDate};
    use std::io::Write;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn write_monthly_csv(path: &std::path::Path) {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(file, "date,spread").unwrap();
        for i in 0..192u32 {
            let d = date(1990, 1).checked_add_months(Months::new(i)).unwrap();
            let spread = ((i as f64) * 0.37).sin() + if i % 40 > 30 { -1.5 } else { 0.5 };
            writeln!(file, "{},{:.4}", d, spread).unwrap();
        }
    }

    fn config(dir: &std::path::Path) -> RunConfig {
        let mut config = RunConfig::default();
        config.models = vec![ModelKind::NaiveBayes, ModelKind::WeightedAverage];
        config.horizons = vec![Horizon::Now, Horizon::Within6Months];
        config.data.path = dir.join("observations.csv");
        config.data.features = vec!["spread".to_string()];
        config.labels.apply = true;
        config.labels.rows_per_year = 12;
        config.labels.episodes = Some(vec![
            RecessionEpisode {
                begin: date(1991, 1),
                end: date(1991, 6),
            },
            RecessionEpisode {
                begin: date(1993, 3),
                end: date(1993, 10),
            },
            RecessionEpisode {
                begin: date(2001, 3),
                end: date(2001, 11),
            },
        ]);
        config.output.dir = dir.join("results");
        config.run.show_progress = false;
        config.windows = vec![TestWindow::new(
            1,
            date(1990, 1),
            date(1997, 12),
            date(1998, 1),
            date(2002, 12),
        )
        .unwrap()];
        config
    }

    #[test]
    fn test_run_writes_results_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_monthly_csv(&config.data.path);

        let output = run(&config).unwrap();
        assert_eq!(output.report.summary.windows_run, 1);

        let store = ResultStore::new(&config.output.dir);
        assert!(store.path(FULL_PREDICTIONS).exists());
        assert!(store.path(RUN_MANIFEST).exists());

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.run_id, output.manifest.run_id);
        assert!(manifest.data_file.is_some());
        assert!(manifest.summary.is_some());
        assert_eq!(
            manifest.models,
            vec![ModelKind::NaiveBayes, ModelKind::WeightedAverage]
        );
    }

    #[test]
    fn test_missing_data_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert!(run(&config).is_err());
        assert!(!config.output.dir.exists());
    }
}
