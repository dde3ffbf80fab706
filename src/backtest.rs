//! Walk-forward backtest orchestration.
//!
//! The [`Backtester`] drives the configured test windows in ascending test
//! order. For each window it runs cross-validation, then prediction with the
//! configurations just selected, and files the results under the window's
//! [`TestId`]. A failed window is recorded in the [`RunSummary`] and the run
//! moves on; results already produced are kept.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::adapter::ModelRegistry;
use crate::cross_validation::{CrossValidationResult, CrossValidator};
use crate::data::ObservationSeries;
use crate::error::{ForecastError, Result};
use crate::predictor::{PredictionResult, Predictor};
use crate::search::SearchSettings;
use crate::types::{
    ByTest, Horizon, Metadata, ModelConfig, ModelKind, PairFailure, PredictionErrors,
    PredictionPoint, Stage, TestId,
};
use crate::walkforward::{validate_schedule, TestWindow};

/// Settings of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Feature columns fed to every model.
    pub features: Vec<String>,
    /// Label columns to forecast.
    pub horizons: Vec<Horizon>,
    pub search: SearchSettings,
    /// Run test windows concurrently.
    pub parallel_windows: bool,
    /// Run (horizon, model) pairs of a window concurrently.
    pub parallel_pairs: bool,
    /// Show a progress bar over windows.
    pub show_progress: bool,
    /// Add the weighted-average ensemble to each window's predictions.
    pub ensemble: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            horizons: Horizon::ALL.to_vec(),
            search: SearchSettings::default(),
            parallel_windows: false,
            parallel_pairs: true,
            show_progress: false,
            ensemble: true,
        }
    }
}

/// A window that was aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFailure {
    pub test: TestId,
    pub stage: Stage,
    pub kind: String,
    pub message: String,
}

impl WindowFailure {
    fn new(test: TestId, stage: Stage, error: &ForecastError) -> Self {
        Self {
            test,
            stage,
            kind: error.kind_name().to_string(),
            message: error.to_string(),
        }
    }

    /// Window failure for a window where every pair failed. Takes the kind
    /// of the first failure and lists every pair's message.
    fn from_pairs(test: TestId, failures: &[PairFailure]) -> Option<Self> {
        let first = failures.first()?;
        let details: Vec<String> = failures
            .iter()
            .map(|f| format!("{} {}: {}", f.horizon, f.model, f.message))
            .collect();
        Some(Self {
            test,
            stage: first.stage,
            kind: first.kind.clone(),
            message: format!("every pair failed: {}", details.join("; ")),
        })
    }
}

/// A pair failure, tagged with its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPairFailure {
    pub test: TestId,
    #[serde(flatten)]
    pub failure: PairFailure,
}

/// Run-level error summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub windows_run: usize,
    pub windows_completed: usize,
    pub window_failures: Vec<WindowFailure>,
    pub pair_failures: Vec<TestPairFailure>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.window_failures.is_empty() && self.pair_failures.is_empty()
    }

    pub fn failed_tests(&self) -> Vec<TestId> {
        self.window_failures.iter().map(|f| f.test).collect()
    }
}

/// Everything a run produces, keyed by test, horizon and model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestReport {
    pub optimal_params: ByTest<ModelConfig>,
    pub cv_metadata: ByTest<Metadata>,
    pub cv_predictions: ByTest<Vec<PredictionPoint>>,
    pub pred_metadata: ByTest<Metadata>,
    pub prediction_errors: ByTest<PredictionErrors>,
    pub full_predictions: ByTest<Vec<PredictionPoint>>,
    pub summary: RunSummary,
}

impl BacktestReport {
    /// Models with at least one out-of-sample record, in model order.
    pub fn models(&self) -> Vec<ModelKind> {
        let models: BTreeSet<ModelKind> = self
            .full_predictions
            .values()
            .flat_map(|by_output| by_output.values())
            .flat_map(|by_model| by_model.keys().copied())
            .collect();
        models.into_iter().collect()
    }

    fn absorb(&mut self, outcome: WindowOutcome) {
        let test = outcome.test;
        self.summary.windows_run += 1;

        if let Some(cv) = outcome.cv {
            self.summary
                .pair_failures
                .extend(cv.failures.into_iter().map(|failure| TestPairFailure { test, failure }));
            self.optimal_params.insert(test, cv.optimal_params);
            self.cv_metadata.insert(test, cv.metadata);
            self.cv_predictions.insert(test, cv.predictions);
        }
        if let Some(pred) = outcome.prediction {
            self.summary
                .pair_failures
                .extend(pred.failures.into_iter().map(|failure| TestPairFailure { test, failure }));
            self.pred_metadata.insert(test, pred.metadata);
            self.prediction_errors.insert(test, pred.errors);
            self.full_predictions.insert(test, pred.predictions);
        }
        match outcome.failure {
            Some(failure) => self.summary.window_failures.push(failure),
            None => self.summary.windows_completed += 1,
        }
    }
}

struct WindowOutcome {
    test: TestId,
    cv: Option<CrossValidationResult>,
    prediction: Option<PredictionResult>,
    failure: Option<WindowFailure>,
}

/// Drives cross-validation and prediction over a schedule of test windows.
pub struct Backtester {
    config: BacktestConfig,
    registry: ModelRegistry,
    windows: Vec<TestWindow>,
}

impl Backtester {
    /// Fails if the schedule is empty or out of order, or no model is
    /// registered.
    pub fn new(
        config: BacktestConfig,
        registry: ModelRegistry,
        windows: Vec<TestWindow>,
    ) -> Result<Self> {
        validate_schedule(&windows)?;
        if registry.is_empty() {
            return Err(ForecastError::ConfigError("no models registered".to_string()));
        }
        if config.horizons.is_empty() {
            return Err(ForecastError::ConfigError("no horizons configured".to_string()));
        }
        Ok(Self {
            config,
            registry,
            windows,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn windows(&self) -> &[TestWindow] {
        &self.windows
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run one window. Never fails: errors land in the outcome.
    fn run_window(&self, data: &ObservationSeries, window: &TestWindow) -> WindowOutcome {
        let test = window.test();
        info!("{}: starting", test);

        let cv = match CrossValidator::new(&self.config, &self.registry, window).run(data) {
            Ok(cv) => cv,
            Err(e) => {
                warn!("{} aborted during cross-validation: {}", test, e);
                return WindowOutcome {
                    test,
                    cv: None,
                    prediction: None,
                    failure: Some(WindowFailure::new(test, Stage::CrossValidation, &e)),
                };
            }
        };

        if cv.configured_pairs() == 0 {
            if let Some(failure) = WindowFailure::from_pairs(test, &cv.failures) {
                warn!("{} aborted during cross-validation: {}", test, failure.message);
                return WindowOutcome {
                    test,
                    cv: Some(cv),
                    prediction: None,
                    failure: Some(failure),
                };
            }
        }

        match Predictor::new(&self.config, &self.registry, window).run(data, &cv) {
            Ok(prediction) => WindowOutcome {
                test,
                cv: Some(cv),
                prediction: Some(prediction),
                failure: None,
            },
            Err(e) => {
                warn!("{} aborted during prediction: {}", test, e);
                WindowOutcome {
                    test,
                    cv: Some(cv),
                    prediction: None,
                    failure: Some(WindowFailure::new(test, Stage::Prediction, &e)),
                }
            }
        }
    }

    /// Run every window and collect the results.
    ///
    /// Window failures never abort the run; see [`BacktestReport::summary`].
    pub fn run(&self, data: &ObservationSeries) -> Result<BacktestReport> {
        if data.is_empty() {
            return Err(ForecastError::DataError("observation table is empty".to_string()));
        }
        info!(
            "Running backtest: {} windows, {} models, {} horizons",
            self.windows.len(),
            self.registry.len(),
            self.config.horizons.len()
        );

        let progress = if self.config.show_progress {
            let pb = ProgressBar::new(self.windows.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        let outcomes: Vec<WindowOutcome> = if self.config.parallel_windows {
            self.windows
                .par_iter()
                .map(|w| {
                    let outcome = self.run_window(data, w);
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    outcome
                })
                .collect()
        } else {
            self.windows
                .iter()
                .map(|w| {
                    if let Some(pb) = &progress {
                        pb.set_message(w.test().to_string());
                    }
                    let outcome = self.run_window(data, w);
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    outcome
                })
                .collect()
        };

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }

        let mut report = BacktestReport::default();
        for outcome in outcomes {
            report.absorb(outcome);
        }

        info!(
            "Backtest finished: {}/{} windows completed, {} pair failures",
            report.summary.windows_completed,
            report.summary.windows_run,
            report.summary.pair_failures.len()
        );

        Ok(report)
    }
}
