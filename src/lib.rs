//! Walk-forward backtesting of recession forecasting models.
//!
//! # Overview
//!
//! The backtester evaluates binary recession classifiers on historical
//! macroeconomic series without look-ahead:
//!
//! - **Test windows**: each window pairs a cross-validation period with a
//!   strictly later out-of-sample period
//! - **Nested search**: hyperparameters are scored on expanding walk-forward
//!   splits inside the cross-validation period only
//! - **Refitting prediction**: out-of-sample rows are predicted by models
//!   trained exclusively on earlier rows
//! - **Isolated failures**: a failing model or window is recorded and the
//!   run continues
//! - **Ensemble**: a weighted average of the models, weighted by validation skill
//! - **Reproducible runs**: TOML configuration, JSON results, run manifests
//!
//! # Quick Start
//!
//! ```no_run
//! use recession_backtest::{
//!     adapter::ModelRegistry,
//!     backtest::{BacktestConfig, Backtester},
//!     data::{load_csv, DataConfig},
//!     walkforward::default_schedule,
//! };
//!
//! let data = load_csv("data/final_features.csv", &DataConfig::default()).unwrap();
//!
//! let config = BacktestConfig {
//!     features: vec!["3M_10Y_Treasury_Spread".to_string()],
//!     ..Default::default()
//! };
//! let backtester =
//!     Backtester::new(config, ModelRegistry::standard(), default_schedule()).unwrap();
//!
//! let report = backtester.run(&data).unwrap();
//! for (test, errors) in &report.prediction_errors {
//!     println!("{}: {} horizons", test, errors.len());
//! }
//! ```
//!
//! # Custom Models
//!
//! Implement [`models::Classifier`] and register it through
//! [`adapter::WalkForwardAdapter`]:
//!
//! ```
//! use ndarray::{Array1, ArrayView1, ArrayView2};
//! use recession_backtest::adapter::{ModelRegistry, WalkForwardAdapter};
//! use recession_backtest::models::{Classifier, ModelError};
//! use recession_backtest::types::{Hyperparams, ModelKind};
//! use std::sync::Arc;
//!
//! struct Prior;
//!
//! impl Classifier for Prior {
//!     fn kind(&self) -> ModelKind {
//!         ModelKind::NaiveBayes
//!     }
//!
//!     fn param_grid(&self) -> Vec<Hyperparams> {
//!         vec![Hyperparams::new()]
//!     }
//!
//!     fn fit_predict(
//!         &self,
//!         _train_x: ArrayView2<'_, f64>,
//!         train_y: ArrayView1<'_, u8>,
//!         query_x: ArrayView2<'_, f64>,
//!         _params: &Hyperparams,
//!     ) -> Result<Array1<f64>, ModelError> {
//!         let rate = train_y.mapv(f64::from).mean().unwrap_or(0.0);
//!         Ok(Array1::from_elem(query_x.nrows(), rate))
//!     }
//! }
//!
//! let mut registry = ModelRegistry::new();
//! registry.register(Arc::new(WalkForwardAdapter::new(Prior)));
//! assert_eq!(registry.kinds(), vec![ModelKind::NaiveBayes]);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Horizons, model identifiers, configurations, prediction records
//! - [`data`]: Observation series and CSV loading
//! - [`labels`]: Recession episode labeling
//! - [`walkforward`]: Test windows and walk-forward splits
//! - [`models`]: The six classifier families
//! - [`search`]: Nested hyperparameter search
//! - [`adapter`]: Model adapter interface and registry
//! - [`cross_validation`]: Per-window configuration selection
//! - [`predictor`]: Out-of-sample prediction
//! - [`ensemble`]: Weighted-average ensemble
//! - [`backtest`]: The orchestrator
//! - [`aggregate`]: Per-model comparison tables
//! - [`export`]: Result persistence
//! - [`metadata`]: Run manifests
//! - [`config`]: TOML configuration file support
//! - [`pipeline`]: Config-driven end-to-end runs

pub mod adapter;
pub mod aggregate;
pub mod backtest;
pub mod config;
pub mod cross_validation;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod export;
pub mod labels;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod search;
pub mod types;
pub mod walkforward;

// Re-exports for convenience
pub use adapter::{ModelAdapter, ModelRegistry, WalkForwardAdapter};
pub use aggregate::{aggregate_all, aggregate_model, ComparisonRow, ModelTable};
pub use backtest::{BacktestConfig, BacktestReport, Backtester, RunSummary};
pub use config::RunConfig;
pub use cross_validation::{CrossValidationResult, CrossValidator};
pub use data::{load_csv, DataConfig, ObservationSeries};
pub use error::{ForecastError, Result};
pub use export::ResultStore;
pub use labels::{label_series, LabelConfig, RecessionEpisode};
pub use predictor::{PredictionResult, Predictor};
pub use search::SearchSettings;
pub use types::{
    ByOutput, ByTest, Horizon, Hyperparams, ModelConfig, ModelKind, PredictionErrors,
    PredictionPoint, TestId,
};
pub use walkforward::{default_schedule, TestWindow};
