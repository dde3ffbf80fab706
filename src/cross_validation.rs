//! Per-window nested cross-validation.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapter::{ModelAdapter, ModelRegistry, SearchOutcome, SearchRequest};
use crate::backtest::BacktestConfig;
use crate::data::ObservationSeries;
use crate::error::{ForecastError, Result};
use crate::types::{
    ByOutput, Horizon, Metadata, ModelConfig, ModelKind, PairFailure, PredictionPoint, Stage,
};
use crate::walkforward::TestWindow;

/// Optimal configurations, metadata and validation predictions of one
/// window, keyed by horizon then model.
#[derive(Debug, Clone, Default)]
pub struct CrossValidationResult {
    pub optimal_params: ByOutput<ModelConfig>,
    pub metadata: ByOutput<Metadata>,
    pub predictions: ByOutput<Vec<PredictionPoint>>,
    /// Pairs whose search failed; they have no entry in the maps above.
    pub failures: Vec<PairFailure>,
}

impl CrossValidationResult {
    pub fn config(&self, horizon: Horizon, model: ModelKind) -> Option<&ModelConfig> {
        self.optimal_params.get(&horizon)?.get(&model)
    }

    pub fn failure(&self, horizon: Horizon, model: ModelKind) -> Option<&PairFailure> {
        self.failures
            .iter()
            .find(|f| f.horizon == horizon && f.model == model)
    }

    /// Number of (horizon, model) pairs with a configuration.
    pub fn configured_pairs(&self) -> usize {
        self.optimal_params.values().map(|m| m.len()).sum()
    }

    fn insert(&mut self, horizon: Horizon, outcome: SearchOutcome) {
        let model = outcome.config.model;
        self.optimal_params
            .entry(horizon)
            .or_default()
            .insert(model, outcome.config);
        self.metadata
            .entry(horizon)
            .or_default()
            .insert(model, outcome.metadata);
        self.predictions
            .entry(horizon)
            .or_default()
            .insert(model, outcome.validation);
    }
}

/// Check that every feature and label column the run needs exists.
pub(crate) fn check_columns(
    data: &ObservationSeries,
    features: &[String],
    horizons: &[Horizon],
) -> Result<()> {
    if features.is_empty() {
        return Err(ForecastError::ConfigError("no feature columns configured".to_string()));
    }
    let missing: Vec<&str> = features
        .iter()
        .map(String::as_str)
        .chain(horizons.iter().map(|h| h.column()))
        .filter(|c| !data.has_column(c))
        .collect();
    if !missing.is_empty() {
        return Err(ForecastError::DataError(format!(
            "missing columns: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Runs every adapter's search over one window's cross-validation period.
pub struct CrossValidator<'a> {
    config: &'a BacktestConfig,
    registry: &'a ModelRegistry,
    window: &'a TestWindow,
}

impl<'a> CrossValidator<'a> {
    pub fn new(
        config: &'a BacktestConfig,
        registry: &'a ModelRegistry,
        window: &'a TestWindow,
    ) -> Self {
        Self {
            config,
            registry,
            window,
        }
    }

    /// Search every (horizon, model) pair.
    ///
    /// Pair-scoped failures are recorded in the result; any other error
    /// aborts the window.
    pub fn run(&self, data: &ObservationSeries) -> Result<CrossValidationResult> {
        let window = self.window;
        check_columns(data, &self.config.features, &self.config.horizons)?;

        let rows = data.range_indices(window.cv_start(), window.cv_end());
        if rows.is_empty() {
            return Err(ForecastError::RangeNotFound {
                start: window.cv_start(),
                end: window.cv_end(),
            });
        }
        info!(
            "{}: cross-validating {} rows ({} to {})",
            window.test(),
            rows.len(),
            window.cv_start(),
            window.cv_end()
        );

        let pairs: Vec<(Horizon, &Arc<dyn ModelAdapter>)> = self
            .config
            .horizons
            .iter()
            .flat_map(|&h| self.registry.iter().map(move |a| (h, a)))
            .collect();

        let search = |&(horizon, adapter): &(Horizon, &Arc<dyn ModelAdapter>)| {
            let request = SearchRequest {
                data,
                features: &self.config.features,
                horizon,
                window,
                settings: &self.config.search,
            };
            (horizon, adapter.kind(), adapter.search(&request))
        };

        let outcomes: Vec<_> = if self.config.parallel_pairs {
            pairs.par_iter().map(search).collect()
        } else {
            pairs.iter().map(search).collect()
        };

        let mut result = CrossValidationResult::default();
        let mut by_horizon: BTreeMap<Horizon, usize> = BTreeMap::new();
        for (horizon, model, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    *by_horizon.entry(horizon).or_default() += 1;
                    result.insert(horizon, outcome);
                }
                Err(e) if e.is_pair_scoped() => {
                    warn!("{} {} {}: {}", window.test(), horizon, model, e);
                    result
                        .failures
                        .push(PairFailure::new(horizon, model, Stage::CrossValidation, &e));
                }
                Err(e) => return Err(e),
            }
        }

        for (horizon, count) in by_horizon {
            info!("{} {}: {} models selected", window.test(), horizon, count);
        }

        Ok(result)
    }
}
