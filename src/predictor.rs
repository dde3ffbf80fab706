//! Out-of-sample prediction for one window.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapter::{ModelAdapter, ModelRegistry, PredictOutcome, PredictRequest};
use crate::backtest::BacktestConfig;
use crate::cross_validation::{check_columns, CrossValidationResult};
use crate::data::ObservationSeries;
use crate::ensemble::weighted_average;
use crate::error::{ForecastError, Result};
use crate::types::{
    ByOutput, Horizon, Metadata, ModelConfig, ModelKind, PairFailure, PredictionErrors,
    PredictionPoint, Stage,
};
use crate::walkforward::TestWindow;

/// Rows of the table whose date lies in `[start, end]`.
///
/// Fails with [`ForecastError::RangeNotFound`] when there are none.
pub fn prediction_indices(
    data: &ObservationSeries,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<usize>> {
    let rows = data.range_indices(start, end);
    if rows.is_empty() {
        return Err(ForecastError::RangeNotFound { start, end });
    }
    Ok(rows.collect())
}

/// Predictions, error metrics and metadata of one window.
#[derive(Debug, Clone, Default)]
pub struct PredictionResult {
    pub predictions: ByOutput<Vec<PredictionPoint>>,
    pub errors: ByOutput<PredictionErrors>,
    pub metadata: ByOutput<Metadata>,
    pub failures: Vec<PairFailure>,
}

impl PredictionResult {
    fn insert(
        &mut self,
        horizon: Horizon,
        model: ModelKind,
        predictions: Vec<PredictionPoint>,
        errors: PredictionErrors,
        metadata: Metadata,
    ) {
        self.predictions
            .entry(horizon)
            .or_default()
            .insert(model, predictions);
        self.errors.entry(horizon).or_default().insert(model, errors);
        self.metadata
            .entry(horizon)
            .or_default()
            .insert(model, metadata);
    }
}

/// Applies the configurations chosen by cross-validation to the window's
/// prediction period.
pub struct Predictor<'a> {
    config: &'a BacktestConfig,
    registry: &'a ModelRegistry,
    window: &'a TestWindow,
}

impl<'a> Predictor<'a> {
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

    /// Resolve a configuration for every pair.
    ///
    /// Pairs whose search failed are skipped. A pair with neither a
    /// configuration nor a recorded failure means cross-validation never ran
    /// for it, which is an error.
    fn resolve<'c>(
        &self,
        cv: &'c CrossValidationResult,
    ) -> Result<Vec<(Horizon, &'a Arc<dyn ModelAdapter>, &'c ModelConfig)>> {
        let mut tasks = Vec::new();
        for &horizon in &self.config.horizons {
            for adapter in self.registry.iter() {
                let model = adapter.kind();
                match cv.config(horizon, model) {
                    Some(config) => tasks.push((horizon, adapter, config)),
                    None if cv.failure(horizon, model).is_some() => {
                        debug!("{} {} {}: no configuration, skipped", self.window.test(), horizon, model);
                    }
                    None => {
                        return Err(ForecastError::ConfigurationMissing {
                            test: self.window.test(),
                            horizon,
                            model,
                        })
                    }
                }
            }
        }

        if tasks.is_empty() {
            // Name a pair that actually failed when there is one.
            let (horizon, model) = match cv.failures.first() {
                Some(f) => (f.horizon, f.model),
                None => (
                    self.config.horizons.first().copied().unwrap_or(Horizon::Now),
                    self.registry
                        .kinds()
                        .first()
                        .copied()
                        .unwrap_or(ModelKind::WeightedAverage),
                ),
            };
            return Err(ForecastError::ConfigurationMissing {
                test: self.window.test(),
                horizon,
                model,
            });
        }
        Ok(tasks)
    }

    pub fn run(
        &self,
        data: &ObservationSeries,
        cv: &CrossValidationResult,
    ) -> Result<PredictionResult> {
        let window = self.window;
        check_columns(data, &self.config.features, &self.config.horizons)?;
        let indices = prediction_indices(data, window.pred_start(), window.pred_end())?;
        let tasks = self.resolve(cv)?;
        info!(
            "{}: predicting {} rows ({} to {})",
            window.test(),
            indices.len(),
            window.pred_start(),
            window.pred_end()
        );

        let predict = |(horizon, adapter, config): &(Horizon, &Arc<dyn ModelAdapter>, &ModelConfig)| {
            let request = PredictRequest {
                data,
                features: &self.config.features,
                horizon: *horizon,
                indices: &indices,
                config,
                settings: &self.config.search,
            };
            let outcome: Result<PredictOutcome> = adapter.predict(&request);
            (*horizon, adapter.kind(), outcome)
        };

        let outcomes: Vec<_> = if self.config.parallel_pairs {
            tasks.par_iter().map(predict).collect()
        } else {
            tasks.iter().map(predict).collect()
        };

        let mut result = PredictionResult::default();
        for (horizon, model, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    debug!(
                        "{} {} {}: {} mismatches over {} rows",
                        window.test(),
                        horizon,
                        model,
                        outcome.errors.mismatches,
                        outcome.errors.observations
                    );
                    result.insert(
                        horizon,
                        model,
                        outcome.predictions,
                        outcome.errors,
                        outcome.metadata,
                    );
                }
                Err(e) if e.is_pair_scoped() => {
                    warn!("{} {} {}: {}", window.test(), horizon, model, e);
                    result
                        .failures
                        .push(PairFailure::new(horizon, model, Stage::Prediction, &e));
                }
                Err(e) => return Err(e),
            }
        }

        if self.config.ensemble {
            self.add_ensemble(cv, &mut result);
        }

        Ok(result)
    }

    fn add_ensemble(&self, cv: &CrossValidationResult, result: &mut PredictionResult) {
        for &horizon in &self.config.horizons {
            let (Some(validation), Some(members)) =
                (cv.predictions.get(&horizon), result.predictions.get(&horizon))
            else {
                continue;
            };
            if let Some(outcome) = weighted_average(validation, members, self.config.search.threshold)
            {
                result.insert(
                    horizon,
                    ModelKind::WeightedAverage,
                    outcome.predictions,
                    outcome.errors,
                    outcome.metadata,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Months;

    fn monthly(n: usize) -> ObservationSeries {
        let start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let dates = (0..n)
            .map(|i| start.checked_add_months(Months::new(i as u32)).unwrap())
            .collect();
        let spread: Vec<f64> = (0..n).map(|i| ((i as f64) * 0.25).sin()).collect();
        let label = spread.iter().map(|&s| f64::from(u8::from(s > 0.0))).collect();
        ObservationSeries::new(
            dates,
            vec![("spread".into(), spread), ("Recession".into(), label)],
        )
        .unwrap()
    }

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            features: vec!["spread".into()],
            horizons: vec![Horizon::Now],
            ..Default::default()
        }
    }

    #[test]
    fn test_prediction_indices() {
        let data = monthly(24);
        assert_eq!(
            prediction_indices(&data, date(1970, 3), date(1970, 5)).unwrap(),
            vec![2, 3, 4]
        );
        let err = prediction_indices(&data, date(1990, 1), date(1991, 1)).unwrap_err();
        assert!(matches!(err, ForecastError::RangeNotFound { .. }));
    }

    #[test]
    fn test_missing_configuration_is_surfaced() {
        let data = monthly(120);
        let config = config();
        let registry = ModelRegistry::with_models(&[ModelKind::NaiveBayes]);
        let window = TestWindow::new(1, date(1972, 1), date(1975, 12), date(1976, 1), date(1977, 12))
            .unwrap();

        let err = Predictor::new(&config, &registry, &window)
            .run(&data, &CrossValidationResult::default())
            .unwrap_err();
        assert!(matches!(err, ForecastError::ConfigurationMissing { .. }));
    }

    #[test]
    fn test_predictions_and_ensemble_cover_window() {
        let data = monthly(120);
        let config = config();
        let registry = ModelRegistry::with_models(&[ModelKind::NaiveBayes, ModelKind::Knn]);
        let window = TestWindow::new(1, date(1972, 1), date(1975, 12), date(1976, 1), date(1977, 12))
            .unwrap();

        let cv = crate::cross_validation::CrossValidator::new(&config, &registry, &window)
            .run(&data)
            .unwrap();
        let result = Predictor::new(&config, &registry, &window)
            .run(&data, &cv)
            .unwrap();

        let by_model = &result.predictions[&Horizon::Now];
        assert_eq!(by_model.len(), 3);
        for points in by_model.values() {
            assert_eq!(points.len(), 24);
            assert!(points.iter().all(|p| window.in_prediction(p.date)));
        }
        assert!(result.errors[&Horizon::Now].contains_key(&ModelKind::WeightedAverage));
    }
}
