//! Model adapters and the adapter registry.
//!
//! A [`ModelAdapter`] is the uniform contract the orchestrator sees:
//! `search` picks a configuration inside a cross-validation window and
//! `predict` applies a fixed configuration to chosen rows. Both are pure
//! over the data they are given.

use ndarray::{s, Axis};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::data::ObservationSeries;
use crate::error::{ForecastError, Result};
use crate::models::{classifier_for, Classifier};
use crate::search::{adapter_failure, grid_search, Deadline, SearchSettings};
use crate::types::{
    Horizon, Metadata, ModelConfig, ModelKind, PredictionErrors, PredictionPoint,
};
use crate::walkforward::TestWindow;

/// Inputs to a hyperparameter search.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub data: &'a ObservationSeries,
    pub features: &'a [String],
    pub horizon: Horizon,
    pub window: &'a TestWindow,
    pub settings: &'a SearchSettings,
}

/// Chosen configuration and its validation record.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub config: ModelConfig,
    /// Dates inside the cross-validation period only.
    pub validation: Vec<PredictionPoint>,
    pub metadata: Metadata,
}

/// Inputs to an out-of-sample prediction.
#[derive(Debug, Clone, Copy)]
pub struct PredictRequest<'a> {
    pub data: &'a ObservationSeries,
    pub features: &'a [String],
    pub horizon: Horizon,
    /// Rows to predict, strictly ascending.
    pub indices: &'a [usize],
    pub config: &'a ModelConfig,
    pub settings: &'a SearchSettings,
}

/// One prediction per requested row, plus error metrics.
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub predictions: Vec<PredictionPoint>,
    pub errors: PredictionErrors,
    pub metadata: Metadata,
}

/// Uniform search/predict contract over one model family.
pub trait ModelAdapter: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Smallest training set the model can be fitted on.
    fn min_fit_size(&self) -> usize;

    /// Nested search restricted to the window's cross-validation period.
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome>;

    /// Predict `request.indices` with a fixed configuration.
    fn predict(&self, request: &PredictRequest<'_>) -> Result<PredictOutcome>;
}

/// Adapter running a [`Classifier`] under walk-forward discipline.
///
/// Prediction refits every `refit_step` rows on all rows before the block
/// (less the embargo), so each forecast only sees earlier observations.
pub struct WalkForwardAdapter {
    classifier: Box<dyn Classifier>,
    timeout: Option<Duration>,
}

impl WalkForwardAdapter {
    pub fn new(classifier: impl Classifier + 'static) -> Self {
        Self::from_boxed(Box::new(classifier))
    }

    pub fn from_boxed(classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier,
            timeout: None,
        }
    }

    /// Budget for this model alone, overriding `timeout_secs`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    fn deadline(&self, settings: &SearchSettings) -> Deadline {
        Deadline::after(self.timeout.or_else(|| settings.timeout()))
    }
}

impl fmt::Debug for WalkForwardAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkForwardAdapter")
            .field("model", &self.classifier.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelAdapter for WalkForwardAdapter {
    fn kind(&self) -> ModelKind {
        self.classifier.kind()
    }

    fn min_fit_size(&self) -> usize {
        self.classifier.min_fit_size()
    }

    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        let model = self.kind();
        let window = request.window;
        let rows = request
            .data
            .range_indices(window.cv_start(), window.cv_end());

        let x = request.data.feature_matrix(request.features, rows.clone())?;
        let y = request.data.labels(request.horizon, rows.clone())?;
        let deadline = self.deadline(request.settings);

        let result = grid_search(
            self.classifier.as_ref(),
            x.view(),
            y.view(),
            request.settings,
            &deadline,
        )?;
        let dates = request.data.dates();
        let validation: Vec<PredictionPoint> = result
            .validated_rows
            .iter()
            .zip(&result.probabilities)
            .map(|(&r, &p)| PredictionPoint::new(dates[rows.start + r], y[r], p))
            .collect();

        debug!(
            "{} {} best config #{} of {}",
            model,
            request.horizon,
            result.best_index,
            result.scores.len()
        );

        let metadata = json!({
            "model": model.name(),
            "output": request.horizon.column(),
            "cv_start": window.cv_start(),
            "cv_end": window.cv_end(),
            "observations": x.nrows(),
            "validated": validation.len(),
            "best_index": result.best_index,
            "cv_score": result.best_score(),
            "scores": result.scores,
        });

        Ok(SearchOutcome {
            config: ModelConfig::new(model, result.best_params),
            validation,
            metadata,
        })
    }

    fn predict(&self, request: &PredictRequest<'_>) -> Result<PredictOutcome> {
        let model = self.kind();
        let settings = request.settings;
        if request.config.model != model {
            return Err(ForecastError::InvalidInput(format!(
                "{} adapter given a {} configuration",
                model, request.config.model
            )));
        }
        if request.indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ForecastError::InvalidInput(
                "prediction indices must be strictly ascending".to_string(),
            ));
        }
        let Some(&last) = request.indices.last() else {
            return Err(ForecastError::InvalidInput("no rows to predict".to_string()));
        };

        let x = request.data.feature_matrix(request.features, 0..last + 1)?;
        let y = request.data.labels(request.horizon, 0..last + 1)?;
        let dates = request.data.dates();
        let deadline = self.deadline(settings);

        let mut predictions = Vec::with_capacity(request.indices.len());
        let mut refits = 0usize;
        for block in request.indices.chunks(settings.refit_step.max(1)) {
            deadline.check(model)?;

            let train_end = block[0].saturating_sub(settings.embargo_rows);
            if train_end < self.min_fit_size() {
                return Err(ForecastError::DataInsufficient {
                    model,
                    required: self.min_fit_size() + settings.embargo_rows,
                    available: block[0],
                });
            }

            let query = x.select(Axis(0), block);
            let probs = self
                .classifier
                .fit_predict(
                    x.slice(s![..train_end, ..]),
                    y.slice(s![..train_end]),
                    query.view(),
                    &request.config.params,
                )
                .map_err(|e| adapter_failure(model, e))?;
            if probs.len() != block.len() {
                return Err(ForecastError::AdapterFailure {
                    model,
                    message: format!("returned {} predictions for {} rows", probs.len(), block.len()),
                });
            }

            predictions.extend(
                block
                    .iter()
                    .zip(probs.iter())
                    .map(|(&i, &p)| PredictionPoint::new(dates[i], y[i], p)),
            );
            refits += 1;
        }

        let errors = PredictionErrors::from_points(&predictions, settings.threshold);
        let metadata = json!({
            "model": model.name(),
            "output": request.horizon.column(),
            "params": request.config.params,
            "observations": predictions.len(),
            "refits": refits,
            "threshold": settings.threshold,
            "brier_score": errors.brier_score,
        });

        Ok(PredictOutcome {
            predictions,
            errors,
            metadata,
        })
    }
}

/// Explicit registry of model adapters, one per [`ModelKind`].
#[derive(Clone, Default)]
pub struct ModelRegistry {
    adapters: Vec<Arc<dyn ModelAdapter>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All six model families with default grids.
    pub fn standard() -> Self {
        Self::with_models(&ModelKind::ADAPTERS)
    }

    /// Adapters for the given kinds; ensemble kinds are skipped.
    pub fn with_models(kinds: &[ModelKind]) -> Self {
        let mut registry = Self::new();
        for &kind in kinds {
            if let Some(classifier) = classifier_for(kind) {
                registry.register(Arc::new(WalkForwardAdapter::from_boxed(classifier)));
            }
        }
        registry
    }

    /// Add an adapter, replacing any existing one of the same kind.
    pub fn register(&mut self, adapter: Arc<dyn ModelAdapter>) {
        match self.adapters.iter().position(|a| a.kind() == adapter.kind()) {
            Some(i) => self.adapters[i] = adapter,
            None => self.adapters.push(adapter),
        }
    }

    pub fn get(&self, kind: ModelKind) -> Option<&Arc<dyn ModelAdapter>> {
        self.adapters.iter().find(|a| a.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ModelAdapter>> {
        self.adapters.iter()
    }

    pub fn kinds(&self) -> Vec<ModelKind> {
        self.adapters.iter().map(|a| a.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Knn;
    use chrono::{Months, NaiveDate};

    fn monthly(n: usize) -> ObservationSeries {
        let start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..n)
            .map(|i| start.checked_add_months(Months::new(i as u32)).unwrap())
            .collect();
        let spread: Vec<f64> = (0..n).map(|i| ((i as f64) * 0.3).sin()).collect();
        let label: Vec<f64> = spread.iter().map(|&s| if s > 0.0 { 1.0 } else { 0.0 }).collect();
        ObservationSeries::new(
            dates,
            vec![
                ("spread".to_string(), spread),
                ("Recession".to_string(), label),
            ],
        )
        .unwrap()
    }

    fn settings() -> SearchSettings {
        SearchSettings {
            min_train_rows: 12,
            refit_step: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_search_stays_inside_cv_period() {
        let data = monthly(120);
        let window = TestWindow::new(
            1,
            NaiveDate::from_ymd_opt(1972, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1975, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(1976, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1977, 12, 1).unwrap(),
        )
        .unwrap();
        let features = vec!["spread".to_string()];
        let adapter = WalkForwardAdapter::new(Knn::new(vec![1, 3]));

        let outcome = adapter
            .search(&SearchRequest {
                data: &data,
                features: &features,
                horizon: Horizon::Now,
                window: &window,
                settings: &settings(),
            })
            .unwrap();

        assert_eq!(outcome.config.model, ModelKind::Knn);
        assert_eq!(outcome.validation.len(), 48 - 12);
        assert!(outcome.validation.iter().all(|p| window.in_cv(p.date)));
        assert!(outcome.metadata["cv_score"].is_number());
    }

    #[test]
    fn test_predict_aligns_with_indices() {
        let data = monthly(120);
        let features = vec!["spread".to_string()];
        let adapter = WalkForwardAdapter::new(Knn::new(vec![3]));
        let config = ModelConfig::new(ModelKind::Knn, Knn::new(vec![3]).param_grid().remove(0));
        let indices: Vec<usize> = (60..80).collect();

        let outcome = adapter
            .predict(&PredictRequest {
                data: &data,
                features: &features,
                horizon: Horizon::Now,
                indices: &indices,
                config: &config,
                settings: &settings(),
            })
            .unwrap();

        assert_eq!(outcome.predictions.len(), 20);
        for (p, &i) in outcome.predictions.iter().zip(&indices) {
            assert_eq!(p.date, data.dates()[i]);
        }
        assert_eq!(outcome.errors.observations, 20);
        assert_eq!(outcome.metadata["refits"], 4);
    }

    #[test]
    fn test_predict_rejects_unsorted_indices() {
        let data = monthly(60);
        let features = vec!["spread".to_string()];
        let adapter = WalkForwardAdapter::new(Knn::new(vec![3]));
        let config = ModelConfig::new(ModelKind::Knn, Knn::new(vec![3]).param_grid().remove(0));

        let err = adapter
            .predict(&PredictRequest {
                data: &data,
                features: &features,
                horizon: Horizon::Now,
                indices: &[40, 39],
                config: &config,
                settings: &settings(),
            })
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidInput(_)));
    }

    #[test]
    fn test_predict_without_history_is_insufficient() {
        let data = monthly(60);
        let features = vec!["spread".to_string()];
        let adapter = WalkForwardAdapter::new(Knn::new(vec![5]));
        let config = ModelConfig::new(ModelKind::Knn, Knn::new(vec![5]).param_grid().remove(0));

        let err = adapter
            .predict(&PredictRequest {
                data: &data,
                features: &features,
                horizon: Horizon::Now,
                indices: &[2, 3],
                config: &config,
                settings: &settings(),
            })
            .unwrap_err();
        assert!(matches!(err, ForecastError::DataInsufficient { available: 2, .. }));
    }

    #[test]
    fn test_registry_replaces_same_kind() {
        let mut registry = ModelRegistry::standard();
        assert_eq!(registry.len(), 6);
        registry.register(Arc::new(WalkForwardAdapter::new(Knn::new(vec![1]))));
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get(ModelKind::Knn).unwrap().min_fit_size(), 1);

        let subset = ModelRegistry::with_models(&[ModelKind::Svm, ModelKind::WeightedAverage]);
        assert_eq!(subset.kinds(), vec![ModelKind::Svm]);
    }
}
