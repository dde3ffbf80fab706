//! Nested walk-forward hyperparameter search.
//!
//! A configuration is scored only on rows that come after every row it was
//! fitted on. Scores are Brier scores over the concatenated validation
//! blocks; the earliest configuration wins ties.

use ndarray::{s, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ForecastError, Result};
use crate::models::{Classifier, ModelError};
use crate::types::{Hyperparams, ModelKind};
use crate::walkforward::{walk_forward_splits, WalkForwardSplit};

/// Settings shared by search and prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Minimum rows in the first training split.
    pub min_train_rows: usize,
    /// Rows predicted per refit, in both search and prediction.
    pub refit_step: usize,
    /// Rows dropped between the end of training and the first scored row.
    pub embargo_rows: usize,
    /// Wall-clock budget per (horizon, model) pair and stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Probability at or above which a row is predicted as recession.
    pub threshold: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_train_rows: 24,
            refit_step: 12,
            embargo_rows: 0,
            timeout_secs: None,
            threshold: 0.5,
        }
    }
}

impl SearchSettings {
    /// Training rows a model needs before its first split.
    pub fn first_train_size(&self, min_fit_size: usize) -> usize {
        self.min_train_rows.max(min_fit_size).max(1)
    }

    /// Rows a search window must hold for at least one scored row.
    pub fn required_rows(&self, min_fit_size: usize) -> usize {
        self.first_train_size(min_fit_size) + self.embargo_rows + 1
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Cooperative wall-clock budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn after(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::after(None)
    }

    /// Fail with [`ForecastError::Timeout`] once the budget is spent.
    pub fn check(&self, model: ModelKind) -> Result<()> {
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => Err(ForecastError::Timeout {
                model,
                seconds: limit.as_secs(),
            }),
            _ => Ok(()),
        }
    }
}

/// Convert a model failure into the adapter-boundary error.
pub fn adapter_failure(model: ModelKind, err: ModelError) -> ForecastError {
    ForecastError::AdapterFailure {
        model,
        message: err.to_string(),
    }
}

/// Probabilities for every validated row of `splits`, in split order.
pub fn walk_forward_probabilities(
    classifier: &dyn Classifier,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
    splits: &[WalkForwardSplit],
    params: &Hyperparams,
    deadline: &Deadline,
) -> Result<Vec<f64>> {
    let model = classifier.kind();
    let mut out = Vec::with_capacity(splits.iter().map(|s| s.validate.len()).sum());

    for split in splits {
        deadline.check(model)?;
        let probs = classifier
            .fit_predict(
                x.slice(s![split.train.clone(), ..]),
                y.slice(s![split.train.clone()]),
                x.slice(s![split.validate.clone(), ..]),
                params,
            )
            .map_err(|e| adapter_failure(model, e))?;
        if probs.len() != split.validate.len() {
            return Err(ForecastError::AdapterFailure {
                model,
                message: format!(
                    "returned {} predictions for {} rows",
                    probs.len(),
                    split.validate.len()
                ),
            });
        }
        out.extend(probs.iter().copied());
    }

    Ok(out)
}

/// Outcome of one hyperparameter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigScore {
    pub index: usize,
    pub params: Hyperparams,
    pub brier_score: Option<f64>,
    pub error: Option<String>,
}

/// Result of a grid search over one cross-validation window.
#[derive(Debug, Clone)]
pub struct GridSearch {
    /// Position of the winner in the grid.
    pub best_index: usize,
    pub best_params: Hyperparams,
    /// Local row indices that were scored, ascending.
    pub validated_rows: Vec<usize>,
    /// Winner's probabilities for `validated_rows`.
    pub probabilities: Vec<f64>,
    pub scores: Vec<ConfigScore>,
}

impl GridSearch {
    pub fn best_score(&self) -> Option<f64> {
        self.scores.get(self.best_index).and_then(|s| s.brier_score)
    }
}

/// Score every configuration of `classifier` on expanding splits over `x`.
///
/// Configurations that fail inside the model are recorded and skipped; the
/// search fails only when none succeeds. A spent deadline aborts the search.
pub fn grid_search(
    classifier: &dyn Classifier,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
    settings: &SearchSettings,
    deadline: &Deadline,
) -> Result<GridSearch> {
    let model = classifier.kind();
    let required = settings.required_rows(classifier.min_fit_size());
    if x.nrows() < required {
        return Err(ForecastError::DataInsufficient {
            model,
            required,
            available: x.nrows(),
        });
    }

    let splits = walk_forward_splits(
        0..x.nrows(),
        settings.first_train_size(classifier.min_fit_size()),
        settings.refit_step,
        settings.embargo_rows,
    );
    let validated_rows: Vec<usize> = splits.iter().flat_map(|s| s.validate.clone()).collect();
    let truth: Vec<f64> = validated_rows.iter().map(|&r| f64::from(y[r])).collect();

    let grid = classifier.param_grid();
    let mut scores = Vec::with_capacity(grid.len());
    let mut best: Option<(usize, f64, Vec<f64>)> = None;

    for (index, params) in grid.into_iter().enumerate() {
        match walk_forward_probabilities(classifier, x, y, &splits, &params, deadline) {
            Ok(probs) => {
                let brier = probs
                    .iter()
                    .zip(&truth)
                    .map(|(p, t)| (p - t).powi(2))
                    .sum::<f64>()
                    / truth.len() as f64;
                debug!("{} config {} brier={:.5}", model, index, brier);

                // Strictly better only: ties keep the earlier configuration.
                if best.as_ref().map_or(true, |(_, b, _)| brier < *b) {
                    best = Some((index, brier, probs));
                }
                scores.push(ConfigScore {
                    index,
                    params,
                    brier_score: Some(brier),
                    error: None,
                });
            }
            Err(e @ ForecastError::Timeout { .. }) => return Err(e),
            Err(e) => {
                warn!("{} config {} failed: {}", model, index, e);
                scores.push(ConfigScore {
                    index,
                    params,
                    brier_score: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let (best_index, _, probabilities) = best.ok_or_else(|| ForecastError::AdapterFailure {
        model,
        message: format!("all {} configurations failed", scores.len()),
    })?;

    Ok(GridSearch {
        best_index,
        best_params: scores[best_index].params.clone(),
        validated_rows,
        probabilities,
        scores,
    })
}
