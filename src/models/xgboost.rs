//! Gradient boosting on logistic loss.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};

use super::{
    as_targets, check_inputs, floats, grid2, ints, param_f64, param_usize, sigmoid, single_class,
    Classifier, ModelError,
};
use crate::types::{Hyperparams, ModelKind};

/// Second-order gradient boosting with depth-one trees.
///
/// Each round fits a stump to the gradient and hessian of the logistic loss
/// and scales its leaf weights by `learning_rate`. Leaf weights are
/// `-G / (H + lambda)`.
#[derive(Debug, Clone)]
pub struct XgBoost {
    estimators: Vec<i64>,
    learning_rates: Vec<f64>,
    lambda: f64,
}

impl Default for XgBoost {
    fn default() -> Self {
        Self {
            estimators: vec![25, 50, 100],
            learning_rates: vec![0.1, 0.3],
            lambda: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

impl Stump {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        if row[self.feature] < self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

impl XgBoost {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.lambda)
    }

    /// Best split by structure-score gain; `None` when no split helps.
    fn best_stump(
        &self,
        x: ArrayView2<'_, f64>,
        grad: &Array1<f64>,
        hess: &Array1<f64>,
    ) -> Option<Stump> {
        let g_total = grad.sum();
        let h_total = hess.sum();
        let parent = self.score(g_total, h_total);
        let mut best: Option<(f64, Stump)> = None;

        for (feature, column) in x.axis_iter(Axis(1)).enumerate() {
            let mut order: Vec<usize> = (0..column.len()).collect();
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for pair in order.windows(2) {
                let (i, next) = (pair[0], pair[1]);
                g_left += grad[i];
                h_left += hess[i];
                if column[i] == column[next] {
                    continue;
                }
                let (g_right, h_right) = (g_total - g_left, h_total - h_left);
                let gain = self.score(g_left, h_left) + self.score(g_right, h_right) - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |(b, _)| gain > *b) {
                    best = Some((
                        gain,
                        Stump {
                            feature,
                            threshold: 0.5 * (column[i] + column[next]),
                            left: -g_left / (h_left + self.lambda),
                            right: -g_right / (h_right + self.lambda),
                        },
                    ));
                }
            }
        }

        best.map(|(_, stump)| stump)
    }
}

impl Classifier for XgBoost {
    fn kind(&self) -> ModelKind {
        ModelKind::XgBoost
    }

    fn param_grid(&self) -> Vec<Hyperparams> {
        grid2(
            "n_estimators",
            &ints(&self.estimators),
            "learning_rate",
            &floats(&self.learning_rates),
        )
    }

    fn fit_predict(
        &self,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, u8>,
        query_x: ArrayView2<'_, f64>,
        params: &Hyperparams,
    ) -> Result<Array1<f64>, ModelError> {
        check_inputs(train_x, train_y, query_x)?;
        let rounds = param_usize(params, "n_estimators")?;
        let eta = param_f64(params, "learning_rate")?;
        if eta <= 0.0 {
            return Err(ModelError::InvalidParameter("learning_rate must be positive".into()));
        }

        if let Some(constant) = single_class(train_y, query_x.nrows()) {
            return Ok(constant);
        }

        let targets = as_targets(train_y);
        let rate = targets.mean().unwrap_or(0.5);
        let base = (rate / (1.0 - rate)).ln();
        let mut margin = Array1::from_elem(train_x.nrows(), base);
        let mut trees = Vec::with_capacity(rounds);

        for _ in 0..rounds {
            let probs = margin.mapv(sigmoid);
            let grad = &probs - &targets;
            let hess = probs.mapv(|p| p * (1.0 - p));

            let Some(stump) = self.best_stump(train_x, &grad, &hess) else {
                break;
            };
            Zip::from(&mut margin)
                .and(train_x.rows())
                .for_each(|m, row| *m += eta * stump.predict(row));
            trees.push(stump);
        }

        Ok(query_x
            .axis_iter(Axis(0))
            .map(|q| sigmoid(base + eta * trees.iter().map(|t| t.predict(q)).sum::<f64>()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{centres, separable};

    #[test]
    fn test_stump_finds_separating_feature() {
        let (x, y) = separable(20);
        let model = XgBoost::default();
        let grad = y.mapv(|v| 0.5 - f64::from(v));
        let hess = Array1::from_elem(y.len(), 0.25);

        let stump = model.best_stump(x.view(), &grad, &hess).unwrap();
        assert_eq!(stump.feature, 0);
        assert!(stump.threshold > -0.9 && stump.threshold < 0.9);
        assert!(stump.left < 0.0 && stump.right > 0.0);
    }

    #[test]
    fn test_boosting_separates_clusters() {
        let (x, y) = separable(40);
        let model = XgBoost::default();
        for params in model.param_grid() {
            let probs = model
                .fit_predict(x.view(), y.view(), centres().view(), &params)
                .unwrap();
            assert!(probs[0] < 0.3, "{:?}", params);
            assert!(probs[1] > 0.7, "{:?}", params);
        }
    }
}
