//! Logistic regression with an elastic-net penalty.

use ndarray::{Array1, ArrayView1, ArrayView2};

use super::{
    as_targets, check_inputs, floats, grid2, param_f64, sigmoid, single_class, Classifier,
    ModelError, Standardizer,
};
use crate::types::{Hyperparams, ModelKind};

/// Elastic-net logistic regression fitted by proximal gradient descent.
///
/// # Parameters
/// - `alpha`: overall penalty strength
/// - `l1_ratio`: share of the penalty that is L1 (0 = ridge, 1 = lasso)
#[derive(Debug, Clone)]
pub struct ElasticNet {
    alphas: Vec<f64>,
    l1_ratios: Vec<f64>,
    iterations: usize,
    learning_rate: f64,
}

impl Default for ElasticNet {
    fn default() -> Self {
        Self {
            alphas: vec![0.001, 0.01, 0.1],
            l1_ratios: vec![0.15, 0.5, 0.85],
            iterations: 300,
            learning_rate: 0.5,
        }
    }
}

impl ElasticNet {
    /// Fitted intercept and weights on standardized features.
    fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        alpha: f64,
        l1_ratio: f64,
    ) -> Result<(f64, Array1<f64>), ModelError> {
        let n = x.nrows() as f64;
        let targets = as_targets(y);
        let mut bias = 0.0;
        let mut w = Array1::<f64>::zeros(x.ncols());
        let lr = self.learning_rate;
        let shrink = lr * alpha * l1_ratio;

        for _ in 0..self.iterations {
            let errors = (x.dot(&w) + bias).mapv(sigmoid) - &targets;
            let grad_w = x.t().dot(&errors) / n;

            bias -= lr * errors.sum() / n;
            // Gradient step on loss + L2, then soft-threshold for L1.
            let step = &w - &((grad_w + &(&w * (alpha * (1.0 - l1_ratio)))) * lr);
            w = step.mapv(|v| v.signum() * (v.abs() - shrink).max(0.0));

            if !bias.is_finite() || w.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite);
            }
        }

        Ok((bias, w))
    }
}

impl Classifier for ElasticNet {
    fn kind(&self) -> ModelKind {
        ModelKind::ElasticNet
    }

    fn min_fit_size(&self) -> usize {
        20
    }

    fn param_grid(&self) -> Vec<Hyperparams> {
        grid2("alpha", &floats(&self.alphas), "l1_ratio", &floats(&self.l1_ratios))
    }

    fn fit_predict(
        &self,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, u8>,
        query_x: ArrayView2<'_, f64>,
        params: &Hyperparams,
    ) -> Result<Array1<f64>, ModelError> {
        check_inputs(train_x, train_y, query_x)?;
        let alpha = param_f64(params, "alpha")?;
        let l1_ratio = param_f64(params, "l1_ratio")?;
        if alpha < 0.0 || !(0.0..=1.0).contains(&l1_ratio) {
            return Err(ModelError::InvalidParameter(format!(
                "alpha={} l1_ratio={}",
                alpha, l1_ratio
            )));
        }

        if let Some(constant) = single_class(train_y, query_x.nrows()) {
            return Ok(constant);
        }

        let scaler = Standardizer::fit(train_x);
        let x = scaler.transform(train_x);
        let (bias, w) = self.fit(x.view(), train_y, alpha, l1_ratio)?;

        Ok((scaler.transform(query_x).dot(&w) + bias).mapv(sigmoid))
    }
}
