//! Gaussian naive Bayes.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use super::{check_inputs, floats, param_f64, single_class, Classifier, ModelError};
use crate::types::{Hyperparams, ModelKind};

/// Gaussian naive Bayes.
///
/// # Parameters
/// - `var_smoothing`: fraction of the largest feature variance added to
///   every class variance
#[derive(Debug, Clone)]
pub struct NaiveBayes {
    smoothing: Vec<f64>,
}

impl Default for NaiveBayes {
    fn default() -> Self {
        Self {
            smoothing: vec![1e-9, 1e-6, 1e-3, 1e-1],
        }
    }
}

#[derive(Debug)]
struct ClassStats {
    log_prior: f64,
    means: Array1<f64>,
    vars: Array1<f64>,
}

impl ClassStats {
    fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, u8>, label: u8, epsilon: f64) -> Self {
        let rows: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == label)
            .map(|(i, _)| i)
            .collect();
        let members = x.select(Axis(0), &rows);
        let width = x.ncols();

        Self {
            log_prior: (rows.len() as f64 / x.nrows() as f64).ln(),
            means: members
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(width)),
            vars: members.var_axis(Axis(0), 0.0) + epsilon,
        }
    }

    fn log_likelihood(&self, row: ArrayView1<'_, f64>) -> f64 {
        let two_pi = 2.0 * std::f64::consts::PI;
        let z = (&row - &self.means).mapv(|d| d * d) / &self.vars;
        let norm = self.vars.mapv(|v| (two_pi * v).ln());
        self.log_prior - 0.5 * (norm + z).sum()
    }
}

impl Classifier for NaiveBayes {
    fn kind(&self) -> ModelKind {
        ModelKind::NaiveBayes
    }

    fn param_grid(&self) -> Vec<Hyperparams> {
        floats(&self.smoothing)
            .into_iter()
            .map(|v| {
                let mut params = Hyperparams::new();
                params.insert("var_smoothing".to_string(), v);
                params
            })
            .collect()
    }

    fn fit_predict(
        &self,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, u8>,
        query_x: ArrayView2<'_, f64>,
        params: &Hyperparams,
    ) -> Result<Array1<f64>, ModelError> {
        check_inputs(train_x, train_y, query_x)?;
        let smoothing = param_f64(params, "var_smoothing")?;
        if smoothing < 0.0 {
            return Err(ModelError::InvalidParameter("var_smoothing must be >= 0".into()));
        }

        if let Some(constant) = single_class(train_y, query_x.nrows()) {
            return Ok(constant);
        }

        let max_var = train_x.var_axis(Axis(0), 0.0).fold(0.0, |a: f64, &b| a.max(b));
        let epsilon = (smoothing * max_var).max(1e-12);

        let neg = ClassStats::fit(train_x, train_y, 0, epsilon);
        let pos = ClassStats::fit(train_x, train_y, 1, epsilon);

        Ok(query_x
            .axis_iter(Axis(0))
            .map(|q| {
                let l0 = neg.log_likelihood(q);
                let l1 = pos.log_likelihood(q);
                let m = l0.max(l1);
                let e0 = (l0 - m).exp();
                let e1 = (l1 - m).exp();
                e1 / (e0 + e1)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{centres, separable};

    #[test]
    fn test_naive_bayes_separates_clusters() {
        let (x, y) = separable(40);
        let model = NaiveBayes::default();
        let probs = model
            .fit_predict(x.view(), y.view(), centres().view(), &model.param_grid()[0])
            .unwrap();
        assert!(probs[0] < 0.05);
        assert!(probs[1] > 0.95);
    }

    #[test]
    fn test_grid_has_one_axis() {
        let grid = NaiveBayes::default().param_grid();
        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|p| p.contains_key("var_smoothing")));
    }
}
