//! Linear soft-margin support vector machine.

use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

use super::{
    check_inputs, floats, grid2, param_f64, sigmoid, single_class, Classifier, ModelError,
    Standardizer,
};
use crate::types::{Hyperparams, ModelKind};

/// Linear SVM trained with full-batch subgradient descent on the hinge
/// loss. Margins are mapped to probabilities with `sigmoid(gamma * margin)`.
///
/// # Parameters
/// - `C`: inverse regularization strength
/// - `gamma`: slope of the margin-to-probability link
#[derive(Debug, Clone)]
pub struct Svm {
    costs: Vec<f64>,
    gammas: Vec<f64>,
    epochs: usize,
}

impl Default for Svm {
    fn default() -> Self {
        Self {
            costs: vec![0.1, 1.0, 10.0],
            gammas: vec![1.0, 3.0],
            epochs: 200,
        }
    }
}

impl Svm {
    /// Minimises `lambda/2 |w|^2 + mean(hinge)` with `lambda = 1 / (C n)`.
    fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        c: f64,
    ) -> Result<(f64, Array1<f64>), ModelError> {
        let n = x.nrows() as f64;
        let lambda = 1.0 / (c * n);
        let targets = y.mapv(|label| if label == 1 { 1.0 } else { -1.0 });
        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;

        for epoch in 0..self.epochs {
            let lr = 0.5 / ((epoch + 1) as f64).sqrt();
            let scores = x.dot(&w) + bias;

            // Subgradient weight is -t/n on rows inside the margin, else zero.
            let active = Zip::from(&scores)
                .and(&targets)
                .map_collect(|&s, &t| if t * s < 1.0 { -t / n } else { 0.0 });

            let grad_w = &w * lambda + x.t().dot(&active);
            w = &w - &(grad_w * lr);
            bias -= lr * active.sum();

            if !bias.is_finite() || w.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite);
            }
        }

        Ok((bias, w))
    }
}

impl Classifier for Svm {
    fn kind(&self) -> ModelKind {
        ModelKind::Svm
    }

    fn min_fit_size(&self) -> usize {
        20
    }

    fn param_grid(&self) -> Vec<Hyperparams> {
        grid2("C", &floats(&self.costs), "gamma", &floats(&self.gammas))
    }

    fn fit_predict(
        &self,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, u8>,
        query_x: ArrayView2<'_, f64>,
        params: &Hyperparams,
    ) -> Result<Array1<f64>, ModelError> {
        check_inputs(train_x, train_y, query_x)?;
        let c = param_f64(params, "C")?;
        let gamma = param_f64(params, "gamma")?;
        if c <= 0.0 || gamma <= 0.0 {
            return Err(ModelError::InvalidParameter(format!("C={} gamma={}", c, gamma)));
        }

        if let Some(constant) = single_class(train_y, query_x.nrows()) {
            return Ok(constant);
        }

        let scaler = Standardizer::fit(train_x);
        let (bias, w) = self.fit(scaler.transform(train_x).view(), train_y, c)?;

        let margins = scaler.transform(query_x).dot(&w) + bias;
        Ok(margins.mapv(|m| sigmoid(gamma * m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{centres, separable};

    #[test]
    fn test_svm_separates_clusters() {
        let (x, y) = separable(60);
        let svm = Svm::default();
        for params in svm.param_grid() {
            let probs = svm
                .fit_predict(x.view(), y.view(), centres().view(), &params)
                .unwrap();
            assert!(probs[0] < 0.5, "{:?}", params);
            assert!(probs[1] > 0.5, "{:?}", params);
        }
    }

    #[test]
    fn test_svm_rejects_non_positive_cost() {
        let (x, y) = separable(30);
        let mut params = Svm::default().param_grid().remove(0);
        params.insert("C".into(), crate::types::ParamValue::Float(0.0));
        assert!(Svm::default()
            .fit_predict(x.view(), y.view(), x.view(), &params)
            .is_err());
    }
}
