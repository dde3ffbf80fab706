//! Gaussian process on recession labels.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use super::{
    as_targets, check_inputs, floats, grid2, param_f64, single_class, Classifier, ModelError,
    Standardizer,
};
use crate::types::{Hyperparams, ModelKind};

/// GP regression with an RBF kernel fitted to the 0/1 labels, with the
/// posterior mean clipped to `[0, 1]`.
///
/// Only the most recent `max_train_rows` rows are used; the Cholesky solve
/// is cubic in the training size.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    length_scales: Vec<f64>,
    noise_levels: Vec<f64>,
    max_train_rows: usize,
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self {
            length_scales: vec![0.5, 1.0, 2.0],
            noise_levels: vec![0.01, 0.1],
            max_train_rows: 300,
        }
    }
}

/// RBF kernel between every row of `a` and every row of `b`.
fn rbf_kernel(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>, length_scale: f64) -> Array2<f64> {
    let scale = -0.5 / (length_scale * length_scale);
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| {
        let diff = &a.row(i) - &b.row(j);
        (scale * diff.dot(&diff)).exp()
    })
}

/// Lower-triangular Cholesky factor of a symmetric matrix.
fn cholesky(m: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
    let n = m.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let dot = l.slice(s![i, ..j]).dot(&l.slice(s![j, ..j]));
            if i == j {
                let d = m[[i, i]] - dot;
                if d <= 0.0 || !d.is_finite() {
                    return Err(ModelError::SingularMatrix);
                }
                l[[i, j]] = d.sqrt();
            } else {
                l[[i, j]] = (m[[i, j]] - dot) / l[[j, j]];
            }
        }
    }
    Ok(l)
}

/// Solve `L L^T x = b` by forward then back substitution.
fn cholesky_solve(l: &Array2<f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let dot = l.slice(s![i, ..i]).dot(&z.slice(s![..i]));
        z[i] = (b[i] - dot) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let dot = l.slice(s![i + 1.., i]).dot(&x.slice(s![i + 1..]));
        x[i] = (z[i] - dot) / l[[i, i]];
    }
    x
}

impl Classifier for GaussianProcess {
    fn kind(&self) -> ModelKind {
        ModelKind::GaussianProcess
    }

    fn param_grid(&self) -> Vec<Hyperparams> {
        grid2(
            "length_scale",
            &floats(&self.length_scales),
            "noise",
            &floats(&self.noise_levels),
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
        let length_scale = param_f64(params, "length_scale")?;
        let noise = param_f64(params, "noise")?;
        if length_scale <= 0.0 || noise <= 0.0 {
            return Err(ModelError::InvalidParameter(format!(
                "length_scale={} noise={}",
                length_scale, noise
            )));
        }

        let skip = train_x.nrows().saturating_sub(self.max_train_rows);
        let train_x = train_x.slice(s![skip.., ..]);
        let train_y = train_y.slice(s![skip..]);

        if let Some(constant) = single_class(train_y, query_x.nrows()) {
            return Ok(constant);
        }

        let scaler = Standardizer::fit(train_x);
        let x = scaler.transform(train_x);
        let targets = as_targets(train_y);
        let prior = targets.mean().unwrap_or(0.0);
        let centred = targets - prior;

        let mut kernel = rbf_kernel(x.view(), x.view(), length_scale);
        kernel.diag_mut().mapv_inplace(|v| v + noise);
        let l = cholesky(&kernel)?;
        let weights = cholesky_solve(&l, centred.view());

        let cross = rbf_kernel(scaler.transform(query_x).view(), x.view(), length_scale);
        Ok((cross.dot(&weights) + prior).mapv(|p| p.clamp(0.0, 1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{centres, separable};
    use ndarray::array;

    #[test]
    fn test_cholesky_solve() {
        let m = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(&m).unwrap();
        let x = cholesky_solve(&l, array![2.0, 1.0].view());
        assert!((4.0 * x[0] + 2.0 * x[1] - 2.0).abs() < 1e-12);
        assert!((2.0 * x[0] + 3.0 * x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let m = array![[1.0, 2.0], [2.0, 1.0]];
        assert_eq!(cholesky(&m), Err(ModelError::SingularMatrix));
    }

    #[test]
    fn test_gp_separates_clusters() {
        let (x, y) = separable(40);
        let gp = GaussianProcess::default();
        let params = &gp.param_grid()[2];
        let probs = gp
            .fit_predict(x.view(), y.view(), centres().view(), params)
            .unwrap();
        assert!(probs[0] < 0.3);
        assert!(probs[1] > 0.7);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
