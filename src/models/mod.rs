//! Recession classifiers.
//!
//! Each model family implements [`Classifier`]: a hyperparameter grid and a
//! fit-then-predict call returning recession probabilities. The walk-forward
//! search and prediction loops live in [`crate::adapter`]; models never see
//! dates or windows.
//!
//! - [`Knn`]: k-nearest neighbours vote
//! - [`ElasticNet`]: logistic regression with an elastic-net penalty
//! - [`NaiveBayes`]: Gaussian naive Bayes
//! - [`Svm`]: linear soft-margin SVM with a logistic link
//! - [`GaussianProcess`]: RBF-kernel GP regression on the labels
//! - [`XgBoost`]: gradient-boosted decision stumps on logistic loss

mod elastic_net;
mod gaussian_process;
mod knn;
mod naive_bayes;
mod svm;
mod xgboost;

pub use elastic_net::ElasticNet;
pub use gaussian_process::GaussianProcess;
pub use knn::Knn;
pub use naive_bayes::NaiveBayes;
pub use svm::Svm;
pub use xgboost::XgBoost;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

use crate::types::{Hyperparams, ModelKind, ParamValue};

/// Failures inside a model. Wrapped into an adapter failure at the
/// adapter boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("missing hyperparameter '{0}'")]
    MissingParameter(String),

    #[error("invalid hyperparameter: {0}")]
    InvalidParameter(String),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("feature width mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("kernel matrix is not positive definite")]
    SingularMatrix,

    #[error("non-finite value during fitting")]
    NonFinite,
}

/// Fit/predict contract for a model family.
pub trait Classifier: Send + Sync {
    /// Which model family this is.
    fn kind(&self) -> ModelKind;

    /// Smallest training set the model can be fitted on.
    fn min_fit_size(&self) -> usize {
        10
    }

    /// Hyperparameter configurations, in enumeration order.
    fn param_grid(&self) -> Vec<Hyperparams>;

    /// Fit on `train_x`/`train_y` and return P(recession) per `query_x` row.
    fn fit_predict(
        &self,
        train_x: ArrayView2<'_, f64>,
        train_y: ArrayView1<'_, u8>,
        query_x: ArrayView2<'_, f64>,
        params: &Hyperparams,
    ) -> Result<Array1<f64>, ModelError>;
}

/// All six model families with their default grids.
pub fn standard_classifiers() -> Vec<Box<dyn Classifier>> {
    vec![
        Box::new(Knn::default()),
        Box::new(ElasticNet::default()),
        Box::new(NaiveBayes::default()),
        Box::new(Svm::default()),
        Box::new(GaussianProcess::default()),
        Box::new(XgBoost::default()),
    ]
}

/// Build the classifier for one adapter kind.
pub fn classifier_for(kind: ModelKind) -> Option<Box<dyn Classifier>> {
    match kind {
        ModelKind::Knn => Some(Box::new(Knn::default())),
        ModelKind::ElasticNet => Some(Box::new(ElasticNet::default())),
        ModelKind::NaiveBayes => Some(Box::new(NaiveBayes::default())),
        ModelKind::Svm => Some(Box::new(Svm::default())),
        ModelKind::GaussianProcess => Some(Box::new(GaussianProcess::default())),
        ModelKind::XgBoost => Some(Box::new(XgBoost::default())),
        ModelKind::WeightedAverage => None,
    }
}

/// Cartesian product of two parameter axes, first axis outermost.
pub(crate) fn grid2(
    a_name: &str,
    a_values: &[ParamValue],
    b_name: &str,
    b_values: &[ParamValue],
) -> Vec<Hyperparams> {
    let mut grid = Vec::with_capacity(a_values.len() * b_values.len());
    for a in a_values {
        for b in b_values {
            let mut params = Hyperparams::new();
            params.insert(a_name.to_string(), a.clone());
            params.insert(b_name.to_string(), b.clone());
            grid.push(params);
        }
    }
    grid
}

pub(crate) fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Float(v)).collect()
}

pub(crate) fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Int(v)).collect()
}

pub(crate) fn param_f64(params: &Hyperparams, name: &str) -> Result<f64, ModelError> {
    params
        .get(name)
        .ok_or_else(|| ModelError::MissingParameter(name.to_string()))?
        .as_f64()
        .ok_or_else(|| ModelError::InvalidParameter(format!("{} must be numeric", name)))
}

pub(crate) fn param_usize(params: &Hyperparams, name: &str) -> Result<usize, ModelError> {
    params
        .get(name)
        .ok_or_else(|| ModelError::MissingParameter(name.to_string()))?
        .as_usize()
        .ok_or_else(|| {
            ModelError::InvalidParameter(format!("{} must be a non-negative integer", name))
        })
}

/// Check shapes shared by every model. Returns the feature width.
pub(crate) fn check_inputs(
    train_x: ArrayView2<'_, f64>,
    train_y: ArrayView1<'_, u8>,
    query_x: ArrayView2<'_, f64>,
) -> Result<usize, ModelError> {
    if train_x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    let width = train_x.ncols();
    if train_x.nrows() != train_y.len() {
        return Err(ModelError::ShapeMismatch {
            expected: train_x.nrows(),
            actual: train_y.len(),
        });
    }
    if query_x.ncols() != width {
        return Err(ModelError::ShapeMismatch {
            expected: width,
            actual: query_x.ncols(),
        });
    }
    Ok(width)
}

/// When the training labels are all one class, every query gets that class.
pub(crate) fn single_class(train_y: ArrayView1<'_, u8>, n_query: usize) -> Option<Array1<f64>> {
    let first = *train_y.first()?;
    if train_y.iter().all(|&y| y == first) {
        Some(Array1::from_elem(n_query, f64::from(first)))
    } else {
        None
    }
}

/// Labels as 0.0/1.0 floats.
pub(crate) fn as_targets(y: ArrayView1<'_, u8>) -> Array1<f64> {
    y.mapv(f64::from)
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Column-wise z-scoring fitted on training rows.
#[derive(Debug, Clone)]
pub(crate) struct Standardizer {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl Standardizer {
    pub(crate) fn fit(x: ArrayView2<'_, f64>) -> Self {
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|sd| if sd > 1e-12 { sd } else { 1.0 });
        Self { means, scales }
    }

    pub(crate) fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.means) / &self.scales
    }
}
