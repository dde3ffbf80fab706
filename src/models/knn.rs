//! k-nearest neighbours.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use super::{
    check_inputs, grid2, ints, param_usize, single_class, Classifier, ModelError, Standardizer,
};
use crate::types::{Hyperparams, ModelKind, ParamValue};

/// k-nearest neighbours on standardized features.
///
/// # Parameters
/// - `n_neighbors`: neighbours that vote
/// - `distance_weighted`: 1 to weight votes by inverse distance, 0 for uniform
///
/// The predicted probability is the (weighted) share of recession neighbours.
/// Distance ties are broken by the earlier training row.
#[derive(Debug, Clone)]
pub struct Knn {
    neighbors: Vec<i64>,
}

impl Default for Knn {
    fn default() -> Self {
        Self {
            neighbors: vec![3, 5, 9, 15, 25],
        }
    }
}

impl Knn {
    pub fn new(neighbors: Vec<i64>) -> Self {
        Self { neighbors }
    }
}

impl Classifier for Knn {
    fn kind(&self) -> ModelKind {
        ModelKind::Knn
    }

    fn min_fit_size(&self) -> usize {
        self.neighbors.iter().copied().max().unwrap_or(1).max(1) as usize
    }

    fn param_grid(&self) -> Vec<Hyperparams> {
        grid2(
            "n_neighbors",
            &ints(&self.neighbors),
            "distance_weighted",
            &[ParamValue::Int(0), ParamValue::Int(1)],
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
        let k = param_usize(params, "n_neighbors")?;
        if k == 0 {
            return Err(ModelError::InvalidParameter("n_neighbors must be positive".into()));
        }
        let weighted = param_usize(params, "distance_weighted")? == 1;

        if let Some(constant) = single_class(train_y, query_x.nrows()) {
            return Ok(constant);
        }

        let scaler = Standardizer::fit(train_x);
        let train = scaler.transform(train_x);
        let query = scaler.transform(query_x);
        let k = k.min(train.nrows());

        let predictions = query
            .axis_iter(Axis(0))
            .map(|q| {
                let mut dists: Vec<(f64, usize)> = train
                    .axis_iter(Axis(0))
                    .enumerate()
                    .map(|(i, row)| {
                        let diff = &row - &q;
                        (diff.dot(&diff).sqrt(), i)
                    })
                    .collect();
                dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

                let (mut votes, mut total) = (0.0, 0.0);
                for &(d, i) in &dists[..k] {
                    let w = if weighted { 1.0 / (d + 1e-9) } else { 1.0 };
                    votes += w * f64::from(train_y[i]);
                    total += w;
                }
                votes / total
            })
            .collect();

        Ok(predictions)
    }
}
