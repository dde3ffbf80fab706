//! Weighted-average ensemble over the adapter models.

use serde_json::json;
use std::collections::BTreeMap;
use tracing::warn;

use crate::types::{Metadata, ModelKind, PredictionErrors, PredictionPoint};

/// Keeps weights finite when a member scored perfectly in validation.
const BRIER_FLOOR: f64 = 1e-6;

/// Ensemble record for one (window, horizon).
#[derive(Debug, Clone)]
pub struct EnsembleOutcome {
    pub predictions: Vec<PredictionPoint>,
    pub errors: PredictionErrors,
    pub metadata: Metadata,
}

/// Average member probabilities, each weighted by the inverse of its
/// cross-validation Brier score.
///
/// Members need both a validation record and predictions on exactly the
/// dates of the first eligible member; others are left out. Returns `None`
/// when no member qualifies.
pub fn weighted_average(
    validation: &BTreeMap<ModelKind, Vec<PredictionPoint>>,
    predictions: &BTreeMap<ModelKind, Vec<PredictionPoint>>,
    threshold: f64,
) -> Option<EnsembleOutcome> {
    let mut members: Vec<(ModelKind, f64, &[PredictionPoint])> = Vec::new();

    for (&model, points) in predictions {
        if model.is_ensemble() || points.is_empty() {
            continue;
        }
        let Some(cv) = validation.get(&model).filter(|v| !v.is_empty()) else {
            continue;
        };
        if let Some((_, _, reference)) = members.first() {
            let aligned = reference.len() == points.len()
                && reference.iter().zip(points).all(|(a, b)| a.date == b.date);
            if !aligned {
                warn!("{} predictions are not date-aligned, left out of ensemble", model);
                continue;
            }
        }
        let brier = PredictionErrors::from_points(cv, threshold).brier_score;
        members.push((model, 1.0 / (brier + BRIER_FLOOR), points));
    }

    let (_, _, reference) = members.first()?;
    let total: f64 = members.iter().map(|(_, w, _)| w).sum();

    let predictions: Vec<PredictionPoint> = reference
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let blended = members.iter().map(|(_, w, p)| w * p[i].predicted).sum::<f64>() / total;
            PredictionPoint::new(point.date, point.actual, blended)
        })
        .collect();

    let weights: BTreeMap<ModelKind, f64> =
        members.iter().map(|(m, w, _)| (*m, w / total)).collect();
    let errors = PredictionErrors::from_points(&predictions, threshold);
    let metadata = json!({
        "model": ModelKind::WeightedAverage.name(),
        "members": members.len(),
        "weights": weights,
        "brier_score": errors.brier_score,
    });

    Some(EnsembleOutcome {
        predictions,
        errors,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn points(values: &[(u8, f64)]) -> Vec<PredictionPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &(a, p))| {
                PredictionPoint::new(NaiveDate::from_ymd_opt(2000, 1 + i as u32, 1).unwrap(), a, p)
            })
            .collect()
    }

    #[test]
    fn test_better_member_gets_more_weight() {
        let mut validation = BTreeMap::new();
        validation.insert(ModelKind::Knn, points(&[(1, 0.9), (0, 0.1)]));
        validation.insert(ModelKind::Svm, points(&[(1, 0.5), (0, 0.5)]));

        let mut preds = BTreeMap::new();
        preds.insert(ModelKind::Knn, points(&[(1, 1.0), (0, 0.0)]));
        preds.insert(ModelKind::Svm, points(&[(1, 0.0), (0, 1.0)]));

        let out = weighted_average(&validation, &preds, 0.5).unwrap();
        // Knn brier 0.01, Svm 0.25: weights 25:1.
        assert!(out.predictions[0].predicted > 0.9);
        assert!(out.predictions[1].predicted < 0.1);
        assert_eq!(out.errors.mismatches, 0);
        assert_eq!(out.metadata["members"], 2);
    }

    #[test]
    fn test_members_without_validation_are_skipped() {
        let mut validation = BTreeMap::new();
        validation.insert(ModelKind::Knn, points(&[(1, 1.0)]));

        let mut preds = BTreeMap::new();
        preds.insert(ModelKind::Knn, points(&[(1, 0.8)]));
        preds.insert(ModelKind::Svm, points(&[(1, 0.0)]));

        let out = weighted_average(&validation, &preds, 0.5).unwrap();
        assert!((out.predictions[0].predicted - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_misaligned_member_is_skipped() {
        let mut validation = BTreeMap::new();
        validation.insert(ModelKind::Knn, points(&[(1, 1.0)]));
        validation.insert(ModelKind::Svm, points(&[(1, 1.0)]));

        let mut preds = BTreeMap::new();
        preds.insert(ModelKind::Knn, points(&[(1, 0.8), (0, 0.2)]));
        preds.insert(ModelKind::Svm, points(&[(1, 0.0)]));

        let out = weighted_average(&validation, &preds, 0.5).unwrap();
        assert_eq!(out.metadata["members"], 1);
    }

    #[test]
    fn test_no_members() {
        assert!(weighted_average(&BTreeMap::new(), &BTreeMap::new(), 0.5).is_none());
    }
}
