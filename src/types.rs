//! Core data types: horizons, model identifiers, configurations and
//! prediction records.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ForecastError, Result};

/// Opaque per-model diagnostic payload, passed through unchanged.
pub type Metadata = serde_json::Value;

/// Results keyed by horizon, then model.
pub type ByOutput<T> = BTreeMap<Horizon, BTreeMap<ModelKind, T>>;

/// Results keyed by test, then horizon, then model.
pub type ByTest<T> = BTreeMap<TestId, ByOutput<T>>;

/// Prediction horizon. Each variant names the label column it is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    /// Recession in the current period.
    #[serde(rename = "Recession")]
    Now,
    #[serde(rename = "Recession_within_6mo")]
    Within6Months,
    #[serde(rename = "Recession_within_12mo")]
    Within12Months,
    #[serde(rename = "Recession_within_24mo")]
    Within24Months,
}

impl Horizon {
    /// All horizons in reporting order.
    pub const ALL: [Horizon; 4] = [
        Horizon::Now,
        Horizon::Within6Months,
        Horizon::Within12Months,
        Horizon::Within24Months,
    ];

    /// Label column this horizon is trained and scored on.
    pub fn column(&self) -> &'static str {
        match self {
            Horizon::Now => "Recession",
            Horizon::Within6Months => "Recession_within_6mo",
            Horizon::Within12Months => "Recession_within_12mo",
            Horizon::Within24Months => "Recession_within_24mo",
        }
    }

    /// Forward offset in months.
    pub fn months(&self) -> u32 {
        match self {
            Horizon::Now => 0,
            Horizon::Within6Months => 6,
            Horizon::Within12Months => 12,
            Horizon::Within24Months => 24,
        }
    }

    /// Look up a horizon by its label column name.
    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.column() == column)
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Horizon {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(h) = Self::from_column(s) {
            return Ok(h);
        }
        match s.trim().to_lowercase().as_str() {
            "0" | "0mo" | "now" => Ok(Horizon::Now),
            "6" | "6mo" => Ok(Horizon::Within6Months),
            "12" | "12mo" => Ok(Horizon::Within12Months),
            "24" | "24mo" => Ok(Horizon::Within24Months),
            _ => Err(ForecastError::InvalidInput(format!("unknown horizon '{}'", s))),
        }
    }
}

/// Model family identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "KNN")]
    Knn,
    #[serde(rename = "Elastic_Net")]
    ElasticNet,
    #[serde(rename = "Naive_Bayes")]
    NaiveBayes,
    #[serde(rename = "SVM")]
    Svm,
    #[serde(rename = "Gaussian_Process")]
    GaussianProcess,
    #[serde(rename = "XGBoost")]
    XgBoost,
    /// Ensemble of the adapter models, weighted by validation skill.
    #[serde(rename = "Weighted_Average")]
    WeightedAverage,
}

impl ModelKind {
    /// The six model families backed by an adapter, in registry order.
    pub const ADAPTERS: [ModelKind; 6] = [
        ModelKind::Knn,
        ModelKind::ElasticNet,
        ModelKind::NaiveBayes,
        ModelKind::Svm,
        ModelKind::GaussianProcess,
        ModelKind::XgBoost,
    ];

    /// Stable name used as a JSON key and in file names.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Knn => "KNN",
            ModelKind::ElasticNet => "Elastic_Net",
            ModelKind::NaiveBayes => "Naive_Bayes",
            ModelKind::Svm => "SVM",
            ModelKind::GaussianProcess => "Gaussian_Process",
            ModelKind::XgBoost => "XGBoost",
            ModelKind::WeightedAverage => "Weighted_Average",
        }
    }

    /// Whether this kind is derived from other models rather than fitted.
    pub fn is_ensemble(&self) -> bool {
        matches!(self, ModelKind::WeightedAverage)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "knn" => Ok(ModelKind::Knn),
            "elastic_net" | "elasticnet" => Ok(ModelKind::ElasticNet),
            "naive_bayes" | "naivebayes" => Ok(ModelKind::NaiveBayes),
            "svm" => Ok(ModelKind::Svm),
            "gaussian_process" | "gaussianprocess" | "gp" => Ok(ModelKind::GaussianProcess),
            "xgboost" | "gbm" => Ok(ModelKind::XgBoost),
            "weighted_average" | "weightedaverage" => Ok(ModelKind::WeightedAverage),
            _ => Err(ForecastError::InvalidInput(format!("unknown model '{}'", s))),
        }
    }
}

/// Test window number. Serialized as `"Test #N"`, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(pub u32);

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test #{}", self.0)
    }
}

impl FromStr for TestId {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let number = s.trim().trim_start_matches("Test").trim().trim_start_matches('#');
        number
            .trim()
            .parse::<u32>()
            .map(TestId)
            .map_err(|_| ForecastError::InvalidInput(format!("invalid test name '{}'", s)))
    }
}

impl Serialize for TestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Hyperparameter name to value.
pub type Hyperparams = BTreeMap<String, ParamValue>;

/// A model plus its chosen hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: ModelKind,
    pub params: Hyperparams,
}

impl ModelConfig {
    pub fn new(model: ModelKind, params: Hyperparams) -> Self {
        Self { model, params }
    }

    /// Compact `name=value` rendering for logs.
    pub fn key(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One dated prediction: realized label and predicted probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub date: NaiveDate,
    #[serde(rename = "True")]
    pub actual: u8,
    #[serde(rename = "Predicted")]
    pub predicted: f64,
}

impl PredictionPoint {
    pub fn new(date: NaiveDate, actual: u8, predicted: f64) -> Self {
        Self {
            date,
            actual,
            predicted,
        }
    }

    /// Predicted label at the given probability threshold.
    pub fn predicted_label(&self, threshold: f64) -> u8 {
        u8::from(self.predicted >= threshold)
    }
}

/// Error metrics for one prediction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionErrors {
    pub observations: usize,
    pub mismatches: usize,
    pub mismatch_rate: f64,
    pub brier_score: f64,
}

impl PredictionErrors {
    /// Score a prediction record against its realized labels.
    pub fn from_points(points: &[PredictionPoint], threshold: f64) -> Self {
        if points.is_empty() {
            return Self {
                observations: 0,
                mismatches: 0,
                mismatch_rate: 0.0,
                brier_score: 0.0,
            };
        }

        let n = points.len();
        let mismatches = points
            .iter()
            .filter(|p| p.predicted_label(threshold) != p.actual)
            .count();
        let brier = points
            .iter()
            .map(|p| (p.predicted - p.actual as f64).powi(2))
            .sum::<f64>()
            / n as f64;

        Self {
            observations: n,
            mismatches,
            mismatch_rate: mismatches as f64 / n as f64,
            brier_score: brier,
        }
    }
}

/// Which stage of a window a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    CrossValidation,
    Prediction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CrossValidation => f.write_str("cross-validation"),
            Stage::Prediction => f.write_str("prediction"),
        }
    }
}

/// A (horizon, model) pair that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFailure {
    pub horizon: Horizon,
    pub model: ModelKind,
    pub stage: Stage,
    pub kind: String,
    pub message: String,
}

impl PairFailure {
    pub fn new(horizon: Horizon, model: ModelKind, stage: Stage, error: &ForecastError) -> Self {
        Self {
            horizon,
            model,
            stage,
            kind: error.kind_name().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_horizon_columns() {
        assert_eq!(Horizon::Now.column(), "Recession");
        assert_eq!(Horizon::Within24Months.months(), 24);
        assert_eq!(
            Horizon::from_column("Recession_within_6mo"),
            Some(Horizon::Within6Months)
        );
        assert_eq!("12mo".parse::<Horizon>().unwrap(), Horizon::Within12Months);
    }

    #[test]
    fn test_model_kind_names_round_trip() {
        for kind in ModelKind::ADAPTERS {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("random_forest".parse::<ModelKind>().is_err());
        assert!(ModelKind::WeightedAverage.is_ensemble());
    }

    #[test]
    fn test_test_id_serializes_as_name() {
        let mut map = BTreeMap::new();
        map.insert(TestId(10), 1);
        map.insert(TestId(2), 2);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"Test #2":2,"Test #10":1}"#);

        let back: BTreeMap<TestId, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_nested_map_keys_serialize() {
        let mut inner = BTreeMap::new();
        inner.insert(ModelKind::Knn, 1);
        let mut outer: ByOutput<i32> = BTreeMap::new();
        outer.insert(Horizon::Within6Months, inner);

        let json = serde_json::to_string(&outer).unwrap();
        assert_eq!(json, r#"{"Recession_within_6mo":{"KNN":1}}"#);
    }

    #[test]
    fn test_prediction_point_field_names() {
        let point = PredictionPoint::new(date(1980, 1, 1), 1, 0.75);
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["date"], "1980-01-01");
        assert_eq!(json["True"], 1);
        assert_eq!(json["Predicted"], 0.75);
    }

    #[test]
    fn test_prediction_errors() {
        let points = vec![
            PredictionPoint::new(date(1980, 1, 1), 1, 0.9),
            PredictionPoint::new(date(1980, 2, 1), 0, 0.6),
            PredictionPoint::new(date(1980, 3, 1), 0, 0.1),
            PredictionPoint::new(date(1980, 4, 1), 1, 0.2),
        ];
        let errors = PredictionErrors::from_points(&points, 0.5);
        assert_eq!(errors.observations, 4);
        assert_eq!(errors.mismatches, 2);
        assert!((errors.mismatch_rate - 0.5).abs() < 1e-12);
        let expected_brier = (0.01 + 0.36 + 0.01 + 0.64) / 4.0;
        assert!((errors.brier_score - expected_brier).abs() < 1e-12);
    }

    #[test]
    fn test_empty_prediction_errors() {
        let errors = PredictionErrors::from_points(&[], 0.5);
        assert_eq!(errors.observations, 0);
        assert_eq!(errors.mismatch_rate, 0.0);
    }

    #[test]
    fn test_param_value_untagged() {
        let mut params = Hyperparams::new();
        params.insert("k".to_string(), ParamValue::Int(5));
        params.insert("alpha".to_string(), ParamValue::Float(0.1));
        let config = ModelConfig::new(ModelKind::Knn, params);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"model":"KNN","params":{"alpha":0.1,"k":5}}"#);
        assert_eq!(config.key(), "alpha=0.1,k=5");
    }
}
