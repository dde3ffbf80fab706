//! Error types for the recession backtester.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{Horizon, ModelKind, TestId};

/// Main error type for cross-validation, prediction and persistence.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid test window: {0}")]
    InvalidWindow(String),

    #[error("No optimal configuration for {model} / {horizon} in {test}")]
    ConfigurationMissing {
        test: TestId,
        horizon: Horizon,
        model: ModelKind,
    },

    #[error("{model} needs at least {required} observations, window has {available}")]
    DataInsufficient {
        model: ModelKind,
        required: usize,
        available: usize,
    },

    #[error("No observations between {start} and {end}")]
    RangeNotFound { start: NaiveDate, end: NaiveDate },

    #[error("{model} failed: {message}")]
    AdapterFailure { model: ModelKind, message: String },

    #[error("{model} exceeded its {seconds}s budget")]
    Timeout { model: ModelKind, seconds: u64 },
}

impl ForecastError {
    /// Errors that only invalidate one (horizon, model) pair.
    ///
    /// Everything else aborts the enclosing test window.
    pub fn is_pair_scoped(&self) -> bool {
        matches!(
            self,
            ForecastError::AdapterFailure { .. }
                | ForecastError::DataInsufficient { .. }
                | ForecastError::Timeout { .. }
        )
    }

    /// Short, stable name used in run summaries.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ForecastError::DataError(_) => "DataError",
            ForecastError::CsvError(_) => "CsvError",
            ForecastError::IoError(_) => "IoError",
            ForecastError::DateParseError(_) => "DateParseError",
            ForecastError::JsonError(_) => "JsonError",
            ForecastError::TomlError(_) => "TomlError",
            ForecastError::ConfigError(_) => "ConfigError",
            ForecastError::InvalidInput(_) => "InvalidInput",
            ForecastError::InvalidWindow(_) => "InvalidWindow",
            ForecastError::ConfigurationMissing { .. } => "ConfigurationMissing",
            ForecastError::DataInsufficient { .. } => "DataInsufficient",
            ForecastError::RangeNotFound { .. } => "RangeNotFound",
            ForecastError::AdapterFailure { .. } => "AdapterFailure",
            ForecastError::Timeout { .. } => "Timeout",
        }
    }
}

/// Result type alias for backtest operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_scoped_classification() {
        let insufficient = ForecastError::DataInsufficient {
            model: ModelKind::Knn,
            required: 30,
            available: 12,
        };
        assert!(insufficient.is_pair_scoped());

        let missing = ForecastError::RangeNotFound {
            start: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2031, 1, 1).unwrap(),
        };
        assert!(!missing.is_pair_scoped());
        assert_eq!(missing.kind_name(), "RangeNotFound");
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ForecastError::ConfigurationMissing {
            test: TestId(3),
            horizon: Horizon::Within12Months,
            model: ModelKind::Svm,
        };
        let msg = err.to_string();
        assert!(msg.contains("Test #3"));
        assert!(msg.contains("Recession_within_12mo"));
        assert!(msg.contains("SVM"));
    }
}
