//! Configuration file support for backtest runs.
//!
//! A run is described by one TOML file so it can be reproduced exactly.
//! Every section is optional; an empty file runs all models over all
//! horizons on the six historical test windows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::adapter::ModelRegistry;
use crate::backtest::BacktestConfig;
use crate::data::{load_csv, DataConfig, ObservationSeries};
use crate::error::{ForecastError, Result};
use crate::labels::{label_series, LabelConfig, RecessionEpisode, TRADING_DAYS_PER_YEAR};
use crate::search::SearchSettings;
use crate::types::{Horizon, ModelKind};
use crate::walkforward::{default_schedule, validate_schedule, TestWindow};

/// Complete run configuration loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Models to backtest; include `Weighted_Average` for the ensemble.
    #[serde(default = "default_models")]
    pub models: Vec<ModelKind>,
    /// Label columns to forecast.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<Horizon>,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub labels: LabelSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub run: RunSettings,
    /// Test windows, in ascending test order.
    #[serde(default = "default_schedule")]
    pub windows: Vec<TestWindow>,
}

fn default_models() -> Vec<ModelKind> {
    let mut models = ModelKind::ADAPTERS.to_vec();
    models.push(ModelKind::WeightedAverage);
    models
}

fn default_horizons() -> Vec<Horizon> {
    Horizon::ALL.to_vec()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            horizons: default_horizons(),
            data: DataSettings::default(),
            labels: LabelSettings::default(),
            search: SearchSettings::default(),
            output: OutputSettings::default(),
            run: RunSettings::default(),
            windows: default_schedule(),
        }
    }
}

/// Input table settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Path to the observation CSV.
    pub path: PathBuf,
    pub date_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    /// Feature columns fed to every model.
    pub features: Vec<String>,
    /// Fill interior gaps by linear interpolation.
    pub interpolate: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/final_features.csv"),
            date_column: "date".to_string(),
            date_format: None,
            features: [
                "Payrolls_3mo_vs_12mo",
                "Real_Fed_Funds_Rate_12mo_chg",
                "CPI_3mo_pct_chg_annualized",
                "10Y_Treasury_Rate_12mo_chg",
                "3M_10Y_Treasury_Spread",
                "S&P_500_12mo_chg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            interpolate: true,
        }
    }
}

impl DataSettings {
    pub fn to_data_config(&self) -> DataConfig {
        DataConfig {
            date_column: self.date_column.clone(),
            date_format: self.date_format.clone(),
            interpolate: self.interpolate,
        }
    }
}

/// Recession labeling applied after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Derive label columns from the episode table instead of reading them.
    pub apply: bool,
    pub rows_per_year: usize,
    pub horizons_months: Vec<u32>,
    /// Episodes to label; the NBER table when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episodes: Option<Vec<RecessionEpisode>>,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            apply: false,
            rows_per_year: TRADING_DAYS_PER_YEAR,
            horizons_months: vec![6, 12, 24],
            episodes: None,
        }
    }
}

impl LabelSettings {
    pub fn to_label_config(&self) -> LabelConfig {
        LabelConfig {
            rows_per_year: self.rows_per_year,
            horizons_months: self.horizons_months.clone(),
            episodes: self.episodes.clone(),
        }
    }
}

/// Where results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    /// Also write per-model comparison tables.
    pub tables: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            tables: true,
        }
    }
}

/// Execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub parallel_windows: bool,
    pub parallel_pairs: bool,
    pub show_progress: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parallel_windows: false,
            parallel_pairs: true,
            show_progress: true,
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ForecastError::ConfigError(e.to_string()))
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.data.features.is_empty() {
            return Err(ForecastError::ConfigError("no feature columns configured".into()));
        }
        let unique: BTreeSet<&String> = self.data.features.iter().collect();
        if unique.len() != self.data.features.len() {
            return Err(ForecastError::ConfigError("duplicate feature columns".into()));
        }
        if !self.models.iter().any(|m| !m.is_ensemble()) {
            return Err(ForecastError::ConfigError("no adapter models configured".into()));
        }
        if self.horizons.is_empty() {
            return Err(ForecastError::ConfigError("no horizons configured".into()));
        }
        if self.search.refit_step == 0 {
            return Err(ForecastError::ConfigError("refit_step must be positive".into()));
        }
        if !(self.search.threshold > 0.0 && self.search.threshold < 1.0) {
            return Err(ForecastError::ConfigError(format!(
                "threshold must be in (0, 1), got {}",
                self.search.threshold
            )));
        }
        self.labels.to_label_config().validate()?;
        validate_schedule(&self.windows)
    }

    /// Convert to the orchestrator's settings.
    pub fn to_backtest_config(&self) -> Result<BacktestConfig> {
        self.validate()?;
        Ok(BacktestConfig {
            features: self.data.features.clone(),
            horizons: self.horizons.clone(),
            search: self.search.clone(),
            parallel_windows: self.run.parallel_windows,
            parallel_pairs: self.run.parallel_pairs,
            show_progress: self.run.show_progress,
            ensemble: self.models.contains(&ModelKind::WeightedAverage),
        })
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::with_models(&self.models)
    }

    /// Load the observation table, labeling it when configured to.
    pub fn load_observations(&self) -> Result<ObservationSeries> {
        let series = load_csv(&self.data.path, &self.data.to_data_config())?;
        if self.labels.apply {
            label_series(&series, &self.labels.to_label_config())
        } else {
            Ok(series)
        }
    }
}
