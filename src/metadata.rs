//! Run manifests and reproducibility tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

use crate::backtest::{BacktestConfig, RunSummary};
use crate::types::{Horizon, ModelKind};
use crate::walkforward::TestWindow;

/// Metadata about the observation file a run read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileMetadata {
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// SHA256 checksum of the file contents.
    pub checksum: String,
}

/// Compute SHA256 checksum of a file.
pub fn compute_file_checksum(path: impl AsRef<Path>) -> std::io::Result<String> {
    let data = std::fs::read(path.as_ref())?;
    Ok(compute_hash(&data))
}

/// Compute SHA256 hash of arbitrary bytes.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash of a configuration's JSON form. Empty if it cannot be serialized.
pub fn compute_config_hash<T: Serialize>(config: &T) -> String {
    match serde_json::to_vec(config) {
        Ok(bytes) => compute_hash(&bytes),
        Err(e) => {
            warn!("Failed to serialize config for hashing: {}", e);
            String::new()
        }
    }
}

/// Track data file metadata.
pub fn track_data_file(path: impl AsRef<Path>) -> std::io::Result<DataFileMetadata> {
    let path = path.as_ref();
    let size = std::fs::metadata(path)?.len();
    let checksum = compute_file_checksum(path)?;

    Ok(DataFileMetadata {
        path: path.display().to_string(),
        size,
        checksum,
    })
}

/// Identity and outcome of one backtest run, written next to its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub crate_version: String,
    pub config_hash: String,
    pub data_file: Option<DataFileMetadata>,
    pub windows: Vec<TestWindow>,
    pub models: Vec<ModelKind>,
    pub horizons: Vec<Horizon>,
    pub features: Vec<String>,
    pub summary: Option<RunSummary>,
}

impl RunManifest {
    /// Start a manifest for a run about to begin.
    pub fn begin(config: &BacktestConfig, windows: &[TestWindow], models: &[ModelKind]) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: compute_config_hash(config),
            data_file: None,
            windows: windows.to_vec(),
            models: models.to_vec(),
            horizons: config.horizons.clone(),
            features: config.features.clone(),
            summary: None,
        }
    }

    /// Attach the observation file; unreadable files are logged and skipped.
    pub fn with_data_file(mut self, path: impl AsRef<Path>) -> Self {
        match track_data_file(path.as_ref()) {
            Ok(meta) => self.data_file = Some(meta),
            Err(e) => warn!("Could not checksum {}: {}", path.as_ref().display(), e),
        }
        self
    }

    pub fn finish(&mut self, summary: RunSummary) {
        self.finished_at = Some(Utc::now());
        self.summary = Some(summary);
    }
}
