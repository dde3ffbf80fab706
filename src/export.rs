//! Persistence of backtest results.
//!
//! A [`ResultStore`] owns one results directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `cv_results.json` | optimal configuration per test / horizon / model |
//! | `cv_metadata.json` | cross-validation metadata |
//! | `pred_model_metadata.json` | prediction metadata |
//! | `prediction_errors.json` | error metrics |
//! | `full_predictions.json` | `{date, True, Predicted}` records |
//! | `run_manifest.json` | run id, timestamps, data checksum, error summary |
//! | `<model>_test_results.{json,csv}` | per-model comparison tables |

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregate::{aggregate_all, ModelTable};
use crate::backtest::BacktestReport;
use crate::error::Result;
use crate::metadata::RunManifest;
use crate::types::{ByTest, ModelConfig, ModelKind, PredictionErrors, PredictionPoint};

pub const CV_RESULTS: &str = "cv_results.json";
pub const CV_METADATA: &str = "cv_metadata.json";
pub const PRED_METADATA: &str = "pred_model_metadata.json";
pub const PREDICTION_ERRORS: &str = "prediction_errors.json";
pub const FULL_PREDICTIONS: &str = "full_predictions.json";
pub const RUN_MANIFEST: &str = "run_manifest.json";

/// Reader/writer for one results directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// File stem of a model's comparison table.
    pub fn table_stem(model: ModelKind) -> String {
        format!("{}_test_results", model.name().to_lowercase())
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(file);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        Ok(path)
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let reader = BufReader::new(File::open(self.path(file))?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write the five result collections.
    pub fn save_report(&self, report: &BacktestReport) -> Result<()> {
        self.write_json(CV_RESULTS, &report.optimal_params)?;
        self.write_json(CV_METADATA, &report.cv_metadata)?;
        self.write_json(PRED_METADATA, &report.pred_metadata)?;
        self.write_json(PREDICTION_ERRORS, &report.prediction_errors)?;
        self.write_json(FULL_PREDICTIONS, &report.full_predictions)?;
        info!("Saved results to {}", self.dir.display());
        Ok(())
    }

    pub fn save_manifest(&self, manifest: &RunManifest) -> Result<()> {
        self.write_json(RUN_MANIFEST, manifest)?;
        Ok(())
    }

    /// Write one comparison table as JSON and CSV.
    pub fn save_table(&self, table: &ModelTable) -> Result<()> {
        let stem = Self::table_stem(table.model);
        self.write_json(&format!("{}.json", stem), table)?;
        table.to_csv(self.path(&format!("{}.csv", stem)))?;
        info!("{} results saved to {}", table.model, self.path(&stem).display());
        Ok(())
    }

    /// Aggregate persisted predictions and write a table per model.
    pub fn save_tables(
        &self,
        full_predictions: &ByTest<Vec<PredictionPoint>>,
    ) -> Result<Vec<ModelTable>> {
        let tables = aggregate_all(full_predictions)?;
        for table in &tables {
            self.save_table(table)?;
        }
        Ok(tables)
    }

    pub fn load_full_predictions(&self) -> Result<ByTest<Vec<PredictionPoint>>> {
        self.read_json(FULL_PREDICTIONS)
    }

    pub fn load_optimal_params(&self) -> Result<ByTest<ModelConfig>> {
        self.read_json(CV_RESULTS)
    }

    pub fn load_prediction_errors(&self) -> Result<ByTest<PredictionErrors>> {
        self.read_json(PREDICTION_ERRORS)
    }

    pub fn load_manifest(&self) -> Result<RunManifest> {
        self.read_json(RUN_MANIFEST)
    }
}
