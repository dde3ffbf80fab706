//! Per-model comparison tables spanning every test window.
//!
//! Rows are concatenated in ascending test order and never re-sorted by
//! date, so overlapping prediction periods show up as repeated dates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{ForecastError, Result};
use crate::types::{ByTest, Horizon, ModelKind, PredictionPoint, TestId};

/// One dated row: realized labels and predicted probabilities.
///
/// A column is empty when the model has no record for that horizon in the
/// row's test window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub date: NaiveDate,
    #[serde(rename = "True_Recession")]
    pub true_now: Option<u8>,
    #[serde(rename = "True_Recession_within_6mo")]
    pub true_6mo: Option<u8>,
    #[serde(rename = "Pred_Recession_within_6mo")]
    pub pred_6mo: Option<f64>,
    #[serde(rename = "True_Recession_within_12mo")]
    pub true_12mo: Option<u8>,
    #[serde(rename = "Pred_Recession_within_12mo")]
    pub pred_12mo: Option<f64>,
    #[serde(rename = "True_Recession_within_24mo")]
    pub true_24mo: Option<u8>,
    #[serde(rename = "Pred_Recession_within_24mo")]
    pub pred_24mo: Option<f64>,
}

impl ComparisonRow {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            true_now: None,
            true_6mo: None,
            pred_6mo: None,
            true_12mo: None,
            pred_12mo: None,
            true_24mo: None,
            pred_24mo: None,
        }
    }

    fn set(&mut self, horizon: Horizon, point: &PredictionPoint) {
        match horizon {
            Horizon::Now => self.true_now = Some(point.actual),
            Horizon::Within6Months => {
                self.true_6mo = Some(point.actual);
                self.pred_6mo = Some(point.predicted);
            }
            Horizon::Within12Months => {
                self.true_12mo = Some(point.actual);
                self.pred_12mo = Some(point.predicted);
            }
            Horizon::Within24Months => {
                self.true_24mo = Some(point.actual);
                self.pred_24mo = Some(point.predicted);
            }
        }
    }

    /// The (true, predicted) pair of a forecast horizon.
    ///
    /// `Horizon::Now` has no predicted column.
    pub fn pair(&self, horizon: Horizon) -> Option<(u8, f64)> {
        match horizon {
            Horizon::Now => None,
            Horizon::Within6Months => self.true_6mo.zip(self.pred_6mo),
            Horizon::Within12Months => self.true_12mo.zip(self.pred_12mo),
            Horizon::Within24Months => self.true_24mo.zip(self.pred_24mo),
        }
    }
}

/// Where one test's rows sit in a [`ModelTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSegment {
    pub test: TestId,
    pub start: usize,
    pub len: usize,
}

/// Continuous comparison table of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTable {
    pub model: ModelKind,
    pub rows: Vec<ComparisonRow>,
    pub segments: Vec<TestSegment>,
}

impl ModelTable {
    /// Rows covered by a segment; `None` if it points outside the table.
    fn segment_rows(&self, segment: &TestSegment) -> Option<&[ComparisonRow]> {
        let end = segment.start.checked_add(segment.len)?;
        self.rows.get(segment.start..end)
    }

    /// Rows of each test, in table order.
    ///
    /// Segments pointing outside the table (a hand-edited or truncated file)
    /// are skipped.
    pub fn split_by_test(&self) -> Vec<(TestId, &[ComparisonRow])> {
        self.segments
            .iter()
            .filter_map(|s| match self.segment_rows(s) {
                Some(rows) => Some((s.test, rows)),
                None => {
                    warn!("{} segment {}+{} is out of range", s.test, s.start, s.len);
                    None
                }
            })
            .collect()
    }

    /// Prediction record of one test and forecast horizon, rebuilt from the
    /// table.
    pub fn records_for(&self, test: TestId, horizon: Horizon) -> Option<Vec<PredictionPoint>> {
        let segment = self.segments.iter().find(|s| s.test == test)?;
        self.segment_rows(segment)?
            .iter()
            .map(|row| {
                row.pair(horizon)
                    .map(|(actual, predicted)| PredictionPoint::new(row.date, actual, predicted))
            })
            .collect()
    }

    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Concatenate one model's out-of-sample records across tests.
///
/// Tests where the model has no record for any horizon are left out. All
/// horizons present in a test must cover the same dates.
pub fn aggregate_model(
    full_predictions: &ByTest<Vec<PredictionPoint>>,
    model: ModelKind,
) -> Result<ModelTable> {
    let mut rows: Vec<ComparisonRow> = Vec::new();
    let mut segments = Vec::new();

    for (&test, by_output) in full_predictions {
        let records: Vec<(Horizon, &Vec<PredictionPoint>)> = by_output
            .iter()
            .filter_map(|(&h, by_model)| by_model.get(&model).map(|r| (h, r)))
            .collect();

        let Some(&(_, reference)) = records.first() else {
            debug!("{} has no {} records", test, model);
            continue;
        };
        if records.len() < by_output.len() {
            warn!(
                "{} {}: only {} of {} horizons present",
                test,
                model,
                records.len(),
                by_output.len()
            );
        }

        let mut block: Vec<ComparisonRow> =
            reference.iter().map(|p| ComparisonRow::empty(p.date)).collect();
        for &(horizon, record) in &records {
            let aligned = record.len() == block.len()
                && record.iter().zip(&block).all(|(p, row)| p.date == row.date);
            if !aligned {
                return Err(ForecastError::DataError(format!(
                    "{} {} {}: dates do not match the other horizons",
                    test, horizon, model
                )));
            }
            for (row, point) in block.iter_mut().zip(record) {
                row.set(horizon, point);
            }
        }

        segments.push(TestSegment {
            test,
            start: rows.len(),
            len: block.len(),
        });
        rows.extend(block);
    }

    Ok(ModelTable {
        model,
        rows,
        segments,
    })
}

/// One table per model that has any out-of-sample record.
pub fn aggregate_all(full_predictions: &ByTest<Vec<PredictionPoint>>) -> Result<Vec<ModelTable>> {
    let models: BTreeSet<ModelKind> = full_predictions
        .values()
        .flat_map(|by_output| by_output.values())
        .flat_map(|by_model| by_model.keys().copied())
        .collect();

    models
        .into_iter()
        .map(|m| aggregate_model(full_predictions, m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(year: i32, months: std::ops::Range<u32>, offset: f64) -> Vec<PredictionPoint> {
        months
            .map(|m| {
                PredictionPoint::new(
                    NaiveDate::from_ymd_opt(year, m, 1).unwrap(),
                    (m % 2) as u8,
                    offset + m as f64 / 100.0,
                )
            })
            .collect()
    }

    fn full() -> ByTest<Vec<PredictionPoint>> {
        let mut full = BTreeMap::new();
        for (test, year) in [(1, 1980), (2, 1979)] {
            let mut by_output = BTreeMap::new();
            for h in Horizon::ALL {
                let mut by_model = BTreeMap::new();
                by_model.insert(ModelKind::Knn, record(year, 1..4, h.months() as f64));
                by_output.insert(h, by_model);
            }
            full.insert(TestId(test), by_output);
        }
        full
    }

    #[test]
    fn test_rows_follow_test_order() {
        let table = aggregate_model(&full(), ModelKind::Knn).unwrap();
        assert_eq!(table.rows.len(), 6);
        // Test #2 covers earlier dates but still comes second.
        assert_eq!(table.rows[0].date.format("%Y").to_string(), "1980");
        assert_eq!(table.rows[3].date.format("%Y").to_string(), "1979");
        assert!((table.rows[0].pred_12mo.unwrap() - 12.01).abs() < 1e-12);
        assert_eq!(table.rows[1].true_now, Some(0));
    }

    #[test]
    fn test_split_recovers_records() {
        let full = full();
        let table = aggregate_model(&full, ModelKind::Knn).unwrap();
        let split = table.split_by_test();
        assert_eq!(split.len(), 2);
        assert_eq!(split[1].0, TestId(2));

        for (&test, by_output) in &full {
            for h in [Horizon::Within6Months, Horizon::Within24Months] {
                let rebuilt = table.records_for(test, h).unwrap();
                assert_eq!(&rebuilt, &by_output[&h][&ModelKind::Knn]);
            }
        }
    }

    #[test]
    fn test_out_of_range_segments_are_ignored() {
        let mut table = aggregate_model(&full(), ModelKind::Knn).unwrap();
        table.segments[1].len = 50;
        table.segments.push(TestSegment {
            test: TestId(9),
            start: usize::MAX,
            len: 2,
        });

        let split = table.split_by_test();
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].0, TestId(1));
        assert!(table.records_for(TestId(2), Horizon::Within6Months).is_none());
        assert!(table.records_for(TestId(9), Horizon::Within6Months).is_none());
        assert!(table.records_for(TestId(1), Horizon::Within6Months).is_some());
    }

    #[test]
    fn test_misaligned_horizons_rejected() {
        let mut full = full();
        let knn = full
            .get_mut(&TestId(1))
            .and_then(|o| o.get_mut(&Horizon::Within6Months))
            .and_then(|m| m.get_mut(&ModelKind::Knn))
            .unwrap();
        knn.pop();
        assert!(aggregate_model(&full, ModelKind::Knn).is_err());
    }

    #[test]
    fn test_unknown_model_gives_empty_table() {
        let table = aggregate_model(&full(), ModelKind::Svm).unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(aggregate_all(&full()).unwrap().len(), 1);
    }

    #[test]
    fn test_csv_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knn.csv");
        aggregate_model(&full(), ModelKind::Knn)
            .unwrap()
            .to_csv(&path)
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "date,True_Recession,True_Recession_within_6mo,Pred_Recession_within_6mo,"
        ));
    }
}
