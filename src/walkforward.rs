//! Walk-forward windows.
//!
//! A [`TestWindow`] splits history into a cross-validation period and a
//! strictly later out-of-sample period. Inside the cross-validation period,
//! [`walk_forward_splits`] produces expanding train/validate splits where
//! every validated row comes after all of its training rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{ForecastError, Result};
use crate::types::TestId;

/// Raw window boundaries, as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWindow {
    pub test: u32,
    pub cv_start: NaiveDate,
    pub cv_end: NaiveDate,
    pub pred_start: NaiveDate,
    pub pred_end: NaiveDate,
}

/// An immutable, validated test window.
///
/// Invariants: `cv_start <= cv_end < pred_start <= pred_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct TestWindow {
    test: TestId,
    cv_start: NaiveDate,
    cv_end: NaiveDate,
    pred_start: NaiveDate,
    pred_end: NaiveDate,
}

impl TestWindow {
    /// Create a window, rejecting overlapping or inverted boundaries.
    pub fn new(
        test: u32,
        cv_start: NaiveDate,
        cv_end: NaiveDate,
        pred_start: NaiveDate,
        pred_end: NaiveDate,
    ) -> Result<Self> {
        if cv_start > cv_end {
            return Err(ForecastError::InvalidWindow(format!(
                "Test #{}: cv_start {} is after cv_end {}",
                test, cv_start, cv_end
            )));
        }
        if pred_start > pred_end {
            return Err(ForecastError::InvalidWindow(format!(
                "Test #{}: pred_start {} is after pred_end {}",
                test, pred_start, pred_end
            )));
        }
        if pred_start <= cv_end {
            return Err(ForecastError::InvalidWindow(format!(
                "Test #{}: pred_start {} must be after cv_end {}",
                test, pred_start, cv_end
            )));
        }

        Ok(Self {
            test: TestId(test),
            cv_start,
            cv_end,
            pred_start,
            pred_end,
        })
    }

    pub fn test(&self) -> TestId {
        self.test
    }

    pub fn cv_start(&self) -> NaiveDate {
        self.cv_start
    }

    pub fn cv_end(&self) -> NaiveDate {
        self.cv_end
    }

    pub fn pred_start(&self) -> NaiveDate {
        self.pred_start
    }

    pub fn pred_end(&self) -> NaiveDate {
        self.pred_end
    }

    /// Whether a date falls in the cross-validation period.
    pub fn in_cv(&self, date: NaiveDate) -> bool {
        self.cv_start <= date && date <= self.cv_end
    }

    /// Whether a date falls in the out-of-sample period.
    pub fn in_prediction(&self, date: NaiveDate) -> bool {
        self.pred_start <= date && date <= self.pred_end
    }
}

impl TryFrom<RawWindow> for TestWindow {
    type Error = ForecastError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        TestWindow::new(
            raw.test,
            raw.cv_start,
            raw.cv_end,
            raw.pred_start,
            raw.pred_end,
        )
    }
}

impl From<TestWindow> for RawWindow {
    fn from(w: TestWindow) -> Self {
        RawWindow {
            test: w.test.0,
            cv_start: w.cv_start,
            cv_end: w.cv_end,
            pred_start: w.pred_start,
            pred_end: w.pred_end,
        }
    }
}

/// The six historical test windows, 1972 through 2021.
pub fn default_schedule() -> Vec<TestWindow> {
    const SCHEDULE: [(u32, &str, &str, &str, &str); 6] = [
        (1, "1972-01-01", "1975-12-01", "1976-01-01", "1981-07-01"),
        (2, "1976-01-01", "1981-07-01", "1981-08-01", "1983-07-01"),
        (3, "1976-01-01", "1983-07-01", "1983-08-01", "1992-12-01"),
        (4, "1983-08-01", "1992-12-01", "1993-01-01", "2003-07-01"),
        (5, "1993-01-01", "2003-07-01", "2003-08-01", "2010-09-01"),
        (6, "2003-08-01", "2010-09-01", "2010-10-01", "2021-07-01"),
    ];

    let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();

    SCHEDULE
        .iter()
        .filter_map(|&(test, a, b, c, d)| {
            TestWindow::new(test, parse(a)?, parse(b)?, parse(c)?, parse(d)?).ok()
        })
        .collect()
}

/// Check that test numbers are unique and strictly ascending.
pub fn validate_schedule(windows: &[TestWindow]) -> Result<()> {
    if windows.is_empty() {
        return Err(ForecastError::ConfigError("no test windows configured".to_string()));
    }
    if let Some(pair) = windows.windows(2).find(|w| w[0].test >= w[1].test) {
        return Err(ForecastError::ConfigError(format!(
            "test windows must be in ascending test order: {} precedes {}",
            pair[0].test, pair[1].test
        )));
    }
    Ok(())
}

/// One expanding walk-forward split, in row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkForwardSplit {
    /// Rows the model is fitted on.
    pub train: Range<usize>,
    /// Rows scored with that fit; always after `train.end + embargo`.
    pub validate: Range<usize>,
}

/// Expanding-window splits over `rows`.
///
/// Training always starts at `rows.start`. The first validation block
/// begins once `min_train` rows plus `embargo` rows are available; each
/// block covers up to `step` rows and the training set grows to just
/// before the next block, less the embargo.
pub fn walk_forward_splits(
    rows: Range<usize>,
    min_train: usize,
    step: usize,
    embargo: usize,
) -> Vec<WalkForwardSplit> {
    let step = step.max(1);
    let mut splits = Vec::new();
    let mut t = rows.start + min_train.max(1) + embargo;

    while t < rows.end {
        let block_end = (t + step).min(rows.end);
        splits.push(WalkForwardSplit {
            train: rows.start..t - embargo,
            validate: t..block_end,
        });
        t = block_end;
    }

    splits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_validation() {
        let ok = TestWindow::new(
            1,
            date(1972, 1, 1),
            date(1975, 12, 1),
            date(1976, 1, 1),
            date(1981, 7, 1),
        );
        assert!(ok.is_ok());

        let overlapping = TestWindow::new(
            1,
            date(1972, 1, 1),
            date(1976, 1, 1),
            date(1976, 1, 1),
            date(1981, 7, 1),
        );
        assert!(matches!(overlapping, Err(ForecastError::InvalidWindow(_))));

        let inverted = TestWindow::new(
            1,
            date(1975, 1, 1),
            date(1972, 1, 1),
            date(1976, 1, 1),
            date(1981, 7, 1),
        );
        assert!(inverted.is_err());
    }

    #[test]
    fn test_default_schedule() {
        let windows = default_schedule();
        assert_eq!(windows.len(), 6);
        assert!(validate_schedule(&windows).is_ok());

        for window in &windows {
            assert!(window.cv_end() < window.pred_start());
        }
        assert_eq!(windows[0].cv_start(), date(1972, 1, 1));
        assert_eq!(windows[5].pred_end(), date(2021, 7, 1));
        // Tests 2 and 3 share a cross-validation start.
        assert_eq!(windows[1].cv_start(), windows[2].cv_start());
    }

    #[test]
    fn test_schedule_order_enforced() {
        let mut windows = default_schedule();
        windows.swap(0, 1);
        assert!(validate_schedule(&windows).is_err());
        assert!(validate_schedule(&[]).is_err());
    }

    #[test]
    fn test_window_deserialization_validates() {
        let good = r#"{"test":1,"cv_start":"1972-01-01","cv_end":"1975-12-01","pred_start":"1976-01-01","pred_end":"1981-07-01"}"#;
        let window: TestWindow = serde_json::from_str(good).unwrap();
        assert_eq!(window.test(), TestId(1));

        let bad = r#"{"test":1,"cv_start":"1972-01-01","cv_end":"1976-12-01","pred_start":"1976-01-01","pred_end":"1981-07-01"}"#;
        assert!(serde_json::from_str::<TestWindow>(bad).is_err());
    }

    #[test]
    fn test_walk_forward_splits_are_chronological() {
        let splits = walk_forward_splits(10..40, 12, 5, 0);
        assert_eq!(splits.first().unwrap().train, 10..22);
        assert_eq!(splits.first().unwrap().validate, 22..27);
        assert_eq!(splits.last().unwrap().validate.end, 40);

        for split in &splits {
            assert_eq!(split.train.start, 10);
            assert!(split.train.end <= split.validate.start);
        }

        // Validation blocks tile the tail of the range exactly once.
        let validated: Vec<usize> = splits.iter().flat_map(|s| s.validate.clone()).collect();
        assert_eq!(validated, (22..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_walk_forward_splits_with_embargo() {
        let splits = walk_forward_splits(0..30, 10, 4, 3);
        assert_eq!(splits[0].train, 0..10);
        assert_eq!(splits[0].validate, 13..17);
        for split in &splits {
            assert!(split.train.end + 3 <= split.validate.start);
        }
    }

    #[test]
    fn test_walk_forward_splits_too_short() {
        assert!(walk_forward_splits(0..10, 10, 1, 0).is_empty());
    }
}
