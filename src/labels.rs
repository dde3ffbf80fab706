//! Recession labeling.
//!
//! Marks each observation that falls inside an NBER recession episode, then
//! derives forward-looking labels per horizon:
//!
//! - `Recession_in_{N}mo`: set on the single row `offset` rows after a
//!   recession row.
//! - `Recession_within_{N}mo`: set on every row from the recession row up to
//!   and including that offset row.
//!
//! The offset is counted in rows, `rows_per_year * months / 12`, with 253
//! rows per year by default (trading days). Offsets running past the end of
//! the table are clamped onto the last row, so the final episode's `in`
//! flag lands on the last observation rather than a true N-month-ahead row.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::ObservationSeries;
use crate::error::{ForecastError, Result};
use crate::types::Horizon;

/// Rows per year used to convert month horizons to row offsets.
pub const TRADING_DAYS_PER_YEAR: usize = 253;

/// A recession episode; the months of `begin` and `end` are both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecessionEpisode {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl RecessionEpisode {
    pub fn contains(&self, date: NaiveDate) -> bool {
        let month = |d: NaiveDate| (d.year(), d.month());
        month(self.begin) <= month(date) && month(date) <= month(self.end)
    }
}

/// NBER business-cycle contractions, begin and end months inclusive.
pub fn nber_recessions() -> Vec<RecessionEpisode> {
    const EPISODES: [((i32, u32), (i32, u32)); 10] = [
        ((1957, 9), (1958, 4)),
        ((1960, 5), (1961, 2)),
        ((1970, 1), (1970, 11)),
        ((1973, 12), (1975, 3)),
        ((1980, 2), (1980, 7)),
        ((1981, 8), (1982, 11)),
        ((1990, 8), (1991, 3)),
        ((2001, 4), (2001, 11)),
        ((2008, 1), (2009, 6)),
        ((2020, 3), (2020, 4)),
    ];

    EPISODES
        .iter()
        .filter_map(|&((by, bm), (ey, em))| {
            Some(RecessionEpisode {
                begin: NaiveDate::from_ymd_opt(by, bm, 1)?,
                end: NaiveDate::from_ymd_opt(ey, em, 1)?,
            })
        })
        .collect()
}

/// Labeling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Rows per year, used to turn month horizons into row offsets.
    pub rows_per_year: usize,
    /// Horizons, in months, to derive `in`/`within` labels for.
    pub horizons_months: Vec<u32>,
    /// Episodes to label; the NBER table when unset.
    pub episodes: Option<Vec<RecessionEpisode>>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            rows_per_year: TRADING_DAYS_PER_YEAR,
            horizons_months: vec![6, 12, 24],
            episodes: None,
        }
    }
}

/// Row offset for a horizon of `months`; `None` on overflow.
pub fn horizon_offset(months: u32, rows_per_year: usize) -> Option<usize> {
    rows_per_year.checked_mul(months as usize).map(|rows| rows / 12)
}

impl LabelConfig {
    /// Reject settings that cannot produce row offsets.
    pub fn validate(&self) -> Result<()> {
        if self.rows_per_year == 0 {
            return Err(ForecastError::ConfigError(
                "rows_per_year must be positive".to_string(),
            ));
        }
        for &months in &self.horizons_months {
            if horizon_offset(months, self.rows_per_year).is_none() {
                return Err(ForecastError::ConfigError(format!(
                    "rows_per_year {} is too large for a {} month horizon",
                    self.rows_per_year, months
                )));
            }
        }
        Ok(())
    }
}

/// 1 for every date inside any episode, else 0.
pub fn recession_flags(dates: &[NaiveDate], episodes: &[RecessionEpisode]) -> Vec<u8> {
    dates
        .iter()
        .map(|&d| u8::from(episodes.iter().any(|e| e.contains(d))))
        .collect()
}

/// `in` and `within` flags derived from a recession flag column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonFlags {
    pub in_flags: Vec<u8>,
    pub within_flags: Vec<u8>,
}

/// Derive `in`/`within` flags for a row offset, clamping at the last row.
pub fn derive_horizon_flags(recession: &[u8], offset: usize) -> HorizonFlags {
    let n = recession.len();
    let mut in_flags = vec![0u8; n];
    let mut within_flags = vec![0u8; n];

    if n == 0 {
        return HorizonFlags {
            in_flags,
            within_flags,
        };
    }

    let last = n - 1;
    for (i, _) in recession.iter().enumerate().filter(|(_, r)| **r == 1) {
        let target = i.saturating_add(offset).min(last);
        in_flags[target] = 1;
        within_flags[i..=target].iter_mut().for_each(|f| *f = 1);
    }

    HorizonFlags {
        in_flags,
        within_flags,
    }
}

/// Column names of the `in` and `within` labels for a horizon.
pub fn label_columns(months: u32) -> (String, String) {
    (
        format!("Recession_in_{}mo", months),
        format!("Recession_within_{}mo", months),
    )
}

/// Attach `Recession` and per-horizon labels to a series.
pub fn label_series(series: &ObservationSeries, config: &LabelConfig) -> Result<ObservationSeries> {
    config.validate()?;

    let episodes = config.episodes.clone().unwrap_or_else(nber_recessions);
    let recession = recession_flags(series.dates(), &episodes);
    info!(
        "Labeling {} observations: {} recession rows",
        series.len(),
        recession.iter().filter(|&&r| r == 1).count()
    );

    let mut labeled = series.with_column(Horizon::Now.column(), to_f64(&recession))?;
    for &months in &config.horizons_months {
        let offset = horizon_offset(months, config.rows_per_year).ok_or_else(|| {
            ForecastError::ConfigError(format!("{} month horizon overflows", months))
        })?;
        let flags = derive_horizon_flags(&recession, offset);
        let (in_col, within_col) = label_columns(months);
        labeled = labeled.with_column(in_col, to_f64(&flags.in_flags))?;
        labeled = labeled.with_column(within_col, to_f64(&flags.within_flags))?;
    }

    Ok(labeled)
}

fn to_f64(flags: &[u8]) -> Vec<f64> {
    flags.iter().map(|&f| f as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_offsets() {
        assert_eq!(horizon_offset(6, TRADING_DAYS_PER_YEAR), Some(126));
        assert_eq!(horizon_offset(12, TRADING_DAYS_PER_YEAR), Some(253));
        assert_eq!(horizon_offset(24, TRADING_DAYS_PER_YEAR), Some(506));
        assert_eq!(horizon_offset(12, 12), Some(12));
        assert_eq!(horizon_offset(24, usize::MAX), None);
    }

    #[test]
    fn test_huge_rows_per_year_is_rejected() {
        let config = LabelConfig {
            rows_per_year: usize::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ForecastError::ConfigError(_))));

        let series = ObservationSeries::new(
            vec![date(1980, 1, 1)],
            vec![("spread".to_string(), vec![0.5])],
        )
        .unwrap();
        assert!(label_series(&series, &config).is_err());
        assert!(LabelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_offset_near_usize_max_does_not_overflow() {
        let flags = derive_horizon_flags(&[0, 1, 0], usize::MAX);
        assert_eq!(flags.in_flags, vec![0, 0, 1]);
        assert_eq!(flags.within_flags, vec![0, 1, 1]);
    }

    #[test]
    fn test_nber_table() {
        let episodes = nber_recessions();
        assert_eq!(episodes.len(), 10);
        assert!(episodes.iter().all(|e| e.begin <= e.end));
        assert!(episodes[3].contains(date(1974, 6, 1)));
        assert!(episodes[3].contains(date(1975, 3, 31)));
        assert!(!episodes[3].contains(date(1975, 4, 1)));
        assert!(!episodes[3].contains(date(1973, 11, 30)));
    }

    #[test]
    fn test_single_recession_row() {
        let mut recession = vec![0u8; 600];
        recession[100] = 1;

        let flags = derive_horizon_flags(&recession, 253);
        let within: Vec<usize> = (0..600).filter(|&i| flags.within_flags[i] == 1).collect();
        assert_eq!(within.len(), 254);
        assert_eq!(within.first(), Some(&100));
        assert_eq!(within.last(), Some(&353));

        let in_rows: Vec<usize> = (0..600).filter(|&i| flags.in_flags[i] == 1).collect();
        assert_eq!(in_rows, vec![353]);
    }

    #[test]
    fn test_offset_clamps_to_last_row() {
        let mut recession = vec![0u8; 200];
        recession[150] = 1;

        let flags = derive_horizon_flags(&recession, 253);
        assert_eq!(flags.in_flags[199], 1);
        assert_eq!(flags.in_flags.iter().filter(|&&f| f == 1).count(), 1);
        assert_eq!(flags.within_flags.iter().filter(|&&f| f == 1).count(), 50);
    }

    #[test]
    fn test_label_series_adds_columns() {
        let dates: Vec<NaiveDate> = (1..=12).map(|m| date(1980, m, 1)).collect();
        let series =
            ObservationSeries::new(dates, vec![("spread".to_string(), vec![0.5; 12])]).unwrap();

        let config = LabelConfig {
            rows_per_year: 12,
            horizons_months: vec![6],
            episodes: None,
        };
        let labeled = label_series(&series, &config).unwrap();

        // 1980-02 through 1980-07 inclusive
        let recession = labeled.column("Recession").unwrap();
        assert_eq!(recession.iter().sum::<f64>(), 6.0);
        assert_eq!(recession[1], 1.0);
        assert_eq!(recession[0], 0.0);

        let within = labeled.column("Recession_within_6mo").unwrap();
        assert!(within[1..].iter().all(|&v| v == 1.0));
        assert_eq!(within[0], 0.0);

        // rows 5 and 6 both clamp onto the last row
        let in_col = labeled.column("Recession_in_6mo").unwrap();
        assert_eq!(in_col.iter().sum::<f64>(), 5.0);
        assert_eq!(in_col[6], 0.0);
        assert_eq!(in_col[7], 1.0);
        assert_eq!(in_col[11], 1.0);
    }
}
