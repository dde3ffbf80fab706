//! Observation series: a dated, column-oriented table of features and labels.
//!
//! The series is sorted ascending by date on construction and rejects
//! duplicate dates, so row indices are chronological everywhere downstream.

use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ForecastError, Result};
use crate::types::Horizon;

/// Configuration for loading a dated table from CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Name of the date column.
    pub date_column: String,
    /// Date format; `%Y-%m-%d` when unset.
    pub date_format: Option<String>,
    /// Linearly interpolate interior gaps in numeric columns.
    pub interpolate: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            date_format: None,
            interpolate: true,
        }
    }
}

/// Chronologically ordered table of numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ObservationSeries {
    /// Build a series from dates and named columns.
    ///
    /// Rows are reordered ascending by date. Duplicate dates, ragged columns
    /// and non-finite values are rejected.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        for (name, values) in &columns {
            if values.len() != dates.len() {
                return Err(ForecastError::DataError(format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    dates.len()
                )));
            }
            if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
                return Err(ForecastError::DataError(format!(
                    "column '{}' has a missing or non-finite value on {}",
                    name, dates[pos]
                )));
            }
        }

        let mut names = Vec::with_capacity(columns.len());
        for (name, _) in &columns {
            if names.contains(name) {
                return Err(ForecastError::DataError(format!("duplicate column '{}'", name)));
            }
            names.push(name.clone());
        }

        let mut order: Vec<usize> = (0..dates.len()).collect();
        order.sort_by_key(|&i| dates[i]);

        let sorted_dates: Vec<NaiveDate> = order.iter().map(|&i| dates[i]).collect();
        if let Some(w) = sorted_dates.windows(2).find(|w| w[0] == w[1]) {
            return Err(ForecastError::DataError(format!("duplicate date {}", w[0])));
        }

        let columns = columns
            .into_iter()
            .map(|(_, values)| order.iter().map(|&i| values[i]).collect())
            .collect();

        Ok(Self {
            dates: sorted_dates,
            names,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, row: usize) -> Option<NaiveDate> {
        self.dates.get(row).copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Values of a named column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| ForecastError::DataError(format!("missing column '{}'", name)))
    }

    /// Return a copy with `name` added, or replaced if it already exists.
    pub fn with_column(&self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(ForecastError::DataError(format!(
                "column '{}' has {} values, expected {}",
                name,
                values.len(),
                self.len()
            )));
        }

        let mut out = self.clone();
        match out.names.iter().position(|n| *n == name) {
            Some(i) => out.columns[i] = values,
            None => {
                out.names.push(name);
                out.columns.push(values);
            }
        }
        Ok(out)
    }

    /// Rows whose date lies in `[start, end]`, as a contiguous index range.
    pub fn range_indices(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        lo..hi.max(lo)
    }

    /// Feature matrix for the given rows, one column per feature.
    pub fn feature_matrix(&self, features: &[String], rows: Range<usize>) -> Result<Array2<f64>> {
        let cols = features
            .iter()
            .map(|f| self.column(f))
            .collect::<Result<Vec<_>>>()?;

        if rows.end > self.len() {
            return Err(ForecastError::InvalidInput(format!(
                "row {} out of range for {} observations",
                rows.end,
                self.len()
            )));
        }

        let start = rows.start;
        Ok(Array2::from_shape_fn(
            (rows.len(), cols.len()),
            |(r, c)| cols[c][start + r],
        ))
    }

    /// Binary labels of a horizon for the given rows.
    pub fn labels(&self, horizon: Horizon, rows: Range<usize>) -> Result<Array1<u8>> {
        let column = self.column(horizon.column())?;
        column
            .get(rows.clone())
            .map(|values| values.iter().map(|&v| u8::from(v >= 0.5)).collect())
            .ok_or_else(|| {
                ForecastError::InvalidInput(format!(
                    "rows {:?} out of range for {} observations",
                    rows,
                    self.len()
                ))
            })
    }
}

/// Load a dated table from a CSV file.
///
/// Every column other than the date column must be numeric. Empty cells are
/// gaps; with `interpolate` set they are filled linearly from their
/// neighbours, otherwise they are an error.
pub fn load_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<ObservationSeries> {
    let path = path.as_ref();
    info!("Loading observations from: {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h == config.date_column)
        .ok_or_else(|| {
            ForecastError::DataError(format!(
                "date column '{}' not found in {}",
                config.date_column,
                path.display()
            ))
        })?;

    let names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut dates = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

    for (row_num, record) in reader.records().enumerate() {
        let record = record?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        dates.push(parse_date(raw_date, config.date_format.as_deref())?);

        let mut col = 0;
        for (i, field) in record.iter().enumerate() {
            if i == date_idx {
                continue;
            }
            let value = if field.is_empty() {
                f64::NAN
            } else {
                field.parse::<f64>().map_err(|e| {
                    ForecastError::DataError(format!(
                        "row {}, column '{}': {}",
                        row_num + 1,
                        names[col],
                        e
                    ))
                })?
            };
            columns[col].push(value);
            col += 1;
        }
        while col < names.len() {
            columns[col].push(f64::NAN);
            col += 1;
        }
    }

    debug!("Read {} rows, {} columns", dates.len(), names.len());

    // Gaps are filled in chronological order, so sort before interpolating.
    let mut order: Vec<usize> = (0..dates.len()).collect();
    order.sort_by_key(|&i| dates[i]);
    let dates: Vec<NaiveDate> = order.iter().map(|&i| dates[i]).collect();

    let mut named = Vec::with_capacity(names.len());
    for (name, values) in names.into_iter().zip(columns) {
        let mut values: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        if config.interpolate {
            let filled = interpolate_gaps(&mut values).map_err(|e| {
                ForecastError::DataError(format!("column '{}': {}", name, e))
            })?;
            if filled > 0 {
                debug!("Interpolated {} gaps in '{}'", filled, name);
            }
        }
        named.push((name, values));
    }

    ObservationSeries::new(dates, named)
}

/// Write a series to CSV with the date as the first column.
pub fn write_csv(series: &ObservationSeries, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path.as_ref())?;

    let mut header = vec!["date".to_string()];
    header.extend(series.column_names().iter().cloned());
    writer.write_record(&header)?;

    for row in 0..series.len() {
        let mut record = vec![series.dates[row].format("%Y-%m-%d").to_string()];
        record.extend(series.columns.iter().map(|c| c[row].to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Fill interior NaN runs by linear interpolation between their neighbours.
///
/// Returns the number of filled values. Gaps touching either end of the
/// series cannot be interpolated and are an error.
pub fn interpolate_gaps(values: &mut [f64]) -> Result<usize> {
    let mut filled = 0;
    let mut i = 0;

    while i < values.len() {
        if !values[i].is_nan() {
            i += 1;
            continue;
        }

        let gap_start = i;
        while i < values.len() && values[i].is_nan() {
            i += 1;
        }

        if gap_start == 0 || i == values.len() {
            return Err(ForecastError::DataError(format!(
                "gap at rows {}..{} touches the edge of the series",
                gap_start, i
            )));
        }

        let left = values[gap_start - 1];
        let right = values[i];
        let span = (i - gap_start + 1) as f64;
        for (step, slot) in values[gap_start..i].iter_mut().enumerate() {
            *slot = left + (right - left) * (step + 1) as f64 / span;
            filled += 1;
        }
    }

    Ok(filled)
}

fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate> {
    if let Some(fmt) = format {
        return Ok(NaiveDate::parse_from_str(s, fmt)?);
    }

    // Accept plain dates and timestamps with a trailing time component.
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    Ok(NaiveDate::parse_from_str(date_part, "%Y-%m-%d")?)
}
