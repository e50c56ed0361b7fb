//! Date-indexed numeric tables.
//!
//! A [`DateFrame`] has strictly ascending dates as rows and named assets as
//! columns. Missing values are NaN.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("{dates} dates but {rows} rows")]
    LengthMismatch { dates: usize, rows: usize },

    #[error("row for {date} has {got} values, expected {expected}")]
    RowWidth {
        date: NaiveDate,
        expected: usize,
        got: usize,
    },

    #[error("dates must be strictly ascending: {next} follows {prev}")]
    Unsorted { prev: NaiveDate, next: NaiveDate },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// Dense date × asset matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

/// Unit prices per date and asset.
pub type PriceTable = DateFrame;

/// Trade signals per date and asset.
pub type SignalMatrix = DateFrame;

impl DateFrame {
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, FrameError> {
        if dates.len() != rows.len() {
            return Err(FrameError::LengthMismatch {
                dates: dates.len(),
                rows: rows.len(),
            });
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
        }
        for (date, row) in dates.iter().zip(&rows) {
            if row.len() != columns.len() {
                return Err(FrameError::RowWidth {
                    date: *date,
                    expected: columns.len(),
                    got: row.len(),
                });
            }
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(FrameError::Unsorted {
                prev: w[0],
                next: w[1],
            });
        }
        Ok(Self {
            dates,
            columns,
            rows,
        })
    }

    /// A table with columns but no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            dates: Vec::new(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    pub fn n_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when there is no row or no column.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.columns.is_empty()
    }

    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Index of the first date on or after `date`.
    pub fn position_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d < date);
        (idx < self.dates.len()).then_some(idx)
    }

    pub fn get(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let row = self.position(date)?;
        let col = self.columns.iter().position(|c| c == column)?;
        Some(self.rows[row][col])
    }

    /// Copy of the rows dated within `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end).max(lo);
        Self {
            dates: self.dates[lo..hi].to_vec(),
            columns: self.columns.clone(),
            rows: self.rows[lo..hi].to_vec(),
        }
    }

    /// Copy with every missing value replaced by the last known value in its
    /// column. Leading gaps stay missing.
    pub fn filled_forward(&self) -> Self {
        let mut last = vec![f64::NAN; self.columns.len()];
        let rows = self
            .rows
            .iter()
            .map(|row| {
                for (slot, v) in last.iter_mut().zip(row) {
                    if v.is_finite() {
                        *slot = *v;
                    }
                }
                last.clone()
            })
            .collect();
        Self {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }
}
