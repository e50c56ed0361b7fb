//! CSV loading of price and signal tables, and CSV export of trajectories.
//!
//! Input layout: a header row whose first column is the date (any name)
//! and whose remaining columns are assets. Dates are `YYYY-MM-DD`; empty
//! cells and `NaN` are missing values.
//!
//! ```text
//! date,AAA,BBB
//! 2024-01-02,10.5,20.1
//! 2024-01-03,,20.3
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use optlab_core::{DateFrame, FrameError, Trajectory};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("header needs a date column followed by at least one asset column")]
    MissingColumns,

    #[error("row {row}: invalid date '{value}'")]
    BadDate { row: usize, value: String },

    #[error("row {row}, column '{column}': invalid number '{value}'")]
    BadValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("table error: {0}")]
    Frame(#[from] FrameError),
}

/// Load a date-indexed table from a CSV file.
pub fn load_frame(path: &Path) -> Result<DateFrame, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_frame(file)
}

/// Parse a date-indexed table from any CSV reader.
pub fn read_frame<R: Read>(reader: R) -> Result<DateFrame, LoadError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv.headers()?.clone();
    if headers.len() < 2 {
        return Err(LoadError::MissingColumns);
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for (i, record) in csv.records().enumerate() {
        let record = record?;
        let row_no = i + 1;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            LoadError::BadDate {
                row: row_no,
                value: raw_date.to_string(),
            }
        })?;
        let values = record
            .iter()
            .skip(1)
            .zip(&columns)
            .map(|(cell, column)| parse_cell(cell, row_no, column))
            .collect::<Result<Vec<f64>, _>>()?;
        dates.push(date);
        rows.push(values);
    }

    Ok(DateFrame::new(dates, columns, rows)?)
}

fn parse_cell(cell: &str, row: usize, column: &str) -> Result<f64, LoadError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| LoadError::BadValue {
        row,
        column: column.to_string(),
        value: cell.to_string(),
    })
}

/// Deterministic BLAKE3 hash over a table's dates, columns and values.
pub fn frame_hash(frame: &DateFrame) -> String {
    let mut hasher = blake3::Hasher::new();
    for column in frame.columns() {
        hasher.update(column.as_bytes());
        hasher.update(&[0]);
    }
    for (date, row) in frame.dates().iter().zip(frame.rows()) {
        hasher.update(date.to_string().as_bytes());
        for v in row {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Write a trajectory as CSV: date, one holdings column per asset, cash,
/// fee, value, injected.
pub fn write_trajectory(path: &Path, trajectory: &Trajectory) -> Result<(), LoadError> {
    let file = File::create(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_trajectory_to(file, trajectory)
}

pub fn write_trajectory_to<W: Write>(writer: W, trajectory: &Trajectory) -> Result<(), LoadError> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["date".to_string()];
    header.extend(trajectory.assets().iter().cloned());
    header.extend(["cash", "fee", "value", "injected"].map(String::from));
    csv.write_record(&header)?;

    for row in trajectory.rows() {
        let mut record = Vec::with_capacity(header.len());
        record.push(row.date.to_string());
        record.extend(row.holdings.iter().map(f64::to_string));
        record.extend([row.cash, row.fee, row.value, row.injected].map(|v| v.to_string()));
        csv.write_record(&record)?;
    }
    csv.flush().map_err(|e| LoadError::Csv(e.into()))?;
    Ok(())
}
