//! Fault-interval table loading
//!
//! The table is a CSV with `uuid`, `start_timestamp`, `end_timestamp`
//! (nanoseconds) and an optional `date` column. Malformed rows are reported
//! and left out; an unreadable table is the only hard failure.

use crate::error::DrillError;
use crate::models::FaultInterval;
use chrono::{TimeZone, Utc};
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

const UUID_COLUMN: &str = "uuid";
const DATE_COLUMN: &str = "date";
const START_COLUMN: &str = "start_timestamp";
const END_COLUMN: &str = "end_timestamp";

/// A row dropped during loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Zero-based data row
    pub row: usize,
    pub reason: String,
}

/// Valid intervals in table order plus the rows that were dropped
#[derive(Debug, Clone, Default)]
pub struct IntervalTable {
    pub intervals: Vec<FaultInterval>,
    pub skipped: Vec<SkippedRow>,
}

impl IntervalTable {
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Partition date (`YYYY-MM-DD`, UTC) of a nanosecond timestamp
pub fn date_of(ts_ns: i64) -> String {
    Utc.timestamp_nanos(ts_ns).format("%Y-%m-%d").to_string()
}

/// Load the interval table from a CSV file
pub fn load_intervals(path: &Path) -> Result<IntervalTable, DrillError> {
    let table_err = |reason: String| DrillError::IntervalTable {
        path: path.to_path_buf(),
        reason,
    };

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| table_err(e.to_string()))?;

    let table = intervals_from_frame(&frame).map_err(table_err)?;
    info!(
        path = %path.display(),
        intervals = table.intervals.len(),
        skipped = table.skipped.len(),
        "Loaded fault intervals"
    );
    Ok(table)
}

/// Build intervals from an already loaded frame
pub fn intervals_from_frame(frame: &DataFrame) -> Result<IntervalTable, String> {
    let string_column = |name: &str| -> Result<Series, String> {
        frame
            .column(name)
            .and_then(|s| s.cast(&DataType::String))
            .map_err(|e| format!("column {}: {}", name, e))
    };
    let int_column = |name: &str| -> Result<Series, String> {
        frame
            .column(name)
            .and_then(|s| s.cast(&DataType::Int64))
            .map_err(|e| format!("column {}: {}", name, e))
    };

    let uuids = string_column(UUID_COLUMN)?;
    let starts = int_column(START_COLUMN)?;
    let ends = int_column(END_COLUMN)?;
    let dates = match frame.get_column_names().contains(&DATE_COLUMN) {
        true => Some(string_column(DATE_COLUMN)?),
        false => None,
    };

    let uuids = uuids.str().map_err(|e| e.to_string())?;
    let starts = starts.i64().map_err(|e| e.to_string())?;
    let ends = ends.i64().map_err(|e| e.to_string())?;
    let dates = dates
        .as_ref()
        .map(|s| s.str())
        .transpose()
        .map_err(|e| e.to_string())?;

    let mut table = IntervalTable::default();
    for row in 0..frame.height() {
        let uuid = uuids.get(row).map(str::trim).filter(|u| !u.is_empty());
        let (uuid, start, end) = match (uuid, starts.get(row), ends.get(row)) {
            (Some(uuid), Some(start), Some(end)) => (uuid, start, end),
            (None, _, _) => {
                skip(&mut table, row, "missing uuid");
                continue;
            }
            _ => {
                skip(&mut table, row, "missing timestamp");
                continue;
            }
        };
        if end < start {
            skip(&mut table, row, "end_timestamp before start_timestamp");
            continue;
        }

        let date = dates
            .and_then(|ca| ca.get(row))
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| date_of(start));

        table.intervals.push(FaultInterval {
            uuid: uuid.to_string(),
            date,
            start_ts_ns: start,
            end_ts_ns: end,
        });
    }
    Ok(table)
}

fn skip(table: &mut IntervalTable, row: usize, reason: &str) {
    warn!(row = row, reason = %reason, "Skipping malformed fault interval");
    table.skipped.push(SkippedRow {
        row,
        reason: reason.to_string(),
    });
}
