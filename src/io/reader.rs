//! Record Reader
//!
//! Reads stocking records from CSV. A malformed row is rejected on its own;
//! only I/O failures abort the read.

use std::{fs::File, io, path::Path, str::FromStr};

use csv::{Position, ReaderBuilder, StringRecord, Trim};
use num_traits::ToPrimitive;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::records::{RecordError, RecordKey, StockingRecord};

/// Errors that abort reading altogether.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The source could not be opened or read.
    #[error("failed to read records: {0}")]
    Io(#[from] io::Error),

    /// The CSV stream itself is unreadable (e.g. the header row).
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// A row that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// 1-based line number in the source
    pub line: u64,

    /// Why the row was rejected
    pub error: RecordError,
}

/// Records accepted from a source, plus the rows that were rejected.
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// Accepted records, in source order
    pub records: Vec<StockingRecord>,

    /// Rejected rows, in source order
    pub rejected: Vec<RejectedRow>,
}

/// Column layout of an input row; every field is optional until validated.
///
/// Unknown columns (e.g. results of an earlier run) are ignored.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(alias = "sku")]
    sku_id: Option<String>,
    warehouse_id: Option<String>,
    profit_per_quantity: Option<String>,
    lp: Option<String>,
    no_of_units: Option<String>,
    min_units: Option<String>,
    max_units: Option<String>,
}

impl RawRow {
    fn into_record(self) -> Result<StockingRecord, RecordError> {
        let sku = required("sku_id", self.sku_id)?;

        let key = match present(self.warehouse_id) {
            Some(warehouse) => RecordKey::sku_at(sku, warehouse),
            None => RecordKey::sku(sku),
        };

        let record = StockingRecord::new(
            key,
            parse_units("no_of_units", self.no_of_units)?,
            parse_number("profit_per_quantity", self.profit_per_quantity)?,
            parse_number("lp", self.lp)?,
        )?;

        match (present(self.min_units), present(self.max_units)) {
            (None, None) => Ok(record),
            (Some(min), Some(max)) => Ok(record.with_bounds(
                parse_units("min_units", Some(min))?,
                parse_units("max_units", Some(max))?,
            )),
            (Some(_), None) => Err(RecordError::PartialBounds("min_units")),
            (None, Some(_)) => Err(RecordError::PartialBounds("max_units")),
        }
    }
}

/// Read records from a CSV file.
///
/// # Errors
///
/// Returns a [`ReadError`] if the file cannot be opened, or its header or
/// underlying stream cannot be read. Bad rows are reported in
/// [`RecordBatch::rejected`] instead.
pub fn read_records_from_path(path: impl AsRef<Path>) -> Result<RecordBatch, ReadError> {
    let path = path.as_ref();

    debug!(path = %path.display(), "reading records");

    read_records(File::open(path)?)
}

/// Read records from any CSV source with a header row.
///
/// # Errors
///
/// Returns a [`ReadError`] if the header or the underlying stream cannot be read.
pub fn read_records(source: impl io::Read) -> Result<RecordBatch, ReadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();

    let mut batch = RecordBatch::default();

    for result in reader.records() {
        let (line, parsed) = match result {
            Ok(row) => (line_of(row.position()), parse_row(&row, &headers)),
            Err(error) if error.is_io_error() => return Err(error.into()),
            Err(error) => (
                line_of(error.position()),
                Err(RecordError::Malformed(error.to_string())),
            ),
        };

        match parsed {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                warn!(line, %error, "rejected input row");

                batch.rejected.push(RejectedRow { line, error });
            }
        }
    }

    debug!(
        accepted = batch.records.len(),
        rejected = batch.rejected.len(),
        "records read"
    );

    Ok(batch)
}

fn parse_row(row: &StringRecord, headers: &StringRecord) -> Result<StockingRecord, RecordError> {
    row.deserialize::<RawRow>(Some(headers))
        .map_err(|error| RecordError::Malformed(error.to_string()))?
        .into_record()
}

fn line_of(position: Option<&Position>) -> u64 {
    position.map_or(0, Position::line)
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(field: &'static str, value: Option<String>) -> Result<String, RecordError> {
    present(value).ok_or(RecordError::MissingField(field))
}

fn parse_number<T: FromStr>(field: &'static str, value: Option<String>) -> Result<T, RecordError> {
    let value = required(field, value)?;

    value
        .parse()
        .map_err(|_err| RecordError::NonNumeric { field, value })
}

/// Unit counts may be written as `12` or `12.0`; fractional or negative counts are rejected.
fn parse_units(field: &'static str, value: Option<String>) -> Result<u32, RecordError> {
    let value = required(field, value)?;

    if let Ok(units) = value.parse::<u32>() {
        return Ok(units);
    }

    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0)
        .and_then(|v| v.to_u32())
        .ok_or(RecordError::NonNumeric { field, value })
}
