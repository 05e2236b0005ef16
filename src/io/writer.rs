//! Allocation Writer
//!
//! Persists per-record allocation rows and a run summary as two sibling CSV files.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use csv::WriterBuilder;
use jiff::Zoned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::reconcile::{AllocationLine, SolvedAllocation};

/// Errors raised while persisting an allocation.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The destination could not be created or written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination file
        path: PathBuf,

        /// Underlying error
        source: io::Error,
    },

    /// A row could not be serialised.
    #[error("failed to serialise CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The in-memory buffer could not be flushed.
    #[error("failed to flush CSV buffer: {0}")]
    Flush(String),
}

/// One persisted per-record row.
#[derive(Debug, Serialize)]
struct AllocationRow<'a> {
    sku_id: &'a str,
    warehouse_id: Option<&'a str>,
    no_of_units: u32,
    profit_per_quantity: f64,
    lp: f64,
    min_units: u32,
    max_units: u32,
    optimal_units: u32,
    optimal_profit: f64,
}

impl<'a> From<&AllocationLine<'a>> for AllocationRow<'a> {
    fn from(line: &AllocationLine<'a>) -> Self {
        let record = line.record();

        Self {
            sku_id: record.key().sku_id(),
            warehouse_id: record.key().warehouse_id(),
            no_of_units: record.baseline_units(),
            profit_per_quantity: record.unit_profit(),
            lp: record.unit_cost(),
            min_units: line.bounds().min_units(),
            max_units: line.bounds().max_units(),
            optimal_units: line.quantity(),
            optimal_profit: line.profit(),
        }
    }
}

/// Default output file for a run started now: `<dir>/output-<timestamp>.csv`.
pub fn default_output_path(dir: impl AsRef<Path>) -> PathBuf {
    let stamp = Zoned::now().strftime("%Y%m%d-%H%M%S");

    dir.as_ref().join(format!("output-{stamp}.csv"))
}

/// Summary file that accompanies `path`: `<stem>.summary.csv` in the same directory.
pub fn summary_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "output".into(), |stem| stem.to_string_lossy());

    path.with_file_name(format!("{stem}.summary.csv"))
}

/// Append-friendly writer for allocation rows and their summaries.
#[derive(Debug, Clone)]
pub struct AllocationWriter {
    rows_path: PathBuf,
    summary_path: PathBuf,
}

impl AllocationWriter {
    /// Writer targeting `path` for rows and its sibling summary file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let rows_path = path.into();
        let summary_path = summary_path_for(&rows_path);

        Self {
            rows_path,
            summary_path,
        }
    }

    /// Per-record rows file.
    pub fn rows_path(&self) -> &Path {
        &self.rows_path
    }

    /// Summary file.
    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Append every allocation's rows and one summary per allocation.
    ///
    /// Each file gets a header only if it is empty or new. Both files are opened
    /// and both buffers serialised before either file is written.
    ///
    /// # Errors
    ///
    /// Returns a [`WriteError`] if serialisation or either file write fails.
    pub fn write(&self, runs: &[(Option<&str>, &SolvedAllocation<'_>)]) -> Result<(), WriteError> {
        let rows: Vec<AllocationRow<'_>> = runs
            .iter()
            .flat_map(|(_, allocation)| allocation.lines().iter().map(AllocationRow::from))
            .collect();

        let summaries: Vec<_> = runs
            .iter()
            .map(|(partition, allocation)| allocation.summary(*partition))
            .collect();

        let mut rows_file = CsvFile::open(&self.rows_path)?;
        let mut summary_file = CsvFile::open(&self.summary_path)?;

        let rows_buffer = rows_file.serialize(&rows)?;
        let summary_buffer = summary_file.serialize(&summaries)?;

        rows_file.append(&rows_buffer)?;
        summary_file.append(&summary_buffer)?;

        info!(
            rows = rows.len(),
            path = %self.rows_path.display(),
            summary = %self.summary_path.display(),
            "allocation written"
        );

        Ok(())
    }
}

/// CSV file opened for appending.
#[derive(Debug)]
struct CsvFile<'p> {
    path: &'p Path,
    file: File,
    is_empty: bool,
}

impl<'p> CsvFile<'p> {
    fn open(path: &'p Path) -> Result<Self, WriteError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(path, source))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| io_error(path, source))?;

        let is_empty = file
            .metadata()
            .map_err(|source| io_error(path, source))?
            .len()
            == 0;

        Ok(Self {
            path,
            file,
            is_empty,
        })
    }

    fn serialize<T: Serialize>(&self, items: &[T]) -> Result<Vec<u8>, WriteError> {
        let mut writer = WriterBuilder::new()
            .has_headers(self.is_empty)
            .from_writer(Vec::new());

        for item in items {
            writer.serialize(item)?;
        }

        writer
            .into_inner()
            .map_err(|err| WriteError::Flush(err.error().to_string()))
    }

    fn append(&mut self, buffer: &[u8]) -> Result<(), WriteError> {
        debug!(
            path = %self.path.display(),
            bytes = buffer.len(),
            header = self.is_empty,
            "appending CSV"
        );

        self.file
            .write_all(buffer)
            .map_err(|source| io_error(self.path, source))
    }
}

fn io_error(path: &Path, source: io::Error) -> WriteError {
    WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rustc_hash::FxHashMap;
    use testresult::TestResult;

    use crate::{
        bounds::{BoundScale, bound_records},
        budget::Budget,
        reconcile::reconcile,
        records::{RecordKey, StockingRecord},
        solvers::{SolveStatus, SolvedValues},
    };

    use super::*;

    fn records() -> Result<Vec<StockingRecord>, crate::records::RecordError> {
        Ok(vec![
            StockingRecord::new(RecordKey::sku_at("A", "W1"), 10, 2.0, 1.0)?,
            StockingRecord::new(RecordKey::sku("B"), 4, 5.0, 3.0)?,
        ])
    }

    fn values() -> SolvedValues {
        let quantities: FxHashMap<_, _> = [
            (RecordKey::sku_at("A", "W1"), 12.0),
            (RecordKey::sku("B"), 6.0),
        ]
        .into_iter()
        .collect();

        SolvedValues::new(SolveStatus::Optimal, quantities, None, Duration::ZERO)
    }

    #[test]
    fn summary_path_sits_beside_rows() {
        let writer = AllocationWriter::new("/tmp/out/run.csv");

        assert_eq!(writer.summary_path(), Path::new("/tmp/out/run.summary.csv"));
    }

    #[test]
    fn default_output_path_is_timestamped() {
        let path = default_output_path("out");

        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());

        assert!(
            name.is_some_and(|n| n.starts_with("output-") && n.ends_with(".csv")),
            "unexpected path {}",
            path.display()
        );
    }

    #[test]
    fn writes_rows_and_summary() -> TestResult {
        let dir = tempfile::tempdir()?;
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;
        let allocation = reconcile(&bounded, &values(), Budget::at_most(100.0)?)?;

        let writer = AllocationWriter::new(dir.path().join("run.csv"));
        writer.write(&[(None, &allocation)])?;

        let rows = fs::read_to_string(writer.rows_path())?;

        assert_eq!(
            rows,
            "sku_id,warehouse_id,no_of_units,profit_per_quantity,lp,min_units,max_units,optimal_units,optimal_profit\n\
             A,W1,10,2.0,1.0,5,15,12,24.0\n\
             B,,4,5.0,3.0,2,6,6,30.0\n"
        );

        let summary = fs::read_to_string(writer.summary_path())?;
        let mut lines = summary.lines();

        assert_eq!(
            lines.next(),
            Some(
                "partition,status,optimal,budget_mode,budget_given,total_spent,budget_left,total_profit,total_profit_gained,spend_delta"
            )
        );
        assert_eq!(
            lines.next(),
            Some(",optimal,true,inequality,100.0,30.0,70.0,54.0,14.0,8.0")
        );
        assert_eq!(lines.next(), None);

        Ok(())
    }

    #[test]
    fn appending_does_not_repeat_header() -> TestResult {
        let dir = tempfile::tempdir()?;
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;
        let allocation = reconcile(&bounded, &values(), Budget::at_most(100.0)?)?;

        let writer = AllocationWriter::new(dir.path().join("nested").join("run.csv"));

        writer.write(&[(Some("W1"), &allocation)])?;
        writer.write(&[(Some("W1"), &allocation)])?;

        let rows = fs::read_to_string(writer.rows_path())?;
        let headers = rows.lines().filter(|l| l.starts_with("sku_id")).count();

        assert_eq!(headers, 1);
        assert_eq!(rows.lines().count(), 5);

        let summary = fs::read_to_string(writer.summary_path())?;

        assert_eq!(summary.lines().count(), 3);
        assert!(summary.lines().skip(1).all(|l| l.starts_with("W1,")));

        Ok(())
    }

    #[test]
    fn unwritable_summary_leaves_rows_untouched() -> TestResult {
        let dir = tempfile::tempdir()?;
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;
        let allocation = reconcile(&bounded, &values(), Budget::at_most(100.0)?)?;

        let writer = AllocationWriter::new(dir.path().join("run.csv"));

        // A directory where the summary file should be cannot be opened for appending.
        fs::create_dir(writer.summary_path())?;

        let result = writer.write(&[(None, &allocation)]);

        assert!(
            matches!(&result, Err(WriteError::Io { path, .. }) if path == writer.summary_path()),
            "unexpected result {result:?}"
        );

        let rows = fs::read_to_string(writer.rows_path()).unwrap_or_default();

        assert!(rows.is_empty(), "rows were written: {rows}");

        Ok(())
    }
}
