//! End-to-end tests: CSV in, allocation out

use std::path::{Path, PathBuf};

use serde::Deserialize;
use testresult::TestResult;

use stockwise::{io::summary_path_for, prelude::*, records::baseline_spend};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("records")
        .join(name)
}

#[derive(Debug, Deserialize)]
struct OutputRow {
    sku_id: String,
    warehouse_id: Option<String>,
    min_units: u32,
    max_units: u32,
    optimal_units: u32,
    lp: f64,
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    partition: Option<String>,
    status: String,
    optimal: bool,
    budget_given: f64,
    total_spent: f64,
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;

    reader.deserialize().collect()
}

#[test]
fn mixed_input_keeps_good_rows_and_reports_bad_ones() -> TestResult {
    let batch = read_records_from_path(fixture("mixed.csv"))?;

    let accepted: Vec<_> = batch.records.iter().map(|r| r.key().to_string()).collect();
    let rejected: Vec<_> = batch.rejected.iter().map(|r| r.line).collect();

    assert_eq!(accepted, ["SKU-A", "SKU-C", "SKU-E"]);
    assert_eq!(rejected, [3, 5, 7]);

    let supplied = batch
        .records
        .iter()
        .find(|r| r.key().sku_id() == "SKU-C")
        .and_then(StockingRecord::supplied_bounds);

    assert_eq!(supplied, Some((3, 6)));

    Ok(())
}

#[test]
fn baseline_budget_run_is_written_and_appended() -> TestResult {
    let dir = tempfile::tempdir()?;
    let batch = read_records_from_path(fixture("basic.csv"))?;

    // 10*2 + 20*1 + 5*3
    let budget = baseline_spend(&batch.records);
    assert!((budget - 55.0).abs() < 1e-9);

    let optimizer = Optimizer::new(OptimizerSettings::default())?;
    let allocation = optimizer.optimize(&batch.records, budget)?;

    let output = dir.path().join("run.csv");
    let writer = AllocationWriter::new(&output);

    writer.write(&[(None, &allocation)])?;
    writer.write(&[(None, &allocation)])?;

    let rows: Vec<OutputRow> = read_rows(&output)?;

    assert_eq!(rows.len(), 6);

    let spend: f64 = rows
        .iter()
        .take(3)
        .map(|row| row.lp * f64::from(row.optimal_units))
        .sum();

    assert!(spend <= budget + 1e-6, "spent {spend} of {budget}");

    for row in &rows {
        assert!(row.warehouse_id.is_none());
        assert!(
            (row.min_units..=row.max_units).contains(&row.optimal_units),
            "{} out of bounds",
            row.sku_id
        );
    }

    let summaries: Vec<SummaryRow> = read_rows(&summary_path_for(&output))?;

    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.optimal && s.status == "optimal"));
    assert!(
        summaries
            .iter()
            .all(|s| (s.budget_given - budget).abs() < 1e-9 && s.total_spent <= budget + 1e-6)
    );

    Ok(())
}

#[test]
fn per_warehouse_run_writes_one_summary_per_partition() -> TestResult {
    let dir = tempfile::tempdir()?;
    let batch = read_records_from_path(fixture("warehouses.csv"))?;

    let budget = baseline_spend(&batch.records);
    let optimizer = Optimizer::new(OptimizerSettings::default())?;

    let outcomes = optimizer.optimize_partitioned(&batch.records, budget);

    let mut runs = Vec::new();

    for outcome in &outcomes {
        let allocation = outcome
            .result
            .as_ref()
            .map_err(|error| format!("partition {:?} failed: {error}", outcome.partition))?;

        runs.push((outcome.partition.as_deref(), allocation));
    }

    let shares: f64 = outcomes.iter().map(|o| o.budget).sum();
    assert!((shares - budget).abs() < 1e-6);

    let output = dir.path().join("partitioned.csv");
    AllocationWriter::new(&output).write(&runs)?;

    let rows: Vec<OutputRow> = read_rows(&output)?;
    assert_eq!(rows.len(), 5);

    let free = rows
        .iter()
        .find(|row| row.sku_id == "SKU-D")
        .ok_or("SKU-D missing from output")?;

    assert_eq!(free.optimal_units, free.max_units);

    let summaries: Vec<SummaryRow> = read_rows(&summary_path_for(&output))?;
    let partitions: Vec<_> = summaries.iter().map(|s| s.partition.as_deref()).collect();

    assert_eq!(partitions, [Some("WH-1"), Some("WH-2")]);

    Ok(())
}
