//! Stockwise command-line runner
//!
//! Reads stocking records from CSV, allocates the budget and appends the
//! result to the output CSV and its summary file.

use std::io;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};

use stockwise::{
    config::AppConfig,
    io::{AllocationWriter, read_records_from_path},
    observability::init_subscriber,
    optimizer::Optimizer,
    records::baseline_spend,
    report::write_report,
};

fn main() -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|error| error.exit());

    init_subscriber(&config.logging)?;

    let batch = read_records_from_path(&config.input)
        .with_context(|| format!("reading {}", config.input.display()))?;

    if !batch.rejected.is_empty() {
        warn!(
            rejected = batch.rejected.len(),
            accepted = batch.records.len(),
            "some input rows were rejected"
        );
    }

    if batch.records.is_empty() {
        bail!("no usable records in {}", config.input.display());
    }

    let settings = config.optimizer.resolve()?;
    let optimizer = Optimizer::new(settings)?;

    let budget = config
        .budget
        .unwrap_or_else(|| baseline_spend(&batch.records));

    info!(
        budget,
        records = batch.records.len(),
        per_warehouse = config.per_warehouse,
        "starting allocation"
    );

    let writer = AllocationWriter::new(config.output_path());
    let mut stdout = io::stdout().lock();

    if config.per_warehouse {
        let outcomes = optimizer.optimize_partitioned(&batch.records, budget);

        let mut runs = Vec::with_capacity(outcomes.len());

        for outcome in &outcomes {
            match &outcome.result {
                Ok(allocation) => runs.push((outcome.partition.as_deref(), allocation)),
                Err(error) => error!(
                    partition = outcome.partition.as_deref().unwrap_or("-"),
                    budget = outcome.budget,
                    %error,
                    "partition not allocated"
                ),
            }
        }

        if runs.is_empty() {
            bail!("no partition could be allocated");
        }

        writer.write(&runs)?;

        for (partition, allocation) in &runs {
            write_report(&mut stdout, *partition, allocation)?;
        }
    } else {
        let allocation = optimizer.optimize(&batch.records, budget)?;

        writer.write(&[(None, &allocation)])?;

        write_report(&mut stdout, None, &allocation)?;
    }

    Ok(())
}
