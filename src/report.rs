//! Console Report

use std::io;

use humanize_duration::{Truncate, prelude::DurationExt};
use tabled::{
    builder::Builder,
    grid::config::HorizontalLine,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::reconcile::{AllocationLine, SolvedAllocation};

/// Errors raised while rendering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The output stream could not be written.
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

/// Render an allocation as a table followed by its run totals.
///
/// # Errors
///
/// Returns a [`ReportError`] if `out` cannot be written.
pub fn write_report(
    mut out: impl io::Write,
    partition: Option<&str>,
    allocation: &SolvedAllocation<'_>,
) -> Result<(), ReportError> {
    if let Some(partition) = partition {
        writeln!(out, "\nWarehouse {partition}")?;
    }

    let mut builder = Builder::default();

    builder.push_record([
        "SKU",
        "Warehouse",
        "Baseline",
        "Min",
        "Max",
        "Units",
        "Unit cost",
        "Unit profit",
        "Profit",
    ]);

    for line in allocation.lines() {
        builder.push_record(line_cells(line));
    }

    let mut table = builder.build();
    let mut theme = Theme::from(Style::modern_rounded());

    theme.remove_horizontal_lines();
    theme.insert_horizontal_line(
        1,
        HorizontalLine::new(Some('─'), Some('┼'), Some('├'), Some('┤')),
    );

    table.with(theme);
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(2..9), Alignment::right());

    writeln!(out, "\n{table}")?;

    write_summary(&mut out, allocation)
}

fn line_cells(line: &AllocationLine<'_>) -> [String; 9] {
    let record = line.record();

    [
        record.key().sku_id().to_string(),
        record.key().warehouse_id().unwrap_or("-").to_string(),
        record.baseline_units().to_string(),
        line.bounds().min_units().to_string(),
        line.bounds().max_units().to_string(),
        line.quantity().to_string(),
        format!("{:.2}", record.unit_cost()),
        format!("{:.2}", record.unit_profit()),
        format!("{:.2}", line.profit()),
    ]
}

fn write_summary(
    out: &mut impl io::Write,
    allocation: &SolvedAllocation<'_>,
) -> Result<(), ReportError> {
    let budget = allocation.budget();

    let mut rows = vec![
        ("Status:", allocation.status().to_string()),
        (
            "Budget:",
            format!("{:.2} ({})", budget.amount(), budget.mode().label()),
        ),
        ("Spent:", format!("{:.2}", allocation.realized_spend())),
        ("Budget left:", format!("{:.2}", allocation.budget_left())),
        ("Profit:", format!("{:.2}", allocation.realized_profit())),
        ("Profit gained:", format!("{:+.2}", allocation.profit_delta())),
        ("Spend delta:", format!("{:+.2}", allocation.spend_delta())),
    ];

    if let Some(slack) = allocation.slack() {
        rows.push(("Slack:", format!("{slack:.4}")));
    }

    rows.push((
        "Solve time:",
        allocation.elapsed().human(Truncate::Nano).to_string(),
    ));

    let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let value_width = rows.iter().map(|(_, value)| value.len()).max().unwrap_or(0);

    for (label, value) in &rows {
        writeln!(out, " {label:>label_width$}  {value:>value_width$}")?;
    }

    writeln!(out)?;

    Ok(())
}
