//! Result Reconciler
//!
//! Maps solved values back onto records, derives spend and profit aggregates
//! and refuses any solution that breaks a bound or the budget rule.

use std::time::Duration;

use num_traits::ToPrimitive;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    bounds::{BoundedRecord, UnitBounds},
    budget::{Budget, BudgetMode},
    records::{RecordKey, StockingRecord},
    solvers::{SolveStatus, SolvedValues},
};

/// Largest distance from an integer a solved decision value may have.
pub const INTEGRALITY_TOLERANCE: f64 = 1e-6;

/// Relative numerical allowance applied to the budget checks.
pub const BUDGET_EPSILON: f64 = 1e-6;

/// Reasons a solved assignment is refused.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    /// A decision variable came back fractional.
    #[error("solved quantity for {key} is not integral: {value}")]
    NonIntegral {
        /// Record key
        key: RecordKey,

        /// Raw solved value
        value: f64,
    },

    /// A decision variable came back outside its domain.
    #[error("solved quantity {value} for {key} is outside [{min}, {max}]")]
    OutOfBounds {
        /// Record key
        key: RecordKey,

        /// Solved value
        value: f64,

        /// Minimum allowed
        min: u32,

        /// Maximum allowed
        max: u32,
    },

    /// Realized spend is above an inequality budget.
    #[error("realized spend {spend} exceeds budget {budget}")]
    BudgetExceeded {
        /// Realized spend
        spend: f64,

        /// Budget amount
        budget: f64,
    },

    /// Realized spend is outside the tolerance band of an equality budget.
    #[error("realized spend {spend} is more than {tolerance} away from budget {budget}")]
    OutsideTolerance {
        /// Realized spend
        spend: f64,

        /// Budget amount
        budget: f64,

        /// Allowed distance
        tolerance: f64,
    },
}

/// One record's solved allocation.
#[derive(Debug, Clone, Copy)]
pub struct AllocationLine<'a> {
    record: BoundedRecord<'a>,
    quantity: u32,
}

impl<'a> AllocationLine<'a> {
    /// Underlying record.
    pub fn record(&self) -> &'a StockingRecord {
        self.record.record()
    }

    /// Record key.
    pub fn key(&self) -> &'a RecordKey {
        self.record.record().key()
    }

    /// Domain the quantity was solved in.
    pub fn bounds(&self) -> UnitBounds {
        self.record.bounds()
    }

    /// Solved integer quantity.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Spend at the solved quantity.
    pub fn spend(&self) -> f64 {
        self.record().unit_cost() * f64::from(self.quantity)
    }

    /// Profit at the solved quantity.
    pub fn profit(&self) -> f64 {
        self.record().unit_profit() * f64::from(self.quantity)
    }
}

/// A reconciled, accepted allocation.
#[derive(Debug, Clone)]
pub struct SolvedAllocation<'a> {
    lines: Vec<AllocationLine<'a>>,
    status: SolveStatus,
    budget: Budget,
    realized_spend: f64,
    realized_profit: f64,
    baseline_spend: f64,
    baseline_profit: f64,
    slack: Option<f64>,
    elapsed: Duration,
}

impl<'a> SolvedAllocation<'a> {
    /// Allocation with no records; nothing to solve.
    pub fn empty(budget: Budget) -> Self {
        Self {
            lines: Vec::new(),
            status: SolveStatus::Optimal,
            budget,
            realized_spend: 0.0,
            realized_profit: 0.0,
            baseline_spend: 0.0,
            baseline_profit: 0.0,
            slack: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Per-record lines, in record order.
    pub fn lines(&self) -> &[AllocationLine<'a>] {
        &self.lines
    }

    /// Solved quantity for a key.
    pub fn quantity(&self, key: &RecordKey) -> Option<u32> {
        self.lines
            .iter()
            .find(|line| line.key() == key)
            .map(AllocationLine::quantity)
    }

    /// [`SolveStatus::Optimal`] or [`SolveStatus::TimedOut`].
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Whether optimality was proven.
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    /// Budget the allocation was solved against.
    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// `Σ unit_cost * quantity`
    pub fn realized_spend(&self) -> f64 {
        self.realized_spend
    }

    /// `Σ unit_profit * quantity`
    pub fn realized_profit(&self) -> f64 {
        self.realized_profit
    }

    /// `Σ unit_cost * baseline_units`
    pub fn baseline_spend(&self) -> f64 {
        self.baseline_spend
    }

    /// `Σ unit_profit * baseline_units`
    pub fn baseline_profit(&self) -> f64 {
        self.baseline_profit
    }

    /// Realized minus baseline spend.
    pub fn spend_delta(&self) -> f64 {
        self.realized_spend - self.baseline_spend
    }

    /// Realized minus baseline profit.
    pub fn profit_delta(&self) -> f64 {
        self.realized_profit - self.baseline_profit
    }

    /// Budget not spent (negative within an equality tolerance band).
    pub fn budget_left(&self) -> f64 {
        self.budget.amount() - self.realized_spend
    }

    /// Solved slack, in tolerance-equality mode.
    pub fn slack(&self) -> Option<f64> {
        self.slack
    }

    /// Solve wall-clock time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Structured summary record for persistence.
    pub fn summary(&self, partition: Option<&str>) -> AllocationSummary {
        AllocationSummary {
            partition: partition.map(str::to_string),
            status: self.status,
            optimal: self.is_optimal(),
            budget_mode: self.budget.mode().label(),
            budget_given: self.budget.amount(),
            total_spent: self.realized_spend,
            budget_left: self.budget_left(),
            total_profit: self.realized_profit,
            total_profit_gained: self.profit_delta(),
            spend_delta: self.spend_delta(),
        }
    }
}

/// Run-level totals, persisted separately from per-record rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSummary {
    /// Partition (warehouse) this run covered, if partitioned
    pub partition: Option<String>,

    /// Solve status
    pub status: SolveStatus,

    /// `false` when the solve stopped on its time limit
    pub optimal: bool,

    /// Budget rule in force
    pub budget_mode: &'static str,

    /// Budget amount
    pub budget_given: f64,

    /// Realized spend
    pub total_spent: f64,

    /// Budget minus realized spend
    pub budget_left: f64,

    /// Realized profit
    pub total_profit: f64,

    /// Realized minus baseline profit
    pub total_profit_gained: f64,

    /// Realized minus baseline spend
    pub spend_delta: f64,
}

/// Reconcile solved values against the records they were solved for.
///
/// # Errors
///
/// Returns a [`ReconcileError`] if any quantity is fractional or out of bounds,
/// or if the realized spend breaks the budget rule.
pub fn reconcile<'a>(
    records: &[BoundedRecord<'a>],
    values: &SolvedValues,
    budget: Budget,
) -> Result<SolvedAllocation<'a>, ReconcileError> {
    let lines = records
        .iter()
        .map(|&record| {
            let key = record.record().key();

            let value = values.quantity(key).unwrap_or_else(|| {
                warn!(%key, "no solved value for record; defaulting to 0");
                0.0
            });

            Ok(AllocationLine {
                record,
                quantity: integral_quantity(key, value, record.bounds())?,
            })
        })
        .collect::<Result<Vec<_>, ReconcileError>>()?;

    let realized_spend: f64 = lines.iter().map(AllocationLine::spend).sum();
    let realized_profit: f64 = lines.iter().map(AllocationLine::profit).sum();

    check_budget(budget, realized_spend)?;

    let baseline_spend = lines.iter().map(|l| l.record().baseline_spend()).sum();
    let baseline_profit = lines.iter().map(|l| l.record().baseline_profit()).sum();

    Ok(SolvedAllocation {
        lines,
        realized_spend,
        realized_profit,
        baseline_spend,
        baseline_profit,
        status: values.status(),
        budget,
        slack: values.slack(),
        elapsed: values.elapsed(),
    })
}

fn integral_quantity(key: &RecordKey, value: f64, bounds: UnitBounds) -> Result<u32, ReconcileError> {
    let rounded = value.round();

    if !value.is_finite() || (value - rounded).abs() > INTEGRALITY_TOLERANCE {
        return Err(ReconcileError::NonIntegral {
            key: key.clone(),
            value,
        });
    }

    rounded
        .to_u32()
        .filter(|&quantity| bounds.contains(quantity))
        .ok_or_else(|| ReconcileError::OutOfBounds {
            key: key.clone(),
            value,
            min: bounds.min_units(),
            max: bounds.max_units(),
        })
}

fn check_budget(budget: Budget, spend: f64) -> Result<(), ReconcileError> {
    let allowance = BUDGET_EPSILON * budget.amount().max(1.0);

    match budget.mode() {
        BudgetMode::Inequality if spend > budget.amount() + allowance => {
            Err(ReconcileError::BudgetExceeded {
                spend,
                budget: budget.amount(),
            })
        }
        BudgetMode::ToleranceEquality { .. } => {
            let tolerance = budget.tolerance().unwrap_or_default();

            if (spend - budget.amount()).abs() > tolerance + allowance {
                Err(ReconcileError::OutsideTolerance {
                    spend,
                    budget: budget.amount(),
                    tolerance,
                })
            } else {
                Ok(())
            }
        }
        BudgetMode::Inequality => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;
    use testresult::TestResult;

    use crate::{
        bounds::{BoundScale, bound_records},
        records::StockingRecord,
    };

    use super::*;

    fn records() -> Result<Vec<StockingRecord>, crate::records::RecordError> {
        Ok(vec![
            StockingRecord::new(RecordKey::sku("A"), 10, 2.0, 1.0)?,
            StockingRecord::new(RecordKey::sku("B"), 4, 5.0, 3.0)?,
        ])
    }

    fn values(pairs: &[(&str, f64)]) -> SolvedValues {
        let quantities: FxHashMap<_, _> = pairs
            .iter()
            .map(|&(sku, value)| (RecordKey::sku(sku), value))
            .collect();

        SolvedValues::new(SolveStatus::Optimal, quantities, None, Duration::ZERO)
    }

    #[test]
    fn aggregates_and_deltas_are_computed_from_quantities() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        let allocation = reconcile(
            &bounded,
            &values(&[("A", 12.0), ("B", 6.000_000_1)]),
            Budget::at_most(100.0)?,
        )?;

        assert_eq!(allocation.quantity(&RecordKey::sku("A")), Some(12));
        assert_eq!(allocation.quantity(&RecordKey::sku("B")), Some(6));

        // Spend 12 + 18 = 30 vs baseline 10 + 12 = 22
        assert!((allocation.realized_spend() - 30.0).abs() < 1e-9);
        assert!((allocation.spend_delta() - 8.0).abs() < 1e-9);

        // Profit 24 + 30 = 54 vs baseline 20 + 20 = 40
        assert!((allocation.realized_profit() - 54.0).abs() < 1e-9);
        assert!((allocation.profit_delta() - 14.0).abs() < 1e-9);
        assert!((allocation.budget_left() - 70.0).abs() < 1e-9);

        Ok(())
    }

    #[test]
    fn fractional_values_are_refused() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        let result = reconcile(
            &bounded,
            &values(&[("A", 7.5), ("B", 4.0)]),
            Budget::at_most(100.0)?,
        );

        assert!(matches!(result, Err(ReconcileError::NonIntegral { .. })));

        Ok(())
    }

    #[test]
    fn out_of_bounds_values_are_refused() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        let result = reconcile(
            &bounded,
            &values(&[("A", 16.0), ("B", 4.0)]),
            Budget::at_most(100.0)?,
        );

        assert!(matches!(
            result,
            Err(ReconcileError::OutOfBounds { min: 5, max: 15, .. })
        ));

        Ok(())
    }

    #[test]
    fn absent_key_defaults_to_zero_and_then_fails_bounds() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        let result = reconcile(&bounded, &values(&[("A", 5.0)]), Budget::at_most(100.0)?);

        assert!(matches!(
            result,
            Err(ReconcileError::OutOfBounds { ref key, .. }) if *key == RecordKey::sku("B")
        ));

        Ok(())
    }

    #[test]
    fn spend_over_budget_is_refused() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        let result = reconcile(
            &bounded,
            &values(&[("A", 15.0), ("B", 6.0)]),
            Budget::at_most(30.0)?,
        );

        assert!(matches!(result, Err(ReconcileError::BudgetExceeded { .. })));

        Ok(())
    }

    #[test]
    fn spend_outside_tolerance_band_is_refused() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        // Spend 5 + 6 = 11, budget 20 with a 0.02 band.
        let result = reconcile(
            &bounded,
            &values(&[("A", 5.0), ("B", 2.0)]),
            Budget::new(20.0, BudgetMode::tolerance_equality())?,
        );

        assert!(matches!(result, Err(ReconcileError::OutsideTolerance { .. })));

        Ok(())
    }

    #[test]
    fn summary_flags_timed_out_runs() -> TestResult {
        let records = records()?;
        let bounded = bound_records(&records, &BoundScale::default())?;

        let quantities: FxHashMap<_, _> = [(RecordKey::sku("A"), 5.0), (RecordKey::sku("B"), 2.0)]
            .into_iter()
            .collect();
        let values = SolvedValues::new(SolveStatus::TimedOut, quantities, None, Duration::ZERO);

        let allocation = reconcile(&bounded, &values, Budget::at_most(50.0)?)?;
        let summary = allocation.summary(Some("W1"));

        assert!(!summary.optimal);
        assert_eq!(summary.status, SolveStatus::TimedOut);
        assert_eq!(summary.partition.as_deref(), Some("W1"));
        assert_eq!(summary.budget_mode, "inequality");

        Ok(())
    }
}
