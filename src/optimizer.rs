//! Allocation Optimizer
//!
//! Runs the forward pipeline: records → bounds → model → solve → reconciled result.

use std::{fs, marker::PhantomData, path::Path, time::Duration};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::{
    bounds::{BoundScale, BoundsError, bound_records},
    budget::{Budget, BudgetError, BudgetMode},
    model::{ModelBuilder, ModelError, minimum_commitment, observer::TracingObserver},
    reconcile::{ReconcileError, SolvedAllocation, reconcile},
    records::StockingRecord,
    solvers::{DEFAULT_TIME_LIMIT, Solver, SolverError, milp::MILPSolver},
};

/// Errors that abort an optimisation run before anything is persisted.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Bounds could not be derived.
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    /// The budget is invalid.
    #[error(transparent)]
    Budget(#[from] BudgetError),

    /// The model could not be built.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The solver reported a terminal failure.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// The solution failed its acceptance checks.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Errors loading optimiser settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error reading the settings file
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("failed to parse settings YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Time limit is negative, NaN or too large.
    #[error("time limit must be a finite, non-negative number of seconds, found {0}")]
    InvalidTimeLimit(f64),
}

/// Tunable optimiser settings, loadable from YAML.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerSettings {
    /// Scale factors for derived bounds.
    pub scale: BoundScale,

    /// Budget rule.
    pub budget_mode: BudgetMode,

    /// Solver wall-clock limit, in seconds.
    pub time_limit_secs: f64,

    /// Emit explicit per-key bound constraints alongside variable domains.
    pub explicit_bound_constraints: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            scale: BoundScale::default(),
            budget_mode: BudgetMode::default(),
            time_limit_secs: DEFAULT_TIME_LIMIT.as_secs_f64(),
            explicit_bound_constraints: false,
        }
    }
}

impl OptimizerSettings {
    /// Parse settings from YAML; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the YAML is malformed or has unknown fields.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        Ok(serde_norway::from_str(yaml)?)
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the file cannot be read or parsed.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }

    /// Solver time limit.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidTimeLimit`] if the configured seconds are not representable.
    pub fn time_limit(&self) -> Result<Duration, SettingsError> {
        Duration::try_from_secs_f64(self.time_limit_secs)
            .map_err(|_err| SettingsError::InvalidTimeLimit(self.time_limit_secs))
    }
}

/// Result of one partition of a partitioned run.
#[derive(Debug)]
pub struct PartitionOutcome<'a> {
    /// Warehouse identifier, or `None` for records keyed by SKU only
    pub partition: Option<String>,

    /// Budget share given to the partition
    pub budget: f64,

    /// Allocation or the error that aborted this partition
    pub result: Result<SolvedAllocation<'a>, AllocationError>,
}

/// Allocation optimiser, generic over the solver backend.
#[derive(Debug)]
pub struct Optimizer<S: Solver = MILPSolver> {
    settings: OptimizerSettings,
    time_limit: Duration,
    _solver: PhantomData<S>,
}

impl Optimizer<MILPSolver> {
    /// Optimiser using the default MILP backend.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the settings carry an invalid time limit.
    pub fn new(settings: OptimizerSettings) -> Result<Self, SettingsError> {
        Self::with_solver(settings)
    }
}

impl<S: Solver> Optimizer<S> {
    /// Optimiser using the solver `S`.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the settings carry an invalid time limit.
    pub fn with_solver(settings: OptimizerSettings) -> Result<Self, SettingsError> {
        Ok(Self {
            time_limit: settings.time_limit()?,
            settings,
            _solver: PhantomData,
        })
    }

    /// Settings in force.
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Allocate `budget` across all records.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocationError`] if bounds, budget or model are invalid, the
    /// solver fails, or the solution is refused by reconciliation.
    pub fn optimize<'a>(
        &self,
        records: &'a [StockingRecord],
        budget: f64,
    ) -> Result<SolvedAllocation<'a>, AllocationError> {
        let budget = Budget::new(budget, self.settings.budget_mode)?;

        self.optimize_subset(records.iter(), budget)
    }

    /// Run the full pipeline once per warehouse.
    ///
    /// Each partition is first given its minimum commitment; the rest of the
    /// budget is split by baseline spend. Partitions are independent: one
    /// failing does not affect the others.
    pub fn optimize_partitioned<'a>(
        &self,
        records: &'a [StockingRecord],
        budget: f64,
    ) -> Vec<PartitionOutcome<'a>> {
        let mut partitions: FxHashMap<Option<&'a str>, Vec<&'a StockingRecord>> =
            FxHashMap::default();

        for record in records {
            partitions
                .entry(record.key().warehouse_id())
                .or_default()
                .push(record);
        }

        let mut partitions: Vec<_> = partitions.into_iter().collect();
        partitions.sort_unstable_by_key(|(partition, _)| *partition);

        let total = match Budget::new(budget, self.settings.budget_mode) {
            Ok(total) => total,
            Err(error) => {
                warn!(%error, "invalid budget; no partition can run");

                return partitions
                    .into_iter()
                    .map(|(partition, _)| PartitionOutcome {
                        partition: partition.map(str::to_string),
                        budget,
                        result: Err(error.clone().into()),
                    })
                    .collect();
            }
        };

        let demands: Vec<_> = partitions
            .iter()
            .map(|(_, members)| self.demand(members))
            .collect();

        let shares = budget_shares(total.amount(), &demands);

        partitions
            .into_iter()
            .zip(shares)
            .map(|((partition, members), share)| {
                let result = {
                    let _span = info_span!("partition", partition = partition.unwrap_or("-"))
                        .entered();

                    self.partition_budget(share)
                        .map_err(AllocationError::from)
                        .and_then(|budget| self.optimize_subset(members, budget))
                };

                if let Err(error) = &result {
                    warn!(partition = partition.unwrap_or("-"), %error, "partition failed");
                }

                PartitionOutcome {
                    partition: partition.map(str::to_string),
                    budget: share,
                    result,
                }
            })
            .collect()
    }

    fn demand(&self, members: &[&StockingRecord]) -> PartitionDemand {
        PartitionDemand {
            // A partition whose bounds fail reports that error when it runs.
            commitment: bound_records(members.iter().copied(), &self.settings.scale)
                .map_or(0.0, |bounded| minimum_commitment(&bounded)),
            baseline: members.iter().map(|r| r.baseline_spend()).sum(),
        }
    }

    fn partition_budget(&self, share: f64) -> Result<Budget, BudgetError> {
        if share > 0.0 {
            Budget::new(share, self.settings.budget_mode)
        } else {
            Ok(Budget::exhausted(self.settings.budget_mode))
        }
    }

    fn optimize_subset<'a, I>(
        &self,
        records: I,
        budget: Budget,
    ) -> Result<SolvedAllocation<'a>, AllocationError>
    where
        I: IntoIterator<Item = &'a StockingRecord>,
    {
        let bounded = bound_records(records, &self.settings.scale)?;

        let _span = info_span!(
            "optimize",
            records = bounded.len(),
            budget = budget.amount(),
            mode = budget.mode().label()
        )
        .entered();

        // Nothing to allocate
        if bounded.is_empty() {
            return Ok(SolvedAllocation::empty(budget));
        }

        let model = ModelBuilder::new(budget)
            .with_explicit_bounds(self.settings.explicit_bound_constraints)
            .build_with_observer(&bounded, &mut TracingObserver)?;

        let values = S::solve(model, self.time_limit)?;

        let allocation = reconcile(&bounded, &values, budget)?;

        info!(
            status = %allocation.status(),
            spend = allocation.realized_spend(),
            profit = allocation.realized_profit(),
            profit_delta = allocation.profit_delta(),
            "allocation accepted"
        );

        Ok(allocation)
    }
}

/// What a partition needs from the shared budget.
#[derive(Debug, Clone, Copy)]
struct PartitionDemand {
    /// `Σ min_units * unit_cost`
    commitment: f64,

    /// `Σ baseline_units * unit_cost`
    baseline: f64,
}

/// Split `budget` so each partition first covers its minimum commitment and the
/// remainder follows baseline spend (evenly when no partition has any).
///
/// When the commitments alone exceed the budget, shares are proportional to them.
fn budget_shares(budget: f64, demands: &[PartitionDemand]) -> Vec<f64> {
    let committed: f64 = demands.iter().map(|d| d.commitment).sum();

    if committed > budget {
        return demands
            .iter()
            .map(|d| {
                if committed > 0.0 {
                    budget * d.commitment / committed
                } else {
                    0.0
                }
            })
            .collect();
    }

    let remaining = budget - committed;
    let total_baseline: f64 = demands.iter().map(|d| d.baseline).sum();
    let count = u32::try_from(demands.len().max(1)).map_or(f64::from(u32::MAX), f64::from);

    demands
        .iter()
        .map(|d| {
            let extra = if total_baseline > 0.0 {
                remaining * d.baseline / total_baseline
            } else {
                remaining / count
            };

            d.commitment + extra
        })
        .collect()
}
