//! Stockwise prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    bounds::{BoundScale, BoundedRecord, BoundsError, UnitBounds, bound_records},
    budget::{Budget, BudgetError, BudgetMode},
    io::{AllocationWriter, ReadError, RecordBatch, WriteError, read_records, read_records_from_path},
    model::{
        AllocationModel, ModelBuilder, ModelError,
        observer::{ModelObserver, NoopObserver, TracingObserver},
    },
    optimizer::{AllocationError, Optimizer, OptimizerSettings, PartitionOutcome, SettingsError},
    reconcile::{AllocationLine, AllocationSummary, ReconcileError, SolvedAllocation},
    records::{RecordError, RecordKey, StockingRecord},
    report::write_report,
    solvers::{SolveStatus, SolvedValues, Solver, SolverError, milp::MILPSolver},
};
