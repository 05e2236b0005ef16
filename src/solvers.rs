//! Solvers for Allocation Models

use std::{fmt, time::Duration};

use good_lp::ResolutionError;
use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::{model::AllocationModel, records::RecordKey};

pub mod milp;

/// Default wall-clock limit for a single solve.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(1);

/// Outcome classification of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,

    /// No assignment satisfies the constraints.
    Infeasible,

    /// The objective can grow without limit.
    Unbounded,

    /// Stopped on the time limit; the incumbent is feasible but not certified optimal.
    TimedOut,

    /// The solver failed for any other reason.
    NotSolved,
}

impl SolveStatus {
    /// Whether values from a solve with this status may be read.
    pub fn has_solution(self) -> bool {
        matches!(self, Self::Optimal | Self::TimedOut)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Unbounded => "unbounded",
            Self::TimedOut => "timed_out",
            Self::NotSolved => "not_solved",
        })
    }
}

/// Solver Errors
///
/// Each variant is a terminal status: no variable values are available.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The model has no feasible assignment.
    #[error("the allocation model is infeasible")]
    Infeasible,

    /// The model's objective is unbounded.
    #[error("the allocation model is unbounded")]
    Unbounded,

    /// The solver failed without a more specific diagnosis.
    #[error("the solver did not produce a solution: {0}")]
    NotSolved(String),
}

impl SolverError {
    /// Status this failure corresponds to.
    pub fn status(&self) -> SolveStatus {
        match self {
            Self::Infeasible => SolveStatus::Infeasible,
            Self::Unbounded => SolveStatus::Unbounded,
            Self::NotSolved(_) => SolveStatus::NotSolved,
        }
    }
}

impl From<ResolutionError> for SolverError {
    fn from(error: ResolutionError) -> Self {
        match error {
            ResolutionError::Infeasible => Self::Infeasible,
            ResolutionError::Unbounded => Self::Unbounded,
            other => Self::NotSolved(other.to_string()),
        }
    }
}

/// Raw variable values read back from a successful solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedValues {
    status: SolveStatus,
    quantities: FxHashMap<RecordKey, f64>,
    slack: Option<f64>,
    elapsed: Duration,
}

impl SolvedValues {
    /// Wrap values read from a solver.
    pub fn new(
        status: SolveStatus,
        quantities: FxHashMap<RecordKey, f64>,
        slack: Option<f64>,
        elapsed: Duration,
    ) -> Self {
        Self {
            status,
            quantities,
            slack,
            elapsed,
        }
    }

    /// Either [`SolveStatus::Optimal`] or [`SolveStatus::TimedOut`].
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Raw solved value of the decision variable for `key`.
    pub fn quantity(&self, key: &RecordKey) -> Option<f64> {
        self.quantities.get(key).copied()
    }

    /// Solved slack value, in tolerance-equality mode.
    pub fn slack(&self) -> Option<f64> {
        self.slack
    }

    /// Wall-clock time spent solving.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Trait for solving allocation models
pub trait Solver {
    /// Solve the model, spending at most `time_limit` where the backend allows it.
    ///
    /// The model is consumed so solver state can never be shared between runs.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the model is infeasible, unbounded, or the
    /// solver fails to produce an assignment.
    fn solve(model: AllocationModel<'_>, time_limit: Duration)
    -> Result<SolvedValues, SolverError>;
}
