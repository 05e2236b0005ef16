//! MILP Solver

use std::time::{Duration, Instant};

use good_lp::{
    Solution, SolverModel,
    solvers::{SolutionStatus, WithTimeLimit},
};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as default_solver;
#[cfg(all(not(feature = "solver-highs"), feature = "solver-microlp"))]
use good_lp::solvers::microlp::microlp as default_solver;

use crate::{
    model::{AllocationModel, ModelParts},
    solvers::{SolveStatus, SolvedValues, Solver, SolverError},
};

/// Solver using Mixed Integer Linear Programming (MILP) through `good_lp`
#[derive(Debug)]
pub struct MILPSolver;

impl Solver for MILPSolver {
    fn solve(
        model: AllocationModel<'_>,
        time_limit: Duration,
    ) -> Result<SolvedValues, SolverError> {
        let ModelParts {
            pb,
            objective,
            decisions,
            slack,
            constraints,
        } = model.into_parts();

        debug!(
            variables = decisions.len(),
            constraints = constraints.len(),
            time_limit_secs = time_limit.as_secs_f64(),
            "solving allocation model"
        );

        let start = Instant::now();

        let mut problem = pb
            .maximise(objective)
            .using(default_solver)
            .with_time_limit(time_limit.as_secs_f64());

        for constraint in constraints {
            problem = problem.with(constraint.into_constraint());
        }

        let solution = problem.solve().map_err(|error| {
            let error = SolverError::from(error);

            warn!(status = %error.status(), %error, "solve failed");

            error
        })?;

        let status = solve_status(solution.status());

        let quantities: FxHashMap<_, _> = decisions
            .iter()
            .map(|decision| (decision.key().clone(), solution.value(decision.var())))
            .collect();

        let slack = slack.map(|var| solution.value(var));

        let elapsed = start.elapsed();

        if status == SolveStatus::TimedOut {
            warn!(
                elapsed_secs = elapsed.as_secs_f64(),
                "solve stopped early; keeping best solution found, optimality not proven"
            );
        } else {
            info!(elapsed_secs = elapsed.as_secs_f64(), "solve finished");
        }

        Ok(SolvedValues::new(status, quantities, slack, elapsed))
    }
}

/// Any stop short of proven optimality keeps the incumbent as [`SolveStatus::TimedOut`].
fn solve_status(status: SolutionStatus) -> SolveStatus {
    match status {
        SolutionStatus::Optimal => SolveStatus::Optimal,
        SolutionStatus::TimeLimit | SolutionStatus::GapLimit => SolveStatus::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        bounds::{BoundScale, bound_records},
        budget::{Budget, BudgetMode},
        model::ModelBuilder,
        records::{RecordKey, StockingRecord},
        solvers::DEFAULT_TIME_LIMIT,
    };

    use super::*;

    #[test]
    fn solver_fills_most_profitable_record_first() -> TestResult {
        let records = [
            StockingRecord::new(RecordKey::sku("cheap"), 10, 1.0, 1.0)?,
            StockingRecord::new(RecordKey::sku("rich"), 10, 10.0, 1.0)?,
        ];
        let bounded = bound_records(&records, &BoundScale::default())?;

        // Minimums cost 10; 10 spare units of budget should all go to "rich".
        let model = ModelBuilder::new(Budget::at_most(20.0)?).build(&bounded)?;

        let values = MILPSolver::solve(model, DEFAULT_TIME_LIMIT)?;

        assert_eq!(values.status(), SolveStatus::Optimal);
        assert!(
            values
                .quantity(&RecordKey::sku("rich"))
                .is_some_and(|q| (q - 15.0).abs() < 1e-6)
        );
        assert!(
            values
                .quantity(&RecordKey::sku("cheap"))
                .is_some_and(|q| (q - 5.0).abs() < 1e-6)
        );
        assert!(values.slack().is_none());

        Ok(())
    }

    #[test]
    fn tolerance_mode_reports_slack() -> TestResult {
        let records = [
            StockingRecord::new(RecordKey::sku("a"), 10, 1.0, 1.0)?,
            StockingRecord::new(RecordKey::sku("b"), 10, 2.0, 1.0)?,
        ];
        let bounded = bound_records(&records, &BoundScale::default())?;

        let model = ModelBuilder::new(Budget::new(20.0, BudgetMode::tolerance_equality())?)
            .build(&bounded)?;

        let values = MILPSolver::solve(model, DEFAULT_TIME_LIMIT)?;

        assert!(values.slack().is_some_and(|s| s.abs() <= 0.02 + 1e-9));

        Ok(())
    }

    #[test]
    fn unreachable_equality_is_infeasible() -> TestResult {
        let records = [StockingRecord::new(RecordKey::sku("a"), 10, 1.0, 1.0)?];
        let bounded = bound_records(&records, &BoundScale::default())?;

        // Max spend is 15, far below the 100 the equality demands.
        let model = ModelBuilder::new(Budget::new(100.0, BudgetMode::tolerance_equality())?)
            .build(&bounded)?;

        let result = MILPSolver::solve(model, DEFAULT_TIME_LIMIT);

        assert_eq!(result, Err(SolverError::Infeasible));

        Ok(())
    }

    #[test]
    fn zero_time_limit_stops_before_proving_optimality() -> TestResult {
        let records = [
            StockingRecord::new(RecordKey::sku("a"), 10, 3.0, 2.5)?,
            StockingRecord::new(RecordKey::sku("b"), 20, 2.0, 1.5)?,
            StockingRecord::new(RecordKey::sku("c"), 5, 7.0, 4.5)?,
        ];
        let bounded = bound_records(&records, &BoundScale::default())?;

        let model = ModelBuilder::new(Budget::at_most(70.0)?).build(&bounded)?;

        let result = MILPSolver::solve(model, Duration::ZERO);

        match result {
            Ok(values) => assert_eq!(values.status(), SolveStatus::TimedOut),
            Err(error) => assert_eq!(error.status(), SolveStatus::NotSolved),
        }

        Ok(())
    }

    #[test]
    fn early_stops_are_reported_as_timed_out() {
        assert_eq!(solve_status(SolutionStatus::Optimal), SolveStatus::Optimal);
        assert_eq!(solve_status(SolutionStatus::TimeLimit), SolveStatus::TimedOut);
        assert_eq!(solve_status(SolutionStatus::GapLimit), SolveStatus::TimedOut);
    }
}
