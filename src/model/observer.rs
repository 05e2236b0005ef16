//! Model Observer

use good_lp::Variable;
use tracing::trace;

use crate::{bounds::UnitBounds, model::constraints::NamedConstraint, records::RecordKey};

/// Observer trait for capturing the formulation as it's built.
///
/// The builder remains the only place the model is constructed; observers
/// passively record what happens for logging or analysis. When none is given
/// the builder uses [`NoopObserver`] and the calls compile away.
pub trait ModelObserver {
    /// Called when the integer decision variable for a record is created.
    fn on_decision_variable(&mut self, key: &RecordKey, var: Variable, bounds: UnitBounds);

    /// Called when the continuous budget slack variable is created.
    fn on_slack_variable(&mut self, _var: Variable, _tolerance: f64) {}

    /// Called when a term is added to the profit objective.
    fn on_objective_term(&mut self, _key: &RecordKey, _var: Variable, _coefficient: f64) {}

    /// Called for every named constraint, in model order.
    fn on_constraint(&mut self, constraint: &NamedConstraint);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ModelObserver for NoopObserver {
    fn on_decision_variable(&mut self, _key: &RecordKey, _var: Variable, _bounds: UnitBounds) {}

    fn on_constraint(&mut self, _constraint: &NamedConstraint) {}
}

/// Observer that logs the formulation at `trace` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ModelObserver for TracingObserver {
    fn on_decision_variable(&mut self, key: &RecordKey, _var: Variable, bounds: UnitBounds) {
        trace!(
            %key,
            min_units = bounds.min_units(),
            max_units = bounds.max_units(),
            "decision variable"
        );
    }

    fn on_slack_variable(&mut self, _var: Variable, tolerance: f64) {
        trace!(tolerance, "budget slack variable");
    }

    fn on_objective_term(&mut self, key: &RecordKey, _var: Variable, coefficient: f64) {
        trace!(%key, coefficient, "objective term");
    }

    fn on_constraint(&mut self, constraint: &NamedConstraint) {
        trace!(
            name = constraint.name(),
            relation = %constraint.relation(),
            rhs = constraint.rhs(),
            "constraint"
        );
    }
}
