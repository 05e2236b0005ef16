//! Model Builder
//!
//! Translates bounded records and a budget into a MILP: one integer variable
//! per record, a profit objective and a set of named linear constraints.

use std::fmt;

use good_lp::{Expression, ProblemVariables, Variable, variable};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{
    bounds::BoundedRecord,
    budget::{Budget, BudgetMode},
    model::{
        constraints::{ConstraintRelation, NamedConstraint},
        observer::{ModelObserver, NoopObserver},
    },
    records::{RecordError, RecordKey},
};

pub mod constraints;
pub mod observer;

/// Name of the budget constraint.
pub const BUDGET_CONSTRAINT: &str = "budget";

/// Model construction errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Two records share a key; each key must map to exactly one variable.
    #[error("duplicate record key {0}")]
    DuplicateKey(RecordKey),

    /// A record has coefficients that cannot enter the model.
    #[error(transparent)]
    InvalidRecord(#[from] RecordError),

    /// Minimum commitments already exceed the budget.
    #[error(
        "budget {budget} is insufficient to cover the minimum required units for all records (requires {required})"
    )]
    InsufficientBudget {
        /// `Σ min_units * unit_cost`
        required: f64,

        /// Budget amount
        budget: f64,
    },
}

/// Integer decision variable tied to the record it allocates.
#[derive(Debug, Clone, Copy)]
pub struct DecisionVariable<'a> {
    record: BoundedRecord<'a>,
    var: Variable,
}

impl<'a> DecisionVariable<'a> {
    /// Bounded record this variable allocates.
    pub fn record(&self) -> BoundedRecord<'a> {
        self.record
    }

    /// Solver variable handle.
    pub fn var(&self) -> Variable {
        self.var
    }

    /// Record key.
    pub fn key(&self) -> &'a RecordKey {
        self.record.record().key()
    }
}

/// A built allocation model, ready to be handed to a solver exactly once.
pub struct AllocationModel<'a> {
    pb: ProblemVariables,
    objective: Expression,
    decisions: Vec<DecisionVariable<'a>>,
    slack: Option<Variable>,
    constraints: Vec<NamedConstraint>,
    budget: Budget,
}

impl fmt::Debug for AllocationModel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationModel")
            .field("pb", &"<ProblemVariables>")
            .field("objective", &"<Expression>")
            .field(
                "decisions",
                &format!("[{} variables]", self.decisions.len()),
            )
            .field("slack", &self.slack.is_some())
            .field(
                "constraints",
                &format!("[{} constraints]", self.constraints.len()),
            )
            .field("budget", &self.budget)
            .finish()
    }
}

/// Parts of a model handed over to the solver.
pub(crate) struct ModelParts<'a> {
    pub(crate) pb: ProblemVariables,
    pub(crate) objective: Expression,
    pub(crate) decisions: Vec<DecisionVariable<'a>>,
    pub(crate) slack: Option<Variable>,
    pub(crate) constraints: Vec<NamedConstraint>,
}

impl<'a> AllocationModel<'a> {
    /// Decision variables, in record order.
    pub fn decisions(&self) -> &[DecisionVariable<'a>] {
        &self.decisions
    }

    /// Budget slack variable, present only in tolerance-equality mode.
    pub fn slack(&self) -> Option<Variable> {
        self.slack
    }

    /// Named constraints, in the order they will be added to the solver.
    pub fn constraints(&self) -> &[NamedConstraint] {
        &self.constraints
    }

    /// Look up a constraint by name.
    pub fn constraint(&self, name: &str) -> Option<&NamedConstraint> {
        self.constraints.iter().find(|c| c.name() == name)
    }

    /// Profit objective.
    pub fn objective(&self) -> &Expression {
        &self.objective
    }

    /// Budget the model was built against.
    pub fn budget(&self) -> Budget {
        self.budget
    }

    pub(crate) fn into_parts(self) -> ModelParts<'a> {
        ModelParts {
            pb: self.pb,
            objective: self.objective,
            decisions: self.decisions,
            slack: self.slack,
            constraints: self.constraints,
        }
    }
}

/// Builds [`AllocationModel`]s against a fixed budget.
#[derive(Debug, Clone, Copy)]
pub struct ModelBuilder {
    budget: Budget,
    explicit_bounds: bool,
}

impl ModelBuilder {
    /// Builder for the given budget, encoding bounds in variable domains only.
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            explicit_bounds: false,
        }
    }

    /// Also emit `min_units[..]`/`max_units[..]` constraints for every record.
    ///
    /// They duplicate the variable domains and only help when inspecting the formulation.
    #[must_use]
    pub fn with_explicit_bounds(mut self, explicit_bounds: bool) -> Self {
        self.explicit_bounds = explicit_bounds;
        self
    }

    /// Build the model.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if keys repeat, a record is invalid, or the
    /// minimum commitments exceed the budget.
    pub fn build<'a>(
        &self,
        records: &[BoundedRecord<'a>],
    ) -> Result<AllocationModel<'a>, ModelError> {
        let mut observer = NoopObserver;

        self.build_with_observer(records, &mut observer)
    }

    /// Build the model, reporting every variable, term and constraint to `observer`.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if keys repeat, a record is invalid, or the
    /// minimum commitments exceed the budget.
    pub fn build_with_observer<'a, O: ModelObserver + ?Sized>(
        &self,
        records: &[BoundedRecord<'a>],
        observer: &mut O,
    ) -> Result<AllocationModel<'a>, ModelError> {
        self.validate(records)?;

        let mut pb = ProblemVariables::new();
        let mut objective = Expression::default();
        let mut spend = Expression::default();
        let mut constraints = Vec::new();

        let decisions: Vec<DecisionVariable<'a>> = records
            .iter()
            .map(|&record| {
                let key = record.record().key();
                let bounds = record.bounds();

                let var = pb.add(
                    variable()
                        .integer()
                        .min(f64::from(bounds.min_units()))
                        .max(f64::from(bounds.max_units()))
                        .name(format!("units_{key}")),
                );

                observer.on_decision_variable(key, var, bounds);

                DecisionVariable { record, var }
            })
            .collect();

        for decision in &decisions {
            let record = decision.record.record();

            objective += decision.var * record.unit_profit();
            observer.on_objective_term(record.key(), decision.var, record.unit_profit());

            spend += decision.var * record.unit_cost();
        }

        // Profit is the only objective; the budget is always a constraint.
        let slack = match self.budget.mode() {
            BudgetMode::Inequality => {
                constraints.push(NamedConstraint::new(
                    BUDGET_CONSTRAINT,
                    spend,
                    ConstraintRelation::Leq,
                    self.budget.amount(),
                ));

                None
            }
            BudgetMode::ToleranceEquality { .. } => {
                let tolerance = self.budget.tolerance().unwrap_or_default();

                let slack = pb.add(variable().min(-tolerance).max(tolerance).name("slack"));

                observer.on_slack_variable(slack, tolerance);

                constraints.push(NamedConstraint::new(
                    BUDGET_CONSTRAINT,
                    spend + slack,
                    ConstraintRelation::Eq,
                    self.budget.amount(),
                ));

                Some(slack)
            }
        };

        if self.explicit_bounds {
            for decision in &decisions {
                let key = decision.key();
                let bounds = decision.record.bounds();

                constraints.push(NamedConstraint::new(
                    format!("min_units[{key}]"),
                    Expression::from(decision.var),
                    ConstraintRelation::Geq,
                    f64::from(bounds.min_units()),
                ));

                constraints.push(NamedConstraint::new(
                    format!("max_units[{key}]"),
                    Expression::from(decision.var),
                    ConstraintRelation::Leq,
                    f64::from(bounds.max_units()),
                ));
            }
        }

        constraints
            .iter()
            .for_each(|constraint| observer.on_constraint(constraint));

        Ok(AllocationModel {
            pb,
            objective,
            decisions,
            slack,
            constraints,
            budget: self.budget,
        })
    }

    /// Reject models that can never yield an acceptable solution.
    fn validate(&self, records: &[BoundedRecord<'_>]) -> Result<(), ModelError> {
        let mut seen = FxHashSet::default();

        for record in records {
            let record = record.record();

            if !seen.insert(record.key()) {
                return Err(ModelError::DuplicateKey(record.key().clone()));
            }

            record.validate()?;
        }

        let required = minimum_commitment(records);

        if required > self.budget.amount() {
            return Err(ModelError::InsufficientBudget {
                required,
                budget: self.budget.amount(),
            });
        }

        Ok(())
    }
}

/// Spend required to allocate every record its minimum.
pub fn minimum_commitment(records: &[BoundedRecord<'_>]) -> f64 {
    records.iter().map(BoundedRecord::committed_spend).sum()
}
