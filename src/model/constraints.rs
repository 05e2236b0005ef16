//! Named Constraints

use std::fmt;

use good_lp::{Constraint, Expression};

/// Relation operator for a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintRelation {
    /// Equality (`lhs == rhs`)
    Eq,

    /// Less than or equal (`lhs <= rhs`)
    Leq,

    /// Greater than or equal (`lhs >= rhs`)
    Geq,
}

impl fmt::Display for ConstraintRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Leq => "<=",
            Self::Geq => ">=",
        })
    }
}

/// Linear constraint recorded during model construction, tagged with a stable name.
#[derive(Debug, Clone)]
pub struct NamedConstraint {
    name: String,
    lhs: Expression,
    relation: ConstraintRelation,
    rhs: f64,
}

impl NamedConstraint {
    /// Record a constraint.
    pub fn new(
        name: impl Into<String>,
        lhs: Expression,
        relation: ConstraintRelation,
        rhs: f64,
    ) -> Self {
        Self {
            name: name.into(),
            lhs,
            relation,
            rhs,
        }
    }

    /// Stable diagnostic name, e.g. `budget` or `min_units[SKU-1]`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Left-hand side expression.
    pub fn lhs(&self) -> &Expression {
        &self.lhs
    }

    /// Relation operator.
    pub fn relation(&self) -> ConstraintRelation {
        self.relation
    }

    /// Right-hand side scalar.
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Solver-facing constraint.
    pub(crate) fn into_constraint(self) -> Constraint {
        match self.relation {
            ConstraintRelation::Eq => self.lhs.eq(self.rhs),
            ConstraintRelation::Leq => self.lhs.leq(self.rhs),
            ConstraintRelation::Geq => self.lhs.geq(self.rhs),
        }
    }
}
