//! Spend Budget

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tolerance band for [`BudgetMode::ToleranceEquality`], as a fraction of the budget.
pub const DEFAULT_TOLERANCE_FRACTION: f64 = 0.001;

/// Budget validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BudgetError {
    /// The budget must be a finite, strictly positive amount.
    #[error("budget must be finite and greater than zero, found {0}")]
    InvalidAmount(f64),

    /// The tolerance fraction must be finite and non-negative.
    #[error("budget tolerance fraction must be finite and non-negative, found {0}")]
    InvalidTolerance(f64),
}

/// How total spend relates to the budget.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BudgetMode {
    /// Total spend must not exceed the budget.
    #[default]
    Inequality,

    /// Total spend must land within `fraction * budget` of the budget.
    ToleranceEquality {
        /// Width of the band on either side, relative to the budget
        #[serde(default = "default_tolerance_fraction")]
        fraction: f64,
    },
}

fn default_tolerance_fraction() -> f64 {
    DEFAULT_TOLERANCE_FRACTION
}

impl BudgetMode {
    /// Tolerance-equality mode with the default band.
    pub fn tolerance_equality() -> Self {
        Self::ToleranceEquality {
            fraction: DEFAULT_TOLERANCE_FRACTION,
        }
    }

    /// Short label used in logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inequality => "inequality",
            Self::ToleranceEquality { .. } => "tolerance_equality",
        }
    }
}

/// Amount available for allocation and the rule binding spend to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    amount: f64,
    mode: BudgetMode,
}

impl Budget {
    /// Create a budget.
    ///
    /// # Errors
    ///
    /// Returns a [`BudgetError`] if the amount is not finite and positive, or the
    /// tolerance fraction is invalid.
    pub fn new(amount: f64, mode: BudgetMode) -> Result<Self, BudgetError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(BudgetError::InvalidAmount(amount));
        }

        if let BudgetMode::ToleranceEquality { fraction } = mode
            && (!fraction.is_finite() || fraction < 0.0)
        {
            return Err(BudgetError::InvalidTolerance(fraction));
        }

        Ok(Self { amount, mode })
    }

    /// Inequality budget: spend at most `amount`.
    ///
    /// # Errors
    ///
    /// Returns a [`BudgetError`] if the amount is not finite and positive.
    pub fn at_most(amount: f64) -> Result<Self, BudgetError> {
        Self::new(amount, BudgetMode::Inequality)
    }

    /// Budget that permits no spend; only free stock can be allocated against it.
    pub(crate) fn exhausted(mode: BudgetMode) -> Self {
        Self { amount: 0.0, mode }
    }

    /// Budget amount.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Budget mode.
    pub fn mode(&self) -> BudgetMode {
        self.mode
    }

    /// Absolute width of the tolerance band, when in tolerance-equality mode.
    pub fn tolerance(&self) -> Option<f64> {
        match self.mode {
            BudgetMode::Inequality => None,
            BudgetMode::ToleranceEquality { fraction } => Some(fraction * self.amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn default_tolerance_is_a_tenth_of_a_percent() -> TestResult {
        let budget = Budget::new(2_000.0, BudgetMode::tolerance_equality())?;

        assert!(budget.tolerance().is_some_and(|t| (t - 2.0).abs() < 1e-12));

        Ok(())
    }

    #[test]
    fn inequality_has_no_tolerance() -> TestResult {
        assert_eq!(Budget::at_most(10.0)?.tolerance(), None);

        Ok(())
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert_eq!(Budget::at_most(0.0), Err(BudgetError::InvalidAmount(0.0)));
        assert_eq!(Budget::at_most(-1.0), Err(BudgetError::InvalidAmount(-1.0)));
        assert!(Budget::at_most(f64::INFINITY).is_err());
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let result = Budget::new(10.0, BudgetMode::ToleranceEquality { fraction: -0.1 });

        assert_eq!(result, Err(BudgetError::InvalidTolerance(-0.1)));
    }

    #[test]
    fn mode_deserializes_from_yaml_with_default_fraction() -> TestResult {
        let mode: BudgetMode = serde_norway::from_str("kind: tolerance_equality")?;

        assert_eq!(mode, BudgetMode::tolerance_equality());

        let mode: BudgetMode = serde_norway::from_str("kind: inequality")?;

        assert_eq!(mode, BudgetMode::Inequality);

        Ok(())
    }
}
