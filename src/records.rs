//! Stocking Records

use std::fmt;

use smallvec::SmallVec;
use thiserror::Error;

/// Errors raised when a record carries values the optimiser cannot use.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    /// A required field was absent or empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field could not be parsed as a number.
    #[error("field `{field}` is not a valid number: {value:?}")]
    NonNumeric {
        /// Name of the offending field
        field: &'static str,

        /// Raw value as read
        value: String,
    },

    /// A coefficient was NaN or infinite.
    #[error("field `{field}` of record {key} must be finite, found {value}")]
    NonFinite {
        /// Record key
        key: RecordKey,

        /// Name of the offending field
        field: &'static str,

        /// Offending value
        value: f64,
    },

    /// Unit cost was negative, which would make the budget constraint meaningless.
    #[error("unit cost of record {key} must not be negative, found {unit_cost}")]
    NegativeCost {
        /// Record key
        key: RecordKey,

        /// Offending cost
        unit_cost: f64,
    },

    /// The row could not be decoded at all.
    #[error("malformed row: {0}")]
    Malformed(String),

    /// Only one of `min_units`/`max_units` was supplied.
    #[error("record supplies `{0}` without its counterpart bound")]
    PartialBounds(&'static str),
}

/// Opaque record identity: a SKU alone, or a composite such as (SKU, warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(SmallVec<[String; 2]>);

impl RecordKey {
    /// Key made of a single SKU identifier.
    pub fn sku(sku: impl Into<String>) -> Self {
        let mut parts = SmallVec::new();
        parts.push(sku.into());

        Self(parts)
    }

    /// Composite key of a SKU held at a specific warehouse.
    pub fn sku_at(sku: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self::from_parts([sku.into(), warehouse.into()])
    }

    /// Key built from an arbitrary ordered sequence of identifying fields.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// All identifying fields, in order.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// SKU identifier (first part).
    pub fn sku_id(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// Warehouse identifier (second part), if the key is composite.
    pub fn warehouse_id(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A single SKU (optionally per warehouse) with its economics and baseline.
///
/// Records are immutable once constructed; every later stage borrows them.
#[derive(Debug, Clone, PartialEq)]
pub struct StockingRecord {
    key: RecordKey,
    baseline_units: u32,
    unit_profit: f64,
    unit_cost: f64,
    supplied_bounds: Option<(u32, u32)>,
}

impl StockingRecord {
    /// Create a record whose bounds will be derived from its baseline.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] if a coefficient is not finite or the unit cost is negative.
    pub fn new(
        key: RecordKey,
        baseline_units: u32,
        unit_profit: f64,
        unit_cost: f64,
    ) -> Result<Self, RecordError> {
        let record = Self {
            key,
            baseline_units,
            unit_profit,
            unit_cost,
            supplied_bounds: None,
        };

        record.validate()?;

        Ok(record)
    }

    /// Attach `(min_units, max_units)` supplied by the input instead of deriving them.
    ///
    /// The pair is validated when bounds are attached for a run.
    #[must_use]
    pub fn with_bounds(mut self, min_units: u32, max_units: u32) -> Self {
        self.supplied_bounds = Some((min_units, max_units));
        self
    }

    /// Check the coefficients are usable in a linear model.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] describing the first offending coefficient.
    pub fn validate(&self) -> Result<(), RecordError> {
        for (field, value) in [("unit_profit", self.unit_profit), ("unit_cost", self.unit_cost)] {
            if !value.is_finite() {
                return Err(RecordError::NonFinite {
                    key: self.key.clone(),
                    field,
                    value,
                });
            }
        }

        if self.unit_cost < 0.0 {
            return Err(RecordError::NegativeCost {
                key: self.key.clone(),
                unit_cost: self.unit_cost,
            });
        }

        Ok(())
    }

    /// Record identity.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Observed or expected unit count.
    pub fn baseline_units(&self) -> u32 {
        self.baseline_units
    }

    /// Profit contribution per allocated unit.
    pub fn unit_profit(&self) -> f64 {
        self.unit_profit
    }

    /// Budget consumption per allocated unit.
    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }

    /// `(min_units, max_units)` supplied with the record, if any.
    pub fn supplied_bounds(&self) -> Option<(u32, u32)> {
        self.supplied_bounds
    }

    /// Spend at the baseline unit count.
    pub fn baseline_spend(&self) -> f64 {
        self.unit_cost * f64::from(self.baseline_units)
    }

    /// Profit at the baseline unit count.
    pub fn baseline_profit(&self) -> f64 {
        self.unit_profit * f64::from(self.baseline_units)
    }
}

/// Total spend of all records at their baseline unit counts.
pub fn baseline_spend(records: &[StockingRecord]) -> f64 {
    records.iter().map(StockingRecord::baseline_spend).sum()
}
