//! Bound Deriver
//!
//! Turns each record's baseline unit count into the `[min_units, max_units]`
//! domain of its decision variable.

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{RecordKey, StockingRecord};

/// Default lower scale factor applied to the baseline.
pub const DEFAULT_LOW_SCALE: f64 = 0.5;

/// Default upper scale factor applied to the baseline.
pub const DEFAULT_HIGH_SCALE: f64 = 1.5;

/// Default floor applied to derived bounds.
pub const DEFAULT_MIN_FLOOR: u32 = 1;

/// Bound derivation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoundsError {
    /// The minimum exceeds the maximum; never clamped.
    #[error("invalid bounds for {key}: min_units {min} exceeds max_units {max}")]
    InvalidBounds {
        /// Record key
        key: RecordKey,

        /// Derived or supplied minimum
        min: u32,

        /// Derived or supplied maximum
        max: u32,
    },

    /// A scale factor was negative or not finite.
    #[error("scale factor `{name}` must be finite and non-negative, found {value}")]
    InvalidScale {
        /// Which factor (`low` or `high`)
        name: &'static str,

        /// Offending value
        value: f64,
    },

    /// A scaled baseline does not fit in the unit range.
    #[error("scaled baseline for {key} does not fit in the unit range: {value}")]
    BoundOverflow {
        /// Record key
        key: RecordKey,

        /// Scaled value
        value: f64,
    },
}

/// Inclusive integer domain of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitBounds {
    min_units: u32,
    max_units: u32,
}

impl UnitBounds {
    /// Create bounds, rejecting `min > max`.
    ///
    /// # Errors
    ///
    /// Returns [`BoundsError::InvalidBounds`] if `min_units > max_units`.
    pub fn new(key: &RecordKey, min_units: u32, max_units: u32) -> Result<Self, BoundsError> {
        if min_units > max_units {
            return Err(BoundsError::InvalidBounds {
                key: key.clone(),
                min: min_units,
                max: max_units,
            });
        }

        Ok(Self {
            min_units,
            max_units,
        })
    }

    /// Create bounds without attaching them to a key.
    ///
    /// Returns `None` when `min_units > max_units`.
    pub fn checked(min_units: u32, max_units: u32) -> Option<Self> {
        (min_units <= max_units).then_some(Self {
            min_units,
            max_units,
        })
    }

    /// Lowest allowed allocation.
    pub fn min_units(&self) -> u32 {
        self.min_units
    }

    /// Highest allowed allocation.
    pub fn max_units(&self) -> u32 {
        self.max_units
    }

    /// Whether `units` lies in the domain.
    pub fn contains(&self, units: u32) -> bool {
        (self.min_units..=self.max_units).contains(&units)
    }
}

/// Scale factors used to derive bounds from a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundScale {
    /// Fraction of the baseline used for the minimum (rounded down).
    pub low: f64,

    /// Fraction of the baseline used for the maximum (rounded up).
    pub high: f64,

    /// Floor applied to the derived minimum, and to the maximum when it would be zero.
    pub min_floor: u32,
}

impl Default for BoundScale {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_SCALE,
            high: DEFAULT_HIGH_SCALE,
            min_floor: DEFAULT_MIN_FLOOR,
        }
    }
}

impl BoundScale {
    /// Check both factors are finite and non-negative.
    ///
    /// `low > high` is deliberately accepted here; it surfaces as
    /// [`BoundsError::InvalidBounds`] for the first affected record.
    ///
    /// # Errors
    ///
    /// Returns [`BoundsError::InvalidScale`] for a negative or non-finite factor.
    pub fn validate(&self) -> Result<(), BoundsError> {
        for (name, value) in [("low", self.low), ("high", self.high)] {
            if !value.is_finite() || value < 0.0 {
                return Err(BoundsError::InvalidScale { name, value });
            }
        }

        Ok(())
    }

    /// Derive bounds for a single baseline.
    ///
    /// # Errors
    ///
    /// Returns a [`BoundsError`] if the scale is invalid, a bound overflows,
    /// or the derived minimum exceeds the maximum.
    pub fn derive(
        &self,
        key: &RecordKey,
        baseline_units: u32,
    ) -> Result<UnitBounds, BoundsError> {
        self.validate()?;

        let baseline = f64::from(baseline_units);

        let min_units = scaled_units(key, (baseline * self.low).floor())?.max(self.min_floor);

        // The floor only lifts an empty upper bound; otherwise `min_floor > max` is an error.
        let max_units = match scaled_units(key, (baseline * self.high).ceil())? {
            0 => self.min_floor,
            max_units => max_units,
        };

        UnitBounds::new(key, min_units, max_units)
    }
}

fn scaled_units(key: &RecordKey, value: f64) -> Result<u32, BoundsError> {
    value.to_u32().ok_or_else(|| BoundsError::BoundOverflow {
        key: key.clone(),
        value,
    })
}

/// A record paired with the domain of its decision variable.
#[derive(Debug, Clone, Copy)]
pub struct BoundedRecord<'a> {
    record: &'a StockingRecord,
    bounds: UnitBounds,
}

impl<'a> BoundedRecord<'a> {
    /// Pair a record with explicit bounds.
    pub fn new(record: &'a StockingRecord, bounds: UnitBounds) -> Self {
        Self { record, bounds }
    }

    /// Underlying record.
    pub fn record(&self) -> &'a StockingRecord {
        self.record
    }

    /// Decision variable domain.
    pub fn bounds(&self) -> UnitBounds {
        self.bounds
    }

    /// Minimum spend this record commits the budget to.
    pub fn committed_spend(&self) -> f64 {
        self.record.unit_cost() * f64::from(self.bounds.min_units())
    }
}

/// Attach bounds to every record, keeping supplied bounds and deriving the rest.
///
/// # Errors
///
/// Returns the first [`BoundsError`] encountered; the run must not proceed.
pub fn bound_records<'a, I>(
    records: I,
    scale: &BoundScale,
) -> Result<Vec<BoundedRecord<'a>>, BoundsError>
where
    I: IntoIterator<Item = &'a StockingRecord>,
{
    scale.validate()?;

    records
        .into_iter()
        .map(|record| {
            let bounds = match record.supplied_bounds() {
                Some((min_units, max_units)) => {
                    UnitBounds::new(record.key(), min_units, max_units)?
                }
                None => scale.derive(record.key(), record.baseline_units())?,
            };

            Ok(BoundedRecord::new(record, bounds))
        })
        .collect()
}
