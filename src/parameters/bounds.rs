//! Parameter bounds implementation
//!
//! This module provides the box constraints attached to peak parameters and
//! the Minuit-style parameter transformation that lets an unconstrained
//! Levenberg-Marquardt solver honour them.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than or equal to max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Non-finite parameter value is not allowed")]
    InfiniteValue,
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

// Infinite limits travel as `null` so the JSON stays valid.
#[derive(Serialize, Deserialize)]
struct BoundsRepr {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        BoundsRepr {
            min: self.has_lower_bound().then_some(self.min),
            max: self.has_upper_bound().then_some(self.max),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = BoundsRepr::deserialize(deserializer)?;
        let min = repr.min.unwrap_or(NEG_INFINITY);
        let max = repr.max.unwrap_or(INFINITY);

        Bounds::new(min, max).map_err(serde::de::Error::custom)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Bounds {
    /// Create a new bounds constraint with min and max values
    ///
    /// # Examples
    ///
    /// ```
    /// use peakfit_rs::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.min, 0.0);
    /// assert_eq!(bounds.max, 10.0);
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Create an unbounded constraint (negative infinity to positive infinity)
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Create a bounds constraint with only a minimum value
    pub fn min_only(min: f64) -> Self {
        Self { min, max: INFINITY }
    }

    /// Create a bounds constraint with only a maximum value
    pub fn max_only(max: f64) -> Self {
        Self {
            min: NEG_INFINITY,
            max,
        }
    }

    /// The interval as a `(lower, upper)` pair.
    pub fn as_tuple(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Check if a value is within the bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check if the bounds are finite (both min and max are finite)
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Check if the parameter is bounded from below
    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    /// Check if the parameter is bounded from above
    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// A zero-width interval pins the parameter to a single value.
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    /// Clamp a value to be within the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Implements the Minuit-style parameter transformations for handling bounds constraints
///
/// The optimizer works with unbounded internal values while the external
/// values stay inside the bounds:
///
/// - lower bound only: `ext = min - 1 + sqrt(int^2 + 1)`
/// - upper bound only: `ext = max + 1 - sqrt(int^2 + 1)`
/// - both bounds: `ext = min + (sin(int) + 1) * (max - min) / 2`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    /// Create a new bounds transform
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// The bounds this transform enforces.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Transform an internal parameter value to an external value
    pub fn to_external(&self, internal_value: f64) -> f64 {
        match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => self.bounds.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => self.bounds.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => {
                let bound_range = self.bounds.max - self.bounds.min;
                self.bounds.min + (internal_value.sin() + 1.0) * bound_range / 2.0
            }
        }
    }

    /// Transform an external parameter value to an internal value
    ///
    /// Returns an error if the external value is not finite or lies outside
    /// the bounds.
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        if !self.bounds.is_within_bounds(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        let internal = match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - self.bounds.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((self.bounds.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let bound_range = self.bounds.max - self.bounds.min;
                if bound_range == 0.0 {
                    return Ok(0.0);
                }
                // Ensure scaled is in [-1, 1] for asin
                let scaled = 2.0 * (external_value - self.bounds.min) / bound_range - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        };

        Ok(internal)
    }

    /// Derivative of the external value with respect to the internal value.
    ///
    /// Used to chain Jacobian columns from external to internal coordinates.
    pub fn derivative(&self, internal_value: f64) -> f64 {
        match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => 1.0,
            (true, false) => internal_value / (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => -internal_value / (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => (self.bounds.max - self.bounds.min) * internal_value.cos() / 2.0,
        }
    }

    /// Like [`to_internal`](Self::to_internal), but a value sitting on a
    /// bound is moved to a nearby internal point where [`derivative`](Self::derivative)
    /// is non-zero, so an optimizer started there can still move.
    pub fn to_internal_interior(&self, external_value: f64) -> Result<f64, BoundsError> {
        let internal = self.to_internal(external_value)?;
        if self.bounds.is_degenerate() {
            return Ok(internal);
        }

        let interior = match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => internal,
            (true, false) | (false, true) => internal.max(INTERIOR_OFFSET),
            (true, true) => {
                let limit = FRAC_PI_2 - INTERIOR_OFFSET;
                internal.clamp(-limit, limit)
            }
        };
        Ok(interior)
    }
}

/// Smallest distance kept between an internal start value and a stationary
/// point of the transform.
const INTERIOR_OFFSET: f64 = 1e-3;
