//! Parameter definition and implementation
//!
//! A `Parameter` is one scalar of a peak (width, amplitude or position)
//! together with the box constraint the optimizer must respect and a flag
//! saying whether it takes part in the fit at all.

use crate::parameters::bounds::{Bounds, BoundsError};
use serde::{Deserialize, Serialize};

/// A single fit parameter.
///
/// Bounds are declarative: they are consulted when a fit starts and are
/// never enforced by [`Parameter::set_value`]. A value may sit outside its
/// own bounds until the next fit pulls it back inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    pub name: String,

    /// Current value of the parameter
    value: f64,

    /// Whether this parameter is varied during optimization
    vary: bool,

    /// Minimum and maximum bounds for the parameter value
    #[serde(default)]
    bounds: Bounds,

    /// Standard error of the parameter (set after fitting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<f64>,
}

impl Parameter {
    /// Create a new, unbounded, varying parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use peakfit_rs::parameters::Parameter;
    ///
    /// let param = Parameter::new("amplitude", 10.0);
    /// assert_eq!(param.name(), "amplitude");
    /// assert_eq!(param.value(), 10.0);
    /// assert!(param.vary());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            vary: true,
            bounds: Bounds::default(),
            stderr: None,
        }
    }

    /// Create a new parameter with bounds.
    ///
    /// Unlike a bounds-enforcing parameter system the value is stored as given,
    /// even when it lies outside `[min, max]`.
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, BoundsError> {
        Ok(Self {
            bounds: Bounds::new(min, max)?,
            ..Self::new(name, value)
        })
    }

    /// Get the name of the parameter
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current value of the parameter
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value of the parameter. No clamping is applied.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    /// Whether the parameter is varied during a fit.
    pub fn vary(&self) -> bool {
        self.vary
    }

    /// Fix (`false`) or free (`true`) the parameter for subsequent fits.
    pub fn set_vary(&mut self, vary: bool) {
        self.vary = vary;
    }

    /// A parameter is free when it varies and its interval is not pinned.
    pub fn is_free(&self) -> bool {
        self.vary && !self.bounds.is_degenerate()
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    /// Replace the bounds. The current value is not checked against them.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), BoundsError> {
        self.bounds = Bounds::new(min, max)?;
        Ok(())
    }

    /// Standard error from the most recent successful fit, if any.
    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    pub(crate) fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }
}
