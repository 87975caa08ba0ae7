//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the solver budget, the convergence tolerances and the
//! damping schedule. Configurations deserialize from JSON with every missing
//! field taking its default.

use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of iterations (accepted steps). Default: 200
    pub max_iterations: usize,

    /// Maximum number of residual evaluations. Default: 10_000
    pub max_function_evals: usize,

    /// Tolerance for relative change in the cost. Default: 1e-10
    pub ftol: f64,

    /// Tolerance for relative change in parameter values. Default: 1e-10
    pub xtol: f64,

    /// Tolerance for the scaled gradient. Default: 1e-12
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e12
    pub max_lambda: f64,

    /// Evaluate per-peak Jacobian blocks on the rayon pool. Default: false
    pub parallel_jacobian: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            max_function_evals: 10_000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
            parallel_jacobian: false,
        }
    }
}

impl LmConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LmConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that tolerances and the damping schedule are usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PeakFitError::Validation(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }

        if !(self.min_lambda > 0.0
            && self.min_lambda <= self.initial_lambda
            && self.initial_lambda <= self.max_lambda
            && self.max_lambda.is_finite())
        {
            return Err(PeakFitError::Validation(format!(
                "damping must satisfy 0 < min_lambda <= initial_lambda <= max_lambda, got {} / {} / {}",
                self.min_lambda, self.initial_lambda, self.max_lambda
            )));
        }

        if !(self.lambda_up_factor > 1.0 && self.lambda_down_factor > 0.0 && self.lambda_down_factor < 1.0)
        {
            return Err(PeakFitError::Validation(format!(
                "lambda factors must satisfy up > 1 and 0 < down < 1, got {} / {}",
                self.lambda_up_factor, self.lambda_down_factor
            )));
        }

        Ok(())
    }
}
