//! Trust region implementation for the Levenberg-Marquardt algorithm.
//!
//! This module provides a trust region implementation that adapts the damping
//! based on the agreement between predicted and actual reduction in cost.

use super::config::LmConfig;

/// Trust region implementation for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone)]
pub struct TrustRegion {
    /// Current value of the damping parameter
    pub lambda: f64,

    /// Minimum allowed value for the damping parameter
    pub lambda_min: f64,

    /// Maximum allowed value for the damping parameter
    pub lambda_max: f64,

    /// Factor to increase lambda by when step is rejected
    pub lambda_increase_factor: f64,

    /// Factor to decrease lambda by when step is accepted
    pub lambda_decrease_factor: f64,

    /// Minimum gain ratio required to accept a step
    pub min_gain_ratio: f64,

    /// Gain ratio below which an accepted step still increases lambda
    pub poor_gain_ratio: f64,

    /// Gain ratio above which to decrease lambda
    pub good_gain_ratio: f64,
}

impl Default for TrustRegion {
    fn default() -> Self {
        Self::from_config(&LmConfig::default())
    }
}

impl TrustRegion {
    /// Creates a new TrustRegion with default parameters.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a trust region with the damping schedule of a configuration.
    pub fn from_config(config: &LmConfig) -> Self {
        Self {
            lambda: config.initial_lambda,
            lambda_min: config.min_lambda,
            lambda_max: config.max_lambda,
            lambda_increase_factor: config.lambda_up_factor,
            lambda_decrease_factor: config.lambda_down_factor,
            min_gain_ratio: 1e-4,
            poor_gain_ratio: 0.25,
            good_gain_ratio: 0.75,
        }
    }

    /// Updates the damping parameter based on the gain ratio.
    ///
    /// Returns whether the step is accepted.
    pub fn update_lambda(&mut self, gain_ratio: f64) -> bool {
        if gain_ratio > self.min_gain_ratio {
            if gain_ratio > self.good_gain_ratio {
                self.decrease();
            } else if gain_ratio < self.poor_gain_ratio {
                self.increase();
            }
            true
        } else {
            self.increase();
            false
        }
    }

    /// Increase the damping after a failed trial point.
    pub fn increase(&mut self) {
        self.lambda = (self.lambda * self.lambda_increase_factor).min(self.lambda_max);
    }

    fn decrease(&mut self) {
        self.lambda = (self.lambda * self.lambda_decrease_factor).max(self.lambda_min);
    }

    /// Whether the damping has reached its ceiling.
    pub fn is_saturated(&self) -> bool {
        self.lambda >= self.lambda_max
    }

    /// Calculates the gain ratio between actual and predicted reduction.
    ///
    /// A non-positive prediction means the quadratic model is unreliable; the
    /// step then only counts as a success if the cost actually went down.
    pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        let actual_reduction = current_cost - new_cost;

        if predicted_reduction > 0.0 {
            actual_reduction / predicted_reduction
        } else if actual_reduction > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}
