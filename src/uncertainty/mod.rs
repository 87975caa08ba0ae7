//! # Uncertainty Calculation
//!
//! This module turns the Jacobian at a least-squares solution into parameter
//! uncertainties and propagates them to the fitted curves. It includes:
//!
//! - Covariance matrix estimation from Jacobian matrices
//! - Correlation matrices and standard errors
//! - First-order error bands for evaluated peaks
//! - Monte Carlo percentile bands as a nonlinear alternative

mod covariance;
mod monte_carlo;
mod propagation;

pub use covariance::{calculate_correlation, calculate_covariance, standard_errors_from_covariance};
pub use monte_carlo::{monte_carlo_band, MonteCarloBand};
pub use propagation::{error_band, propagate_error};
