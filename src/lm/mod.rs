//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides an unconstrained Levenberg-Marquardt solver for
//! nonlinear least-squares problems. Bounds are handled one level up by
//! mapping parameters into an unbounded internal space before the solver
//! sees them.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod step;
pub mod trust_region;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
pub use step::{LmStep, StepResult};
pub use trust_region::TrustRegion;
