//! # peakfit-rs
//!
//! `peakfit-rs` decomposes a 1D spectrum into a sum of Gaussian and
//! Lorentzian peaks on top of a fixed baseline, fitting all peak
//! parameters jointly with a bounded Levenberg-Marquardt solver and
//! reporting covariance-based uncertainties.
//!
//! The library provides:
//! - Peak shapes parameterized by width (Gaussian sigma or Lorentzian half
//!   width at half maximum), amplitude and position, each parameter with its
//!   own bounds and fix/free flag
//! - Baselines subtracted before fitting: identity, piecewise linear,
//!   cubic spline (not-a-knot or natural) or any closure
//! - A Levenberg-Marquardt solver with Marquardt scaling and gain-ratio
//!   damping control
//! - Standard errors, covariance and correlation of the fitted parameters,
//!   with first-order and Monte Carlo error bands for each peak
//! - Delimited-text spectrum loading and simple preprocessing
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::Array1;
//! use peakfit_rs::{Deconvolution, Peak};
//!
//! let x = Array1::linspace(0.0, 20.0, 201);
//! let truth = Peak::gaussian(2.0, 1.5, 10.0);
//! let y = truth.evaluate(&x).unwrap();
//!
//! let mut fit = Deconvolution::new(&[Peak::gaussian(3.0, 1.0, 9.0)]);
//! let summary = fit.fit(&x, &y).unwrap();
//! assert!((summary.params[2] - 10.0).abs() < 1e-6);
//! ```

pub mod deconvolution;
pub mod error;
pub mod lm;
pub mod models;
pub mod parameters;
pub mod problem;
pub mod spectrum;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use deconvolution::{Deconvolution, FitSummary};
pub use error::{PeakFitError, Result};
pub use lm::{LevenbergMarquardt, LmConfig, LmResult};
pub use models::{
    Baseline, CubicSplineBaseline, Extrapolation, FnBaseline, IdentityBaseline, ParamKind, Peak,
    PeakShape, PiecewiseLinearBaseline, SplineBoundary,
};
pub use problem::Problem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
