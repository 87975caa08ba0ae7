//! Built-in model implementations for spectral deconvolution.
//!
//! This module provides the peak shapes fitted to a spectrum and the
//! fixed baselines subtracted from it beforehand.

mod baseline;
mod peak;

pub use baseline::{
    Baseline, CubicSplineBaseline, Extrapolation, FnBaseline, IdentityBaseline,
    PiecewiseLinearBaseline, SplineBoundary,
};
pub use peak::{gaussian, lorentzian, ParamKind, Peak, PeakShape};
