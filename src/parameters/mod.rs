//! # Parameter System
//!
//! Peak parameters with box constraints and fix/free flags.
//!
//! - [`Parameter`]: a value, its [`Bounds`], a vary flag and the standard
//!   error from the last fit
//! - [`BoundsTransform`]: maps bounded external values to the unbounded
//!   internal coordinates used by the solver
//!
//! ```rust
//! use peakfit_rs::parameters::Parameter;
//!
//! let mut width = Parameter::with_bounds("width", 3.0, 0.5, 10.0).unwrap();
//! width.set_vary(false);
//! assert!(!width.is_free());
//! ```

pub mod bounds;
pub mod parameter;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use parameter::Parameter;
