//! Peak models for fitting data.
//!
//! A [`Peak`] is a single Gaussian or Lorentzian bump described by `width`,
//! `amplitude` and `position`. Both shapes are height normalised, so the
//! value at `position` equals `amplitude`:
//!
//! - Gaussian: `amplitude * exp(-(x - position)^2 / (2 * width^2))`
//! - Lorentzian: `amplitude * width^2 / ((x - position)^2 + width^2)`
//!
//! Each parameter carries its own box constraint and vary flag, consulted
//! only when a [`Deconvolution`](crate::deconvolution::Deconvolution) fits it.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};
use crate::parameters::{Bounds, Parameter};
use crate::uncertainty;

/// FWHM of a Gaussian in units of its width: `2 * sqrt(2 * ln(2))`.
const GAUSSIAN_FWHM_FACTOR: f64 = 2.354_820_045_030_949_3;

/// Evaluate a Gaussian peak at a single abscissa.
pub fn gaussian(x: f64, width: f64, amplitude: f64, position: f64) -> f64 {
    let u = (x - position) / width;
    amplitude * (-0.5 * u * u).exp()
}

/// Evaluate a Lorentzian peak at a single abscissa.
pub fn lorentzian(x: f64, width: f64, amplitude: f64, position: f64) -> f64 {
    let d = x - position;
    let w2 = width * width;
    amplitude * (w2 / (d * d + w2))
}

/// The functional family of a peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakShape {
    Gaussian,
    Lorentzian,
}

impl PeakShape {
    /// Shape value at `x`. The caller guarantees `width > 0`.
    pub fn value(self, x: f64, width: f64, amplitude: f64, position: f64) -> f64 {
        match self {
            PeakShape::Gaussian => gaussian(x, width, amplitude, position),
            PeakShape::Lorentzian => lorentzian(x, width, amplitude, position),
        }
    }

    /// Partial derivatives at `x` ordered as `[width, amplitude, position]`.
    pub fn gradient(self, x: f64, width: f64, amplitude: f64, position: f64) -> [f64; 3] {
        match self {
            PeakShape::Gaussian => {
                let u = (x - position) / width;
                let e = (-0.5 * u * u).exp();
                [amplitude * e * u * u / width, e, amplitude * e * u / width]
            }
            PeakShape::Lorentzian => {
                let d = x - position;
                let w2 = width * width;
                let denom = d * d + w2;
                let denom2 = denom * denom;
                [
                    2.0 * amplitude * width * d * d / denom2,
                    w2 / denom,
                    2.0 * amplitude * w2 * d / denom2,
                ]
            }
        }
    }

    /// Full width at half maximum for a given width parameter.
    pub fn fwhm(self, width: f64) -> f64 {
        match self {
            PeakShape::Gaussian => GAUSSIAN_FWHM_FACTOR * width,
            PeakShape::Lorentzian => 2.0 * width,
        }
    }

    /// Integrated area for the given width and amplitude.
    pub fn area(self, width: f64, amplitude: f64) -> f64 {
        match self {
            PeakShape::Gaussian => amplitude * width * (2.0 * PI).sqrt(),
            PeakShape::Lorentzian => PI * amplitude * width,
        }
    }
}

impl fmt::Display for PeakShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakShape::Gaussian => write!(f, "gaussian"),
            PeakShape::Lorentzian => write!(f, "lorentzian"),
        }
    }
}

impl FromStr for PeakShape {
    type Err = PeakFitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Ok(PeakShape::Gaussian),
            "lorentzian" => Ok(PeakShape::Lorentzian),
            other => Err(PeakFitError::Validation(format!(
                "peak shape must be 'gaussian' or 'lorentzian', got '{}'",
                other
            ))),
        }
    }
}

/// Identifies one of the three parameters of a peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Width,
    Amplitude,
    Position,
}

impl ParamKind {
    /// All kinds in flattening order.
    pub const ALL: [ParamKind; 3] = [ParamKind::Width, ParamKind::Amplitude, ParamKind::Position];

    /// Column of this parameter in [`Peak::partial_derivatives`].
    pub fn index(self) -> usize {
        match self {
            ParamKind::Width => 0,
            ParamKind::Amplitude => 1,
            ParamKind::Position => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Width => "width",
            ParamKind::Amplitude => "amplitude",
            ParamKind::Position => "position",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single peak with its parameters and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    shape: PeakShape,
    width: Parameter,
    amplitude: Parameter,
    position: Parameter,

    /// 3x3 covariance block `[width, amplitude, position]` from the last fit.
    #[serde(skip)]
    covariance: Option<Array2<f64>>,
}

impl Peak {
    /// Create an unconstrained peak from initial guesses.
    ///
    /// # Examples
    ///
    /// ```
    /// use peakfit_rs::models::{Peak, PeakShape};
    /// use ndarray::array;
    ///
    /// let peak = Peak::new(PeakShape::Gaussian, 2.0, 5.0, 10.0);
    /// let y = peak.evaluate(&array![10.0]).unwrap();
    /// assert_eq!(y[0], 5.0);
    /// ```
    pub fn new(shape: PeakShape, width: f64, amplitude: f64, position: f64) -> Self {
        Self {
            shape,
            width: Parameter::new("width", width),
            amplitude: Parameter::new("amplitude", amplitude),
            position: Parameter::new("position", position),
            covariance: None,
        }
    }

    pub fn gaussian(width: f64, amplitude: f64, position: f64) -> Self {
        Self::new(PeakShape::Gaussian, width, amplitude, position)
    }

    pub fn lorentzian(width: f64, amplitude: f64, position: f64) -> Self {
        Self::new(PeakShape::Lorentzian, width, amplitude, position)
    }

    /// Builder form of [`Peak::set_width_bounds`].
    pub fn with_width_bounds(mut self, lower: f64, upper: f64) -> Result<Self> {
        self.set_width_bounds(lower, upper)?;
        Ok(self)
    }

    /// Builder form of [`Peak::set_amplitude_bounds`].
    pub fn with_amplitude_bounds(mut self, lower: f64, upper: f64) -> Result<Self> {
        self.set_amplitude_bounds(lower, upper)?;
        Ok(self)
    }

    /// Builder form of [`Peak::set_position_bounds`].
    pub fn with_position_bounds(mut self, lower: f64, upper: f64) -> Result<Self> {
        self.set_position_bounds(lower, upper)?;
        Ok(self)
    }

    /// Builder form of [`Peak::set_vary`].
    pub fn with_fixed(mut self, kind: ParamKind) -> Self {
        self.set_vary(kind, false);
        self
    }

    pub fn shape(&self) -> PeakShape {
        self.shape
    }

    /// Switch the functional family. Width, amplitude and position are kept.
    ///
    /// Like the value setters this discards uncertainties from a previous
    /// fit, since they no longer describe the curve.
    pub fn set_shape(&mut self, shape: PeakShape) {
        self.clear_fit();
        self.shape = shape;
    }

    pub fn width(&self) -> f64 {
        self.width.value()
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude.value()
    }

    pub fn position(&self) -> f64 {
        self.position.value()
    }

    pub fn set_width(&mut self, width: f64) {
        self.clear_fit();
        self.width.set_value(width);
    }

    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.clear_fit();
        self.amplitude.set_value(amplitude);
    }

    pub fn set_position(&mut self, position: f64) {
        self.clear_fit();
        self.position.set_value(position);
    }

    /// Access a parameter by kind.
    pub fn param(&self, kind: ParamKind) -> &Parameter {
        match kind {
            ParamKind::Width => &self.width,
            ParamKind::Amplitude => &self.amplitude,
            ParamKind::Position => &self.position,
        }
    }

    /// Mutable access to a parameter by kind.
    ///
    /// Discards uncertainties from a previous fit.
    pub fn param_mut(&mut self, kind: ParamKind) -> &mut Parameter {
        self.clear_fit();
        self.entry(kind)
    }

    fn entry(&mut self, kind: ParamKind) -> &mut Parameter {
        match kind {
            ParamKind::Width => &mut self.width,
            ParamKind::Amplitude => &mut self.amplitude,
            ParamKind::Position => &mut self.position,
        }
    }

    /// Current `[width, amplitude, position]`.
    pub fn values(&self) -> [f64; 3] {
        [self.width(), self.amplitude(), self.position()]
    }

    pub(crate) fn set_values(&mut self, values: [f64; 3]) {
        for kind in ParamKind::ALL {
            self.entry(kind).set_value(values[kind.index()]);
        }
    }

    pub fn bounds(&self, kind: ParamKind) -> Bounds {
        self.param(kind).bounds()
    }

    /// Set the constraint interval of a parameter.
    ///
    /// The current value is not checked or clamped; the next fit starts from
    /// the nearest feasible point.
    pub fn set_bounds(&mut self, kind: ParamKind, lower: f64, upper: f64) -> Result<()> {
        self.entry(kind).set_bounds(lower, upper)?;
        Ok(())
    }

    pub fn width_bounds(&self) -> (f64, f64) {
        self.bounds(ParamKind::Width).as_tuple()
    }

    pub fn amplitude_bounds(&self) -> (f64, f64) {
        self.bounds(ParamKind::Amplitude).as_tuple()
    }

    pub fn position_bounds(&self) -> (f64, f64) {
        self.bounds(ParamKind::Position).as_tuple()
    }

    pub fn set_width_bounds(&mut self, lower: f64, upper: f64) -> Result<()> {
        self.set_bounds(ParamKind::Width, lower, upper)
    }

    pub fn set_amplitude_bounds(&mut self, lower: f64, upper: f64) -> Result<()> {
        self.set_bounds(ParamKind::Amplitude, lower, upper)
    }

    pub fn set_position_bounds(&mut self, lower: f64, upper: f64) -> Result<()> {
        self.set_bounds(ParamKind::Position, lower, upper)
    }

    pub fn vary(&self, kind: ParamKind) -> bool {
        self.param(kind).vary()
    }

    /// Fix (`false`) or free (`true`) one parameter for subsequent fits.
    pub fn set_vary(&mut self, kind: ParamKind, vary: bool) {
        self.entry(kind).set_vary(vary);
    }

    /// Fails with a domain error unless the width is a finite positive number.
    pub fn check_domain(&self) -> Result<()> {
        let width = self.width();
        if !(width.is_finite() && width > 0.0) {
            return Err(PeakFitError::Domain(format!(
                "{} peak at {} has non-positive width {}",
                self.shape,
                self.position(),
                width
            )));
        }
        Ok(())
    }

    /// Evaluate the peak at each point of `x`.
    pub fn evaluate(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_domain()?;
        let [width, amplitude, position] = self.values();
        Ok(x.mapv(|xv| self.shape.value(xv, width, amplitude, position)))
    }

    /// Analytic Jacobian of the shape: an `n x 3` matrix with columns
    /// `[d/d width, d/d amplitude, d/d position]`.
    pub fn partial_derivatives(&self, x: &Array1<f64>) -> Result<Array2<f64>> {
        self.check_domain()?;
        let [width, amplitude, position] = self.values();

        let mut jac = Array2::zeros((x.len(), 3));
        for (i, &xv) in x.iter().enumerate() {
            let g = self.shape.gradient(xv, width, amplitude, position);
            for (j, value) in g.into_iter().enumerate() {
                jac[[i, j]] = value;
            }
        }

        Ok(jac)
    }

    /// Full width at half maximum.
    pub fn fwhm(&self) -> f64 {
        self.shape.fwhm(self.width())
    }

    /// Integrated area under the peak.
    pub fn area(&self) -> f64 {
        self.shape.area(self.width(), self.amplitude())
    }

    /// Standard error of a parameter from the last successful fit.
    ///
    /// Fixed parameters report `None`.
    pub fn stderr(&self, kind: ParamKind) -> Option<f64> {
        self.param(kind).stderr()
    }

    /// The covariance block of this peak from the last successful fit.
    pub fn covariance(&self) -> Option<&Array2<f64>> {
        self.covariance.as_ref()
    }

    /// Whether a fit has written uncertainties into this peak.
    pub fn is_fit(&self) -> bool {
        self.covariance.is_some()
    }

    pub(crate) fn set_fit_uncertainty(&mut self, covariance: Array2<f64>, stderr: [Option<f64>; 3]) {
        for kind in ParamKind::ALL {
            self.entry(kind).set_stderr(stderr[kind.index()]);
        }
        self.covariance = Some(covariance);
    }

    fn clear_fit(&mut self) {
        if self.covariance.take().is_some() {
            for kind in ParamKind::ALL {
                self.entry(kind).set_stderr(None);
            }
        }
    }

    /// Upper and lower 1-sigma bounds of the evaluated curve.
    ///
    /// Available until the shape or a parameter value is changed. The band is the first-order propagation of the fitted covariance
    /// block through the shape's own Jacobian:
    /// `sigma(x)^2 = g(x)^T C g(x)`. Returns `(upper, lower)`.
    pub fn fit_error(&self, x: &Array1<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let covariance = self.covariance.as_ref().ok_or_else(|| {
            PeakFitError::State("fit error requested for a peak that has not been fit".to_string())
        })?;

        let values = self.evaluate(x)?;
        let jac = self.partial_derivatives(x)?;
        let sigma = uncertainty::propagate_error(&jac, covariance)?;

        Ok(uncertainty::error_band(&values, &sigma))
    }
}
