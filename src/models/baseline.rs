//! Baseline models subtracted from a spectrum before peaks are fitted.
//!
//! A baseline is fixed during a fit: it is evaluated once at the abscissae
//! and never adjusted by the solver. Baselines are stateless and shared
//! read-only, so they are held as `Arc<dyn Baseline>`.

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;

use crate::error::{PeakFitError, Result};

/// A fixed background curve.
pub trait Baseline: Send + Sync {
    /// Evaluate the baseline at each point of `x`.
    fn evaluate(&self, x: &Array1<f64>) -> Array1<f64>;

    /// Short human-readable name used in reports.
    fn name(&self) -> &str {
        "custom"
    }
}

/// The zero baseline. Used when no baseline is supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdentityBaseline;

impl Baseline for IdentityBaseline {
    fn evaluate(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::zeros(x.len())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Adapts any `Fn(f64) -> f64` into a baseline.
///
/// ```
/// use peakfit_rs::models::{Baseline, FnBaseline};
/// use ndarray::array;
///
/// let sloped = FnBaseline(|x: f64| 1.0 + 0.5 * x);
/// assert_eq!(sloped.evaluate(&array![0.0, 10.0]), array![1.0, 6.0]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FnBaseline<F>(pub F);

impl<F> Baseline for FnBaseline<F>
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn evaluate(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| (self.0)(v))
    }
}

/// Behaviour of an interpolating baseline outside its node range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Extrapolation {
    /// Continue the boundary segment.
    #[default]
    Linear,
    /// Hold the boundary node's value.
    Constant,
}

/// End conditions of a [`CubicSplineBaseline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SplineBoundary {
    /// Third derivative continuous at the second and second-to-last nodes.
    /// Three nodes give a parabola.
    #[default]
    NotAKnot,
    /// Zero second derivative at the end nodes.
    Natural,
}

/// Sort nodes by abscissa and check they describe a function.
fn sorted_nodes(nodes_x: &[f64], nodes_y: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    if nodes_x.len() != nodes_y.len() {
        return Err(PeakFitError::Validation(format!(
            "baseline node arrays differ in length: {} x values, {} y values",
            nodes_x.len(),
            nodes_y.len()
        )));
    }
    if nodes_x.len() < 2 {
        return Err(PeakFitError::Validation(format!(
            "a baseline needs at least 2 nodes, got {}",
            nodes_x.len()
        )));
    }
    if nodes_x.iter().chain(nodes_y.iter()).any(|v| !v.is_finite()) {
        return Err(PeakFitError::Validation(
            "baseline nodes must be finite".to_string(),
        ));
    }

    let mut pairs: Vec<(f64, f64)> = nodes_x.iter().copied().zip(nodes_y.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(PeakFitError::Validation(format!(
            "duplicate baseline node at x = {}",
            w[0].0
        )));
    }

    Ok(pairs.into_iter().unzip())
}

/// Index `i` of the segment `[xs[i], xs[i + 1]]` containing `x`, for `x`
/// inside the node range.
fn segment(xs: &[f64], x: f64) -> usize {
    let upper = xs.partition_point(|&node| node <= x);
    upper.clamp(1, xs.len() - 1) - 1
}

/// Straight lines between sorted nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseLinearBaseline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    extrapolation: Extrapolation,
}

impl PiecewiseLinearBaseline {
    /// Create a baseline through the given nodes, in any order.
    ///
    /// Outside the node range the boundary segment is extended.
    pub fn new(nodes_x: &[f64], nodes_y: &[f64]) -> Result<Self> {
        let (xs, ys) = sorted_nodes(nodes_x, nodes_y)?;
        Ok(Self {
            xs,
            ys,
            extrapolation: Extrapolation::Linear,
        })
    }

    /// Change the behaviour outside the node range.
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// The sorted nodes.
    pub fn nodes(&self) -> (&[f64], &[f64]) {
        (&self.xs, &self.ys)
    }

    fn value(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        if self.extrapolation == Extrapolation::Constant {
            if x <= self.xs[0] {
                return self.ys[0];
            }
            if x >= self.xs[last] {
                return self.ys[last];
            }
        }

        let i = segment(&self.xs, x);
        let slope = (self.ys[i + 1] - self.ys[i]) / (self.xs[i + 1] - self.xs[i]);
        self.ys[i] + slope * (x - self.xs[i])
    }
}

impl Baseline for PiecewiseLinearBaseline {
    fn evaluate(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| self.value(v))
    }

    fn name(&self) -> &str {
        "piecewise linear"
    }
}

/// Cubic spline through sorted nodes.
///
/// The end conditions default to not-a-knot; see [`SplineBoundary`].
/// Outside the node range the spline continues along its tangent at the
/// nearest end node. Two nodes give a straight line.
///
/// ```
/// use peakfit_rs::models::{Baseline, CubicSplineBaseline};
/// use ndarray::array;
///
/// // Four not-a-knot nodes are interpolated by a single cubic
/// let b = CubicSplineBaseline::new(&[0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 0.0, 1.0]).unwrap();
/// assert!((b.evaluate(&array![0.5])[0] - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSplineBaseline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    boundary: SplineBoundary,
    /// Second derivative at each node
    second: Vec<f64>,
}

impl CubicSplineBaseline {
    /// Create a not-a-knot spline through the given nodes, in any order.
    pub fn new(nodes_x: &[f64], nodes_y: &[f64]) -> Result<Self> {
        Self::with_boundary(nodes_x, nodes_y, SplineBoundary::default())
    }

    /// Create a spline with the given end conditions.
    pub fn with_boundary(nodes_x: &[f64], nodes_y: &[f64], boundary: SplineBoundary) -> Result<Self> {
        let (xs, ys) = sorted_nodes(nodes_x, nodes_y)?;
        let second = match boundary {
            SplineBoundary::NotAKnot => not_a_knot_second_derivatives(&xs, &ys)?,
            SplineBoundary::Natural => natural_second_derivatives(&xs, &ys),
        };
        Ok(Self {
            xs,
            ys,
            boundary,
            second,
        })
    }

    pub fn boundary(&self) -> SplineBoundary {
        self.boundary
    }

    /// The sorted nodes.
    pub fn nodes(&self) -> (&[f64], &[f64]) {
        (&self.xs, &self.ys)
    }

    /// First derivative of segment `i` at its left node.
    fn left_slope(&self, i: usize) -> f64 {
        let h = self.xs[i + 1] - self.xs[i];
        (self.ys[i + 1] - self.ys[i]) / h - h * (2.0 * self.second[i] + self.second[i + 1]) / 6.0
    }

    fn value(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;

        if x < self.xs[0] {
            return self.ys[0] + self.left_slope(0) * (x - self.xs[0]);
        }
        if x > self.xs[last] {
            let i = last - 1;
            let h = self.xs[last] - self.xs[i];
            let slope = self.left_slope(i) + h * (self.second[i] + self.second[last]) / 2.0;
            return self.ys[last] + slope * (x - self.xs[last]);
        }

        let i = segment(&self.xs, x);
        let h = self.xs[i + 1] - self.xs[i];
        let t = x - self.xs[i];
        self.ys[i]
            + self.left_slope(i) * t
            + self.second[i] / 2.0 * t * t
            + (self.second[i + 1] - self.second[i]) / (6.0 * h) * t * t * t
    }
}

impl Baseline for CubicSplineBaseline {
    fn evaluate(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| self.value(v))
    }

    fn name(&self) -> &str {
        "cubic spline"
    }
}

/// Second derivatives of the not-a-knot spline.
///
/// The end rows equate the third derivatives of the two outermost segments
/// on each side, which breaks the tridiagonal structure, so the system is
/// solved densely. Node counts are small.
fn not_a_knot_second_derivatives(xs: &[f64], ys: &[f64]) -> Result<Vec<f64>> {
    let n = xs.len();
    if n < 3 {
        return Ok(vec![0.0; n]);
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let slope: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    if n == 3 {
        let curvature = 2.0 * (slope[1] - slope[0]) / (h[0] + h[1]);
        return Ok(vec![curvature; 3]);
    }

    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);

    a[(0, 0)] = h[1];
    a[(0, 1)] = -(h[0] + h[1]);
    a[(0, 2)] = h[0];
    for i in 1..n - 1 {
        a[(i, i - 1)] = h[i - 1];
        a[(i, i)] = 2.0 * (h[i - 1] + h[i]);
        a[(i, i + 1)] = h[i];
        b[i] = 6.0 * (slope[i] - slope[i - 1]);
    }
    a[(n - 1, n - 3)] = h[n - 2];
    a[(n - 1, n - 2)] = -(h[n - 3] + h[n - 2]);
    a[(n - 1, n - 1)] = h[n - 3];

    let second = a.lu().solve(&b).ok_or_else(|| {
        PeakFitError::LinearAlgebra("not-a-knot spline system is singular".to_string())
    })?;
    Ok(second.iter().copied().collect())
}

/// Second derivatives of the natural spline, by the Thomas algorithm on the
/// tridiagonal continuity system.
fn natural_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut second = vec![0.0; n];
    if n < 3 {
        return second;
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m = n - 2;
    let mut diag = vec![0.0; m];
    let mut upper = vec![0.0; m];
    let mut rhs = vec![0.0; m];

    for k in 0..m {
        let i = k + 1;
        diag[k] = 2.0 * (h[i - 1] + h[i]);
        upper[k] = h[i];
        rhs[k] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
    }

    // Forward sweep; the sub-diagonal entry of row k is h[k]
    for k in 1..m {
        let factor = h[k] / diag[k - 1];
        diag[k] -= factor * upper[k - 1];
        rhs[k] -= factor * rhs[k - 1];
    }

    second[m] = rhs[m - 1] / diag[m - 1];
    for k in (0..m - 1).rev() {
        second[k + 1] = (rhs[k] - upper[k] * second[k + 2]) / diag[k];
    }

    second
}
