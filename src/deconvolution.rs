//! # Spectral Deconvolution
//!
//! [`Deconvolution`] owns a set of peaks and a fixed baseline and fits the
//! peaks to a spectrum by bounded Levenberg-Marquardt least squares.
//!
//! Bounds are enforced through [`BoundsTransform`]: the solver iterates on
//! unbounded internal coordinates and every evaluation maps them back into
//! the feasible box, so no iterate can leave it. The analytic peak Jacobian
//! is chained through the transform derivative.
//!
//! After a successful fit the covariance of the varying parameters is
//! estimated from the external-space Jacobian at the solution,
//! `cov = redchi * (J^T J)^-1`, and each peak receives its 3x3 block.
//!
//! # Examples
//!
//! ```
//! use peakfit_rs::{Deconvolution, Peak};
//! use ndarray::Array1;
//!
//! let truth = Peak::gaussian(3.0, 2.0, 50.0);
//! let x = Array1::linspace(0.0, 100.0, 201);
//! let y = truth.evaluate(&x).unwrap();
//!
//! let guess = Peak::gaussian(5.0, 1.0, 45.0).with_width_bounds(0.0, 20.0).unwrap();
//! let mut deconvolution = Deconvolution::new(&[guess]);
//! deconvolution.fit(&x, &y).unwrap();
//!
//! let fitted = &deconvolution.peaks()[0];
//! assert!((fitted.position() - 50.0).abs() < 1e-6);
//! assert!((fitted.width() - 3.0).abs() < 1e-6);
//! ```

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::Serialize;

use crate::error::{PeakFitError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::models::{Baseline, IdentityBaseline, ParamKind, Peak, PeakShape};
use crate::parameters::BoundsTransform;
use crate::problem::Problem;
use crate::uncertainty::{self, MonteCarloBand};
use crate::utils::parallel;

/// Outcome of the last successful fit.
///
/// Vectors are indexed like the varying parameters, which are flattened in
/// peak order as `width, amplitude, position` with fixed ones skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSummary {
    /// Parameter labels such as `p0.width`
    pub labels: Vec<String>,
    /// Starting values after clamping into the bounds
    pub initial_params: Vec<f64>,
    /// Fitted values
    pub params: Vec<f64>,
    /// Standard errors of the fitted values
    pub stderr: Vec<f64>,
    /// Covariance matrix of the varying parameters
    pub covariance: Array2<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// `rss / max(ndata - nvarys, 1)`
    pub redchi: f64,
    /// Number of data points
    pub ndata: usize,
    /// Number of varying parameters
    pub nvarys: usize,
    /// Solver iterations
    pub iterations: usize,
    /// Residual evaluations
    pub func_evals: usize,
    /// Solver termination message
    pub message: String,
}

impl FitSummary {
    /// Correlation matrix derived from the covariance.
    pub fn correlation(&self) -> Array2<f64> {
        uncertainty::calculate_correlation(&self.covariance)
    }

    /// Index of a label such as `"p1.position"`.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

/// A varying parameter as seen by the solver.
#[derive(Debug, Clone, Copy)]
struct Slot {
    peak: usize,
    kind: ParamKind,
    transform: BoundsTransform,
}

/// Least-squares problem `sum_i peak_i(x) - (y - baseline(x))` over the
/// internal coordinates of the varying parameters.
struct DeconvolutionProblem<'a> {
    x: &'a Array1<f64>,
    target: Array1<f64>,
    shapes: Vec<PeakShape>,
    /// Values used for parameters that do not vary
    template: Vec<[f64; 3]>,
    slots: Vec<Slot>,
    parallel: bool,
}

impl<'a> DeconvolutionProblem<'a> {
    /// Per-peak `[width, amplitude, position]` for internal coordinates.
    fn peak_values(&self, internal: &Array1<f64>) -> Vec<[f64; 3]> {
        let mut values = self.template.clone();
        for (slot, &u) in self.slots.iter().zip(internal.iter()) {
            values[slot.peak][slot.kind.index()] = slot.transform.to_external(u);
        }
        values
    }

    fn check_widths(&self, values: &[[f64; 3]]) -> Result<()> {
        for (i, v) in values.iter().enumerate() {
            if !(v[0].is_finite() && v[0] > 0.0) {
                return Err(PeakFitError::Domain(format!(
                    "peak {} has non-positive width {}",
                    i, v[0]
                )));
            }
        }
        Ok(())
    }

    fn model(&self, values: &[[f64; 3]]) -> Result<Array1<f64>> {
        self.check_widths(values)?;
        let mut y = Array1::zeros(self.x.len());
        for (shape, &[width, amplitude, position]) in self.shapes.iter().zip(values.iter()) {
            y.zip_mut_with(self.x, |acc, &xv| *acc += shape.value(xv, width, amplitude, position));
        }
        Ok(y)
    }

    /// Analytic `n x 3` shape Jacobian of every peak.
    fn peak_blocks(&self, values: &[[f64; 3]]) -> Result<Vec<Array2<f64>>> {
        self.check_widths(values)?;
        let indices: Vec<usize> = (0..values.len()).collect();
        parallel::try_map(&indices, self.parallel, |&i| {
            let [width, amplitude, position] = values[i];
            let shape = self.shapes[i];
            let mut block = Array2::zeros((self.x.len(), 3));
            for (row, &xv) in self.x.iter().enumerate() {
                let g = shape.gradient(xv, width, amplitude, position);
                for (col, value) in g.into_iter().enumerate() {
                    block[[row, col]] = value;
                }
            }
            Ok(block)
        })
    }

    /// Jacobian with respect to the external values of the varying
    /// parameters, optionally chained into internal coordinates.
    fn slot_jacobian(&self, values: &[[f64; 3]], chain: Option<&Array1<f64>>) -> Result<Array2<f64>> {
        let blocks = self.peak_blocks(values)?;
        let mut jac = Array2::zeros((self.x.len(), self.slots.len()));
        for (j, slot) in self.slots.iter().enumerate() {
            let factor = chain.map_or(1.0, |internal| slot.transform.derivative(internal[j]));
            let column = blocks[slot.peak].column(slot.kind.index());
            jac.column_mut(j).assign(&(&column * factor));
        }
        Ok(jac)
    }
}

impl<'a> Problem for DeconvolutionProblem<'a> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let values = self.peak_values(params);
        Ok(self.model(&values)? - &self.target)
    }

    fn parameter_count(&self) -> usize {
        self.slots.len()
    }

    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let values = self.peak_values(params);
        self.slot_jacobian(&values, Some(params))
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

/// Peaks fitted against a spectrum on top of a fixed baseline.
#[derive(Clone)]
pub struct Deconvolution {
    peaks: Vec<Peak>,
    baseline: Arc<dyn Baseline>,
    config: LmConfig,
    summary: Option<FitSummary>,
}

impl fmt::Debug for Deconvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deconvolution")
            .field("peaks", &self.peaks)
            .field("baseline", &self.baseline.name())
            .field("config", &self.config)
            .field("summary", &self.summary)
            .finish()
    }
}

impl Deconvolution {
    /// Create a deconvolution from initial peak guesses.
    ///
    /// The peaks are copied; later changes to the caller's peaks do not
    /// affect this object and fits never touch the caller's peaks.
    pub fn new(peaks: &[Peak]) -> Self {
        Self {
            peaks: peaks.to_vec(),
            baseline: Arc::new(IdentityBaseline),
            config: LmConfig::default(),
            summary: None,
        }
    }

    /// Use a fixed baseline instead of the zero baseline.
    pub fn with_baseline(mut self, baseline: Arc<dyn Baseline>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Use a solver configuration other than the default.
    pub fn with_config(mut self, config: LmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn peak(&self, index: usize) -> Option<&Peak> {
        self.peaks.get(index)
    }

    /// Mutable access to an owned peak, e.g. to refine its guess or bounds
    /// before the next fit. Changing a fitted peak's shape or values drops
    /// its uncertainties, so [`Deconvolution::fit_error`] fails until the
    /// next fit.
    pub fn peak_mut(&mut self, index: usize) -> Option<&mut Peak> {
        self.peaks.get_mut(index)
    }

    pub fn baseline(&self) -> &Arc<dyn Baseline> {
        &self.baseline
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// The last successful fit, if any.
    pub fn summary(&self) -> Option<&FitSummary> {
        self.summary.as_ref()
    }

    /// Covariance of the varying parameters from the last successful fit.
    pub fn covariance(&self) -> Option<&Array2<f64>> {
        self.summary.as_ref().map(|s| &s.covariance)
    }

    pub fn is_fit(&self) -> bool {
        self.summary.is_some()
    }

    fn validate(&self, x: &Array1<f64>, y: &Array1<f64>) -> Result<()> {
        self.config.validate()?;

        if x.len() != y.len() {
            return Err(PeakFitError::Validation(format!(
                "x and y differ in length: {} vs {}",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(PeakFitError::Validation("spectrum is empty".to_string()));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(PeakFitError::Validation(
                "spectrum contains non-finite values".to_string(),
            ));
        }
        if self.peaks.is_empty() {
            return Err(PeakFitError::Validation("no peaks to fit".to_string()));
        }
        for (i, peak) in self.peaks.iter().enumerate() {
            if !(peak.width().is_finite() && peak.width() > 0.0) {
                return Err(PeakFitError::Validation(format!(
                    "peak {} has non-positive width {}",
                    i,
                    peak.width()
                )));
            }
            for kind in ParamKind::ALL {
                if !peak.param(kind).value().is_finite() {
                    return Err(PeakFitError::Validation(format!(
                        "peak {} has a non-finite {}",
                        i, kind
                    )));
                }
            }
        }
        Ok(())
    }

    /// Varying parameters, their labels and clamped start values, and the
    /// per-peak template used for everything else.
    fn flatten(&self) -> Result<(Vec<Slot>, Vec<String>, Vec<f64>, Vec<[f64; 3]>)> {
        let mut slots = Vec::new();
        let mut labels = Vec::new();
        let mut initial = Vec::new();
        let mut template = Vec::with_capacity(self.peaks.len());

        for (i, peak) in self.peaks.iter().enumerate() {
            let mut values = peak.values();
            for kind in ParamKind::ALL {
                let param = peak.param(kind);
                let bounds = param.bounds();
                if !param.vary() {
                    continue;
                }

                let clamped = bounds.clamp(param.value());
                if clamped != param.value() {
                    warn!(
                        "p{}.{} = {} lies outside [{}, {}]; starting from {}",
                        i,
                        kind,
                        param.value(),
                        bounds.min,
                        bounds.max,
                        clamped
                    );
                }
                values[kind.index()] = clamped;

                if param.is_free() {
                    slots.push(Slot {
                        peak: i,
                        kind,
                        transform: BoundsTransform::new(bounds),
                    });
                    labels.push(format!("p{}.{}", i, kind));
                    initial.push(clamped);
                }
            }

            if !(values[0] > 0.0) {
                return Err(PeakFitError::Validation(format!(
                    "width bounds of peak {} admit no positive width",
                    i
                )));
            }
            template.push(values);
        }

        Ok((slots, labels, initial, template))
    }

    /// Fit the peaks to `(x, y)`.
    ///
    /// The current peak values are the initial guess, so repeated calls
    /// refine from the previous solution. On success the solution and its
    /// uncertainties are written into the owned peaks. On any error the
    /// peaks and the previous summary are left untouched.
    pub fn fit(&mut self, x: &Array1<f64>, y: &Array1<f64>) -> Result<&FitSummary> {
        self.validate(x, y)?;

        let baseline = self.baseline.evaluate(x);
        if baseline.len() != x.len() || baseline.iter().any(|v| !v.is_finite()) {
            return Err(PeakFitError::Validation(format!(
                "baseline '{}' did not produce {} finite values",
                self.baseline.name(),
                x.len()
            )));
        }

        let (slots, labels, initial, template) = self.flatten()?;
        let ndata = x.len();
        let nvarys = slots.len();
        if nvarys == 0 {
            return Err(PeakFitError::Validation(
                "every peak parameter is fixed".to_string(),
            ));
        }
        if ndata < nvarys {
            return Err(PeakFitError::Validation(format!(
                "{} data points cannot determine {} parameters",
                ndata, nvarys
            )));
        }

        let start = slots
            .iter()
            .zip(initial.iter())
            .map(|(slot, &value)| slot.transform.to_internal_interior(value))
            .collect::<std::result::Result<Array1<f64>, _>>()?;

        let problem = DeconvolutionProblem {
            x,
            target: y - &baseline,
            shapes: self.peaks.iter().map(Peak::shape).collect(),
            template,
            slots,
            parallel: self.config.parallel_jacobian,
        };

        let result = LevenbergMarquardt::with_config(self.config.clone()).minimize(&problem, start)?;
        if !result.success {
            warn!(
                "fit did not converge after {} iterations: {}",
                result.iterations, result.message
            );
            return Err(PeakFitError::Convergence {
                message: result.message,
                cost: result.cost,
                iterations: result.iterations,
            });
        }

        let values = problem.peak_values(&result.params);
        let jacobian = problem.slot_jacobian(&values, None)?;
        let rss = result.cost;
        let redchi = rss / ndata.saturating_sub(nvarys).max(1) as f64;
        let covariance = uncertainty::calculate_covariance(&jacobian, redchi)?;
        let stderr = uncertainty::standard_errors_from_covariance(&covariance);

        // Commit
        for (i, peak) in self.peaks.iter_mut().enumerate() {
            peak.set_values(values[i]);

            let mut block = Array2::zeros((3, 3));
            let mut errors = [None; 3];
            for (a, slot_a) in problem.slots.iter().enumerate().filter(|(_, s)| s.peak == i) {
                errors[slot_a.kind.index()] = Some(stderr[a]);
                for (b, slot_b) in problem.slots.iter().enumerate().filter(|(_, s)| s.peak == i) {
                    block[[slot_a.kind.index(), slot_b.kind.index()]] = covariance[[a, b]];
                }
            }
            peak.set_fit_uncertainty(block, errors);
        }

        let params = problem
            .slots
            .iter()
            .map(|slot| values[slot.peak][slot.kind.index()])
            .collect();

        info!(
            "fit converged after {} iterations ({} evaluations): rss = {:.6e}, redchi = {:.6e}",
            result.iterations, result.func_evals, rss, redchi
        );

        let summary = FitSummary {
            labels,
            initial_params: initial,
            params,
            stderr: stderr.to_vec(),
            covariance,
            rss,
            redchi,
            ndata,
            nvarys,
            iterations: result.iterations,
            func_evals: result.func_evals,
            message: result.message,
        };
        Ok(&*self.summary.insert(summary))
    }

    /// Sum of the peaks at `x`, without the baseline.
    pub fn evaluate_peaks(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let mut y = Array1::zeros(x.len());
        for peak in &self.peaks {
            y += &peak.evaluate(x)?;
        }
        Ok(y)
    }

    /// The full model at `x`: the sum of the peaks plus the baseline.
    pub fn evaluate(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(self.evaluate_peaks(x)? + self.baseline.evaluate(x))
    }

    /// `y - evaluate(x)`.
    pub fn residuals(&self, x: &Array1<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
        if x.len() != y.len() {
            return Err(PeakFitError::Validation(format!(
                "x and y differ in length: {} vs {}",
                x.len(),
                y.len()
            )));
        }
        Ok(y - &self.evaluate(x)?)
    }

    fn fitted_peak(&self, index: usize) -> Result<&Peak> {
        self.peaks.get(index).ok_or_else(|| {
            PeakFitError::Validation(format!(
                "peak index {} out of range for {} peaks",
                index,
                self.peaks.len()
            ))
        })
    }

    /// First-order `(upper, lower)` 1-sigma band of peak `index` at `x`.
    pub fn fit_error(&self, index: usize, x: &Array1<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        self.fitted_peak(index)?.fit_error(x)
    }

    /// Monte Carlo 1-sigma band of peak `index` at `x`.
    ///
    /// Parameter sets are drawn from the peak's covariance block with `rng`;
    /// the band is reproducible for a seeded generator.
    pub fn monte_carlo_fit_error(
        &self,
        index: usize,
        x: &Array1<f64>,
        n_samples: usize,
        rng: &mut impl Rng,
    ) -> Result<MonteCarloBand> {
        let peak = self.fitted_peak(index)?;
        uncertainty::monte_carlo_band(peak, x, n_samples, true, rng)
    }

    /// The parameter table with standard errors after a fit.
    pub fn report_with_errors(&self) -> String {
        let mut out = String::new();
        write_table(&mut out, &self.peaks, true);
        if let Some(summary) = &self.summary {
            out.push_str(&format!(
                "\nrss = {:.6e}, redchi = {:.6e}, {} data points, {} varying parameters, {} iterations\n",
                summary.rss, summary.redchi, summary.ndata, summary.nvarys, summary.iterations
            ));
        }
        out
    }

    /// Peaks, baseline name, solver configuration and last fit as JSON.
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Snapshot<'a> {
            baseline: &'a str,
            peaks: &'a [Peak],
            config: &'a LmConfig,
            summary: Option<&'a FitSummary>,
        }

        let snapshot = Snapshot {
            baseline: self.baseline.name(),
            peaks: &self.peaks,
            config: &self.config,
            summary: self.summary.as_ref(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }
}

fn format_value(value: f64, stderr: Option<f64>, with_errors: bool) -> String {
    match stderr {
        Some(err) if with_errors => format!("{:.6} +/- {:.6}", value, err),
        _ => format!("{:.6}", value),
    }
}

fn write_table(out: &mut String, peaks: &[Peak], with_errors: bool) {
    let rows: Vec<[String; 4]> = peaks
        .iter()
        .map(|peak| {
            let cell = |kind: ParamKind| {
                format_value(peak.param(kind).value(), peak.stderr(kind), with_errors)
            };
            [
                peak.shape().to_string(),
                cell(ParamKind::Width),
                cell(ParamKind::Amplitude),
                cell(ParamKind::Position),
            ]
        })
        .collect();

    let headers = ["Peak Type", "Width", "Amplitude", "Position"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }

    out.push_str(&table_line(headers, &widths));
    let rule = widths.map(|w| "-".repeat(w));
    out.push_str(&table_line(
        [rule[0].as_str(), rule[1].as_str(), rule[2].as_str(), rule[3].as_str()],
        &widths,
    ));
    for row in &rows {
        out.push_str(&table_line(
            [row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()],
            &widths,
        ));
    }
}

fn table_line(cells: [&str; 4], widths: &[usize; 4]) -> String {
    format!(
        "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}\n",
        cells[0],
        cells[1],
        cells[2],
        cells[3],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3]
    )
}

impl fmt::Display for Deconvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_table(&mut out, &self.peaks, false);
        f.write_str(&out)
    }
}
