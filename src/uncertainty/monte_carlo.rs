//! # Monte Carlo Error Bands
//!
//! Linear propagation through the covariance matrix can understate the
//! uncertainty of strongly nonlinear shapes. This module draws parameter sets
//! from the multivariate normal defined by a fitted peak's values and
//! covariance block, evaluates the curve for each, and reports per-point
//! percentiles matching a one-sigma interval.

use nalgebra::SymmetricEigen;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{PeakFitError, Result};
use crate::models::Peak;
use crate::utils::matrix_convert::ndarray_to_nalgebra;
use crate::utils::parallel;

/// Lower percentile of a one-sigma normal interval.
const LOWER_PERCENTILE: f64 = 15.865;
/// Upper percentile of a one-sigma normal interval.
const UPPER_PERCENTILE: f64 = 84.135;

/// Percentile band of a peak curve estimated by sampling.
#[derive(Debug, Clone)]
pub struct MonteCarloBand {
    /// Mean curve over the accepted samples
    pub mean: Array1<f64>,
    /// 15.865th percentile at each point
    pub lower: Array1<f64>,
    /// 84.135th percentile at each point
    pub upper: Array1<f64>,
    /// Samples that produced a valid curve (non-positive widths are dropped)
    pub n_used: usize,
}

/// Matrix `L` with `L L^T = covar`.
///
/// Built from the eigen-decomposition so that positive semi-definite
/// matrices (fixed parameters leave zero rows) are accepted. Small negative
/// eigenvalues from round-off are clipped to zero.
fn covariance_factor(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let eigen = SymmetricEigen::new(ndarray_to_nalgebra(covar));

    let mut factor = Array2::zeros((n, n));
    for j in 0..n {
        let scale = eigen.eigenvalues[j].max(0.0).sqrt();
        for i in 0..n {
            factor[[i, j]] = eigen.eigenvectors[(i, j)] * scale;
        }
    }
    factor
}

/// Linear-interpolated percentile of a sorted slice, `q` in `[0, 100]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = q / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Sample `n_samples` parameter sets for a fitted peak and summarise the
/// resulting curves at `x`.
///
/// Sampling draws from `rng` sequentially so results are reproducible for a
/// seeded generator; curve evaluation runs on the rayon pool when
/// `parallel` is set.
pub fn monte_carlo_band(
    peak: &Peak,
    x: &Array1<f64>,
    n_samples: usize,
    parallel: bool,
    rng: &mut impl Rng,
) -> Result<MonteCarloBand> {
    let covar = peak.covariance().ok_or_else(|| {
        PeakFitError::State("Monte Carlo band requested for a peak that has not been fit".to_string())
    })?;
    if n_samples < 2 {
        return Err(PeakFitError::Validation(format!(
            "at least 2 Monte Carlo samples are required, got {}",
            n_samples
        )));
    }

    let center = peak.values();
    let factor = covariance_factor(covar);

    let mut samples: Vec<[f64; 3]> = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let z: [f64; 3] = [
            StandardNormal.sample(rng),
            StandardNormal.sample(rng),
            StandardNormal.sample(rng),
        ];
        let mut values = center;
        for i in 0..3 {
            for (j, zj) in z.iter().enumerate() {
                values[i] += factor[[i, j]] * zj;
            }
        }
        // Width is the first entry
        if values[0] > 0.0 && values.iter().all(|v| v.is_finite()) {
            samples.push(values);
        }
    }

    if samples.len() < 2 {
        return Err(PeakFitError::Domain(format!(
            "only {} of {} Monte Carlo samples had a positive width",
            samples.len(),
            n_samples
        )));
    }

    let shape = peak.shape();
    let curves = parallel::try_map(&samples, parallel, |&[width, amplitude, position]| {
        Ok(x.mapv(|xv| shape.value(xv, width, amplitude, position)))
    })?;

    let n_used = curves.len();
    let mut mean = Array1::zeros(x.len());
    let mut lower = Array1::zeros(x.len());
    let mut upper = Array1::zeros(x.len());
    let mut column = vec![0.0; n_used];

    for i in 0..x.len() {
        for (k, curve) in curves.iter().enumerate() {
            column[k] = curve[i];
        }
        mean[i] = column.iter().sum::<f64>() / n_used as f64;
        column.sort_by(f64::total_cmp);
        lower[i] = percentile(&column, LOWER_PERCENTILE);
        upper[i] = percentile(&column, UPPER_PERCENTILE);
    }

    Ok(MonteCarloBand {
        mean,
        lower,
        upper,
        n_used,
    })
}
