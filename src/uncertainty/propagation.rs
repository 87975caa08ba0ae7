//! First-order propagation of parameter covariance to model values.

use ndarray::{Array1, Array2};

use crate::error::{PeakFitError, Result};

/// Propagate a parameter covariance matrix through a model's gradient.
///
/// `gradient` is `n x k` (one row per evaluation point, one column per
/// parameter) and `covariance` is `k x k`. Returns the standard deviation
/// `sqrt(g_i^T C g_i)` at each point. Negative round-off variances are
/// reported as zero.
pub fn propagate_error(gradient: &Array2<f64>, covariance: &Array2<f64>) -> Result<Array1<f64>> {
    let k = gradient.ncols();
    if covariance.dim() != (k, k) {
        return Err(PeakFitError::DimensionMismatch(format!(
            "covariance matrix shape {:?} does not match {} gradient columns",
            covariance.shape(),
            k
        )));
    }

    let projected = gradient.dot(covariance);
    let sigma = (&projected * gradient)
        .sum_axis(ndarray::Axis(1))
        .mapv(|v| v.max(0.0).sqrt());

    Ok(sigma)
}

/// Build the `(upper, lower)` one-sigma band around `values`.
pub fn error_band(values: &Array1<f64>, sigma: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
    (values + sigma, values - sigma)
}
