//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating and manipulating covariance
//! matrices from Jacobian matrices in nonlinear least-squares optimization.

use ndarray::{Array1, Array2};

use crate::error::{PeakFitError, Result};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = redchi * inv(J^T * J)
/// where:
///   - J is the Jacobian matrix of the residuals at the solution
///   - redchi is the reduced chi-square (chi^2 / dof)
///
/// `J^T J` is inverted through its Cholesky factor. When it is singular
/// (a parameter with no influence on the residuals) the SVD pseudo-inverse
/// is used instead, which reports zero variance along the null space.
pub fn calculate_covariance(jacobian: &Array2<f64>, redchi: f64) -> Result<Array2<f64>> {
    if jacobian.ncols() == 0 {
        return Err(PeakFitError::DimensionMismatch(
            "cannot compute a covariance matrix for zero parameters".to_string(),
        ));
    }

    let jtj = ndarray_to_nalgebra(&jacobian.t().dot(jacobian));

    let inverse = match jtj.clone().cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => {
            let svd = jtj.svd(true, true);
            let largest = svd.singular_values.iter().copied().fold(0.0, f64::max);
            let cutoff = largest * f64::EPSILON * svd.singular_values.len() as f64;
            svd.pseudo_inverse(cutoff)
                .map_err(|e| PeakFitError::LinearAlgebra(e.to_string()))?
        }
    };

    let mut covar = nalgebra_to_ndarray(&inverse) * redchi;

    // Symmetrize to remove round-off asymmetry
    let n = covar.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let mean = 0.5 * (covar[[i, j]] + covar[[j, i]]);
            covar[[i, j]] = mean;
            covar[[j, i]] = mean;
        }
    }

    Ok(covar)
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                if denom > 0.0 {
                    correl[[i, j]] = covar[[i, j]] / denom;
                }
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements
/// of the covariance matrix; negative round-off is reported as zero.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}
