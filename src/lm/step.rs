//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! This module provides functionality for computing the Levenberg-Marquardt step,
//! which blends the Gauss-Newton and scaled gradient descent directions.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::error::{PeakFitError, Result};
use crate::utils::matrix_convert::{nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra};

/// Result of a Levenberg-Marquardt step calculation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The calculated step vector
    pub step: Array1<f64>,

    /// The predicted reduction in cost function value
    pub predicted_reduction: f64,

    /// The damping parameter used to calculate the step
    pub lambda: f64,
}

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Calculates the Levenberg-Marquardt step.
    ///
    /// Solves `(J^T J + lambda * D) step = -J^T r` where `D` is the diagonal
    /// `scale`.
    ///
    /// # Arguments
    ///
    /// * `j_t_j` - The J^T * J matrix at the current position
    /// * `j_t_r` - The gradient J^T * r at the current position
    /// * `scale` - Positive diagonal scaling of the damping term
    /// * `lambda` - The damping parameter
    ///
    /// # Returns
    ///
    /// * The step result containing the step vector and other information
    pub fn calculate_step(
        j_t_j: &Array2<f64>,
        j_t_r: &Array1<f64>,
        scale: &Array1<f64>,
        lambda: f64,
    ) -> Result<StepResult> {
        let n = j_t_r.len();
        if j_t_j.dim() != (n, n) || scale.len() != n {
            return Err(PeakFitError::DimensionMismatch(format!(
                "step system of size {} got J^T J {:?} and scale of length {}",
                n,
                j_t_j.shape(),
                scale.len()
            )));
        }

        let mut a = ndarray_to_nalgebra(j_t_j);
        for i in 0..n {
            a[(i, i)] += lambda * scale[i];
        }
        let b = -ndarray_vec_to_nalgebra(j_t_r);

        let step = nalgebra_vec_to_ndarray(&Self::solve(a, &b)?);
        let predicted_reduction = Self::predicted_reduction(j_t_r, scale, &step, lambda);

        Ok(StepResult {
            step,
            predicted_reduction,
            lambda,
        })
    }

    /// Solves `a * x = b`, by Cholesky when `a` is positive definite and by
    /// SVD otherwise.
    fn solve(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        match a.clone().cholesky() {
            Some(cholesky) => Ok(cholesky.solve(b)),
            None => {
                let svd = a.svd(true, true);
                let largest = svd.singular_values.iter().copied().fold(0.0, f64::max);
                let eps = largest * f64::EPSILON * svd.singular_values.len() as f64;
                svd.solve(b, eps)
                    .map_err(|e| PeakFitError::LinearAlgebra(e.to_string()))
            }
        }
    }

    /// Predicted reduction of `|r|^2` under the linear model.
    ///
    /// With `(J^T J + lambda D) step = -J^T r` the reduction of
    /// `|r + J step|^2` is `-step . J^T r + lambda * step . D step`.
    fn predicted_reduction(
        j_t_r: &Array1<f64>,
        scale: &Array1<f64>,
        step: &Array1<f64>,
        lambda: f64,
    ) -> f64 {
        let model_reduction = -step.dot(j_t_r);
        let damping_term = lambda * (step * scale).dot(step);
        model_reduction + damping_term
    }
}
