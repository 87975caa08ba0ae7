//! Finite difference methods for numerical differentiation.
//!
//! Used as the default Jacobian of a [`Problem`] and to cross-check analytic
//! Jacobians in tests.

use crate::error::{PeakFitError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default relative step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

fn step_for(param: f64, eps: f64) -> f64 {
    if param.abs() > eps {
        param.abs() * eps
    } else {
        eps
    }
}

fn check_residual_count(problem: &dyn Problem, residuals: &Array1<f64>) -> Result<()> {
    if residuals.len() != problem.residual_count() {
        return Err(PeakFitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            problem.residual_count(),
            residuals.len()
        )));
    }
    Ok(())
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// `J[i, j] = d residual[i] / d param[j]`, with the step for each parameter
/// scaled to its magnitude.
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let residuals = problem.eval(params)?;
    check_residual_count(problem, &residuals)?;

    let mut jac = Array2::zeros((residuals.len(), params.len()));
    for j in 0..params.len() {
        let eps_j = step_for(params[j], eps);
        let mut perturbed = params.clone();
        perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&perturbed)?;
        for i in 0..residuals.len() {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    Ok(jac)
}

/// Compute the Jacobian matrix using central finite differences.
///
/// Twice the evaluations of [`jacobian`], second-order accurate.
pub fn jacobian_central(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(1e-6);
    let n_residuals = problem.residual_count();

    let mut jac = Array2::zeros((n_residuals, params.len()));
    for j in 0..params.len() {
        let eps_j = step_for(params[j], eps);

        let mut forward = params.clone();
        forward[j] += eps_j;
        let mut backward = params.clone();
        backward[j] -= eps_j;

        let r_forward = problem.eval(&forward)?;
        let r_backward = problem.eval(&backward)?;
        check_residual_count(problem, &r_forward)?;

        for i in 0..n_residuals {
            jac[[i, j]] = (r_forward[i] - r_backward[i]) / (2.0 * eps_j);
        }
    }

    Ok(jac)
}
