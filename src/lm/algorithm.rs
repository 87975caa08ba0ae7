//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core iteration for nonlinear least-squares
//! optimization: Marquardt-scaled damping, gain-ratio step acceptance and
//! the convergence tests of [`ConvergenceCriteria`].

use log::debug;
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{PeakFitError, Result};
use crate::problem::Problem;

use super::config::LmConfig;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::step::LmStep;
use super::trust_region::TrustRegion;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values (best iterate when unsuccessful)
    pub params: Array1<f64>,

    /// Residuals at the returned parameters
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations (accepted steps) performed
    pub iterations: usize,

    /// Number of residual evaluations
    pub func_evals: usize,

    /// Whether the optimization succeeded
    pub success: bool,

    /// A message describing the result
    pub message: String,

    /// The terminal status
    pub status: ConvergenceStatus,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

/// Residuals of a trial point, or `None` when the point is outside the
/// model's domain or produced non-finite values.
fn trial_eval<P: Problem>(problem: &P, params: &Array1<f64>) -> Result<Option<(Array1<f64>, f64)>> {
    match problem.eval(params) {
        Ok(residuals) => {
            let cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
            Ok(if cost.is_finite() { Some((residuals, cost)) } else { None })
        }
        Err(PeakFitError::Domain(message)) => {
            debug!("trial point rejected: {}", message);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the maximum number of residual evaluations.
    pub fn with_max_function_evals(mut self, max_function_evals: usize) -> Self {
        self.config.max_function_evals = max_function_evals;
        self
    }

    /// Set the tolerance for relative change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for the scaled gradient.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Failure to converge within the budget is not an error: the result
    /// carries `success == false` and the best iterate found. Errors are
    /// reserved for invalid input and failures of the problem itself.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * `Result<LmResult>` - The result of the optimization
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmResult> {
        self.config.validate()?;

        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let criteria = ConvergenceCriteria::from_config(&self.config);
        let mut trust_region = TrustRegion::from_config(&self.config);

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut func_evals = 1;
        let mut iterations = 0;
        if !cost.is_finite() {
            return Err(PeakFitError::Domain(
                "residuals at the initial parameters are not finite".to_string(),
            ));
        }

        let mut scale = Array1::<f64>::zeros(n_params);

        let status = 'outer: loop {
            if cost == 0.0 {
                break ConvergenceStatus::ExactFit;
            }
            if iterations >= self.config.max_iterations {
                break ConvergenceStatus::MaxIterationsReached;
            }

            let jacobian: Array2<f64> = problem.jacobian(&params)?;
            if !problem.has_custom_jacobian() {
                func_evals += n_params;
            }
            let j_t_j = jacobian.t().dot(&jacobian);
            let j_t_r = jacobian.t().dot(&residuals);
            let diag = j_t_j.diag().to_owned();

            // Marquardt scaling, never shrinking between iterations
            for (s, &d) in scale.iter_mut().zip(diag.iter()) {
                *s = s.max(d);
            }
            let damping_scale = scale.mapv(|s| if s > 0.0 { s } else { 1.0 });

            let gradient_status =
                criteria.check_gradient(ConvergenceCriteria::scaled_gradient(&j_t_r, &diag, cost));
            if gradient_status.is_terminated() {
                break gradient_status;
            }

            loop {
                if func_evals >= self.config.max_function_evals {
                    break 'outer ConvergenceStatus::MaxFunctionEvalsReached;
                }

                let step = LmStep::calculate_step(&j_t_j, &j_t_r, &damping_scale, trust_region.lambda)?;
                let new_params = &params + &step.step;
                let trial = trial_eval(problem, &new_params)?;
                func_evals += 1;

                let accepted = match trial {
                    Some((new_residuals, new_cost)) => {
                        let rho = TrustRegion::gain_ratio(cost, new_cost, step.predicted_reduction);
                        if trust_region.update_lambda(rho) {
                            Some((new_residuals, new_cost))
                        } else {
                            None
                        }
                    }
                    None => {
                        trust_region.increase();
                        None
                    }
                };

                match accepted {
                    Some((new_residuals, new_cost)) => {
                        let status = criteria.check_accepted(&params, &step.step, cost, new_cost);
                        params = new_params;
                        residuals = new_residuals;
                        cost = new_cost;
                        iterations += 1;
                        debug!(
                            "iteration {}: cost = {:.6e}, lambda = {:.3e}",
                            iterations, cost, trust_region.lambda
                        );
                        if status.is_terminated() {
                            break 'outer status;
                        }
                        break;
                    }
                    None => {
                        let status = criteria.check_rejected(&params, &step.step);
                        if status.is_terminated() {
                            break 'outer status;
                        }
                        if trust_region.is_saturated() {
                            break 'outer ConvergenceStatus::DampingSaturated;
                        }
                    }
                }
            }
        };

        let success = status.is_converged();
        debug!(
            "finished after {} iterations and {} evaluations: {}",
            iterations,
            func_evals,
            status.description()
        );

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            message: status.description(),
            status,
        })
    }
}
