//! Convergence criteria for the Levenberg-Marquardt iteration.
//!
//! This module defines the criteria used to determine when the optimization
//! has converged to a solution, and the terminal states it can end in.

use ndarray::Array1;

use super::config::LmConfig;

/// Possible convergence states for an optimization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The algorithm is still running.
    Running,

    /// The residuals vanished exactly.
    ExactFit,

    /// The algorithm has converged due to a small parameter change.
    ParameterConvergence,

    /// The algorithm has converged due to a small function value change.
    FunctionValueConvergence,

    /// The algorithm has converged due to a small gradient.
    GradientConvergence,

    /// The algorithm has terminated due to reaching the maximum number of iterations.
    MaxIterationsReached,

    /// The residual evaluation budget was exhausted.
    MaxFunctionEvalsReached,

    /// No acceptable step could be found before the damping hit its ceiling.
    DampingSaturated,
}

impl ConvergenceStatus {
    /// Returns true if the optimization has terminated (either converged or failed).
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the optimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ExactFit
                | ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> String {
        match self {
            ConvergenceStatus::Running => "Optimization is still running".to_string(),
            ConvergenceStatus::ExactFit => "Converged: residuals are exactly zero".to_string(),
            ConvergenceStatus::ParameterConvergence => {
                "Converged: small parameter change".to_string()
            }
            ConvergenceStatus::FunctionValueConvergence => {
                "Converged: small function value change".to_string()
            }
            ConvergenceStatus::GradientConvergence => "Converged: small gradient".to_string(),
            ConvergenceStatus::MaxIterationsReached => {
                "Terminated: maximum iterations reached".to_string()
            }
            ConvergenceStatus::MaxFunctionEvalsReached => {
                "Terminated: maximum function evaluations reached".to_string()
            }
            ConvergenceStatus::DampingSaturated => {
                "Terminated: damping reached its maximum without an acceptable step".to_string()
            }
        }
    }
}

/// Criteria for determining when an optimization algorithm has converged.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Tolerance for change in parameter values.
    pub xtol: f64,

    /// Tolerance for change in function value.
    pub ftol: f64,

    /// Tolerance for the scaled gradient.
    pub gtol: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self::from_config(&LmConfig::default())
    }
}

impl ConvergenceCriteria {
    /// Creates a new set of convergence criteria with the given tolerances.
    pub fn new(xtol: f64, ftol: f64, gtol: f64) -> Self {
        Self { xtol, ftol, gtol }
    }

    /// Takes the tolerances of a solver configuration.
    pub fn from_config(config: &LmConfig) -> Self {
        Self::new(config.xtol, config.ftol, config.gtol)
    }

    /// Largest relative component of a step, `|dx_i| / max(|x_i|, 1)`.
    pub fn relative_step(params: &Array1<f64>, step: &Array1<f64>) -> f64 {
        step.iter()
            .zip(params.iter())
            .map(|(dx, x)| dx.abs() / x.abs().max(1.0))
            .fold(0.0, f64::max)
    }

    /// Largest cosine between the residual vector and a Jacobian column,
    /// `|g_i| / (sqrt((J^T J)_ii) * |r|)`.
    ///
    /// Columns with no influence on the residuals are ignored.
    pub fn scaled_gradient(gradient: &Array1<f64>, jtj_diag: &Array1<f64>, cost: f64) -> f64 {
        let residual_norm = cost.sqrt();
        if residual_norm == 0.0 {
            return 0.0;
        }
        gradient
            .iter()
            .zip(jtj_diag.iter())
            .filter(|(_, d)| **d > 0.0)
            .map(|(g, d)| g.abs() / (d.sqrt() * residual_norm))
            .fold(0.0, f64::max)
    }

    /// Status after a step has been accepted.
    pub fn check_accepted(
        &self,
        params: &Array1<f64>,
        step: &Array1<f64>,
        cost: f64,
        new_cost: f64,
    ) -> ConvergenceStatus {
        if new_cost == 0.0 {
            return ConvergenceStatus::ExactFit;
        }

        if Self::relative_step(params, step) < self.xtol {
            return ConvergenceStatus::ParameterConvergence;
        }

        let cost_change = (cost - new_cost).abs() / cost.max(f64::MIN_POSITIVE);
        if cost_change < self.ftol {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        ConvergenceStatus::Running
    }

    /// Status after a step has been rejected.
    ///
    /// A rejected step that no longer moves the parameters means the current
    /// point cannot be improved at the working precision.
    pub fn check_rejected(&self, params: &Array1<f64>, step: &Array1<f64>) -> ConvergenceStatus {
        if Self::relative_step(params, step) < self.xtol {
            ConvergenceStatus::ParameterConvergence
        } else {
            ConvergenceStatus::Running
        }
    }

    /// Status before a step is attempted.
    pub fn check_gradient(&self, scaled_gradient: f64) -> ConvergenceStatus {
        if scaled_gradient <= self.gtol {
            ConvergenceStatus::GradientConvergence
        } else {
            ConvergenceStatus::Running
        }
    }
}
