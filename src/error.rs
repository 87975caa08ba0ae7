use thiserror::Error;

use crate::parameters::bounds::BoundsError;

/// Error types for the peakfit-rs library.
#[derive(Error, Debug)]
pub enum PeakFitError {
    /// Malformed input detected before any optimization was attempted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The solver exhausted its budget without converging.
    ///
    /// The diagnostics describe the best iterate reached; no peak state is
    /// committed when this is returned.
    #[error("Fit did not converge after {iterations} iterations (cost = {cost:.6e}): {message}")]
    Convergence {
        message: String,
        cost: f64,
        iterations: usize,
    },

    /// An operation that needs a completed fit was called before one exists.
    #[error("Invalid state: {0}")]
    State(String),

    /// A shape function was evaluated outside its domain.
    #[error("Domain error: {0}")]
    Domain(String),

    /// Error indicating a mismatch in matrix or vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Error for boundary constraint problems.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited-text parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PeakFitError {
    /// Returns true for errors raised before the solver ran.
    pub fn is_validation(&self) -> bool {
        matches!(self, PeakFitError::Validation(_) | PeakFitError::Bounds(_))
    }
}

/// Result type alias for peakfit-rs operations.
pub type Result<T> = std::result::Result<T, PeakFitError>;
