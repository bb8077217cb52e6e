use thiserror::Error;

use crate::parameters::bounds::BoundsError;

/// Error types for the svdopt-rs library.
#[derive(Error, Debug)]
pub enum SvdOptError {
    /// The unperturbed parameter set failed to run; there is no residual baseline.
    #[error("Base parameter run failed: {0}")]
    BaseRunFailed(String),

    /// Every trial of an upgrade batch failed to run.
    #[error("All {trials} upgrade runs failed in iteration {iteration}")]
    AllTrialsFailed { iteration: usize, trials: usize },

    /// Inconsistent or invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A restart resume point whose precondition does not hold.
    #[error("Inconsistent restart state: {0}")]
    InconsistentRestart(String),

    /// Jacobian, residual or weight vectors of incompatible length.
    #[error("Matrix dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Parameter not found.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    /// Observation or prior information equation not found.
    #[error("Observation not found: {0}")]
    ObservationNotFound(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// A model run or solver state that cannot be used.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Inverted or NaN parameter bounds.
    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),

    /// Reading a configuration file failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed configuration or parameter JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for svdopt-rs operations.
pub type Result<T> = std::result::Result<T, SvdOptError>;
