//! Error types for the behavioral engines.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, BehavioralError>;

/// Error types surfaced by the optimization, detection and evaluation engines.
///
/// Degraded outcomes (solver non-convergence, too few trades, repairable
/// constraints) are not errors; they are flagged in the returned values.
#[derive(Error, Debug)]
pub enum BehavioralError {
    /// Empty, non-finite, mis-shaped or otherwise unusable input.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Unrecognized optimization method key.
    #[error("Unknown optimization method: {method}")]
    InvalidMethod { method: String },

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration source could not be read or deserialized.
    #[error("Configuration loading failed: {0}")]
    ConfigLoad(#[from] config::ConfigError),
}

impl BehavioralError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an invalid input error for arrays of mismatched length.
    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        Self::invalid_input(format!("length mismatch: expected {expected}, got {actual}"))
    }

    /// Create an invalid method error.
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::InvalidMethod {
            method: method.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<BehavioralError> for pyo3::PyErr {
    fn from(err: BehavioralError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
