//! Error handling for loudness-core
//!
//! Configuration problems are reported as typed errors at `initialize()`
//! time. Contract violations after initialisation (wrong-shape writes,
//! processing an uninitialised module) are programmer errors and panic.

use thiserror::Error;

/// Result type alias for loudness-core operations
pub type Result<T> = std::result::Result<T, LoudnessError>;

/// Main error type for loudness-core operations
#[derive(Error, Debug)]
pub enum LoudnessError {
    /// A SignalBank was given a degenerate shape
    #[error("invalid SignalBank shape: {details}")]
    InvalidShape { details: String },

    /// A module rejected the input bank it was initialised with
    #[error("{module}: incompatible input: {details}")]
    IncompatibleInput { module: String, details: String },

    /// A module or model was constructed with unusable parameters
    #[error("{module}: invalid parameter: {details}")]
    InvalidParameter { module: String, details: String },

    /// A named output does not exist in the model
    #[error("unknown model output: '{name}'")]
    UnknownOutput { name: String },

    /// Two pipeline stages were registered under the same name
    #[error("duplicate model output: '{name}'")]
    DuplicateOutput { name: String },

    /// An operation required an initialised object
    #[error("{what} is not initialized")]
    NotInitialized { what: String },

    // Serialization Errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoudnessError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            LoudnessError::InvalidShape { .. } => "INVALID_SHAPE",
            LoudnessError::IncompatibleInput { .. } => "INCOMPATIBLE_INPUT",
            LoudnessError::InvalidParameter { .. } => "INVALID_PARAMETER",
            LoudnessError::UnknownOutput { .. } => "UNKNOWN_OUTPUT",
            LoudnessError::DuplicateOutput { .. } => "DUPLICATE_OUTPUT",
            LoudnessError::NotInitialized { .. } => "NOT_INITIALIZED",
            LoudnessError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is a configuration error (fixable by the caller
    /// re-initialising with corrected parameters)
    pub fn is_configuration(&self) -> bool {
        !matches!(self, LoudnessError::Serialization(_))
    }
}
