//! Error types.
//!
//! - [`ValuationError`] is the library-level taxonomy used by the pipeline and
//!   the inference service.
//! - [`AppError`] is what the `hv` binary reports: a message plus a process exit
//!   code. Every `ValuationError` converts into one.
//!
//! Exit codes:
//! - `2`: invalid input or configuration
//! - `3`: insufficient data (nothing usable to train on, no viable model)
//! - `4`: runtime failures (I/O, artifacts, network, numeric)

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures surfaced by the valuation pipeline and the inference boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    /// Caller-facing validation failure (bad beds/baths, no location source, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The postcode could not be turned into coordinates.
    #[error("could not find postcode: {postcode}")]
    LocationUnresolved { postcode: String },

    /// An operation needs a trained model and none is loaded.
    #[error("no trained model is available: {0}")]
    ArtifactMissing(String),

    /// The persisted bundle exists but is incomplete or unreadable.
    #[error("corrupt model artifact: {0}")]
    CorruptArtifact(String),

    /// Feature vector does not line up with the model's recorded columns.
    #[error("feature mismatch: {0}")]
    FeatureMismatch(String),

    /// Non-finite or otherwise unusable numeric output.
    #[error("prediction failed: {0}")]
    PredictionError(String),

    /// Every configuration in the training grid failed.
    #[error("no viable model: {0}")]
    NoViableModel(String),

    /// Cleaning removed every record, even with the widest date window.
    #[error("no usable records: {0}")]
    NoUsableRecords(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ValuationError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ValuationError::InvalidInput(_) | ValuationError::LocationUnresolved { .. } => 2,
            ValuationError::NoViableModel(_) | ValuationError::NoUsableRecords(_) => 3,
            ValuationError::ArtifactMissing(_)
            | ValuationError::CorruptArtifact(_)
            | ValuationError::FeatureMismatch(_)
            | ValuationError::PredictionError(_)
            | ValuationError::Io(_) => 4,
        }
    }
}

impl From<ValuationError> for AppError {
    fn from(err: ValuationError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl From<std::io::Error> for ValuationError {
    fn from(err: std::io::Error) -> Self {
        ValuationError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_error_names_the_postcode() {
        let err = ValuationError::LocationUnresolved {
            postcode: "ZZ99 9ZZ".to_string(),
        };
        assert!(err.to_string().contains("ZZ99 9ZZ"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn conversion_keeps_exit_code() {
        let app: AppError = ValuationError::NoViableModel("all failed".to_string()).into();
        assert_eq!(app.exit_code(), 3);
        assert!(app.message().contains("all failed"));
    }
}
