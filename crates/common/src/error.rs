//! Error types for the common crate
//!
//! This module defines the error taxonomy shared by the lifecycle service,
//! the estimator registry and both transport adapters.

use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for lifecycle service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for lifecycle service operations
#[derive(Error, Debug)]
pub enum Error {
    /// Hyperparameters rejected by the estimator schema
    #[error("Invalid hyperparameters: {0}")]
    InvalidHyperparameters(String),

    /// Request shape or argument rejected before any work started
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Already exists error
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model exists but has no servable estimator
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Another job holds the model
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Fit failed
    #[error("Training failure: {0}")]
    TrainingFailure(String),

    /// Predict failed
    #[error("Prediction failure: {0}")]
    PredictionFailure(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Backing store or gateway outage, or no free job slot
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Copyable classification of an [`Error`], used by the transport adapters
/// and stored on model records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidHyperparameters,
    InvalidArgument,
    AlreadyExists,
    NotFound,
    NotReady,
    Conflict,
    TrainingFailure,
    PredictionFailure,
    Timeout,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidHyperparameters => "invalid_hyperparameters",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TrainingFailure => "training_failure",
            ErrorKind::PredictionFailure => "prediction_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Returns the classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHyperparameters(_) => ErrorKind::InvalidHyperparameters,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotReady(_) => ErrorKind::NotReady,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::TrainingFailure(_) => ErrorKind::TrainingFailure,
            Error::PredictionFailure(_) => ErrorKind::PredictionFailure,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}
