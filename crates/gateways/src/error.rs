//! Gateway error types

use thiserror::Error;

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Failures reported by a dataset store or experiment tracker
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The requested dataset does not exist
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// The backing service cannot be reached or refused the call
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// Stored or received data could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Unavailable(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidData(err.to_string())
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

impl From<GatewayError> for common::Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::DatasetNotFound(id) => common::Error::NotFound(format!("dataset '{}'", id)),
            GatewayError::Unavailable(msg) => common::Error::Unavailable(msg),
            GatewayError::InvalidData(msg) => common::Error::InvalidArgument(msg),
        }
    }
}
