//! Error mapping for both transports
//!
//! Service errors reach clients as a JSON body `{ "error", "detail" }` with
//! an HTTP status on the REST side, and as a `tonic::Status` on the gRPC side.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// JSON error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error kind in snake_case
    pub error: String,
    /// Human-readable message
    pub detail: String,
}

/// Error returned by REST handlers
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl ApiError {
    /// Shorthand for a malformed request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::InvalidArgument(message.into()))
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        http_status(self.0.kind())
    }
}

/// HTTP status for an error kind
pub fn http_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidHyperparameters | ErrorKind::InvalidArgument | ErrorKind::PredictionFailure => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::Conflict | ErrorKind::NotReady => StatusCode::CONFLICT,
        ErrorKind::TrainingFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        let body = ErrorBody {
            error: self.0.kind().as_str().to_string(),
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// gRPC status for a service error
pub fn grpc_status(err: Error) -> tonic::Status {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::InvalidHyperparameters | ErrorKind::InvalidArgument | ErrorKind::PredictionFailure => {
            tonic::Status::invalid_argument(message)
        }
        ErrorKind::AlreadyExists => tonic::Status::already_exists(message),
        ErrorKind::NotFound => tonic::Status::not_found(message),
        ErrorKind::NotReady => tonic::Status::failed_precondition(message),
        ErrorKind::Conflict => tonic::Status::aborted(message),
        ErrorKind::Timeout => tonic::Status::deadline_exceeded(message),
        ErrorKind::Unavailable => tonic::Status::unavailable(message),
        ErrorKind::TrainingFailure | ErrorKind::Internal => tonic::Status::internal(message),
    }
}
