//! Native API error types.

use crate::body::is_body_error;
use crate::engine::EngineError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Engine(e) => match e {
                e if e.is_not_found() => "not_found",
                EngineError::BucketAlreadyExists { .. } => "already_exists",
                EngineError::BucketNotEmpty { .. } => "bucket_not_empty",
                EngineError::InvalidPart { .. } => "invalid_part",
                EngineError::Conflict(_) => "conflict",
                EngineError::InvalidBucketName(_)
                | EngineError::KeyTooLong { .. }
                | EngineError::InvalidRequest(_)
                | EngineError::InvalidArgument(_) => "bad_request",
                e if is_body_error(e) => "bad_request",
                _ => "io_failure",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Engine(e) => match e {
                e if e.is_not_found() => StatusCode::NOT_FOUND,
                EngineError::BucketAlreadyExists { .. }
                | EngineError::BucketNotEmpty { .. }
                | EngineError::Conflict(_) => StatusCode::CONFLICT,
                EngineError::InvalidPart { .. }
                | EngineError::InvalidBucketName(_)
                | EngineError::KeyTooLong { .. }
                | EngineError::InvalidRequest(_)
                | EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                e if is_body_error(e) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
