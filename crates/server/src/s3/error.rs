//! S3-compatible error types and XML error responses.

use super::xml;
use crate::body::is_body_error;
use crate::engine::EngineError;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors returned by S3 API handlers.
#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    /// The request body is not well-formed XML or not the expected document.
    #[error("malformed XML: {message}")]
    MalformedXml { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Code and message of a failed S3 request, left in the response extensions
/// so the request layer can re-render the body with the resource and request ID.
#[derive(Debug, Clone)]
pub struct S3ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl S3Error {
    /// Map to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedXml { .. } | Self::InvalidArgument { .. } | Self::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
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

    /// Map to an S3 error code string.
    pub fn s3_code(&self) -> &'static str {
        match self {
            Self::MalformedXml { .. } => "MalformedXML",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::InvalidRequest { .. } => "InvalidRequest",
            Self::Internal { .. } => "InternalError",
            Self::Engine(e) => match e {
                EngineError::BucketNotFound { .. } => "NoSuchBucket",
                EngineError::ObjectNotFound { .. } | EngineError::BlobNotFound { .. } => "NoSuchKey",
                EngineError::UploadNotFound { .. } => "NoSuchUpload",
                // Single tenant: every existing bucket is the caller's own.
                EngineError::BucketAlreadyExists { .. } => "BucketAlreadyOwnedByYou",
                EngineError::BucketNotEmpty { .. } => "BucketNotEmpty",
                EngineError::InvalidPart { .. } => "InvalidPart",
                EngineError::InvalidBucketName(_) => "InvalidBucketName",
                EngineError::KeyTooLong { .. } => "KeyTooLongError",
                EngineError::InvalidRequest(_) => "InvalidRequest",
                EngineError::InvalidArgument(_) => "InvalidArgument",
                EngineError::Conflict(_) => "OperationAborted",
                e if is_body_error(e) => "IncompleteBody",
                _ => "InternalError",
            },
        }
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "S3 request failed");
        } else {
            tracing::debug!(error = %self, "S3 request rejected");
        }

        let detail = S3ErrorDetail {
            code: self.s3_code(),
            message: self.to_string(),
        };
        let body = xml::error_xml(detail.code, &detail.message, "", "");
        let mut response = (status, [(CONTENT_TYPE, "application/xml")], body).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}
