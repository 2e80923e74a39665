//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid entity tag: {0}")]
    InvalidEtag(String),

    #[error("invalid upload ID: {0}")]
    InvalidUploadId(String),

    #[error("invalid part number: {0} (must be between 1 and 10000)")]
    InvalidPartNumber(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("object key is {0} bytes, longer than the 1024 byte limit")]
    KeyTooLong(usize),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
