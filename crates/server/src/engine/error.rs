//! Error types for the engine.

use hoard_metadata::MetadataError;
use hoard_storage::StorageError;

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("object not found: bucket={bucket}, key={key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("blob not found: {fingerprint}")]
    BlobNotFound { fingerprint: String },

    #[error("bucket already exists: {bucket}")]
    BucketAlreadyExists { bucket: String },

    /// The completion manifest names a part that is not staged, or whose
    /// entity tag does not match the staged one.
    #[error("invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("bucket not empty: {bucket}")]
    BucketNotEmpty { bucket: String },

    /// Lock contention that outlived the single internal retry.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("object key too long: {len} bytes")]
    KeyTooLong { len: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(MetadataError),
}

impl EngineError {
    /// Whether the error means "absent" in any of its forms.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound { .. }
                | Self::ObjectNotFound { .. }
                | Self::UploadNotFound { .. }
                | Self::BlobNotFound { .. }
        )
    }
}

impl From<MetadataError> for EngineError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Metadata(other),
        }
    }
}

impl From<hoard_core::Error> for EngineError {
    fn from(err: hoard_core::Error) -> Self {
        match err {
            hoard_core::Error::InvalidPartNumber(_) => Self::InvalidArgument(err.to_string()),
            hoard_core::Error::InvalidBucketName(name) => Self::InvalidBucketName(name),
            hoard_core::Error::KeyTooLong(len) => Self::KeyTooLong { len },
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
