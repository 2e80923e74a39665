//! Metadata store error types.

use thiserror::Error;

/// SQLite primary and extended result codes that mean another writer holds the lock.
const SQLITE_CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// Lock contention reported by the database. Callers may retry.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid continuation token: {0}")]
    InvalidToken(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Whether the operation that produced this error may succeed on retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for MetadataError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let contended = db
                .code()
                .is_some_and(|code| SQLITE_CONTENTION_CODES.contains(&&*code));
            if contended || db.message().contains("database is locked") {
                return Self::Conflict(db.message().to_string());
            }
        }
        Self::Database(err)
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_conflicts() {
        let err = MetadataError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_conflict());
        assert!(matches!(err, MetadataError::Database(_)));
    }

    #[test]
    fn test_conflict_display() {
        let err = MetadataError::Conflict("database is locked".to_string());
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "conflicting concurrent update: database is locked"
        );
    }
}
