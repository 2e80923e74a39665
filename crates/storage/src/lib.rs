//! Blob storage for hoard.
//!
//! This crate provides:
//! - A content-addressed store keyed by SHA-1 fingerprint, sharded two levels deep
//! - Stage-then-commit placement so a blob is never visible half written
//! - A staging area for multipart parts that lives outside the blob tree

pub mod backends;
mod digest;
pub mod error;
pub mod staging;
pub mod traits;

pub use backends::filesystem::FilesystemContentStore;
pub use error::{StorageError, StorageResult};
pub use staging::FilesystemStaging;
pub use traits::{
    BlobDigest, BlobEntry, BlobEntryStream, ByteStream, ContentStore, InputStream, PartStaging,
    RetrievedBlob, StagedBlob, StagedPart, StagedUploadEntry, StoreOutcome,
};

use hoard_core::config::StorageConfig;
use std::sync::Arc;

/// The two storage areas the server needs.
#[derive(Clone)]
pub struct Storage {
    /// Committed blobs.
    pub blobs: Arc<dyn ContentStore>,
    /// In-flight multipart parts.
    pub staging: Arc<dyn PartStaging>,
}

/// Create the content store and staging area from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Storage> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path, .. } => {
            let blobs = FilesystemContentStore::new(path).await?;
            let staging = FilesystemStaging::new(config.staging_root()).await?;
            Ok(Storage {
                blobs: Arc::new(blobs),
                staging: Arc::new(staging),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
            staging_path: None,
        };

        let storage = from_config(&config).await.unwrap();
        let input: InputStream = Box::pin(futures::stream::once(async {
            Ok(Bytes::from_static(b"hi"))
        }));
        let outcome = storage.blobs.store(input).await.unwrap();
        assert!(storage.blobs.exists(&outcome.digest.fingerprint).await.unwrap());
        assert!(temp.path().join("store").join("multipart").is_dir());
    }

    #[tokio::test]
    async fn from_config_rejects_shared_staging_root() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().to_path_buf(),
            staging_path: Some(temp.path().to_path_buf()),
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
