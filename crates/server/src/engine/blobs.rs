//! Fingerprint-addressed operations behind the native API.

use super::{Engine, EngineError, EngineResult, retry_on_conflict};
use crate::metrics::STORE_DURATION;
use hoard_core::Fingerprint;
use hoard_metadata::LedgerRepo;
use hoard_metadata::models::ReleaseOutcome;
use hoard_storage::{InputStream, RetrievedBlob, StorageError};
use serde::Serialize;
use std::time::Instant;

/// Result of a native store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredBlob {
    #[serde(rename = "sha1")]
    pub fingerprint: Fingerprint,
    pub size: u64,
    /// The ledger row was created by this store.
    #[serde(rename = "new")]
    pub created: bool,
}

/// Result of releasing a native reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlobRelease {
    /// A reference was released.
    pub deleted: bool,
    /// References left afterwards.
    pub remaining: i64,
}

impl Engine {
    /// Stream bytes into the content store and take one reference on them.
    #[tracing::instrument(skip(self, input))]
    pub async fn store_blob(&self, input: InputStream) -> EngineResult<StoredBlob> {
        let start = Instant::now();
        let staged = self.blobs.stage(input).await?;
        let digest = staged.digest().clone();
        let hex = digest.fingerprint.to_hex();

        let guard = self.lock_blob(&digest.fingerprint).await;
        self.commit_locked(staged, &guard).await?;
        let metadata = &self.metadata;
        let created = retry_on_conflict("add_or_increment", || metadata.add_or_increment(&hex)).await?;
        drop(guard);

        STORE_DURATION.observe(start.elapsed().as_secs_f64());
        tracing::info!(fingerprint = %hex, size = digest.size, created, "stored blob");

        Ok(StoredBlob {
            fingerprint: digest.fingerprint,
            size: digest.size,
            created,
        })
    }

    /// Open a blob for streaming.
    pub async fn open_blob(&self, fingerprint: &Fingerprint) -> EngineResult<RetrievedBlob> {
        match self.blobs.retrieve(fingerprint).await {
            Ok(blob) => Ok(blob),
            Err(StorageError::NotFound(_)) => Err(EngineError::BlobNotFound {
                fingerprint: fingerprint.to_hex(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the content store holds the blob. The ledger is not consulted.
    pub async fn blob_exists(&self, fingerprint: &Fingerprint) -> EngineResult<bool> {
        Ok(self.blobs.exists(fingerprint).await?)
    }

    /// Release one reference taken by [`Engine::store_blob`].
    ///
    /// References held by catalog entries are never released here, so an S3
    /// object cannot lose its bytes to a native delete. An unknown fingerprint
    /// is not an error.
    #[tracing::instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn release_blob(&self, fingerprint: &Fingerprint) -> EngineResult<BlobRelease> {
        let hex = fingerprint.to_hex();
        let metadata = &self.metadata;
        let outcome = retry_on_conflict("release_unowned", || metadata.release_unowned(&hex)).await?;

        let release = match outcome {
            ReleaseOutcome::Absent => BlobRelease {
                deleted: false,
                remaining: 0,
            },
            ReleaseOutcome::Released { remaining } => {
                if remaining == 0 {
                    self.reap(fingerprint).await?;
                }
                BlobRelease {
                    deleted: true,
                    remaining,
                }
            }
            ReleaseOutcome::Pinned { remaining } => {
                tracing::debug!(remaining, "all remaining references belong to catalog entries");
                BlobRelease {
                    deleted: false,
                    remaining,
                }
            }
        };
        Ok(release)
    }
}
