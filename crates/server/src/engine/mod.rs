//! Orchestration of the content store, reference ledger, catalog and
//! multipart staging.
//!
//! The engine owns every ordering rule that spans more than one of those
//! components:
//! - a blob is placed and its reference recorded under the fingerprint's lock,
//!   so a concurrent reaper never erases a blob between the two steps
//! - a catalog entry is removed together with its reference, and the blob is
//!   erased only afterwards, once the count is seen at zero under the same lock
//! - `UploadPart` holds its session shared while `Complete` and `Abort` hold it
//!   exclusively
//!
//! Protocol front ends call into the engine and never touch the stores directly.

mod blobs;
mod error;
mod multipart;
mod objects;
mod reaper;
mod retry;

pub use blobs::{BlobRelease, StoredBlob};
pub use error::{EngineError, EngineResult};
pub use multipart::{CompletedObject, ManifestPart, NewUpload};
pub use objects::{ListPage, ListRequest, MAX_KEYS_LIMIT, PutObjectRequest, PutObjectResult};
pub use reaper::{ReapReport, spawn_reaper};
pub use retry::{CONFLICT_BACKOFF, retry_on_conflict};

use crate::locks::{KeyGuard, KeyedLocks};
use crate::metrics::{BLOBS_DEDUPLICATED, BLOBS_ERASED, BLOBS_STORED, BYTES_STORED};
use hoard_core::Fingerprint;
use hoard_metadata::{LedgerRepo, MetadataStore};
use hoard_storage::{ContentStore, PartStaging, StagedBlob, Storage};
use std::sync::Arc;

/// Shared handle to the storage engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    blobs: Arc<dyn ContentStore>,
    staging: Arc<dyn PartStaging>,
    metadata: Arc<dyn MetadataStore>,
    blob_locks: KeyedLocks,
    upload_locks: KeyedLocks,
}

impl Engine {
    pub fn new(storage: Storage, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            blobs: storage.blobs,
            staging: storage.staging,
            metadata,
            blob_locks: KeyedLocks::new(),
            upload_locks: KeyedLocks::new(),
        }
    }

    /// The content store, for read-only inspection.
    pub fn blobs(&self) -> &Arc<dyn ContentStore> {
        &self.blobs
    }

    /// The metadata store, for read-only inspection.
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    async fn lock_blob(&self, fingerprint: &Fingerprint) -> KeyGuard {
        self.blob_locks.write(&fingerprint.to_hex()).await
    }

    /// Place a staged blob while the caller holds its fingerprint lock.
    ///
    /// Returns true if this call created the blob file.
    async fn commit_locked(&self, staged: Box<dyn StagedBlob>, _guard: &KeyGuard) -> EngineResult<bool> {
        let size = staged.digest().size;
        let placed = staged.commit().await?;
        if placed {
            BLOBS_STORED.inc();
            BYTES_STORED.inc_by(size);
        } else {
            BLOBS_DEDUPLICATED.inc();
        }
        Ok(placed)
    }

    /// Erase a blob whose ledger row is at zero or absent, then drop the row.
    ///
    /// The caller holds the fingerprint lock, so no store of the same content
    /// can slip in between the count check and the erase.
    async fn erase_if_unreferenced(
        &self,
        fingerprint: &Fingerprint,
        _guard: &KeyGuard,
    ) -> EngineResult<bool> {
        let hex = fingerprint.to_hex();
        let row = self.metadata.get_refcount(&hex).await?;
        if let Some(row) = &row
            && row.refcount > 0
        {
            tracing::debug!(fingerprint = %hex, refcount = row.refcount, "blob referenced again, keeping");
            return Ok(false);
        }

        let erased = self.blobs.delete(fingerprint).await?;
        if row.is_some() {
            let metadata = &self.metadata;
            retry_on_conflict("remove_if_zero", || metadata.remove_if_zero(&hex)).await?;
        }
        if erased {
            BLOBS_ERASED.inc();
            tracing::info!(fingerprint = %hex, "erased unreferenced blob");
        }
        Ok(erased)
    }

    /// Erase a blob if its count has reached zero. Returns true if bytes were removed.
    #[tracing::instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn reap(&self, fingerprint: &Fingerprint) -> EngineResult<bool> {
        let guard = self.lock_blob(fingerprint).await;
        self.erase_if_unreferenced(fingerprint, &guard).await
    }

    /// Reap a fingerprint reported by the metadata store, logging rather than
    /// failing the request that released it. The reaper retries later.
    async fn reap_released(&self, fingerprint: &str) {
        let parsed = match Fingerprint::from_hex(fingerprint) {
            Ok(fp) => fp,
            Err(e) => {
                tracing::error!(fingerprint, error = %e, "ledger holds an unparseable fingerprint");
                return;
            }
        };
        if let Err(e) = self.reap(&parsed).await {
            tracing::warn!(fingerprint, error = %e, "failed to erase released blob, leaving it to the reaper");
        }
    }
}
