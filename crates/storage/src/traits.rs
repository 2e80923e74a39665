//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use hoard_core::{Etag, Fingerprint, PartNumber, UploadId};
use std::pin::Pin;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A boxed stream of client bytes consumed exactly once by a write.
pub type InputStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// A boxed stream of blob entries for maintenance walks.
pub type BlobEntryStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<BlobEntry>> + Send + 'a>>;

/// Digests computed in the same pass that wrote the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobDigest {
    /// SHA-1 fingerprint addressing the blob.
    pub fingerprint: Fingerprint,
    /// MD5 entity tag of the same bytes.
    pub etag: Etag,
    /// Total byte count.
    pub size: u64,
}

/// Result of a completed `store`.
#[derive(Clone, Debug)]
pub struct StoreOutcome {
    /// Digests of the stored bytes.
    pub digest: BlobDigest,
    /// True when the blob was placed by this call, false when it already existed.
    pub created: bool,
}

/// A committed blob opened for sequential reading.
pub struct RetrievedBlob {
    /// Blob size in bytes.
    pub size: u64,
    /// Blob content.
    pub stream: ByteStream,
}

/// A blob found while walking the sharded tree.
#[derive(Clone, Debug)]
pub struct BlobEntry {
    pub fingerprint: Fingerprint,
    pub modified: Option<OffsetDateTime>,
}

/// Content-addressed blob store.
///
/// A pure fingerprint to bytes map. It knows nothing about reference counts,
/// buckets or keys.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Consume `input` once, hashing while writing to a private staging file.
    ///
    /// The returned handle is not visible to `retrieve` until committed.
    async fn stage(&self, input: InputStream) -> StorageResult<Box<dyn StagedBlob>>;

    /// Stage and immediately commit. Returns the fingerprint whether the
    /// content was new or a duplicate.
    async fn store(&self, input: InputStream) -> StorageResult<StoreOutcome> {
        let staged = self.stage(input).await?;
        let digest = staged.digest().clone();
        let created = staged.commit().await?;
        Ok(StoreOutcome { digest, created })
    }

    /// Open a blob for sequential read. Fails with `NotFound` if absent.
    async fn retrieve(&self, fingerprint: &Fingerprint) -> StorageResult<RetrievedBlob>;

    /// Remove a blob. Returns false, not an error, when nothing was there.
    async fn delete(&self, fingerprint: &Fingerprint) -> StorageResult<bool>;

    /// Existence check against the derived path only.
    async fn exists(&self, fingerprint: &Fingerprint) -> StorageResult<bool>;

    /// Walk every committed blob.
    fn list(&self) -> BlobEntryStream<'_>;

    /// Get the name of this storage backend, used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is usable before accepting requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Bytes written and hashed but not yet placed in the blob tree.
#[async_trait]
pub trait StagedBlob: Send {
    /// Digests of the staged bytes.
    fn digest(&self) -> &BlobDigest;

    /// Move into the sharded tree only if no blob with this fingerprint exists.
    ///
    /// Returns true if this call placed the blob. When the path is already
    /// occupied the staged copy is discarded and false is returned.
    async fn commit(self: Box<Self>) -> StorageResult<bool>;

    /// Throw the staged bytes away.
    async fn discard(self: Box<Self>) -> StorageResult<()>;
}

/// A part written to the multipart staging area.
#[derive(Clone, Debug)]
pub struct StagedPart {
    /// Opaque location relative to the staging root.
    pub location: String,
    /// MD5 entity tag of the part bytes.
    pub etag: Etag,
    /// Part size in bytes.
    pub size: u64,
}

/// A staging directory found while walking the staging area.
#[derive(Clone, Debug)]
pub struct StagedUploadEntry {
    /// Directory name. Usually an upload ID, but not guaranteed to parse as one.
    pub name: String,
    pub modified: Option<OffsetDateTime>,
}

/// Arena of transient part bytes indexed by upload and part number.
///
/// Staged data lives outside the committed blob tree and is never returned
/// by `ContentStore::retrieve`.
#[async_trait]
pub trait PartStaging: Send + Sync + 'static {
    /// Write one part. Every call gets a fresh location, so a re-upload of the
    /// same part number never clobbers bytes another request may be reading.
    async fn stage_part(
        &self,
        upload_id: &UploadId,
        part_number: PartNumber,
        input: InputStream,
    ) -> StorageResult<StagedPart>;

    /// Open a staged part for reading.
    async fn open_part(&self, location: &str) -> StorageResult<ByteStream>;

    /// Remove one staged part. Missing files are not an error.
    async fn remove_part(&self, location: &str) -> StorageResult<()>;

    /// Remove every staged part of an upload. Missing directories are not an error.
    async fn remove_upload(&self, upload_id: &UploadId) -> StorageResult<()>;

    /// Remove a staging directory by its raw name. Used for directories
    /// whose name does not parse as an upload ID.
    async fn remove_dir(&self, name: &str) -> StorageResult<()>;

    /// List upload directories present in the staging area.
    async fn list_uploads(&self) -> StorageResult<Vec<StagedUploadEntry>>;
}
