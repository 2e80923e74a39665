//! Multipart session repository.

use crate::error::MetadataResult;
use crate::models::{CompletedUpload, MultipartUploadRow, ObjectWrite, PartRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for multipart sessions and their part records.
#[async_trait]
pub trait MultipartRepo: Send + Sync {
    /// Open a session. Fails with `NotFound` if the bucket does not exist.
    async fn create_upload(&self, upload: &MultipartUploadRow) -> MetadataResult<()>;

    /// Get a session by ID.
    async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<MultipartUploadRow>>;

    /// Record a staged part, replacing any earlier record for the same number.
    ///
    /// Returns the replaced part's staging location. Fails with `NotFound`
    /// when the session no longer exists.
    async fn upsert_part(&self, part: &PartRow) -> MetadataResult<Option<String>>;

    /// Parts of a session in ascending part number order.
    async fn list_parts(&self, upload_id: Uuid) -> MetadataResult<Vec<PartRow>>;

    /// Put the assembled object and drop the session and its parts in one
    /// transaction. Fails with `NotFound` if the session is gone.
    async fn complete_upload(
        &self,
        upload_id: Uuid,
        object: &ObjectWrite,
    ) -> MetadataResult<CompletedUpload>;

    /// Drop a session and its parts. Returns the staging locations of the
    /// dropped parts, or `None` if the session did not exist.
    async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<Option<Vec<String>>>;

    /// Sessions created before `cutoff`.
    async fn list_uploads_created_before(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<MultipartUploadRow>>;

    /// Whether a session exists.
    async fn upload_exists(&self, upload_id: Uuid) -> MetadataResult<bool>;
}
