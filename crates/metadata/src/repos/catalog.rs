//! Bucket and object catalog repository.

use crate::error::MetadataResult;
use crate::models::{BucketRow, DeletedObject, ObjectPage, ObjectRow, ObjectWrite, PutOutcome};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for buckets and the objects they hold.
///
/// Object mutations update the reference ledger in the same transaction, so a
/// catalog entry and its reference are always written or removed together.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Create a bucket. Fails with `AlreadyExists` on a name collision.
    async fn create_bucket(&self, name: &str) -> MetadataResult<BucketRow>;

    /// Delete an empty bucket.
    ///
    /// Fails with `NotFound` if absent and `BucketNotEmpty` if any object
    /// remains. Open multipart sessions are dropped with the bucket and their
    /// IDs returned so staged parts can be reclaimed.
    async fn delete_bucket(&self, name: &str) -> MetadataResult<Vec<Uuid>>;

    /// Get a bucket by name.
    async fn get_bucket(&self, name: &str) -> MetadataResult<Option<BucketRow>>;

    /// List all buckets ordered by name.
    async fn list_buckets(&self) -> MetadataResult<Vec<BucketRow>>;

    /// Point `(bucket, key)` at a fingerprint.
    ///
    /// When the key already points at a different fingerprint the old one is
    /// decremented and the new one incremented (or inserted) atomically. When
    /// it points at the same fingerprint the ledger is left alone.
    async fn put_object(&self, object: &ObjectWrite) -> MetadataResult<PutOutcome>;

    /// Get an object entry.
    async fn get_object(&self, bucket: &str, key: &str) -> MetadataResult<Option<ObjectRow>>;

    /// Remove an object entry and decrement its fingerprint in one transaction.
    /// Returns `None` if there was nothing to remove.
    async fn delete_object(&self, bucket: &str, key: &str)
    -> MetadataResult<Option<DeletedObject>>;

    /// List objects in key order.
    ///
    /// Returns at most `max_keys` objects whose key starts with `prefix` and
    /// sorts strictly after `start_after`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: u32,
    ) -> MetadataResult<ObjectPage>;

    /// Number of objects pointing at a fingerprint.
    async fn count_object_refs(&self, fingerprint: &str) -> MetadataResult<i64>;
}
