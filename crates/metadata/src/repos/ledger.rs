//! Reference ledger repository.

use crate::error::MetadataResult;
use crate::models::{RefCountRow, ReleaseOutcome};
use async_trait::async_trait;

/// Repository for per-fingerprint reference counts.
///
/// Every method runs as a single transaction. Counts never go negative.
#[async_trait]
pub trait LedgerRepo: Send + Sync {
    /// Insert the fingerprint with count 1, or increment an existing row and
    /// refresh its access time. Returns true when the row was created.
    async fn add_or_increment(&self, fingerprint: &str) -> MetadataResult<bool>;

    /// Increment an existing row. Fails with `NotFound` if absent.
    async fn increment(&self, fingerprint: &str) -> MetadataResult<()>;

    /// Decrement and return the resulting count in the same statement.
    /// A row already at zero stays at zero. Fails with `NotFound` if absent.
    async fn decrement(&self, fingerprint: &str) -> MetadataResult<i64>;

    /// Release one reference that is not owned by a catalog entry.
    ///
    /// The count is only decremented while it exceeds the number of objects
    /// pointing at the fingerprint, so a catalog entry never outlives its reference.
    async fn release_unowned(&self, fingerprint: &str) -> MetadataResult<ReleaseOutcome>;

    /// Delete the row unconditionally.
    async fn remove(&self, fingerprint: &str) -> MetadataResult<()>;

    /// Delete the row only if its count is zero. Returns true if deleted.
    async fn remove_if_zero(&self, fingerprint: &str) -> MetadataResult<bool>;

    /// Whether a row with a positive count exists.
    async fn exists(&self, fingerprint: &str) -> MetadataResult<bool>;

    /// Get the full row.
    async fn get_refcount(&self, fingerprint: &str) -> MetadataResult<Option<RefCountRow>>;

    /// Fingerprints whose count is zero. These are left behind only when a
    /// process stops between a decrement and the erase that follows it.
    async fn list_zero_counts(&self, limit: u32) -> MetadataResult<Vec<String>>;
}
