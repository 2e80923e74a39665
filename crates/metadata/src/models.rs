//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use sqlx::types::Json;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// User-supplied `x-amz-meta-*` pairs, keyed by the lowercase suffix.
pub type UserMetadata = BTreeMap<String, String>;

// =============================================================================
// Reference ledger
// =============================================================================

/// Reference count for one fingerprint.
#[derive(Debug, Clone, FromRow)]
pub struct RefCountRow {
    pub fingerprint: String,
    pub refcount: i64,
    pub created_at: OffsetDateTime,
    pub last_accessed_at: OffsetDateTime,
}

/// Outcome of releasing a reference that no catalog entry owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// No ledger row for the fingerprint.
    Absent,
    /// One reference released; `remaining` are left.
    Released { remaining: i64 },
    /// Every remaining reference belongs to a catalog entry, so nothing was released.
    Pinned { remaining: i64 },
}

// =============================================================================
// Bucket/object catalog
// =============================================================================

/// Bucket record.
#[derive(Debug, Clone, FromRow)]
pub struct BucketRow {
    pub name: String,
    pub created_at: OffsetDateTime,
}

/// Object record. Holds one reference to `fingerprint`.
#[derive(Debug, Clone, FromRow)]
pub struct ObjectRow {
    pub bucket: String,
    pub key: String,
    pub fingerprint: String,
    pub size_bytes: i64,
    pub etag: String,
    pub content_type: String,
    pub user_metadata: Json<UserMetadata>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields written by a put. Timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct ObjectWrite {
    pub bucket: String,
    pub key: String,
    pub fingerprint: String,
    pub size_bytes: i64,
    pub etag: String,
    pub content_type: String,
    pub user_metadata: UserMetadata,
}

/// Ledger effects of a catalog put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Fingerprint the key pointed at before this put, if any.
    pub previous: Option<String>,
    /// The new fingerprint's ledger row was created (count went from absent or zero to one).
    pub new_reference: bool,
    /// A fingerprint whose count reached zero because of this put.
    pub released: Option<String>,
}

/// A removed catalog entry and what is left of its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedObject {
    pub fingerprint: String,
    pub remaining: i64,
}

/// One page of a key-ordered listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectRow>,
    /// More keys sort after the last returned one.
    pub is_truncated: bool,
}

impl ObjectPage {
    /// Last key on the page, used to resume after it.
    pub fn last_key(&self) -> Option<&str> {
        self.objects.last().map(|o| o.key.as_str())
    }
}

// =============================================================================
// Multipart sessions
// =============================================================================

/// Open multipart session.
#[derive(Debug, Clone, FromRow)]
pub struct MultipartUploadRow {
    pub upload_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub user_metadata: Json<UserMetadata>,
    pub created_at: OffsetDateTime,
}

/// One staged part of a multipart session.
#[derive(Debug, Clone, FromRow)]
pub struct PartRow {
    pub upload_id: Uuid,
    pub part_number: i64,
    /// Staging location relative to the staging root.
    pub location: String,
    pub size_bytes: i64,
    pub etag: String,
    pub uploaded_at: OffsetDateTime,
}

/// Result of completing a multipart session.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub put: PutOutcome,
    /// Staging locations of every part the session held, listed or not.
    pub part_locations: Vec<String>,
}
