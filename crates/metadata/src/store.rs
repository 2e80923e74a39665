//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{CatalogRepo, LedgerRepo, MultipartRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: LedgerRepo + CatalogRepo + MultipartRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// The ledger, catalog and multipart tables share one database so that a
/// catalog change and the reference count it implies commit together.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite store at `path`.
    pub async fn new(path: impl AsRef<Path>, busy_timeout: Duration) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // A single connection serialises writers inside the process; the busy
            // timeout covers other processes sharing the file.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Statements shared by several transactions. Each takes an open connection so
// the caller decides the transaction boundary.
mod ops {
    use super::*;
    use crate::models::{ObjectWrite, PutOutcome};
    use sqlx::types::Json;

    pub(super) async fn bucket_exists(
        conn: &mut SqliteConnection,
        bucket: &str,
    ) -> MetadataResult<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Insert with count 1 or increment. Returns the resulting count.
    pub(super) async fn add_or_increment(
        conn: &mut SqliteConnection,
        fingerprint: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO refcounts (fingerprint, refcount, created_at, last_accessed_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                refcount = refcount + 1,
                last_accessed_at = excluded.last_accessed_at
            RETURNING refcount
            "#,
        )
        .bind(fingerprint)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Decrement and return the new count. A row at zero stays at zero.
    pub(super) async fn decrement(
        conn: &mut SqliteConnection,
        fingerprint: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE refcounts SET refcount = refcount - 1, last_accessed_at = ?
            WHERE fingerprint = ? AND refcount > 0
            RETURNING refcount
            "#,
        )
        .bind(now)
        .bind(fingerprint)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(count) = count {
            return Ok(count);
        }

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT refcount FROM refcounts WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_optional(&mut *conn)
                .await?;
        existing.ok_or_else(|| MetadataError::NotFound(format!("fingerprint {fingerprint}")))
    }

    /// Upsert the catalog row and apply the ledger effects of a retarget.
    pub(super) async fn put_object(
        conn: &mut SqliteConnection,
        object: &ObjectWrite,
        now: OffsetDateTime,
    ) -> MetadataResult<PutOutcome> {
        if !bucket_exists(conn, &object.bucket).await? {
            return Err(MetadataError::NotFound(format!("bucket {}", object.bucket)));
        }

        let previous: Option<String> =
            sqlx::query_scalar("SELECT fingerprint FROM objects WHERE bucket = ? AND key = ?")
                .bind(&object.bucket)
                .bind(&object.key)
                .fetch_optional(&mut *conn)
                .await?;

        let mut outcome = PutOutcome {
            previous: previous.clone(),
            ..PutOutcome::default()
        };

        if previous.as_deref() == Some(object.fingerprint.as_str()) {
            sqlx::query("UPDATE refcounts SET last_accessed_at = ? WHERE fingerprint = ?")
                .bind(now)
                .bind(&object.fingerprint)
                .execute(&mut *conn)
                .await?;
        } else {
            let count = add_or_increment(conn, &object.fingerprint, now).await?;
            outcome.new_reference = count == 1;

            if let Some(old) = previous {
                match decrement(conn, &old, now).await {
                    Ok(0) => outcome.released = Some(old),
                    Ok(_) => {}
                    Err(MetadataError::NotFound(_)) => {
                        tracing::warn!(
                            fingerprint = %old,
                            bucket = %object.bucket,
                            key = %object.key,
                            "catalog entry pointed at a fingerprint with no ledger row"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        sqlx::query(
            r#"
            INSERT INTO objects (
                bucket, key, fingerprint, size_bytes, etag, content_type,
                user_metadata, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                content_type = excluded.content_type,
                user_metadata = excluded.user_metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&object.bucket)
        .bind(&object.key)
        .bind(&object.fingerprint)
        .bind(object.size_bytes)
        .bind(&object.etag)
        .bind(&object.content_type)
        .bind(Json(&object.user_metadata))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(outcome)
    }

    /// Delete part rows and the session row. Returns the part locations, or
    /// `None` when the session did not exist.
    pub(super) async fn delete_upload(
        conn: &mut SqliteConnection,
        upload_id: uuid::Uuid,
    ) -> MetadataResult<Option<Vec<String>>> {
        let locations: Vec<String> =
            sqlx::query_scalar("SELECT location FROM multipart_parts WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_all(&mut *conn)
                .await?;

        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&mut *conn)
            .await?;
        let result = sqlx::query("DELETE FROM multipart_uploads WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(locations))
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use sqlx::types::Json;
    use uuid::Uuid;

    #[async_trait]
    impl LedgerRepo for SqliteStore {
        async fn add_or_increment(&self, fingerprint: &str) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;
            let count = ops::add_or_increment(&mut tx, fingerprint, OffsetDateTime::now_utc()).await?;
            tx.commit().await?;
            Ok(count == 1)
        }

        async fn increment(&self, fingerprint: &str) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE refcounts SET refcount = refcount + 1, last_accessed_at = ? WHERE fingerprint = ?",
            )
            .bind(OffsetDateTime::now_utc())
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("fingerprint {fingerprint}")));
            }
            Ok(())
        }

        async fn decrement(&self, fingerprint: &str) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;
            let count = ops::decrement(&mut tx, fingerprint, OffsetDateTime::now_utc()).await?;
            tx.commit().await?;
            Ok(count)
        }

        async fn release_unowned(&self, fingerprint: &str) -> MetadataResult<ReleaseOutcome> {
            let mut tx = self.pool.begin().await?;

            let current: Option<i64> =
                sqlx::query_scalar("SELECT refcount FROM refcounts WHERE fingerprint = ?")
                    .bind(fingerprint)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(current) = current else {
                return Ok(ReleaseOutcome::Absent);
            };

            let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_one(&mut *tx)
                .await?;
            if current <= owned {
                return Ok(ReleaseOutcome::Pinned { remaining: current });
            }

            let remaining = ops::decrement(&mut tx, fingerprint, OffsetDateTime::now_utc()).await?;
            tx.commit().await?;
            Ok(ReleaseOutcome::Released { remaining })
        }

        async fn remove(&self, fingerprint: &str) -> MetadataResult<()> {
            sqlx::query("DELETE FROM refcounts WHERE fingerprint = ?")
                .bind(fingerprint)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn remove_if_zero(&self, fingerprint: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM refcounts WHERE fingerprint = ? AND refcount = 0")
                .bind(fingerprint)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn exists(&self, fingerprint: &str) -> MetadataResult<bool> {
            let row: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM refcounts WHERE fingerprint = ? AND refcount > 0")
                    .bind(fingerprint)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.is_some())
        }

        async fn get_refcount(&self, fingerprint: &str) -> MetadataResult<Option<RefCountRow>> {
            let row = sqlx::query_as::<_, RefCountRow>(
                "SELECT * FROM refcounts WHERE fingerprint = ?",
            )
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_zero_counts(&self, limit: u32) -> MetadataResult<Vec<String>> {
            let rows = sqlx::query_scalar(
                "SELECT fingerprint FROM refcounts WHERE refcount = 0 ORDER BY last_accessed_at LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl CatalogRepo for SqliteStore {
        async fn create_bucket(&self, name: &str) -> MetadataResult<BucketRow> {
            let row = BucketRow {
                name: name.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            let result = sqlx::query(
                "INSERT INTO buckets (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
            )
            .bind(&row.name)
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::AlreadyExists(format!("bucket {name}")));
            }
            Ok(row)
        }

        async fn delete_bucket(&self, name: &str) -> MetadataResult<Vec<Uuid>> {
            let mut tx = self.pool.begin().await?;

            if !ops::bucket_exists(&mut tx, name).await? {
                return Err(MetadataError::NotFound(format!("bucket {name}")));
            }

            let objects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE bucket = ?")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;
            if objects > 0 {
                return Err(MetadataError::BucketNotEmpty(format!(
                    "bucket {name} holds {objects} objects"
                )));
            }

            let uploads: Vec<Uuid> =
                sqlx::query_scalar("SELECT upload_id FROM multipart_uploads WHERE bucket = ?")
                    .bind(name)
                    .fetch_all(&mut *tx)
                    .await?;
            for upload_id in &uploads {
                ops::delete_upload(&mut tx, *upload_id).await?;
            }

            sqlx::query("DELETE FROM buckets WHERE name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(uploads)
        }

        async fn get_bucket(&self, name: &str) -> MetadataResult<Option<BucketRow>> {
            let row = sqlx::query_as::<_, BucketRow>("SELECT * FROM buckets WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_buckets(&self) -> MetadataResult<Vec<BucketRow>> {
            let rows = sqlx::query_as::<_, BucketRow>("SELECT * FROM buckets ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn put_object(&self, object: &ObjectWrite) -> MetadataResult<PutOutcome> {
            let mut tx = self.pool.begin().await?;
            let outcome = ops::put_object(&mut tx, object, OffsetDateTime::now_utc()).await?;
            tx.commit().await?;
            Ok(outcome)
        }

        async fn get_object(&self, bucket: &str, key: &str) -> MetadataResult<Option<ObjectRow>> {
            let row = sqlx::query_as::<_, ObjectRow>(
                "SELECT * FROM objects WHERE bucket = ? AND key = ?",
            )
            .bind(bucket)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn delete_object(
            &self,
            bucket: &str,
            key: &str,
        ) -> MetadataResult<Option<DeletedObject>> {
            let mut tx = self.pool.begin().await?;

            let fingerprint: Option<String> = sqlx::query_scalar(
                "DELETE FROM objects WHERE bucket = ? AND key = ? RETURNING fingerprint",
            )
            .bind(bucket)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(fingerprint) = fingerprint else {
                return Ok(None);
            };

            let remaining = match ops::decrement(&mut tx, &fingerprint, OffsetDateTime::now_utc())
                .await
            {
                Ok(remaining) => remaining,
                Err(MetadataError::NotFound(_)) => {
                    tracing::warn!(
                        fingerprint = %fingerprint,
                        bucket = %bucket,
                        key = %key,
                        "deleted catalog entry had no ledger row"
                    );
                    0
                }
                Err(e) => return Err(e),
            };

            tx.commit().await?;
            Ok(Some(DeletedObject {
                fingerprint,
                remaining,
            }))
        }

        async fn list_objects(
            &self,
            bucket: &str,
            prefix: &str,
            start_after: Option<&str>,
            max_keys: u32,
        ) -> MetadataResult<ObjectPage> {
            if max_keys == 0 {
                return Ok(ObjectPage::default());
            }

            // One extra row tells whether the listing continues.
            let mut objects = sqlx::query_as::<_, ObjectRow>(
                r#"
                SELECT * FROM objects
                WHERE bucket = ?
                  AND substr(key, 1, length(?)) = ?
                  AND key > ?
                ORDER BY key
                LIMIT ?
                "#,
            )
            .bind(bucket)
            .bind(prefix)
            .bind(prefix)
            .bind(start_after.unwrap_or(""))
            .bind(i64::from(max_keys) + 1)
            .fetch_all(&self.pool)
            .await?;

            let is_truncated = objects.len() > max_keys as usize;
            objects.truncate(max_keys as usize);
            Ok(ObjectPage {
                objects,
                is_truncated,
            })
        }

        async fn count_object_refs(&self, fingerprint: &str) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }
    }

    #[async_trait]
    impl MultipartRepo for SqliteStore {
        async fn create_upload(&self, upload: &MultipartUploadRow) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            if !ops::bucket_exists(&mut tx, &upload.bucket).await? {
                return Err(MetadataError::NotFound(format!("bucket {}", upload.bucket)));
            }

            sqlx::query(
                r#"
                INSERT INTO multipart_uploads (
                    upload_id, bucket, key, content_type, user_metadata, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(upload.upload_id)
            .bind(&upload.bucket)
            .bind(&upload.key)
            .bind(&upload.content_type)
            .bind(Json(&upload.user_metadata.0))
            .bind(upload.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<MultipartUploadRow>> {
            let row = sqlx::query_as::<_, MultipartUploadRow>(
                "SELECT * FROM multipart_uploads WHERE upload_id = ?",
            )
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn upsert_part(&self, part: &PartRow) -> MetadataResult<Option<String>> {
            let mut tx = self.pool.begin().await?;

            let open: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM multipart_uploads WHERE upload_id = ?")
                    .bind(part.upload_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if open.is_none() {
                return Err(MetadataError::NotFound(format!("upload {}", part.upload_id)));
            }

            let replaced: Option<String> = sqlx::query_scalar(
                "SELECT location FROM multipart_parts WHERE upload_id = ? AND part_number = ?",
            )
            .bind(part.upload_id)
            .bind(part.part_number)
            .fetch_optional(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO multipart_parts (
                    upload_id, part_number, location, size_bytes, etag, uploaded_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(upload_id, part_number) DO UPDATE SET
                    location = excluded.location,
                    size_bytes = excluded.size_bytes,
                    etag = excluded.etag,
                    uploaded_at = excluded.uploaded_at
                "#,
            )
            .bind(part.upload_id)
            .bind(part.part_number)
            .bind(&part.location)
            .bind(part.size_bytes)
            .bind(&part.etag)
            .bind(part.uploaded_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(replaced)
        }

        async fn list_parts(&self, upload_id: Uuid) -> MetadataResult<Vec<PartRow>> {
            let rows = sqlx::query_as::<_, PartRow>(
                "SELECT * FROM multipart_parts WHERE upload_id = ? ORDER BY part_number",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn complete_upload(
            &self,
            upload_id: Uuid,
            object: &ObjectWrite,
        ) -> MetadataResult<CompletedUpload> {
            let mut tx = self.pool.begin().await?;
            let now = OffsetDateTime::now_utc();

            // Checked first: a live session implies a live bucket, so a
            // NotFound from here on can only mean the session.
            let open: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM multipart_uploads WHERE upload_id = ?")
                    .bind(upload_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if open.is_none() {
                return Err(MetadataError::NotFound(format!("upload {upload_id}")));
            }

            let put = ops::put_object(&mut tx, object, now).await?;
            let part_locations = ops::delete_upload(&mut tx, upload_id)
                .await?
                .unwrap_or_default();

            tx.commit().await?;
            Ok(CompletedUpload {
                put,
                part_locations,
            })
        }

        async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<Option<Vec<String>>> {
            let mut tx = self.pool.begin().await?;
            let locations = ops::delete_upload(&mut tx, upload_id).await?;
            tx.commit().await?;
            Ok(locations)
        }

        async fn list_uploads_created_before(
            &self,
            cutoff: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<MultipartUploadRow>> {
            let rows = sqlx::query_as::<_, MultipartUploadRow>(
                "SELECT * FROM multipart_uploads WHERE created_at < ? ORDER BY created_at LIMIT ?",
            )
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn upload_exists(&self, upload_id: Uuid) -> MetadataResult<bool> {
            let row: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM multipart_uploads WHERE upload_id = ?")
                    .bind(upload_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.is_some())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Reference ledger: one row per stored fingerprint
CREATE TABLE IF NOT EXISTS refcounts (
    fingerprint TEXT PRIMARY KEY,
    refcount INTEGER NOT NULL CHECK (refcount >= 0),
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_refcounts_zero ON refcounts(refcount) WHERE refcount = 0;

-- Buckets
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- Objects: each row holds one reference to its fingerprint
CREATE TABLE IF NOT EXISTS objects (
    bucket TEXT NOT NULL REFERENCES buckets(name),
    key TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    etag TEXT NOT NULL,
    content_type TEXT NOT NULL,
    user_metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (bucket, key)
);
CREATE INDEX IF NOT EXISTS idx_objects_fingerprint ON objects(fingerprint);

-- Multipart sessions
CREATE TABLE IF NOT EXISTS multipart_uploads (
    upload_id BLOB PRIMARY KEY,
    bucket TEXT NOT NULL REFERENCES buckets(name),
    key TEXT NOT NULL,
    content_type TEXT NOT NULL,
    user_metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_multipart_uploads_created ON multipart_uploads(created_at);

CREATE TABLE IF NOT EXISTS multipart_parts (
    upload_id BLOB NOT NULL REFERENCES multipart_uploads(upload_id) ON DELETE CASCADE,
    part_number INTEGER NOT NULL CHECK (part_number BETWEEN 1 AND 10000),
    location TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    etag TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, part_number)
);
"#;
