//! Multipart upload coordinator.
//!
//! A session moves from open to either committed (`complete`) or aborted
//! (`abort`). Parts are staged outside the blob tree and only become visible
//! once `complete` has assembled them into a single blob and cataloged it.

use super::{Engine, EngineError, EngineResult, retry_on_conflict};
use crate::metrics::{MULTIPART_ABORTED, MULTIPART_COMPLETED, MULTIPART_INITIATED};
use futures::{StreamExt, TryStreamExt};
use hoard_core::{Etag, Fingerprint, PartNumber, UploadId, validate_object_key};
use hoard_metadata::models::{MultipartUploadRow, ObjectWrite, PartRow, UserMetadata};
use hoard_metadata::{MetadataError, MultipartRepo};
use hoard_storage::{InputStream, PartStaging};
use sqlx::types::Json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use time::OffsetDateTime;

/// Parameters for opening a session.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub user_metadata: UserMetadata,
}

/// One entry of a completion manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPart {
    pub part_number: u32,
    /// Entity tag the client saw when it uploaded the part, if it sent one.
    pub etag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletedObject {
    pub fingerprint: Fingerprint,
    pub etag: Etag,
    pub size: u64,
}

/// Resolve a client supplied upload ID. Anything unparseable names no session.
fn parse_upload_id(upload_id: &str) -> EngineResult<UploadId> {
    UploadId::parse(upload_id).map_err(|_| EngineError::UploadNotFound {
        upload_id: upload_id.to_string(),
    })
}

/// Pick the staged locations named by `manifest`, in ascending part order.
///
/// Every listed part must be staged, and a listed entity tag must match the
/// staged one. Repeated part numbers collapse into one.
fn select_parts(manifest: &[ManifestPart], staged: &[PartRow]) -> EngineResult<Vec<String>> {
    if manifest.is_empty() {
        return Err(EngineError::InvalidRequest(
            "completion manifest lists no parts".to_string(),
        ));
    }

    let by_number: BTreeMap<i64, &PartRow> = staged.iter().map(|p| (p.part_number, p)).collect();
    let mut selected = BTreeSet::new();

    for entry in manifest {
        let part = by_number
            .get(&i64::from(entry.part_number))
            .ok_or_else(|| EngineError::InvalidPart {
                part_number: entry.part_number,
                reason: "part was never uploaded".to_string(),
            })?;

        if let Some(claimed) = &entry.etag {
            let claimed = Etag::parse(claimed).map_err(|_| EngineError::InvalidPart {
                part_number: entry.part_number,
                reason: format!("malformed entity tag {claimed}"),
            })?;
            if claimed.as_str() != part.etag {
                return Err(EngineError::InvalidPart {
                    part_number: entry.part_number,
                    reason: "entity tag does not match the uploaded part".to_string(),
                });
            }
        }
        selected.insert(part.part_number);
    }

    // BTreeSet iteration is ascending regardless of manifest order.
    Ok(selected
        .into_iter()
        .filter_map(|n| by_number.get(&n).map(|p| p.location.clone()))
        .collect())
}

/// Chain staged parts into one input stream, opening each only when the previous one is drained.
fn concat_parts(staging: Arc<dyn PartStaging>, locations: Vec<String>) -> InputStream {
    let stream = futures::stream::iter(locations)
        .then(move |location| {
            let staging = staging.clone();
            async move { staging.open_part(&location).await }
        })
        .try_flatten()
        .map_err(std::io::Error::other);
    Box::pin(stream)
}

impl Engine {
    /// Open a multipart session. The bucket must exist.
    #[tracing::instrument(skip(self, upload), fields(bucket = %upload.bucket, key = %upload.key))]
    pub async fn initiate_upload(&self, upload: NewUpload) -> EngineResult<UploadId> {
        validate_object_key(&upload.key)?;
        let upload_id = UploadId::new();
        let row = MultipartUploadRow {
            upload_id: *upload_id.as_uuid(),
            bucket: upload.bucket,
            key: upload.key,
            content_type: upload.content_type,
            user_metadata: Json(upload.user_metadata),
            created_at: OffsetDateTime::now_utc(),
        };

        let metadata = &self.metadata;
        match retry_on_conflict("create_upload", || metadata.create_upload(&row)).await {
            Ok(()) => {}
            Err(MetadataError::NotFound(_)) => {
                return Err(EngineError::BucketNotFound { bucket: row.bucket });
            }
            Err(e) => return Err(e.into()),
        }

        MULTIPART_INITIATED.inc();
        tracing::info!(%upload_id, "initiated multipart upload");
        Ok(upload_id)
    }

    /// Load a session and check it belongs to `(bucket, key)`.
    async fn session_for(
        &self,
        upload_id: &UploadId,
        bucket: &str,
        key: &str,
    ) -> EngineResult<Option<MultipartUploadRow>> {
        let Some(session) = self.metadata.get_upload(*upload_id.as_uuid()).await? else {
            return Ok(None);
        };
        if session.bucket != bucket || session.key != key {
            return Err(EngineError::InvalidRequest(format!(
                "upload {upload_id} does not belong to {bucket}/{key}"
            )));
        }
        Ok(Some(session))
    }

    /// Stage one part, replacing any earlier upload of the same part number.
    #[tracing::instrument(skip(self, input))]
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        input: InputStream,
    ) -> EngineResult<Etag> {
        let part_number = PartNumber::new(part_number)?;
        let upload_id = parse_upload_id(upload_id)?;
        let not_found = || EngineError::UploadNotFound {
            upload_id: upload_id.to_string(),
        };

        let _session_lock = self.upload_locks.read(&upload_id.to_string()).await;
        match self.session_for(&upload_id, bucket, key).await {
            Ok(Some(_)) => {}
            // A session opened for another object is not visible under this one.
            Ok(None) | Err(EngineError::InvalidRequest(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        }

        let staged = self.staging.stage_part(&upload_id, part_number, input).await?;
        let row = PartRow {
            upload_id: *upload_id.as_uuid(),
            part_number: i64::from(part_number.get()),
            location: staged.location.clone(),
            size_bytes: i64::try_from(staged.size)
                .map_err(|_| EngineError::InvalidArgument("part too large".to_string()))?,
            etag: staged.etag.as_str().to_string(),
            uploaded_at: OffsetDateTime::now_utc(),
        };

        let metadata = &self.metadata;
        let replaced = match retry_on_conflict("upsert_part", || metadata.upsert_part(&row)).await {
            Ok(replaced) => replaced,
            Err(e) => {
                if let Err(cleanup) = self.staging.remove_part(&staged.location).await {
                    tracing::warn!(error = %cleanup, "failed to remove unrecorded part");
                }
                return Err(match e {
                    // The session was dropped with its bucket while the part streamed in.
                    MetadataError::NotFound(_) => not_found(),
                    other => other.into(),
                });
            }
        };

        if let Some(old) = replaced
            && let Err(e) = self.staging.remove_part(&old).await
        {
            tracing::warn!(location = %old, error = %e, "failed to remove replaced part");
        }

        tracing::debug!(size = staged.size, etag = %staged.etag, "staged part");
        Ok(staged.etag)
    }

    /// Assemble the listed parts into one object.
    ///
    /// Parts are concatenated in ascending part number order whatever order
    /// the manifest uses. If anything fails after the blob is placed, the
    /// session is left intact so the client can retry; the blob stays and is
    /// reused by the retry.
    #[tracing::instrument(skip(self, manifest), fields(parts = manifest.len()))]
    pub async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        manifest: &[ManifestPart],
    ) -> EngineResult<CompletedObject> {
        let upload_id = parse_upload_id(upload_id)?;
        let not_found = || EngineError::UploadNotFound {
            upload_id: upload_id.to_string(),
        };

        let _session_lock = self.upload_locks.write(&upload_id.to_string()).await;
        let session = self
            .session_for(&upload_id, bucket, key)
            .await?
            .ok_or_else(not_found)?;

        let staged_parts = self.metadata.list_parts(*upload_id.as_uuid()).await?;
        let locations = select_parts(manifest, &staged_parts)?;

        let staged = self
            .blobs
            .stage(concat_parts(self.staging.clone(), locations))
            .await?;
        let digest = staged.digest().clone();

        let write = ObjectWrite {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            fingerprint: digest.fingerprint.to_hex(),
            size_bytes: i64::try_from(digest.size)
                .map_err(|_| EngineError::InvalidArgument("object too large".to_string()))?,
            etag: digest.etag.as_str().to_string(),
            content_type: session.content_type.clone(),
            user_metadata: session.user_metadata.0.clone(),
        };

        let guard = self.lock_blob(&digest.fingerprint).await;
        self.commit_locked(staged, &guard).await?;
        let metadata = &self.metadata;
        let completed = match retry_on_conflict("complete_upload", || {
            metadata.complete_upload(*upload_id.as_uuid(), &write)
        })
        .await
        {
            Ok(completed) => completed,
            Err(e) => {
                // The placed blob stays for a retry; the orphan sweep takes it otherwise.
                tracing::warn!(fingerprint = %write.fingerprint, error = %e, "completion rejected after blob was placed");
                return Err(match e {
                    MetadataError::NotFound(_) => not_found(),
                    other => other.into(),
                });
            }
        };
        drop(guard);

        if let Some(released) = &completed.put.released {
            self.reap_released(released).await;
        }
        // Unlisted parts live in the same directory and go with it.
        if let Err(e) = self.staging.remove_upload(&upload_id).await {
            tracing::warn!(error = %e, "failed to remove staged parts after completion");
        }

        MULTIPART_COMPLETED.inc();
        tracing::info!(
            fingerprint = %write.fingerprint,
            size = digest.size,
            "completed multipart upload"
        );

        Ok(CompletedObject {
            fingerprint: digest.fingerprint,
            etag: digest.etag,
            size: digest.size,
        })
    }

    /// Discard a session and its staged parts.
    ///
    /// Unknown or already aborted sessions are not an error. Returns whether a
    /// session was actually dropped. The content store and ledger are never touched.
    #[tracing::instrument(skip(self))]
    pub async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> EngineResult<bool> {
        let Ok(upload_id) = UploadId::parse(upload_id) else {
            tracing::debug!("abort of unparseable upload ID ignored");
            return Ok(false);
        };

        let _session_lock = self.upload_locks.write(&upload_id.to_string()).await;
        match self.session_for(&upload_id, bucket, key).await {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(false),
            Err(EngineError::InvalidRequest(reason)) => {
                tracing::debug!(%reason, "abort for a different object ignored");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        self.drop_session(&upload_id).await
    }

    /// Delete a session row and its staged bytes. The caller holds the session lock.
    pub(super) async fn drop_session(&self, upload_id: &UploadId) -> EngineResult<bool> {
        let metadata = &self.metadata;
        let dropped =
            retry_on_conflict("delete_upload", || metadata.delete_upload(*upload_id.as_uuid())).await?;
        self.staging.remove_upload(upload_id).await?;

        if dropped.is_some() {
            MULTIPART_ABORTED.inc();
            tracing::info!(%upload_id, "aborted multipart upload");
        }
        Ok(dropped.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine, held_input, input, session_lock_taken};
    use super::*;
    use futures::TryStreamExt;
    use hoard_metadata::{CatalogRepo, LedgerRepo, SqliteStore};
    use std::time::Duration;

    fn new_upload(bucket: &str, key: &str) -> NewUpload {
        NewUpload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: "text/plain".to_string(),
            user_metadata: UserMetadata::from([("owner".to_string(), "ops".to_string())]),
        }
    }

    fn manifest(numbers: &[u32]) -> Vec<ManifestPart> {
        numbers
            .iter()
            .map(|&part_number| ManifestPart {
                part_number,
                etag: None,
            })
            .collect()
    }

    async fn read_object(engine: &Engine, bucket: &str, key: &str) -> Vec<u8> {
        let (_, blob) = engine.get_object(bucket, key).await.unwrap();
        let chunks: Vec<bytes::Bytes> = blob.stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_parts_assembled_in_ascending_order() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "movie")).await.unwrap().to_string();

        engine.upload_part("media", "movie", &id, 2, input(b"world")).await.unwrap();
        engine.upload_part("media", "movie", &id, 1, input(b"hello ")).await.unwrap();

        let done = engine
            .complete_upload("media", "movie", &id, &manifest(&[2, 1]))
            .await
            .unwrap();
        assert_eq!(done.etag, Etag::compute(b"hello world"));
        assert_eq!(read_object(&engine, "media", "movie").await, b"hello world");

        let row = engine.head_object("media", "movie").await.unwrap();
        assert_eq!(row.content_type, "text/plain");
        assert_eq!(row.user_metadata.0.get("owner").map(String::as_str), Some("ops"));
        assert!(!engine.metadata().upload_exists(*UploadId::parse(&id).unwrap().as_uuid()).await.unwrap());
    }

    #[tokio::test]
    async fn test_reuploaded_part_replaces_earlier_bytes() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();

        engine.upload_part("media", "k", &id, 1, input(b"first")).await.unwrap();
        let etag = engine.upload_part("media", "k", &id, 1, input(b"second")).await.unwrap();
        assert_eq!(etag, Etag::compute(b"second"));

        engine.complete_upload("media", "k", &id, &manifest(&[1])).await.unwrap();
        assert_eq!(read_object(&engine, "media", "k").await, b"second");
    }

    #[tokio::test]
    async fn test_unstaged_part_is_invalid_and_session_survives() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        engine.upload_part("media", "k", &id, 1, input(b"one")).await.unwrap();

        let result = engine.complete_upload("media", "k", &id, &manifest(&[1, 2])).await;
        assert!(matches!(result, Err(EngineError::InvalidPart { part_number: 2, .. })));

        // Still open: a corrected manifest succeeds.
        engine.complete_upload("media", "k", &id, &manifest(&[1])).await.unwrap();
        assert_eq!(read_object(&engine, "media", "k").await, b"one");
    }

    #[tokio::test]
    async fn test_manifest_etag_must_match() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        let etag = engine.upload_part("media", "k", &id, 1, input(b"one")).await.unwrap();

        let wrong = vec![ManifestPart {
            part_number: 1,
            etag: Some(Etag::compute(b"two").quoted()),
        }];
        assert!(matches!(
            engine.complete_upload("media", "k", &id, &wrong).await,
            Err(EngineError::InvalidPart { .. })
        ));

        let right = vec![
            ManifestPart {
                part_number: 1,
                etag: Some(etag.quoted()),
            },
            ManifestPart {
                part_number: 1,
                etag: None,
            },
        ];
        let done = engine.complete_upload("media", "k", &id, &right).await.unwrap();
        assert_eq!(done.size, 3);
    }

    #[tokio::test]
    async fn test_empty_manifest_rejected() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        assert!(matches!(
            engine.complete_upload("media", "k", &id, &[]).await,
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_part_number_bounds() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        for bad in [0, 10_001] {
            assert!(matches!(
                engine.upload_part("media", "k", &id, bad, input(b"x")).await,
                Err(EngineError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_upload_rejected_but_abort_tolerant() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let unknown = UploadId::new().to_string();

        assert!(matches!(
            engine.upload_part("media", "k", &unknown, 1, input(b"x")).await,
            Err(EngineError::UploadNotFound { .. })
        ));
        assert!(matches!(
            engine.complete_upload("media", "k", &unknown, &manifest(&[1])).await,
            Err(EngineError::UploadNotFound { .. })
        ));
        assert!(!engine.abort_upload("media", "k", &unknown).await.unwrap());
        assert!(!engine.abort_upload("media", "k", "garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_abort_leaves_no_trace() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        engine.upload_part("media", "k", &id, 1, input(b"discard me")).await.unwrap();

        assert!(engine.abort_upload("media", "k", &id).await.unwrap());
        assert!(!engine.abort_upload("media", "k", &id).await.unwrap());

        let fingerprint = Fingerprint::compute(b"discard me");
        assert!(!engine.blob_exists(&fingerprint).await.unwrap());
        assert!(engine.metadata().get_refcount(&fingerprint.to_hex()).await.unwrap().is_none());
        assert!(engine.metadata().get_object("media", "k").await.unwrap().is_none());
        assert!(matches!(
            engine.upload_part("media", "k", &id, 2, input(b"late")).await,
            Err(EngineError::UploadNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_against_other_key_rejected() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        engine.upload_part("media", "k", &id, 1, input(b"x")).await.unwrap();

        assert!(matches!(
            engine.complete_upload("media", "other", &id, &manifest(&[1])).await,
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_initiate_requires_bucket() {
        let (engine, _dir) = engine().await;
        assert!(matches!(
            engine.initiate_upload(new_upload("absent", "k")).await,
            Err(EngineError::BucketNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_waits_for_part_in_flight() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        engine.upload_part("media", "k", &id, 1, input(b"hello ")).await.unwrap();

        let (body, release) = held_input(b"wor", b"ld");
        let part = tokio::spawn({
            let (engine, id) = (engine.clone(), id.clone());
            async move { engine.upload_part("media", "k", &id, 2, body).await }
        });
        session_lock_taken(&engine).await;

        let complete = tokio::spawn({
            let (engine, id) = (engine.clone(), id.clone());
            async move { engine.complete_upload("media", "k", &id, &manifest(&[1, 2])).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!complete.is_finished());

        release.send(()).unwrap();
        part.await.unwrap().unwrap();
        let done = complete.await.unwrap().unwrap();
        assert_eq!(done.etag, Etag::compute(b"hello world"));
        assert_eq!(read_object(&engine, "media", "k").await, b"hello world");
    }

    #[tokio::test]
    async fn test_sessions_do_not_contend() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("media").await.unwrap();
        let slow = engine.initiate_upload(new_upload("media", "slow")).await.unwrap().to_string();
        let quick = engine.initiate_upload(new_upload("media", "quick")).await.unwrap().to_string();
        engine.upload_part("media", "quick", &quick, 1, input(b"done")).await.unwrap();

        let (body, release) = held_input(b"still ", b"going");
        let part = tokio::spawn({
            let (engine, slow) = (engine.clone(), slow.clone());
            async move { engine.upload_part("media", "slow", &slow, 1, body).await }
        });
        session_lock_taken(&engine).await;

        let done = tokio::time::timeout(
            Duration::from_secs(5),
            engine.complete_upload("media", "quick", &quick, &manifest(&[1])),
        )
        .await
        .expect("completion of another upload waited on the held part")
        .unwrap();
        assert_eq!(done.size, 4);

        release.send(()).unwrap();
        part.await.unwrap().unwrap();
        engine.complete_upload("media", "slow", &slow, &manifest(&[1])).await.unwrap();
        assert_eq!(read_object(&engine, "media", "slow").await, b"still going");
    }

    #[tokio::test]
    async fn test_rejected_completion_keeps_blob_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = hoard_storage::from_config(&hoard_core::config::StorageConfig::Filesystem {
            path: dir.path().join("blobs"),
            staging_path: None,
        })
        .await
        .unwrap();
        let store = Arc::new(
            SqliteStore::new(dir.path().join("meta.db"), Duration::from_secs(5))
                .await
                .unwrap(),
        );
        let engine = Engine::new(storage, store.clone());
        engine.create_bucket("media").await.unwrap();
        let id = engine.initiate_upload(new_upload("media", "k")).await.unwrap().to_string();
        engine.upload_part("media", "k", &id, 1, input(b"assembled")).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_objects BEFORE INSERT ON objects \
             BEGIN SELECT RAISE(ABORT, 'catalog unavailable'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();
        assert!(engine.complete_upload("media", "k", &id, &manifest(&[1])).await.is_err());

        let fingerprint = Fingerprint::compute(b"assembled");
        assert!(engine.blob_exists(&fingerprint).await.unwrap());
        assert!(engine.metadata().upload_exists(*UploadId::parse(&id).unwrap().as_uuid()).await.unwrap());

        sqlx::query("DROP TRIGGER reject_objects")
            .execute(store.pool())
            .await
            .unwrap();
        engine.complete_upload("media", "k", &id, &manifest(&[1])).await.unwrap();
        let row = engine
            .metadata()
            .get_refcount(&fingerprint.to_hex())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.refcount, 1);
        assert_eq!(read_object(&engine, "media", "k").await, b"assembled");
    }

    #[test]
    fn test_select_parts_orders_and_dedups() {
        let now = OffsetDateTime::now_utc();
        let upload_id = uuid::Uuid::new_v4();
        let staged: Vec<PartRow> = [3, 1, 2]
            .into_iter()
            .map(|n| PartRow {
                upload_id,
                part_number: n,
                location: format!("loc-{n}"),
                size_bytes: 1,
                etag: Etag::compute(&[n as u8]).as_str().to_string(),
                uploaded_at: now,
            })
            .collect();

        let locations = select_parts(&manifest(&[3, 1, 3]), &staged).unwrap();
        assert_eq!(locations, vec!["loc-1".to_string(), "loc-3".to_string()]);
    }
}
