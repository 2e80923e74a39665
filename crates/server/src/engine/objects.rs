//! Buckets and objects.

use super::{Engine, EngineError, EngineResult, retry_on_conflict};
use crate::metrics::{OBJECTS_DELETED, OBJECTS_PUT, STORE_DURATION};
use hoard_core::{Etag, Fingerprint, UploadId, validate_bucket_name, validate_object_key};
use hoard_metadata::models::{BucketRow, ObjectRow, ObjectWrite, UserMetadata};
use hoard_metadata::{CatalogRepo, ContinuationToken, MetadataError};
use hoard_storage::{InputStream, RetrievedBlob, StorageError};
use std::time::Instant;

/// Largest page a listing returns, whatever the client asks for.
pub const MAX_KEYS_LIMIT: u32 = 1000;

/// Everything about a put except the bytes.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone)]
pub struct PutObjectResult {
    pub fingerprint: Fingerprint,
    pub etag: Etag,
    pub size: u64,
}

/// A listing request. `continuation_token` wins over `start_after` when both are set.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
    pub max_keys: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectRow>,
    pub is_truncated: bool,
    /// Opaque cursor for the next page, set only when truncated.
    pub next_continuation_token: Option<String>,
    /// The clamped page size actually applied.
    pub max_keys: u32,
}

impl Engine {
    #[tracing::instrument(skip(self))]
    pub async fn create_bucket(&self, bucket: &str) -> EngineResult<BucketRow> {
        validate_bucket_name(bucket)?;
        let metadata = &self.metadata;
        match retry_on_conflict("create_bucket", || metadata.create_bucket(bucket)).await {
            Ok(row) => {
                tracing::info!(bucket, "created bucket");
                Ok(row)
            }
            Err(MetadataError::AlreadyExists(_)) => Err(EngineError::BucketAlreadyExists {
                bucket: bucket.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an empty bucket. Multipart sessions still open in it are dropped.
    #[tracing::instrument(skip(self))]
    pub async fn delete_bucket(&self, bucket: &str) -> EngineResult<()> {
        let metadata = &self.metadata;
        let dropped = match retry_on_conflict("delete_bucket", || metadata.delete_bucket(bucket)).await {
            Ok(dropped) => dropped,
            Err(MetadataError::NotFound(_)) => {
                return Err(EngineError::BucketNotFound {
                    bucket: bucket.to_string(),
                });
            }
            Err(MetadataError::BucketNotEmpty(_)) => {
                return Err(EngineError::BucketNotEmpty {
                    bucket: bucket.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        for upload_id in dropped {
            let upload_id = UploadId::from_uuid(upload_id);
            // Waits out any part still streaming into the directory.
            let _session_lock = self.upload_locks.write(&upload_id.to_string()).await;
            if let Err(e) = self.staging.remove_upload(&upload_id).await {
                tracing::warn!(%upload_id, error = %e, "failed to remove staged parts of dropped upload");
            }
        }
        tracing::info!(bucket, "deleted bucket");
        Ok(())
    }

    pub async fn get_bucket(&self, bucket: &str) -> EngineResult<BucketRow> {
        self.metadata
            .get_bucket(bucket)
            .await?
            .ok_or_else(|| EngineError::BucketNotFound {
                bucket: bucket.to_string(),
            })
    }

    pub async fn list_buckets(&self) -> EngineResult<Vec<BucketRow>> {
        Ok(self.metadata.list_buckets().await?)
    }

    /// Store the bytes and point `(bucket, key)` at them.
    ///
    /// A key that already pointed elsewhere releases its old reference in the
    /// same transaction, and the old blob is erased if that was its last one.
    #[tracing::instrument(skip(self, request, input), fields(bucket = %request.bucket, key = %request.key))]
    pub async fn put_object(
        &self,
        request: PutObjectRequest,
        input: InputStream,
    ) -> EngineResult<PutObjectResult> {
        let start = Instant::now();
        // Checked up front so a bad key or missing bucket does not cost a full upload.
        validate_object_key(&request.key)?;
        self.get_bucket(&request.bucket).await?;

        let staged = self.blobs.stage(input).await?;
        let digest = staged.digest().clone();
        let write = ObjectWrite {
            bucket: request.bucket,
            key: request.key,
            fingerprint: digest.fingerprint.to_hex(),
            size_bytes: i64::try_from(digest.size)
                .map_err(|_| EngineError::InvalidArgument("object too large".to_string()))?,
            etag: digest.etag.as_str().to_string(),
            content_type: request.content_type,
            user_metadata: request.user_metadata,
        };

        let guard = self.lock_blob(&digest.fingerprint).await;
        let placed = self.commit_locked(staged, &guard).await?;
        let metadata = &self.metadata;
        let outcome = match retry_on_conflict("put_object", || metadata.put_object(&write)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Nothing references a blob this call placed, so take it back out.
                if placed && let Err(erase_err) = self.erase_if_unreferenced(&digest.fingerprint, &guard).await {
                    tracing::warn!(error = %erase_err, "failed to erase blob after rejected put");
                }
                return Err(match e {
                    MetadataError::NotFound(_) => EngineError::BucketNotFound {
                        bucket: write.bucket.clone(),
                    },
                    other => other.into(),
                });
            }
        };
        drop(guard);

        if let Some(released) = &outcome.released {
            self.reap_released(released).await;
        }

        OBJECTS_PUT.inc();
        STORE_DURATION.observe(start.elapsed().as_secs_f64());
        tracing::info!(
            fingerprint = %write.fingerprint,
            size = digest.size,
            retargeted = outcome.previous.is_some(),
            "put object"
        );

        Ok(PutObjectResult {
            fingerprint: digest.fingerprint,
            etag: digest.etag,
            size: digest.size,
        })
    }

    /// Catalog entry for `(bucket, key)`, distinguishing a missing bucket from a missing key.
    pub async fn head_object(&self, bucket: &str, key: &str) -> EngineResult<ObjectRow> {
        if let Some(row) = self.metadata.get_object(bucket, key).await? {
            return Ok(row);
        }
        self.get_bucket(bucket).await?;
        Err(EngineError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Catalog entry plus an open stream of its bytes.
    #[tracing::instrument(skip(self))]
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> EngineResult<(ObjectRow, RetrievedBlob)> {
        let row = self.head_object(bucket, key).await?;
        let fingerprint = Fingerprint::from_hex(&row.fingerprint)
            .map_err(|e| EngineError::Metadata(MetadataError::Internal(e.to_string())))?;

        match self.blobs.retrieve(&fingerprint).await {
            Ok(blob) => Ok((row, blob)),
            // Deleted between the catalog read and the open.
            Err(StorageError::NotFound(_)) => Err(EngineError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `(bucket, key)`. Returns false when there was nothing to remove.
    ///
    /// The catalog row and its reference go first, in one transaction; the
    /// blob is erased afterwards only if no reference is left.
    #[tracing::instrument(skip(self))]
    pub async fn delete_object(&self, bucket: &str, key: &str) -> EngineResult<bool> {
        let metadata = &self.metadata;
        let deleted = retry_on_conflict("delete_object", || metadata.delete_object(bucket, key)).await?;

        let Some(deleted) = deleted else {
            self.get_bucket(bucket).await?;
            tracing::debug!("nothing to delete");
            return Ok(false);
        };

        OBJECTS_DELETED.inc();
        if deleted.remaining == 0 {
            self.reap_released(&deleted.fingerprint).await;
        }
        tracing::info!(fingerprint = %deleted.fingerprint, remaining = deleted.remaining, "deleted object");
        Ok(true)
    }

    /// Delete several keys of one bucket, reporting each outcome separately.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> EngineResult<Vec<(String, EngineResult<bool>)>> {
        self.get_bucket(bucket).await?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let result = self.delete_object(bucket, key).await;
            results.push((key.clone(), result));
        }
        Ok(results)
    }

    /// One page of keys in lexicographic order.
    #[tracing::instrument(skip(self, request), fields(prefix = %request.prefix, max_keys = request.max_keys))]
    pub async fn list_objects(&self, bucket: &str, request: &ListRequest) -> EngineResult<ListPage> {
        self.get_bucket(bucket).await?;

        let max_keys = request.max_keys.min(MAX_KEYS_LIMIT);
        let token = match &request.continuation_token {
            Some(raw) => Some(
                ContinuationToken::decode(raw)
                    .map_err(|e| EngineError::InvalidArgument(e.to_string()))?,
            ),
            None => None,
        };
        if max_keys == 0 {
            return Ok(ListPage {
                max_keys,
                ..ListPage::default()
            });
        }

        let start_after = token
            .as_ref()
            .map(|t| t.last_key())
            .or(request.start_after.as_deref());

        let page = self
            .metadata
            .list_objects(bucket, &request.prefix, start_after, max_keys)
            .await?;

        let next_continuation_token = match (page.is_truncated, page.last_key()) {
            (true, Some(last)) => Some(ContinuationToken::after(last)?.encode()),
            _ => None,
        };

        Ok(ListPage {
            is_truncated: page.is_truncated,
            objects: page.objects,
            next_continuation_token,
            max_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine, held_input, input, session_lock_taken};
    use super::*;
    use crate::engine::NewUpload;
    use hoard_metadata::LedgerRepo;
    use std::time::Duration;

    fn request(bucket: &str, key: &str) -> PutObjectRequest {
        PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: hoard_core::DEFAULT_CONTENT_TYPE.to_string(),
            user_metadata: UserMetadata::new(),
        }
    }

    #[tokio::test]
    async fn test_put_into_missing_bucket_stores_nothing() {
        let (engine, _dir) = engine().await;
        let result = engine.put_object(request("ghost", "k"), input(b"orphan?")).await;
        assert!(matches!(result, Err(EngineError::BucketNotFound { .. })));
        assert!(
            !engine
                .blob_exists(&Fingerprint::compute(b"orphan?"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_overwrite_with_new_content_erases_old_blob() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("photos").await.unwrap();

        let first = engine.put_object(request("photos", "cat.jpg"), input(b"v1")).await.unwrap();
        let second = engine.put_object(request("photos", "cat.jpg"), input(b"v2")).await.unwrap();

        assert!(!engine.blob_exists(&first.fingerprint).await.unwrap());
        assert!(engine.blob_exists(&second.fingerprint).await.unwrap());
        assert!(
            engine
                .metadata()
                .get_refcount(&first.fingerprint.to_hex())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_overwrite_with_same_content_keeps_count() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("photos").await.unwrap();

        let first = engine.put_object(request("photos", "a"), input(b"same")).await.unwrap();
        engine.put_object(request("photos", "a"), input(b"same")).await.unwrap();

        let row = engine
            .metadata()
            .get_refcount(&first.fingerprint.to_hex())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.refcount, 1);
    }

    #[tokio::test]
    async fn test_delete_bucket_rules() {
        let (engine, _dir) = engine().await;
        assert!(matches!(
            engine.create_bucket("Bad_Name").await,
            Err(EngineError::InvalidBucketName(_))
        ));

        engine.create_bucket("docs").await.unwrap();
        assert!(matches!(
            engine.create_bucket("docs").await,
            Err(EngineError::BucketAlreadyExists { .. })
        ));

        engine.put_object(request("docs", "readme"), input(b"hi")).await.unwrap();
        assert!(matches!(
            engine.delete_bucket("docs").await,
            Err(EngineError::BucketNotEmpty { .. })
        ));

        assert!(engine.delete_object("docs", "readme").await.unwrap());
        engine.delete_bucket("docs").await.unwrap();
        assert!(matches!(
            engine.delete_bucket("docs").await,
            Err(EngineError::BucketNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_bucket_waits_for_part_in_flight() {
        let (engine, dir) = engine().await;
        engine.create_bucket("drafts").await.unwrap();
        let upload_id = engine
            .initiate_upload(NewUpload {
                bucket: "drafts".to_string(),
                key: "k".to_string(),
                content_type: hoard_core::DEFAULT_CONTENT_TYPE.to_string(),
                user_metadata: UserMetadata::new(),
            })
            .await
            .unwrap()
            .to_string();

        let (body, release) = held_input(b"half", b"done");
        let part = tokio::spawn({
            let (engine, upload_id) = (engine.clone(), upload_id.clone());
            async move { engine.upload_part("drafts", "k", &upload_id, 1, body).await }
        });
        session_lock_taken(&engine).await;

        let delete = tokio::spawn({
            let engine = engine.clone();
            async move { engine.delete_bucket("drafts").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!delete.is_finished());

        release.send(()).unwrap();
        assert!(matches!(
            part.await.unwrap(),
            Err(EngineError::UploadNotFound { .. })
        ));
        delete.await.unwrap().unwrap();

        let staged = dir.path().join("blobs").join("multipart").join(&upload_id);
        assert!(!staged.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_release_racing_reput_keeps_blob() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("docs").await.unwrap();
        let fingerprint = Fingerprint::compute(b"contested");

        for round in 0..20 {
            engine.put_object(request("docs", "old"), input(b"contested")).await.unwrap();

            let delete = tokio::spawn({
                let engine = engine.clone();
                async move { engine.delete_object("docs", "old").await }
            });
            let put = tokio::spawn({
                let engine = engine.clone();
                async move { engine.put_object(request("docs", "new"), input(b"contested")).await }
            });
            assert!(delete.await.unwrap().unwrap());
            put.await.unwrap().unwrap();

            assert!(engine.blob_exists(&fingerprint).await.unwrap(), "round {round}");
            let row = engine
                .metadata()
                .get_refcount(&fingerprint.to_hex())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(row.refcount, 1, "round {round}");

            assert!(engine.delete_object("docs", "new").await.unwrap());
            assert!(!engine.blob_exists(&fingerprint).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_quiet_but_missing_bucket_is_not() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("docs").await.unwrap();
        assert!(!engine.delete_object("docs", "nope").await.unwrap());
        assert!(matches!(
            engine.delete_object("nobucket", "nope").await,
            Err(EngineError::BucketNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_object_distinguishes_bucket_and_key() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("docs").await.unwrap();
        assert!(matches!(
            engine.get_object("docs", "missing").await,
            Err(EngineError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            engine.get_object("other", "missing").await,
            Err(EngineError::BucketNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_max_keys_clamped_and_zero() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("docs").await.unwrap();
        engine.put_object(request("docs", "a"), input(b"a")).await.unwrap();

        let page = engine
            .list_objects(
                "docs",
                &ListRequest {
                    max_keys: 5000,
                    ..ListRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.max_keys, MAX_KEYS_LIMIT);
        assert_eq!(page.objects.len(), 1);

        let empty = engine
            .list_objects("docs", &ListRequest::default())
            .await
            .unwrap();
        assert!(empty.objects.is_empty());
        assert!(!empty.is_truncated);
    }

    #[tokio::test]
    async fn test_list_rejects_garbage_token() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("docs").await.unwrap();
        let result = engine
            .list_objects(
                "docs",
                &ListRequest {
                    continuation_token: Some("!!not base64!!".to_string()),
                    max_keys: 10,
                    ..ListRequest::default()
                },
            )
            .await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }
}
