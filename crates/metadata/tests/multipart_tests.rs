// Multipart session rows: part overwrite, completion and abort

mod common;

use common::{TestStore, fp, object};
use hoard_metadata::models::{MultipartUploadRow, PartRow, UserMetadata};
use hoard_metadata::{CatalogRepo, LedgerRepo, MetadataError, MultipartRepo};
use sqlx::types::Json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn session(bucket: &str, key: &str) -> MultipartUploadRow {
    MultipartUploadRow {
        upload_id: Uuid::new_v4(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        content_type: "video/mp4".to_string(),
        user_metadata: Json(UserMetadata::from([("camera".to_string(), "a7".to_string())])),
        created_at: OffsetDateTime::now_utc(),
    }
}

fn part(upload_id: Uuid, part_number: i64, location: &str) -> PartRow {
    PartRow {
        upload_id,
        part_number,
        location: location.to_string(),
        size_bytes: 5,
        etag: "0cc175b9c0f1b6a831c399e269772661".to_string(),
        uploaded_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn test_initiate_requires_bucket() {
    let t = TestStore::new().await;
    assert!(matches!(
        t.store.create_upload(&session("missing", "k")).await,
        Err(MetadataError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_part_overwrite_returns_replaced_location() {
    let t = TestStore::new().await;
    t.store.create_bucket("b").await.unwrap();
    let upload = session("b", "k");
    t.store.create_upload(&upload).await.unwrap();

    let id = upload.upload_id;
    assert_eq!(t.store.upsert_part(&part(id, 2, "u/p2-a")).await.unwrap(), None);
    assert_eq!(t.store.upsert_part(&part(id, 1, "u/p1")).await.unwrap(), None);
    assert_eq!(
        t.store.upsert_part(&part(id, 2, "u/p2-b")).await.unwrap(),
        Some("u/p2-a".to_string())
    );

    let parts = t.store.list_parts(id).await.unwrap();
    let listed: Vec<(i64, &str)> = parts
        .iter()
        .map(|p| (p.part_number, p.location.as_str()))
        .collect();
    assert_eq!(listed, vec![(1, "u/p1"), (2, "u/p2-b")]);

    let stored = t.store.get_upload(id).await.unwrap().unwrap();
    assert_eq!(stored.content_type, "video/mp4");
    assert_eq!(stored.user_metadata.0.get("camera").map(String::as_str), Some("a7"));
}

#[tokio::test]
async fn test_part_for_missing_session_rejected() {
    let t = TestStore::new().await;
    assert!(matches!(
        t.store.upsert_part(&part(Uuid::new_v4(), 1, "x")).await,
        Err(MetadataError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_complete_puts_object_and_drops_session_together() {
    let t = TestStore::new().await;
    t.store.create_bucket("b").await.unwrap();
    let upload = session("b", "big");
    t.store.create_upload(&upload).await.unwrap();
    let id = upload.upload_id;
    t.store.upsert_part(&part(id, 1, "u/p1")).await.unwrap();
    t.store.upsert_part(&part(id, 2, "u/p2")).await.unwrap();

    let done = t
        .store
        .complete_upload(id, &object("b", "big", &fp('a')))
        .await
        .unwrap();
    assert!(done.put.new_reference);
    let mut locations = done.part_locations.clone();
    locations.sort();
    assert_eq!(locations, vec!["u/p1", "u/p2"]);

    assert!(!t.store.upload_exists(id).await.unwrap());
    assert!(t.store.list_parts(id).await.unwrap().is_empty());
    assert!(t.store.get_object("b", "big").await.unwrap().is_some());
    assert_eq!(
        t.store.get_refcount(&fp('a')).await.unwrap().unwrap().refcount,
        1
    );
}

#[tokio::test]
async fn test_complete_unknown_session_writes_nothing() {
    let t = TestStore::new().await;
    t.store.create_bucket("b").await.unwrap();

    assert!(matches!(
        t.store
            .complete_upload(Uuid::new_v4(), &object("b", "k", &fp('b')))
            .await,
        Err(MetadataError::NotFound(_))
    ));
    assert!(t.store.get_object("b", "k").await.unwrap().is_none());
    assert!(t.store.get_refcount(&fp('b')).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_upload_is_idempotent() {
    let t = TestStore::new().await;
    t.store.create_bucket("b").await.unwrap();
    let upload = session("b", "k");
    t.store.create_upload(&upload).await.unwrap();
    t.store
        .upsert_part(&part(upload.upload_id, 1, "u/p1"))
        .await
        .unwrap();

    assert_eq!(
        t.store.delete_upload(upload.upload_id).await.unwrap(),
        Some(vec!["u/p1".to_string()])
    );
    assert_eq!(t.store.delete_upload(upload.upload_id).await.unwrap(), None);
}

#[tokio::test]
async fn test_list_uploads_created_before() {
    let t = TestStore::new().await;
    t.store.create_bucket("b").await.unwrap();

    let mut stale = session("b", "old");
    stale.created_at = OffsetDateTime::now_utc() - Duration::days(8);
    let fresh = session("b", "new");
    t.store.create_upload(&stale).await.unwrap();
    t.store.create_upload(&fresh).await.unwrap();

    let cutoff = OffsetDateTime::now_utc() - Duration::days(7);
    let expired = t.store.list_uploads_created_before(cutoff, 100).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].upload_id, stale.upload_id);
}
