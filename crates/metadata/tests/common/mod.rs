use hoard_metadata::SqliteStore;
use hoard_metadata::models::{ObjectWrite, UserMetadata};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A fresh store backed by a temp directory that lives as long as the handle.
pub struct TestStore {
    pub store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("metadata.db"), Duration::from_secs(5))
            .await
            .unwrap();
        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        }
    }
}

/// 40-character fingerprint built from a repeated hex digit.
#[allow(dead_code)]
pub fn fp(c: char) -> String {
    std::iter::repeat_n(c, 40).collect()
}

/// Object write with placeholder protocol metadata.
#[allow(dead_code)]
pub fn object(bucket: &str, key: &str, fingerprint: &str) -> ObjectWrite {
    ObjectWrite {
        bucket: bucket.to_string(),
        key: key.to_string(),
        fingerprint: fingerprint.to_string(),
        size_bytes: 10,
        etag: "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
        content_type: "application/octet-stream".to_string(),
        user_metadata: UserMetadata::new(),
    }
}
