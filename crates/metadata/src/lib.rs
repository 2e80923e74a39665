//! Metadata store for hoard.
//!
//! This crate provides the bookkeeping that sits beside the blob tree:
//! - The reference ledger counting how many names point at each fingerprint
//! - The bucket/object catalog mapping `(bucket, key)` to a fingerprint
//! - Multipart sessions and their staged part records
//!
//! All three live in one SQLite database so that a catalog change and the
//! ledger update it implies commit in a single transaction.

pub mod cursor;
pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use cursor::ContinuationToken;
pub use error::{MetadataError, MetadataResult};
pub use repos::{CatalogRepo, LedgerRepo, MultipartRepo};
pub use store::{MetadataStore, SqliteStore};

use hoard_core::config::MetadataConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => {
            let store = SqliteStore::new(path, Duration::from_millis(*busy_timeout_ms)).await?;
            tracing::info!(path = %path.display(), "opened SQLite metadata store");
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
