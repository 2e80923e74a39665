//! Application state shared across handlers.

use crate::engine::Engine;
use hoard_core::config::AppConfig;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Storage engine shared by both front ends.
    pub engine: Engine,
}

impl AppState {
    pub fn new(config: AppConfig, engine: Engine) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    /// Build the content store, metadata store and engine from configuration.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let storage = hoard_storage::from_config(&config.storage)
            .await
            .context("failed to initialize storage")?;
        storage
            .blobs
            .health_check()
            .await
            .context("storage health check failed")?;
        tracing::info!(backend = storage.blobs.backend_name(), "storage initialized");

        let metadata = hoard_metadata::from_config(&config.metadata)
            .await
            .context("failed to initialize metadata store")?;
        metadata
            .health_check()
            .await
            .context("metadata health check failed")?;
        tracing::info!("metadata store initialized");

        Ok(Self::new(config, Engine::new(storage, metadata)))
    }
}
