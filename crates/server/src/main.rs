//! Hoard server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use hoard_core::config::AppConfig;
use hoard_server::engine::spawn_reaper;
use hoard_server::{AppState, create_router, create_s3_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hoard - a deduplicating blob store with native and S3-compatible APIs
#[derive(Parser, Debug)]
#[command(name = "hoardd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "HOARD_CONFIG", default_value = "config/hoard.toml")]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `HOARD_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}, using defaults", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("HOARD_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn bind(addr: &str, surface: &str) -> Result<tokio::net::TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid {surface} bind address: {addr}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("{} listening on {}", surface, addr);
    Ok(listener)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Hoard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    hoard_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let state = AppState::from_config(config.clone()).await?;

    if config.gc.auto_schedule_enabled {
        spawn_reaper(state.engine.clone(), config.gc.clone());
        tracing::info!(
            interval_secs = config.gc.auto_schedule_interval_secs,
            "Reaper scheduled"
        );
    } else {
        tracing::info!("Automatic reaping disabled");
    }

    let native_listener = bind(&config.server.bind, "native API").await?;
    let native = axum::serve(
        native_listener,
        create_router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if config.s3.enabled {
        let s3_listener = bind(&config.s3.bind, "S3 API").await?;
        let s3 = axum::serve(
            s3_listener,
            create_s3_router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        tokio::try_join!(async { native.await }, async { s3.await })?;
    } else {
        native.await?;
    }

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::config::{MetadataConfig, StorageConfig};
    use tempfile::tempdir;

    #[test]
    fn load_config_reads_toml_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("hoard.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:8181"
metrics_enabled = true

[s3]
enabled = false

[storage]
type = "filesystem"
path = "/var/lib/hoard/blobs"

[metadata]
type = "sqlite"
path = "/var/lib/hoard/hoard.db"

[gc]
upload_expiry_secs = 60
sweep_orphan_blobs = true
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8181");
        assert!(config.server.metrics_enabled);
        assert!(!config.s3.enabled);
        assert_eq!(
            config.storage.blob_root(),
            &std::path::PathBuf::from("/var/lib/hoard/blobs")
        );
        assert!(matches!(
            config.metadata,
            MetadataConfig::Sqlite { busy_timeout_ms: 5000, .. }
        ));
        assert_eq!(config.gc.upload_expiry_secs, 60);
        assert!(config.gc.sweep_orphan_blobs);
        assert!(config.gc.auto_schedule_enabled);
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("absent.toml");

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.s3.region, "us-east-1");
        assert!(matches!(config.storage, StorageConfig::Filesystem { .. }));
    }

    #[test]
    fn load_config_rejects_zero_interval() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("hoard.toml");
        std::fs::write(&path, "[gc]\nauto_schedule_interval_secs = 0\n").unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("auto_schedule_interval_secs"));
    }
}
