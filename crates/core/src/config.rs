//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Native API server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the native API (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Expose `/metrics` for Prometheus scraping on the native listener.
    #[serde(default)]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: false,
        }
    }
}

/// S3-compatible listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct S3Config {
    /// Serve the S3-compatible API.
    #[serde(default = "default_s3_enabled")]
    pub enabled: bool,
    /// Bind address for the S3 listener.
    #[serde(default = "default_s3_bind")]
    pub bind: String,
    /// Region reported to clients.
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_s3_enabled() -> bool {
    true
}

fn default_s3_bind() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            enabled: default_s3_enabled(),
            bind: default_s3_bind(),
            region: default_region(),
        }
    }
}

/// Native API access control.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Shared key required in the `X-API-Key` header of `/api/*` requests.
    /// When unset, the native API is open.
    /// WARNING: Prefer the HOARD_API__KEY env var over storing it in a file.
    #[serde(default)]
    pub key: Option<String>,
}

/// Content store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem blob tree.
    Filesystem {
        /// Root directory of the sharded blob tree.
        path: PathBuf,
        /// Directory for in-flight multipart parts (default: `<path>/multipart`).
        #[serde(default)]
        staging_path: Option<PathBuf>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./storage"),
            staging_path: None,
        }
    }
}

impl StorageConfig {
    /// Root of the committed blob tree.
    pub fn blob_root(&self) -> &PathBuf {
        match self {
            Self::Filesystem { path, .. } => path,
        }
    }

    /// Directory holding staged multipart parts.
    pub fn staging_root(&self) -> PathBuf {
        match self {
            Self::Filesystem { path, staging_path } => staging_path
                .clone()
                .unwrap_or_else(|| path.join("multipart")),
        }
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem { path, staging_path } => {
                if path.as_os_str().is_empty() {
                    return Err("storage.path must not be empty".to_string());
                }
                if let Some(staging) = staging_path
                    && staging == path
                {
                    return Err(
                        "storage.staging_path must differ from storage.path".to_string(),
                    );
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// Embedded SQLite database holding the ledger, catalog and multipart sessions.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// How long a writer waits on a locked database before reporting a conflict.
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./storage.db"),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Background maintenance configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Run the reaper on a schedule.
    #[serde(default = "default_auto_schedule_enabled")]
    pub auto_schedule_enabled: bool,
    /// Interval in seconds between reaper runs (default: 1 hour).
    #[serde(default = "default_auto_schedule_interval_secs")]
    pub auto_schedule_interval_secs: u64,
    /// Multipart sessions older than this are aborted (default: 7 days).
    #[serde(default = "default_upload_expiry_secs")]
    pub upload_expiry_secs: u64,
    /// Remove blobs that have no ledger row.
    /// Such blobs only exist after a crash between blob placement and ledger commit.
    #[serde(default)]
    pub sweep_orphan_blobs: bool,
    /// Minimum age in seconds of an orphan blob or staging directory before removal.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

fn default_auto_schedule_enabled() -> bool {
    true
}

fn default_auto_schedule_interval_secs() -> u64 {
    3600
}

fn default_upload_expiry_secs() -> u64 {
    7 * 24 * 3600
}

fn default_grace_period_secs() -> u64 {
    3600
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            auto_schedule_enabled: default_auto_schedule_enabled(),
            auto_schedule_interval_secs: default_auto_schedule_interval_secs(),
            upload_expiry_secs: default_upload_expiry_secs(),
            sweep_orphan_blobs: false,
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl GcConfig {
    /// Get the multipart expiry as a Duration.
    pub fn upload_expiry(&self) -> Duration {
        Duration::seconds(i64::try_from(self.upload_expiry_secs).unwrap_or(i64::MAX))
    }

    /// Get the grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        Duration::seconds(i64::try_from(self.grace_period_secs).unwrap_or(i64::MAX))
    }

    /// Get the schedule interval as a std::time::Duration.
    pub fn auto_schedule_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auto_schedule_interval_secs)
    }

    /// Validate GC configuration for settings that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.auto_schedule_enabled && self.auto_schedule_interval_secs == 0 {
            return Err("gc.auto_schedule_interval_secs must be greater than 0".to_string());
        }
        for (name, value) in [
            ("gc.upload_expiry_secs", self.upload_expiry_secs),
            ("gc.grace_period_secs", self.grace_period_secs),
        ] {
            if value > i64::MAX as u64 {
                return Err(format!(
                    "{name} {value} exceeds maximum value {}",
                    i64::MAX
                ));
            }
        }
        Ok(())
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Native API server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// S3-compatible listener configuration.
    #[serde(default)]
    pub s3: S3Config,
    /// Native API access control.
    #[serde(default)]
    pub api: ApiConfig,
    /// Content store configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Background maintenance configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

impl AppConfig {
    /// Create a test configuration rooted in `dir`.
    ///
    /// **For testing only.** The reaper schedule is disabled so tests drive it explicitly.
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            storage: StorageConfig::Filesystem {
                path: dir.join("storage"),
                staging_path: None,
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("metadata.db"),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            gc: GcConfig {
                auto_schedule_enabled: false,
                ..GcConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.gc.validate()
    }
}
