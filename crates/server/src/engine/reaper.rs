//! Background cleanup.
//!
//! Every request already erases what it releases, so a run normally finds
//! nothing. The reaper exists for the leftovers of failures: sessions that
//! were never completed, staging directories without a session, ledger rows
//! stuck at zero after a failed erase, and blobs placed before a crash that
//! never got a ledger row.

use super::{Engine, EngineResult};
use crate::metrics::record_reaped;
use futures::TryStreamExt;
use hoard_core::config::GcConfig;
use hoard_core::{Fingerprint, UploadId};
use hoard_metadata::{LedgerRepo, MultipartRepo};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Rows fetched per batch.
const BATCH_SIZE: u32 = 100;

/// Upper bound on batches per phase. Rows whose cleanup keeps failing are
/// returned by every batch, so a phase must not loop on them forever.
const MAX_ITERATIONS: u32 = 1000;

/// What one reaper run removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub expired_uploads: u64,
    pub stale_staging_dirs: u64,
    pub zero_count_blobs: u64,
    pub orphan_blobs: u64,
    pub errors: u64,
}

impl ReapReport {
    pub fn total(&self) -> u64 {
        self.expired_uploads + self.stale_staging_dirs + self.zero_count_blobs + self.orphan_blobs
    }
}

fn is_older_than(modified: Option<OffsetDateTime>, cutoff: OffsetDateTime) -> bool {
    // Unknown modification times are treated as fresh.
    modified.is_some_and(|m| m < cutoff)
}

impl Engine {
    /// Run every cleanup phase once.
    #[tracing::instrument(skip_all)]
    pub async fn run_reaper(&self, config: &GcConfig) -> EngineResult<ReapReport> {
        let mut report = ReapReport::default();
        let now = OffsetDateTime::now_utc();

        self.expire_uploads(now - config.upload_expiry(), &mut report).await?;
        self.remove_stale_staging(now - config.grace_period(), &mut report).await?;
        self.reap_zero_counts(&mut report).await?;
        if config.sweep_orphan_blobs {
            self.sweep_orphan_blobs(now - config.grace_period(), &mut report).await?;
        }

        if report.total() > 0 || report.errors > 0 {
            tracing::info!(
                expired_uploads = report.expired_uploads,
                stale_staging_dirs = report.stale_staging_dirs,
                zero_count_blobs = report.zero_count_blobs,
                orphan_blobs = report.orphan_blobs,
                errors = report.errors,
                "reaper run finished"
            );
        } else {
            tracing::debug!("reaper run found nothing to remove");
        }
        Ok(report)
    }

    async fn expire_uploads(&self, cutoff: OffsetDateTime, report: &mut ReapReport) -> EngineResult<()> {
        for iteration in 1..=MAX_ITERATIONS {
            let expired = self.metadata.list_uploads_created_before(cutoff, BATCH_SIZE).await?;
            if expired.is_empty() {
                return Ok(());
            }

            let mut progressed = false;
            for session in expired {
                let upload_id = UploadId::from_uuid(session.upload_id);
                let _session_lock = self.upload_locks.write(&upload_id.to_string()).await;
                match self.drop_session(&upload_id).await {
                    Ok(true) => {
                        progressed = true;
                        report.expired_uploads += 1;
                        record_reaped("expired_upload");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(%upload_id, error = %e, "failed to expire multipart upload");
                        report.errors += 1;
                    }
                }
            }
            if !progressed {
                tracing::warn!(iteration, "expired uploads could not be removed, stopping");
                return Ok(());
            }
        }
        tracing::warn!(max_iterations = MAX_ITERATIONS, "upload expiry hit its iteration limit");
        Ok(())
    }

    async fn remove_stale_staging(&self, cutoff: OffsetDateTime, report: &mut ReapReport) -> EngineResult<()> {
        for entry in self.staging.list_uploads().await? {
            if !is_older_than(entry.modified, cutoff) {
                continue;
            }

            let removal = match UploadId::parse(&entry.name) {
                Ok(upload_id) => {
                    // Hold the session so a concurrent UploadPart cannot land in a directory being removed.
                    let _session_lock = self.upload_locks.write(&upload_id.to_string()).await;
                    if self.metadata.upload_exists(*upload_id.as_uuid()).await? {
                        continue;
                    }
                    self.staging.remove_dir(&entry.name).await
                }
                Err(_) => self.staging.remove_dir(&entry.name).await,
            };

            match removal {
                Ok(()) => {
                    tracing::debug!(name = %entry.name, "removed stale staging directory");
                    report.stale_staging_dirs += 1;
                    record_reaped("stale_staging");
                }
                Err(e) => {
                    tracing::warn!(name = %entry.name, error = %e, "failed to remove staging directory");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn reap_zero_counts(&self, report: &mut ReapReport) -> EngineResult<()> {
        for _ in 0..MAX_ITERATIONS {
            let zero = self.metadata.list_zero_counts(BATCH_SIZE).await?;
            if zero.is_empty() {
                return Ok(());
            }

            let mut progressed = false;
            for hex in zero {
                let fingerprint = match Fingerprint::from_hex(&hex) {
                    Ok(fp) => fp,
                    Err(e) => {
                        tracing::error!(fingerprint = %hex, error = %e, "ledger holds an unparseable fingerprint");
                        report.errors += 1;
                        continue;
                    }
                };
                match self.reap(&fingerprint).await {
                    Ok(_) => {
                        progressed = true;
                        report.zero_count_blobs += 1;
                        record_reaped("zero_count");
                    }
                    Err(e) => {
                        tracing::warn!(fingerprint = %hex, error = %e, "failed to reap zero-count blob");
                        report.errors += 1;
                    }
                }
            }
            if !progressed {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn sweep_orphan_blobs(&self, cutoff: OffsetDateTime, report: &mut ReapReport) -> EngineResult<()> {
        // Collect first; erasing while the directory walk is open would race it.
        let candidates: Vec<Fingerprint> = self
            .blobs
            .list()
            .try_filter(|entry| futures::future::ready(is_older_than(entry.modified, cutoff)))
            .map_ok(|entry| entry.fingerprint)
            .try_collect()
            .await?;

        for fingerprint in candidates {
            if self.metadata.exists(&fingerprint.to_hex()).await? {
                continue;
            }
            let guard = self.lock_blob(&fingerprint).await;
            match self.erase_if_unreferenced(&fingerprint, &guard).await {
                Ok(true) => {
                    tracing::info!(%fingerprint, "erased orphan blob");
                    report.orphan_blobs += 1;
                    record_reaped("orphan_blob");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%fingerprint, error = %e, "failed to erase orphan blob");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }
}

/// Run the reaper on the configured interval until the task is aborted.
pub fn spawn_reaper(engine: Engine, config: GcConfig) -> JoinHandle<()> {
    let interval = config.auto_schedule_interval();
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "reaper scheduled");
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = engine.run_reaper(&config).await {
                tracing::error!(error = %e, "reaper run failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine, input};
    use super::super::{ManifestPart, NewUpload};
    use super::*;
    use hoard_core::PartNumber;

    fn immediate() -> GcConfig {
        GcConfig {
            auto_schedule_enabled: false,
            upload_expiry_secs: 0,
            grace_period_secs: 0,
            sweep_orphan_blobs: true,
            ..GcConfig::default()
        }
    }

    async fn open_upload(engine: &Engine, key: &str) -> String {
        engine
            .initiate_upload(NewUpload {
                bucket: "b".to_string(),
                key: key.to_string(),
                content_type: hoard_core::DEFAULT_CONTENT_TYPE.to_string(),
                user_metadata: Default::default(),
            })
            .await
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_expired_uploads_are_aborted() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("b").await.unwrap();
        let id = open_upload(&engine, "k").await;
        engine.upload_part("b", "k", &id, 1, input(b"abandoned")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let report = engine.run_reaper(&immediate()).await.unwrap();
        assert_eq!(report.expired_uploads, 1);
        assert_eq!(report.errors, 0);

        let manifest = [ManifestPart {
            part_number: 1,
            etag: None,
        }];
        assert!(engine.complete_upload("b", "k", &id, &manifest).await.is_err());
    }

    #[tokio::test]
    async fn test_fresh_uploads_survive() {
        let (engine, _dir) = engine().await;
        engine.create_bucket("b").await.unwrap();
        let id = open_upload(&engine, "k").await;

        let report = engine.run_reaper(&GcConfig::default()).await.unwrap();
        assert_eq!(report, ReapReport::default());
        engine.upload_part("b", "k", &id, 1, input(b"still open")).await.unwrap();
    }

    #[tokio::test]
    async fn test_staging_without_session_is_removed() {
        let (engine, _dir) = engine().await;
        let stray = UploadId::new();
        engine
            .staging
            .stage_part(&stray, PartNumber::new(1).unwrap(), input(b"stray"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let report = engine.run_reaper(&immediate()).await.unwrap();
        assert_eq!(report.stale_staging_dirs, 1);
        assert!(engine.staging.list_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_count_rows_are_reaped() {
        let (engine, _dir) = engine().await;
        let stored = engine.store_blob(input(b"stuck")).await.unwrap();
        let hex = stored.fingerprint.to_hex();
        // Simulate a release whose erase never ran.
        assert_eq!(engine.metadata().decrement(&hex).await.unwrap(), 0);

        let report = engine.run_reaper(&GcConfig::default()).await.unwrap();
        assert_eq!(report.zero_count_blobs, 1);
        assert!(!engine.blob_exists(&stored.fingerprint).await.unwrap());
        assert!(!engine.metadata().exists(&hex).await.unwrap());
    }

    #[tokio::test]
    async fn test_orphan_blob_swept_but_referenced_blob_kept() {
        let (engine, _dir) = engine().await;
        let kept = engine.store_blob(input(b"kept")).await.unwrap();
        let orphan = engine.blobs().store(input(b"orphan")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let report = engine.run_reaper(&immediate()).await.unwrap();
        assert_eq!(report.orphan_blobs, 1);
        assert!(!engine.blob_exists(&orphan.digest.fingerprint).await.unwrap());
        assert!(engine.blob_exists(&kept.fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn test_orphan_sweep_disabled_by_default() {
        let (engine, _dir) = engine().await;
        let orphan = engine.blobs().store(input(b"orphan")).await.unwrap();

        let report = engine.run_reaper(&GcConfig::default()).await.unwrap();
        assert_eq!(report.orphan_blobs, 0);
        assert!(engine.blob_exists(&orphan.digest.fingerprint).await.unwrap());
    }
}
