//! Prometheus metrics for the hoard server.
//!
//! Exposes counters for deduplication, reference releases, multipart sessions
//! and background reaping.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no bucket names, keys or fingerprints, only aggregate counts.
//! Keep the native listener network-restricted when it is enabled.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Content store metrics
pub static BLOBS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_blobs_stored_total",
        "Total number of blobs placed in the content store",
    )
    .expect("metric creation failed")
});

pub static BLOBS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_blobs_deduplicated_total",
        "Total number of stores whose content already existed",
    )
    .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_bytes_stored_total",
        "Total bytes placed in the content store (new blobs only)",
    )
    .expect("metric creation failed")
});

pub static BLOBS_ERASED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_blobs_erased_total",
        "Total number of blobs erased after their last reference was released",
    )
    .expect("metric creation failed")
});

// Catalog metrics
pub static OBJECTS_PUT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hoard_objects_put_total", "Total number of object puts")
        .expect("metric creation failed")
});

pub static OBJECTS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_objects_deleted_total",
        "Total number of catalog entries removed",
    )
    .expect("metric creation failed")
});

// Multipart metrics
pub static MULTIPART_INITIATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_multipart_initiated_total",
        "Total number of multipart uploads initiated",
    )
    .expect("metric creation failed")
});

pub static MULTIPART_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_multipart_completed_total",
        "Total number of multipart uploads completed",
    )
    .expect("metric creation failed")
});

pub static MULTIPART_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_multipart_aborted_total",
        "Total number of multipart uploads aborted, by client or reaper",
    )
    .expect("metric creation failed")
});

// Consistency metrics
pub static CONFLICT_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_metadata_conflict_retries_total",
        "Total number of metadata writes retried after lock contention",
    )
    .expect("metric creation failed")
});

pub static REAPER_ITEMS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_reaper_items_total",
            "Items reclaimed by the background reaper, by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static STORE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "hoard_store_duration_seconds",
            "Time taken to stream, hash and place a blob",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BLOBS_STORED.clone()),
            Box::new(BLOBS_DEDUPLICATED.clone()),
            Box::new(BYTES_STORED.clone()),
            Box::new(BLOBS_ERASED.clone()),
            Box::new(OBJECTS_PUT.clone()),
            Box::new(OBJECTS_DELETED.clone()),
            Box::new(MULTIPART_INITIATED.clone()),
            Box::new(MULTIPART_COMPLETED.clone()),
            Box::new(MULTIPART_ABORTED.clone()),
            Box::new(CONFLICT_RETRIES.clone()),
            Box::new(REAPER_ITEMS.clone()),
            Box::new(STORE_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// Record one reaped item of the given kind.
pub fn record_reaped(kind: &str) {
    REAPER_ITEMS.with_label_values(&[kind]).inc();
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        register_metrics();
        register_metrics();
        BLOBS_STORED.inc();
        record_reaped("expired_upload");

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("hoard_blobs_stored_total"));
        assert!(text.contains("hoard_reaper_items_total{kind=\"expired_upload\"}"));
    }
}
