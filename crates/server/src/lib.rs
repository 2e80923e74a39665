//! HTTP front ends for the hoard blob store.
//!
//! This crate provides:
//! - The storage engine that orders blob, ledger and catalog writes
//! - The native `/api` surface for storing and fetching blobs by fingerprint
//! - An S3-compatible surface with buckets, objects and multipart uploads
//! - The background reaper for expired uploads and unreferenced blobs

pub mod auth;
pub mod body;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod metrics;
pub mod routes;
pub mod s3;
pub mod state;

pub use auth::RequestId;
pub use engine::Engine;
pub use error::ApiError;
pub use routes::{create_router, create_s3_router};
pub use state::AppState;
