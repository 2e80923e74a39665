//! Core domain types for the hoard content-addressed blob store.
//!
//! This crate defines the value types shared across all other crates:
//! - Content fingerprints (SHA-1) and their sharded on-disk location
//! - Entity tags (MD5) exposed to S3 clients
//! - Multipart upload identifiers and part numbers
//! - Bucket naming rules
//! - Configuration

pub mod bucket;
pub mod config;
pub mod error;
pub mod etag;
pub mod fingerprint;
pub mod upload;

pub use bucket::{validate_bucket_name, validate_object_key};
pub use error::{Error, Result};
pub use etag::{Etag, EtagHasher};
pub use fingerprint::{Fingerprint, FingerprintHasher};
pub use upload::{PartNumber, UploadId};

/// Content type recorded when a client does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
