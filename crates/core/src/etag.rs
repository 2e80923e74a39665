//! Entity tags exposed to protocol clients.
//!
//! S3 clients expect an MD5 checksum of the object bytes, which is
//! independent of the SHA-1 fingerprint used for addressing.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lowercase hex MD5 checksum, stored without surrounding quotes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    /// Compute the entity tag of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create an incremental hasher.
    pub fn hasher() -> EtagHasher {
        EtagHasher(Md5::new())
    }

    /// Parse a client supplied entity tag, tolerating surrounding quotes.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim().trim_matches('"');
        if trimmed.len() != 32 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidEtag(s.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Wrap a value read back from the metadata store.
    pub fn from_stored(s: String) -> Self {
        Self(s)
    }

    /// Get the bare hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the quoted form used in `ETag` headers and XML bodies.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Debug for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Etag({})", self.0)
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental MD5 hasher.
pub struct EtagHasher(Md5);

impl EtagHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the entity tag.
    pub fn finalize(self) -> Etag {
        Etag(
            self.0
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect(),
        )
    }
}
