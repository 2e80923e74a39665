//! Content fingerprints: SHA-1 digests identifying stored bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Length of a fingerprint in raw bytes.
pub const FINGERPRINT_LEN: usize = 20;

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = FINGERPRINT_LEN * 2;

/// A 160-bit SHA-1 digest of a blob's raw bytes.
///
/// This is the sole primary key for stored content. Identical bytes always
/// produce the same fingerprint, so a blob is stored at most once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Create a fingerprint from raw digest bytes.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Compute the fingerprint of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create an incremental hasher for single-pass streaming.
    pub fn hasher() -> FingerprintHasher {
        FingerprintHasher(Sha1::new())
    }

    /// Parse from a 40 character hex string. Upper case digits are accepted.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != FINGERPRINT_HEX_LEN {
            return Err(crate::Error::InvalidFingerprint(format!(
                "expected {FINGERPRINT_HEX_LEN} hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; FINGERPRINT_LEN];
        for (i, pair) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_value(pair[0])?;
            let lo = hex_value(pair[1])?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Relative location of the blob inside a sharded tree.
    ///
    /// The first two hex characters name the outer shard directory, the next
    /// two the inner shard directory, and the remaining 36 the file name.
    pub fn shard_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let mut path = PathBuf::from(&hex[..2]);
        path.push(&hex[2..4]);
        path.push(&hex[4..]);
        path
    }

    /// Rebuild a fingerprint from the three components of a sharded path.
    pub fn from_shard_parts(outer: &str, inner: &str, rest: &str) -> crate::Result<Self> {
        if outer.len() != 2 || inner.len() != 2 {
            return Err(crate::Error::InvalidFingerprint(format!(
                "malformed shard directories: {outer}/{inner}"
            )));
        }
        Self::from_hex(&format!("{outer}{inner}{rest}"))
    }
}

fn hex_value(c: u8) -> crate::Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(crate::Error::InvalidFingerprint(format!(
            "invalid hex character: {:?}",
            c as char
        ))),
    }
}

impl FromStr for Fingerprint {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-1 hasher.
pub struct FingerprintHasher(Sha1);

impl FingerprintHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the fingerprint.
    pub fn finalize(self) -> Fingerprint {
        Fingerprint(self.0.finalize().into())
    }
}
