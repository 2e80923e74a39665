//! Multipart upload identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Smallest part number accepted by UploadPart.
pub const MIN_PART_NUMBER: u32 = 1;

/// Largest part number accepted by UploadPart.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Unique identifier for a multipart upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidUploadId(format!("{s}: {e}")))
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated part number in `MIN_PART_NUMBER..=MAX_PART_NUMBER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartNumber(u32);

impl PartNumber {
    /// Validate a raw part number.
    pub fn new(n: u32) -> crate::Result<Self> {
        if (MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&n) {
            Ok(Self(n))
        } else {
            Err(crate::Error::InvalidPartNumber(n.to_string()))
        }
    }

    /// Parse from a query string value.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| crate::Error::InvalidPartNumber(s.to_string()))?;
        Self::new(n)
    }

    /// Get the numeric value.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
