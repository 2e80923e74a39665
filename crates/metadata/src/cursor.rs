//! Opaque listing cursors.
//!
//! A cursor encodes the last key returned on a page. Resuming lists keys
//! strictly greater than it, so inserts sorting before the cursor never
//! shift later pages.

use crate::error::{MetadataError, MetadataResult};
use base64::{Engine as _, engine::general_purpose};

/// Maximum decoded token size. S3 keys are at most 1024 bytes.
pub const MAX_TOKEN_SIZE: usize = 2048;

/// An opaque continuation token for resuming a key listing.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Create a token that resumes after `last_key`.
    pub fn after(last_key: &str) -> MetadataResult<Self> {
        if last_key.len() > MAX_TOKEN_SIZE {
            return Err(MetadataError::InvalidToken(format!(
                "continuation token too large: {} bytes (max: {})",
                last_key.len(),
                MAX_TOKEN_SIZE
            )));
        }
        Ok(Self(last_key.to_string()))
    }

    /// The key to resume after.
    pub fn last_key(&self) -> &str {
        &self.0
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        general_purpose::STANDARD.encode(self.0.as_bytes())
    }

    /// Decode a token received from a client.
    pub fn decode(s: &str) -> MetadataResult<Self> {
        // Reject before decoding so oversized input never allocates.
        const MAX_BASE64_INPUT: usize = MAX_TOKEN_SIZE * 2;
        if s.len() > MAX_BASE64_INPUT {
            return Err(MetadataError::InvalidToken(format!(
                "continuation token base64 too large: {} bytes (max: {})",
                s.len(),
                MAX_BASE64_INPUT
            )));
        }

        let data = general_purpose::STANDARD
            .decode(s)
            .map_err(|e| MetadataError::InvalidToken(format!("invalid base64: {e}")))?;
        let key = String::from_utf8(data)
            .map_err(|_| MetadataError::InvalidToken("token is not valid UTF-8".to_string()))?;
        if key.is_empty() {
            return Err(MetadataError::InvalidToken("empty token".to_string()));
        }
        Self::after(&key)
    }
}

impl std::fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContinuationToken").field(&self.0).finish()
    }
}
