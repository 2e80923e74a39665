//! Single-pass write-and-hash of client streams.

use crate::error::StorageResult;
use crate::traits::{BlobDigest, InputStream};
use futures::StreamExt;
use hoard_core::{Etag, EtagHasher, Fingerprint, FingerprintHasher};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Tees every chunk into both digests while counting bytes.
pub(crate) struct DigestWriter {
    fingerprint: FingerprintHasher,
    etag: EtagHasher,
    size: u64,
}

impl DigestWriter {
    pub(crate) fn new() -> Self {
        Self {
            fingerprint: Fingerprint::hasher(),
            etag: Etag::hasher(),
            size: 0,
        }
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.fingerprint.update(chunk);
        self.etag.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub(crate) fn finalize(self) -> BlobDigest {
        BlobDigest {
            fingerprint: self.fingerprint.finalize(),
            etag: self.etag.finalize(),
            size: self.size,
        }
    }
}

/// Drain `input` into a newly created file at `path`, fsync it, and return
/// the digests of what was written.
///
/// On failure the partially written file is removed before the error is returned.
pub(crate) async fn write_stream(path: &Path, mut input: InputStream) -> StorageResult<BlobDigest> {
    let result = async {
        let mut file = fs::File::create(path).await?;
        let mut digest = DigestWriter::new();
        while let Some(chunk) = input.next().await {
            let chunk = chunk?;
            digest.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        Ok::<_, std::io::Error>(digest.finalize())
    }
    .await;

    match result {
        Ok(digest) => Ok(digest),
        Err(err) => {
            let _ = fs::remove_file(path).await;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_digest_matches_whole_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let digest = write_stream(&path, Box::pin(futures::stream::iter(chunks)))
            .await
            .unwrap();

        assert_eq!(digest.size, 11);
        assert_eq!(digest.fingerprint, Fingerprint::compute(b"hello world"));
        assert_eq!(digest.etag, Etag::compute(b"hello world"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_failed_input_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("client went away")),
        ];
        let result = write_stream(&path, Box::pin(futures::stream::iter(chunks))).await;

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
