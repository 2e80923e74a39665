//! Local filesystem content store.
//!
//! Blobs live at `<root>/<aa>/<bb>/<rest>` where `aabb..` is the hex
//! fingerprint. Incoming bytes are first written under `<root>/tmp` and only
//! linked into the sharded tree once fully hashed and synced.

use crate::digest::write_stream;
use crate::error::{StorageError, StorageResult};
use crate::traits::{
    BlobDigest, BlobEntry, BlobEntryStream, ContentStore, InputStream, RetrievedBlob, StagedBlob,
};
use async_trait::async_trait;
use bytes::Bytes;
use hoard_core::Fingerprint;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Directory under the root that holds in-flight writes.
const TMP_DIR: &str = "tmp";

/// Sharded content store on a local filesystem.
pub struct FilesystemContentStore {
    root: PathBuf,
    tmp: PathBuf,
}

impl FilesystemContentStore {
    /// Open (and create if needed) a content store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let tmp = root.join(TMP_DIR);
        fs::create_dir_all(&tmp).await?;
        Ok(Self { root, tmp })
    }

    /// Root of the sharded tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path a blob with this fingerprint occupies once committed.
    pub fn blob_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.shard_path())
    }
}

#[async_trait]
impl ContentStore for FilesystemContentStore {
    #[instrument(skip(self, input), fields(backend = "filesystem"))]
    async fn stage(&self, input: InputStream) -> StorageResult<Box<dyn StagedBlob>> {
        let temp_path = self.tmp.join(format!("upload-{}", Uuid::new_v4()));
        let digest = write_stream(&temp_path, input).await?;
        let final_path = self.blob_path(&digest.fingerprint);
        debug!(fingerprint = %digest.fingerprint, size = digest.size, "staged blob");

        Ok(Box::new(FilesystemStagedBlob {
            temp_path: Some(temp_path),
            final_path,
            digest,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn retrieve(&self, fingerprint: &Fingerprint) -> StorageResult<RetrievedBlob> {
        use tokio::io::AsyncReadExt;

        let path = self.blob_path(fingerprint);
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_open(fingerprint.to_hex(), e))?;
        let size = file.metadata().await?.len();

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(RetrievedBlob {
            size,
            stream: Box::pin(stream),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        match fs::remove_file(self.blob_path(fingerprint)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        fs::try_exists(self.blob_path(fingerprint))
            .await
            .map_err(StorageError::Io)
    }

    fn list(&self) -> BlobEntryStream<'_> {
        let root = self.root.clone();

        let stream = async_stream::try_stream! {
            let mut outer_dirs = fs::read_dir(&root).await?;
            while let Some(outer) = outer_dirs.next_entry().await? {
                // Use file_type() so symlinks are never followed out of the root.
                if !outer.file_type().await?.is_dir() {
                    continue;
                }
                let outer_name = outer.file_name().to_string_lossy().to_string();
                if !is_shard_name(&outer_name) {
                    continue;
                }

                let mut inner_dirs = fs::read_dir(outer.path()).await?;
                while let Some(inner) = inner_dirs.next_entry().await? {
                    if !inner.file_type().await?.is_dir() {
                        continue;
                    }
                    let inner_name = inner.file_name().to_string_lossy().to_string();
                    if !is_shard_name(&inner_name) {
                        continue;
                    }

                    let mut files = fs::read_dir(inner.path()).await?;
                    while let Some(file) = files.next_entry().await? {
                        let metadata = file.metadata().await?;
                        if !metadata.is_file() {
                            continue;
                        }
                        let rest = file.file_name().to_string_lossy().to_string();
                        match Fingerprint::from_shard_parts(&outer_name, &inner_name, &rest) {
                            Ok(fingerprint) => {
                                yield BlobEntry {
                                    fingerprint,
                                    modified: metadata.modified().ok().map(Into::into),
                                };
                            }
                            Err(_) => {
                                debug!(path = %file.path().display(), "skipping non-blob file");
                            }
                        }
                    }
                }
            }
        };

        Box::pin(stream)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        for dir in [&self.root, &self.tmp] {
            let metadata = fs::metadata(dir).await.map_err(|e| {
                StorageError::Io(std::io::Error::new(
                    e.kind(),
                    format!("storage directory not accessible: {e}"),
                ))
            })?;
            if !metadata.is_dir() {
                return Err(StorageError::Io(std::io::Error::new(
                    ErrorKind::NotADirectory,
                    format!("not a directory: {}", dir.display()),
                )));
            }
        }
        Ok(())
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A fully written, synced temp file awaiting placement.
struct FilesystemStagedBlob {
    /// `None` once the file has been linked or discarded.
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    digest: BlobDigest,
}

#[async_trait]
impl StagedBlob for FilesystemStagedBlob {
    fn digest(&self) -> &BlobDigest {
        &self.digest
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<bool> {
        let Some(temp_path) = self.temp_path.take() else {
            return Ok(false);
        };
        if let Some(parent) = self.final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // A hard link fails with AlreadyExists instead of replacing, which
        // gives create-if-absent without a separate existence check.
        let placed = match fs::hard_link(&temp_path, &self.final_path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) if e.kind() == ErrorKind::Unsupported => {
                warn!(error = %e, "hard links unsupported, falling back to rename");
                if fs::try_exists(&self.final_path).await? {
                    false
                } else {
                    fs::rename(&temp_path, &self.final_path).await?;
                    return Ok(true);
                }
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::Io(e));
            }
        };

        if let Err(e) = fs::remove_file(&temp_path).await {
            warn!(path = %temp_path.display(), error = %e, "failed to remove staged file");
        }
        debug!(fingerprint = %self.digest.fingerprint, placed, "committed blob");
        Ok(placed)
    }

    async fn discard(mut self: Box<Self>) -> StorageResult<()> {
        if let Some(temp_path) = self.temp_path.take() {
            match fs::remove_file(&temp_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }
}

impl Drop for FilesystemStagedBlob {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            let _ = std::fs::remove_file(temp_path);
        }
    }
}
