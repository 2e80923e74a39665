//! Filesystem staging area for multipart parts.
//!
//! Layout: `<root>/<upload_id>/part-<nnnnn>.<uuid>`. The staging root must be
//! on the same filesystem as the blob tree only for performance; parts are
//! always copied through a fresh blob write on completion.

use crate::digest::write_stream;
use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, InputStream, PartStaging, StagedPart, StagedUploadEntry};
use async_trait::async_trait;
use bytes::Bytes;
use hoard_core::{PartNumber, UploadId};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Part staging rooted in a local directory.
pub struct FilesystemStaging {
    root: PathBuf,
}

impl FilesystemStaging {
    /// Open (and create if needed) the staging root.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a stored location, refusing anything that could leave the root.
    ///
    /// Locations come back from the metadata store, so they are validated
    /// again here rather than trusted.
    async fn location_path(&self, location: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let location = location.to_string();
        tokio::task::spawn_blocking(move || location_path_sync(&root, &location))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    fn upload_dir(&self, upload_id: &UploadId) -> PathBuf {
        self.root.join(upload_id.to_string())
    }
}

fn location_path_sync(root: &Path, location: &str) -> StorageResult<PathBuf> {
    if location.is_empty() || location.starts_with('/') || location.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!(
            "invalid staging location: {location}"
        )));
    }
    if !Path::new(location)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {location}"
        )));
    }

    let path = root.join(location);
    let root_canonical = root.canonicalize()?;

    // An existing entry (including a symlinked upload directory) must resolve inside the root.
    match std::fs::symlink_metadata(&path) {
        Ok(_) => {
            let canonical = path.canonicalize().map_err(|_| {
                StorageError::InvalidKey(format!("unresolvable staging location: {location}"))
            })?;
            if !canonical.starts_with(&root_canonical) {
                return Err(StorageError::InvalidKey(format!(
                    "resolved path escapes staging root: {location}"
                )));
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(StorageError::Io(e)),
    }

    Ok(path)
}

fn ignore_missing(result: std::io::Result<()>) -> StorageResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}

#[async_trait]
impl PartStaging for FilesystemStaging {
    #[instrument(skip(self, input), fields(upload_id = %upload_id, part_number = %part_number))]
    async fn stage_part(
        &self,
        upload_id: &UploadId,
        part_number: PartNumber,
        input: InputStream,
    ) -> StorageResult<StagedPart> {
        let dir = self.upload_dir(upload_id);
        fs::create_dir_all(&dir).await?;

        let location = format!(
            "{upload_id}/part-{:05}.{}",
            part_number.get(),
            Uuid::new_v4().simple()
        );
        let digest = write_stream(&self.root.join(&location), input).await?;
        debug!(size = digest.size, "staged part");

        Ok(StagedPart {
            location,
            etag: digest.etag,
            size: digest.size,
        })
    }

    #[instrument(skip(self))]
    async fn open_part(&self, location: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.location_path(location).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_open(location, e))?;

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

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self))]
    async fn remove_part(&self, location: &str) -> StorageResult<()> {
        let path = self.location_path(location).await?;
        ignore_missing(fs::remove_file(&path).await)
    }

    #[instrument(skip(self))]
    async fn remove_upload(&self, upload_id: &UploadId) -> StorageResult<()> {
        ignore_missing(fs::remove_dir_all(self.upload_dir(upload_id)).await)
    }

    #[instrument(skip(self))]
    async fn remove_dir(&self, name: &str) -> StorageResult<()> {
        if name.contains('/') || name.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "not a staging directory name: {name}"
            )));
        }
        let path = self.location_path(name).await?;
        ignore_missing(fs::remove_dir_all(&path).await)
    }

    #[instrument(skip(self))]
    async fn list_uploads(&self) -> StorageResult<Vec<StagedUploadEntry>> {
        let mut results = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let metadata = entry.metadata().await?;
            results.push(StagedUploadEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                modified: metadata.modified().ok().map(Into::into),
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use hoard_core::Etag;

    fn input(data: &'static [u8]) -> InputStream {
        Box::pin(futures::stream::once(async move {
            Ok(Bytes::from_static(data))
        }))
    }

    #[tokio::test]
    async fn test_stage_and_read_part() {
        let dir = tempfile::tempdir().unwrap();
        let staging = FilesystemStaging::new(dir.path()).await.unwrap();
        let upload_id = UploadId::new();
        let part = PartNumber::new(3).unwrap();

        let staged = staging
            .stage_part(&upload_id, part, input(b"part three"))
            .await
            .unwrap();
        assert_eq!(staged.size, 10);
        assert_eq!(staged.etag, Etag::compute(b"part three"));
        assert!(staged.location.starts_with(&format!("{upload_id}/part-00003.")));

        let chunks: Vec<Bytes> = staging
            .open_part(&staged.location)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"part three");
    }

    #[tokio::test]
    async fn test_restaging_same_part_gets_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let staging = FilesystemStaging::new(dir.path()).await.unwrap();
        let upload_id = UploadId::new();
        let part = PartNumber::new(1).unwrap();

        let first = staging.stage_part(&upload_id, part, input(b"a")).await.unwrap();
        let second = staging.stage_part(&upload_id, part, input(b"b")).await.unwrap();
        assert_ne!(first.location, second.location);

        staging.remove_part(&first.location).await.unwrap();
        staging.remove_part(&first.location).await.unwrap();
        assert!(staging.open_part(&second.location).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_upload_clears_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = FilesystemStaging::new(dir.path()).await.unwrap();
        let upload_id = UploadId::new();
        staging
            .stage_part(&upload_id, PartNumber::new(1).unwrap(), input(b"x"))
            .await
            .unwrap();

        let listed = staging.list_uploads().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, upload_id.to_string());

        staging.remove_upload(&upload_id).await.unwrap();
        staging.remove_upload(&upload_id).await.unwrap();
        assert!(staging.list_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_traversal_locations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let staging = FilesystemStaging::new(dir.path()).await.unwrap();

        for location in ["../escape", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(
                    staging.open_part(location).await,
                    Err(StorageError::InvalidKey(_))
                ),
                "{location:?} should be rejected"
            );
        }
        assert!(staging.remove_dir("a/b").await.is_err());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlinked_upload_dir_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"secret").unwrap();
        let staging = FilesystemStaging::new(dir.path()).await.unwrap();
        symlink(outside.path(), dir.path().join("link")).unwrap();

        let result = staging.open_part("link/secret").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
