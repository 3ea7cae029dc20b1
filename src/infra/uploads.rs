//! Filesystem storage for post images.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{MediaStore, RepoError};

const POST_IMAGE_PREFIX: &str = "posts";

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
}

impl From<UploadStorageError> for RepoError {
    fn from(err: UploadStorageError) -> Self {
        match err {
            UploadStorageError::InvalidPath | UploadStorageError::EmptyPayload => {
                RepoError::InvalidInput {
                    message: err.to_string(),
                }
            }
            UploadStorageError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => {
                RepoError::NotFound
            }
            UploadStorageError::Io(err) => RepoError::from_persistence(err),
        }
    }
}

/// Result of storing an upload payload.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Media root on the local filesystem. Stored paths are relative to it and
/// look like `posts/2025/03/01/<uuid>-cat.png`.
#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn store(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredUpload, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let stored_path = build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        if let Err(err) = file.write_all(&data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }
        file.flush().await?;

        let checksum = hex::encode(Sha256::digest(data.as_ref()).as_slice());

        Ok(StoredUpload {
            stored_path,
            checksum,
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for UploadStorage {
    async fn store_image(&self, original_name: &str, data: Bytes) -> Result<String, RepoError> {
        let stored = self.store(original_name, data).await?;
        debug!(
            stored_path = %stored.stored_path,
            checksum = %stored.checksum,
            size_bytes = stored.size_bytes,
            "stored post image"
        );
        Ok(stored.stored_path)
    }

    async fn remove(&self, stored_path: &str) -> Result<(), RepoError> {
        self.delete(stored_path).await.map_err(RepoError::from)
    }
}

fn build_stored_path(original_name: &str) -> String {
    let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
    let identifier = Uuid::new_v4();
    let filename = sanitize_filename(original_name);
    format!(
        "{POST_IMAGE_PREFIX}/{year}/{:02}/{day:02}/{identifier}-{filename}",
        month as u8
    )
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_extension_and_slugifies_stem() {
        assert_eq!(sanitize_filename("My Cat.PNG"), "my-cat.png");
        assert_eq!(sanitize_filename("???.gif"), "image.gif");
        assert_eq!(sanitize_filename("noext"), "noext");
    }

    #[test]
    fn stored_path_lives_under_posts_prefix() {
        let path = build_stored_path("cat.png");
        assert!(path.starts_with("posts/"));
        assert!(path.ends_with("-cat.png"));
    }

    #[tokio::test]
    async fn store_read_and_delete_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let stored = storage
            .store("cat.gif", Bytes::from_static(b"GIF89a"))
            .await
            .expect("store");
        assert_eq!(stored.size_bytes, 6);
        assert_eq!(stored.checksum.len(), 64);

        let data = storage.read(&stored.stored_path).await.expect("read");
        assert_eq!(data, Bytes::from_static(b"GIF89a"));

        storage.delete(&stored.stored_path).await.expect("delete");
        assert!(storage.read(&stored.stored_path).await.is_err());
        storage
            .delete(&stored.stored_path)
            .await
            .expect("missing file is fine");
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");
        let err = storage
            .store("cat.gif", Bytes::new())
            .await
            .expect_err("empty");
        assert!(matches!(err, UploadStorageError::EmptyPayload));
    }

    #[tokio::test]
    async fn parent_traversal_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");
        assert!(matches!(
            storage.read("../etc/passwd").await,
            Err(UploadStorageError::InvalidPath)
        ));
        assert!(matches!(
            storage.read("/etc/passwd").await,
            Err(UploadStorageError::InvalidPath)
        ));
    }
}
