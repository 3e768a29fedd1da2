use crate::{domain::FileStorage, errors::StorageError};
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing;
use uuid::Uuid;

/// URL prefix under which uploaded files are served.
pub const UPLOADS_MOUNT: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Creates the upload directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::info!(upload_dir = %root.display(), "Upload directory ready");
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            tracing::warn!(file_key = %key, "Rejecting file key");
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        tracing::debug!(file_key = %key, bytes = data.len(), "Disk: Writing upload");
        fs::write(&path, data).await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(Vec<u8>, String), StorageError> {
        let path = self.path_for(key)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let content_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok((data, content_type))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(file_key = %key, "Disk: Removed upload");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(file_key = %key, "Disk: Upload already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A key is a single plain file name inside the upload directory.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
        && Path::new(key).file_name().is_some()
}

/// Builds the stored file name: `<unix millis>-<nonce>-<sanitized original name>`.
/// The nonce keeps same-named uploads in the same millisecond apart.
pub fn upload_key(original_name: &str, unix_millis: i64, nonce: Uuid) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let mut sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('.').is_empty() {
        sanitized = "upload".to_string();
    }
    format!("{}-{}-{}", unix_millis, nonce.simple(), sanitized)
}

/// Public URL path for a stored file.
pub fn url_for_key(key: &str) -> String {
    format!("{}/{}", UPLOADS_MOUNT, key)
}

/// Extracts the storage key from an image URL produced by [`url_for_key`].
/// URLs pointing anywhere else are not ours to clean up.
pub fn key_from_url(url: &str) -> Option<&str> {
    url.strip_prefix(UPLOADS_MOUNT)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| is_valid_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_keys_are_timestamp_prefixed_and_flat() {
        let nonce = Uuid::nil();
        let n = "00000000000000000000000000000000";
        assert_eq!(upload_key("cat.png", 1700000000000, nonce), format!("1700000000000-{n}-cat.png"));
        assert_eq!(upload_key("../../etc/passwd", 1, nonce), format!("1-{n}-passwd"));
        assert_eq!(upload_key("C:\\pics\\my cat.jpg", 2, nonce), format!("2-{n}-my_cat.jpg"));
        assert_eq!(upload_key("..", 3, nonce), format!("3-{n}-upload"));
        assert_eq!(upload_key("", 4, nonce), format!("4-{n}-upload"));
    }

    #[test]
    fn same_name_in_same_millisecond_gets_distinct_keys() {
        let a = upload_key("cat.png", 42, Uuid::new_v4());
        let b = upload_key("cat.png", 42, Uuid::new_v4());
        assert_ne!(a, b);
        assert!(a.starts_with("42-") && a.ends_with("-cat.png"));
        assert!(key_from_url(&url_for_key(&a)).is_some());
    }

    #[test]
    fn only_upload_urls_yield_keys() {
        assert_eq!(key_from_url("/uploads/1-cat.png"), Some("1-cat.png"));
        assert_eq!(key_from_url("/uploads/../secret"), None);
        assert_eq!(key_from_url("https://cdn.example.com/cat.png"), None);
        assert_eq!(key_from_url(""), None);
    }

    #[tokio::test]
    async fn files_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().join("uploads")).await.unwrap();

        storage.upload("1-cat.png", b"\x89PNG").await.unwrap();
        let (data, content_type) = storage.download("1-cat.png").await.unwrap();
        assert_eq!(data, b"\x89PNG");
        assert_eq!(content_type, "image/png");

        storage.delete("1-cat.png").await.unwrap();
        assert!(matches!(
            storage.download("1-cat.png").await,
            Err(StorageError::NotFound(_))
        ));
        // Deleting twice is fine.
        storage.delete("1-cat.png").await.unwrap();
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path()).await.unwrap();
        assert!(matches!(
            storage.download("../Cargo.toml").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.upload("a/b", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
