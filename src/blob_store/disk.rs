/// Disk-based blob storage backend
use crate::{
    blob_store::{validate_path, BlobBackend, StoredBlob},
    error::{AuraError, AuraResult},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Suffix of the file holding a blob's MIME type
const MIME_SUFFIX: &str = ".mime";

/// Disk storage backend
///
/// A media path maps directly onto a file below `base_path`. The MIME type
/// accepted at upload sits next to it in `{file}.mime`.
#[derive(Clone)]
pub struct DiskBlobBackend {
    base_path: PathBuf,
}

impl DiskBlobBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn file_path(&self, path: &str) -> AuraResult<PathBuf> {
        validate_path(path)?;
        if path.ends_with(MIME_SUFFIX) {
            return Err(AuraError::Validation(format!("Invalid media path: {}", path)));
        }
        Ok(path
            .split('/')
            .fold(self.base_path.clone(), |acc, segment| acc.join(segment)))
    }

    fn mime_path(file_path: &Path) -> PathBuf {
        let mut name = file_path.as_os_str().to_os_string();
        name.push(MIME_SUFFIX);
        PathBuf::from(name)
    }
}

#[async_trait]
impl BlobBackend for DiskBlobBackend {
    async fn put(&self, path: &str, data: Vec<u8>, mime_type: &str) -> AuraResult<()> {
        let file_path = self.file_path(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AuraError::Storage(format!("Failed to create media directory: {}", e))
            })?;
        }

        fs::write(&file_path, data)
            .await
            .map_err(|e| AuraError::Storage(format!("Failed to write {}: {}", path, e)))?;
        fs::write(Self::mime_path(&file_path), mime_type)
            .await
            .map_err(|e| AuraError::Storage(format!("Failed to write type of {}: {}", path, e)))?;

        Ok(())
    }

    async fn get(&self, path: &str) -> AuraResult<Option<StoredBlob>> {
        let file_path = self.file_path(path)?;

        let data = match fs::read(&file_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuraError::Storage(format!("Failed to read {}: {}", path, e))),
        };

        let mime_type = match fs::read_to_string(Self::mime_path(&file_path)).await {
            Ok(mime) => Some(mime.trim().to_string()).filter(|mime| !mime.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(AuraError::Storage(format!(
                    "Failed to read type of {}: {}",
                    path, e
                )))
            }
        };

        Ok(Some(StoredBlob { data, mime_type }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf());

        let path = "posts/alice/one";
        backend.put(path, b"bytes".to_vec(), "image/png").await.unwrap();
        assert!(dir.path().join("posts").join("alice").join("one").exists());
        assert!(dir.path().join("posts").join("alice").join("one.mime").exists());

        let stored = backend.get(path).await.unwrap().unwrap();
        assert_eq!(stored.data, b"bytes".to_vec());
        assert_eq!(stored.mime_type.as_deref(), Some("image/png"));

        assert_eq!(backend.get("posts/alice/two").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf());

        let path = "profilePictures/a/profile.jpg";
        backend.put(path, b"old".to_vec(), "image/png").await.unwrap();
        backend.put(path, b"new".to_vec(), "image/webp").await.unwrap();

        let stored = backend.get(path).await.unwrap().unwrap();
        assert_eq!(stored.data, b"new".to_vec());
        assert_eq!(stored.mime_type.as_deref(), Some("image/webp"));
    }

    #[tokio::test]
    async fn test_missing_type_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().to_path_buf());

        std::fs::create_dir_all(dir.path().join("posts")).unwrap();
        std::fs::write(dir.path().join("posts").join("legacy"), b"raw").unwrap();

        let stored = backend.get("posts/legacy").await.unwrap().unwrap();
        assert_eq!(stored.data, b"raw".to_vec());
        assert_eq!(stored.mime_type, None);
    }

    #[tokio::test]
    async fn test_traversal_and_type_files_rejected() {
        let dir = tempdir().unwrap();
        let backend = DiskBlobBackend::new(dir.path().join("media"));

        let result = backend.put("../escape", b"x".to_vec(), "image/png").await;
        assert!(matches!(result, Err(AuraError::Validation(_))));
        assert!(!dir.path().join("escape").exists());

        backend.put("posts/a/one", b"x".to_vec(), "image/png").await.unwrap();
        assert!(matches!(
            backend.get("posts/a/one.mime").await,
            Err(AuraError::Validation(_))
        ));
    }
}
