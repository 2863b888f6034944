/// Media storage
///
/// Uploaded images are stored under slash-separated paths such as
/// `posts/{uid}/{id}` and served back from `/media/{path}`.

pub mod disk;
pub mod store;

pub use disk::DiskBlobBackend;
pub use store::{BlobStore, MediaKind, MediaRef, StoredMedia};

use crate::error::{AuraError, AuraResult};
use async_trait::async_trait;

/// Bytes as a backend returns them
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub data: Vec<u8>,
    /// MIME type accepted at upload; absent for blobs stored without one
    pub mime_type: Option<String>,
}

/// Blob storage backend trait
///
/// Implementations handle the actual storage and retrieval of bytes.
/// Paths have already been checked with [`validate_path`].
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store bytes and their MIME type at `path`, replacing anything already there
    async fn put(&self, path: &str, data: Vec<u8>, mime_type: &str) -> AuraResult<()>;

    async fn get(&self, path: &str) -> AuraResult<Option<StoredBlob>>;
}

/// Reject empty, absolute and traversing paths
pub fn validate_path(path: &str) -> AuraResult<()> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(AuraError::Validation(format!("Invalid media path: {}", path)));
    }

    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(AuraError::Validation(format!("Invalid media path: {}", path)));
        }
    }

    Ok(())
}
