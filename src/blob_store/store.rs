/// Blob store manager
///
/// Validates uploads and maps stored paths to public URLs.
use crate::{
    blob_store::{validate_path, BlobBackend, DiskBlobBackend, StoredBlob},
    config::MediaConfig,
    error::{AuraError, AuraResult},
    metrics,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{path::PathBuf, str::FromStr, sync::Arc};
use uuid::Uuid;

/// Reference to stored media
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub path: String,
    pub url: String,
    pub mime_type: String,
    pub size: usize,
}

/// Bytes read back for serving
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub etag: String,
}

/// What an upload is for; decides its path and size limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Post,
    Story,
    Avatar,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Post => "post",
            MediaKind::Story => "story",
            MediaKind::Avatar => "avatar",
        }
    }

    /// Folder and file name for an upload by `uid`
    ///
    /// Avatars live at a fixed name so a new one replaces the old.
    pub fn location(&self, uid: &str) -> (String, String) {
        match self {
            MediaKind::Post => (format!("posts/{}", uid), Uuid::new_v4().to_string()),
            MediaKind::Story => (format!("stories/{}", uid), Uuid::new_v4().to_string()),
            MediaKind::Avatar => (format!("profilePictures/{}", uid), "profile.jpg".to_string()),
        }
    }

    pub fn max_bytes(&self, config: &MediaConfig) -> usize {
        match self {
            MediaKind::Avatar => config.avatar_upload_limit,
            MediaKind::Post | MediaKind::Story => config.upload_limit,
        }
    }
}

impl FromStr for MediaKind {
    type Err = AuraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(MediaKind::Post),
            "story" => Ok(MediaKind::Story),
            "avatar" => Ok(MediaKind::Avatar),
            other => Err(AuraError::Validation(format!("Unknown media kind: {}", other))),
        }
    }
}

/// Main blob store manager
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
    public_url: String,
}

impl BlobStore {
    pub fn new(backend: Arc<dyn BlobBackend>, public_url: &str) -> Self {
        Self {
            backend,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Store on local disk under `media_directory`
    pub fn on_disk(media_directory: PathBuf, public_url: &str) -> Self {
        Self::new(Arc::new(DiskBlobBackend::new(media_directory)), public_url)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/media/{}", self.public_url, path)
    }

    /// Detect an image MIME type from the leading bytes
    fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
        image::guess_format(data).ok().map(|format| format.to_mime_type())
    }

    /// Validate and store an image
    ///
    /// The declared MIME type wins when present; otherwise it is sniffed.
    /// Either way it must be `image/*`.
    pub async fn upload(
        &self,
        folder: &str,
        file_name: &str,
        data: Vec<u8>,
        declared_mime: Option<&str>,
        max_bytes: usize,
    ) -> AuraResult<MediaRef> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(AuraError::Validation(format!("Invalid file name: {}", file_name)));
        }
        let path = format!("{}/{}", folder.trim_end_matches('/'), file_name);
        validate_path(&path)?;

        let size = data.len();
        if size == 0 {
            return Err(AuraError::Validation("Upload is empty".to_string()));
        }
        if size > max_bytes {
            return Err(AuraError::Validation(format!(
                "Upload of {} bytes exceeds maximum of {} bytes",
                size, max_bytes
            )));
        }

        let mime_type = declared_mime
            .map(|mime| mime.trim().to_ascii_lowercase())
            .filter(|mime| !mime.is_empty())
            .or_else(|| Self::sniff_mime_type(&data).map(String::from))
            .ok_or_else(|| AuraError::Validation("Could not determine file type".to_string()))?;

        if !mime_type.starts_with("image/") {
            return Err(AuraError::Validation(format!(
                "Unsupported MIME type: {}",
                mime_type
            )));
        }

        self.backend.put(&path, data, &mime_type).await?;

        tracing::info!(path = %path, mime_type = %mime_type, size, "Stored media");

        Ok(MediaRef {
            url: self.url_for(&path),
            path,
            mime_type,
            size,
        })
    }

    /// Upload for `uid` at the location its kind prescribes
    pub async fn upload_for(
        &self,
        kind: MediaKind,
        uid: &str,
        data: Vec<u8>,
        declared_mime: Option<&str>,
        config: &MediaConfig,
    ) -> AuraResult<MediaRef> {
        let (folder, file_name) = kind.location(uid);
        let media = self
            .upload(&folder, &file_name, data, declared_mime, kind.max_bytes(config))
            .await?;
        metrics::record_media_upload(kind.as_str());
        Ok(media)
    }

    /// Read stored media back with a content hash for caching
    ///
    /// Served with the type accepted at upload. Blobs stored without one are
    /// sniffed.
    pub async fn get(&self, path: &str) -> AuraResult<Option<StoredMedia>> {
        validate_path(path)?;

        let Some(StoredBlob { data, mime_type }) = self.backend.get(path).await? else {
            return Ok(None);
        };

        let mime_type = mime_type.unwrap_or_else(|| {
            Self::sniff_mime_type(&data)
                .unwrap_or("application/octet-stream")
                .to_string()
        });
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(&data)));

        Ok(Some(StoredMedia {
            data,
            mime_type,
            etag,
        }))
    }
}
