/// Media upload and serving endpoints
use crate::{
    auth::AuthContext,
    blob_store::{MediaKind, MediaRef},
    context::AppContext,
    error::{AuraError, AuraResult},
    social::ProfileUpdate,
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};

/// Uploads under a fixed name are replaced in place and must be revalidated
const MUTABLE_CACHE: &str = "public, max-age=300, must-revalidate";
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/media/:kind", post(upload_media))
        .route("/media/*path", get(get_media))
}

/// Upload raw image bytes
///
/// The body is the file itself. An avatar upload also points the caller's
/// profile at the new picture.
async fn upload_media(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AuraResult<(StatusCode, Json<MediaRef>)> {
    let kind: MediaKind = kind.parse()?;
    let declared_mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim())
        .filter(|value| *value != "application/octet-stream");

    let media = ctx
        .blob_store
        .upload_for(kind, &auth.uid, body.to_vec(), declared_mime, &ctx.config.media)
        .await?;

    if kind == MediaKind::Avatar {
        ctx.social
            .update_profile(
                &auth.uid,
                ProfileUpdate {
                    photo_url: Some(media.url.clone()),
                    ..Default::default()
                },
            )
            .await?;
    }

    Ok((StatusCode::CREATED, Json(media)))
}

/// Serve stored media with caching and range support
async fn get_media(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> AuraResult<Response> {
    let media = ctx
        .blob_store
        .get(&path)
        .await?
        .ok_or_else(|| AuraError::NotFound(format!("Media not found: {}", path)))?;

    let cache_control = if path.starts_with("profilePictures/") {
        MUTABLE_CACHE
    } else {
        IMMUTABLE_CACHE
    };

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').any(|tag| tag.trim() == media.etag))
        .unwrap_or(false);

    if not_modified {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, &media.etag)
            .header(header::CACHE_CONTROL, cache_control)
            .body(Body::empty())
            .map_err(|e| AuraError::Internal(e.to_string()));
    }

    let total_size = media.data.len();

    if let Some((start, end)) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_range(value, total_size))
    {
        let partial = media.data[start..=end].to_vec();
        return Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, &media.mime_type)
            .header(header::CONTENT_LENGTH, partial.len().to_string())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, total_size),
            )
            .header(header::ETAG, &media.etag)
            .header(header::CACHE_CONTROL, cache_control)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from(partial))
            .map_err(|e| AuraError::Internal(e.to_string()));
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &media.mime_type)
        .header(header::CONTENT_LENGTH, total_size.to_string())
        .header(header::ETAG, &media.etag)
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from(media.data))
        .map_err(|e| AuraError::Internal(e.to_string()))
}

/// Parse a single `bytes=start-end` range
///
/// Returns inclusive bounds, or `None` when the header is malformed or
/// unsatisfiable.
fn parse_range(range: &str, total_size: usize) -> Option<(usize, usize)> {
    let bounds = range.strip_prefix("bytes=")?;
    if bounds.contains(',') || total_size == 0 {
        return None;
    }
    let (start, end) = bounds.split_once('-')?;
    let last = total_size - 1;

    let (start, end) = match (start.trim(), end.trim()) {
        ("", suffix) => {
            let suffix: usize = suffix.parse().ok()?;
            if suffix == 0 {
                return None;
            }
            (total_size.saturating_sub(suffix), last)
        }
        (start, "") => (start.parse().ok()?, last),
        (start, end) => (start.parse().ok()?, end.parse::<usize>().ok()?.min(last)),
    };

    (start <= end && start <= last).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=900-5000", 1000), Some((900, 999)));
    }

    #[test]
    fn test_parse_range_rejects_bad_input() {
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=50-10", 1000), None);
        assert_eq!(parse_range("items=0-1", 1000), None);
        assert_eq!(parse_range("bytes=0-1,5-6", 1000), None);
        assert_eq!(parse_range("bytes=0-1", 0), None);
    }
}
