//! Face-scan uploads and asset lookup.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub asset_id: String,
    pub filename: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Upload,
    Output,
}

#[derive(Debug, Serialize)]
pub struct AssetResponse {
    pub asset_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

/// POST /v0/assets/upload
///
/// Stores the first `file` field of the form. Only `video/*` is accepted.
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let is_video = field
            .content_type()
            .is_some_and(|ct| ct.starts_with("video/"));
        if !is_video {
            return Err(ApiError::bad_request("Only video files are accepted"));
        }

        let filename = field.file_name().map(str::to_string);
        let asset_id = Uuid::new_v4().to_string();
        let file_name = format!("{}.{}", asset_id, upload_extension(filename.as_deref()));
        fs::create_dir_all(&state.config.upload_dir).await?;
        let dest = state.config.upload_dir.join(&file_name);

        let mut file = fs::File::create(&dest).await?;
        let mut written = 0u64;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&dest).await;
                    return Err(ApiError::bad_request(e.body_text()));
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(asset_id = %asset_id, bytes = written, "Stored upload");
        metrics::record_asset_uploaded(written);
        return Ok(Json(UploadResponse {
            asset_id,
            filename,
            url: format!("/media/uploads/{}", file_name),
        }));
    }

    Err(ApiError::bad_request(format!(
        "Missing '{}' field",
        UPLOAD_FIELD
    )))
}

/// GET /v0/assets/:asset_id
///
/// Uploads are searched before rendered outputs.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> ApiResult<Json<AssetResponse>> {
    if !is_valid_asset_id(&asset_id) {
        return Err(ApiError::not_found("Asset not found"));
    }

    let searches = [
        (&state.config.upload_dir, AssetKind::Upload, "uploads"),
        (&state.config.output_dir, AssetKind::Output, "outputs"),
    ];
    for (dir, kind, mount) in searches {
        if let Some(path) = find_by_stem(dir, &asset_id).await? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(Json(AssetResponse {
                asset_id,
                url: format!("/media/{}/{}", mount, name),
                kind,
            }));
        }
    }

    Err(ApiError::not_found("Asset not found"))
}

/// First file in `dir` named `<stem>.<ext>`.
async fn find_by_stem(dir: &FsPath, stem: &str) -> ApiResult<Option<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some(stem) && path.extension().is_some() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Extension of the client's file name, `mp4` when absent or unusable.
fn upload_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string())
}

/// Alphanumeric characters, hyphens and underscores only, at most 128 chars.
fn is_valid_asset_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 128 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension(Some("scan.MOV")), "mov");
        assert_eq!(upload_extension(Some("scan")), "mp4");
        assert_eq!(upload_extension(None), "mp4");
        assert_eq!(upload_extension(Some("evil.../x")), "mp4");
    }

    #[test]
    fn test_asset_ids() {
        assert!(is_valid_asset_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_asset_id("output_anime"));
        assert!(!is_valid_asset_id(""));
        assert!(!is_valid_asset_id("../etc/passwd"));
        assert!(!is_valid_asset_id("a.b"));
    }
}
