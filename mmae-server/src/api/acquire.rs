use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State},
};
use mmae_core::{TrackId, TrackSummary, UploadedFile};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::run_blocking;
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
}

/// Shape returned for every acquired or listed track.
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub file_id: TrackId,
    pub filename: String,
    pub duration: f64,
}

impl From<TrackSummary> for TrackResponse {
    fn from(summary: TrackSummary) -> Self {
        Self {
            file_id: summary.track_id,
            filename: summary.source_label,
            duration: summary.duration,
        }
    }
}

/// POST /api/download
#[instrument(skip(state, request), fields(url = %request.url))]
pub async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<Json<TrackResponse>> {
    let url = request.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::BadRequest("url is required".to_string()));
    }

    let manager = Arc::clone(&state.acquisition);
    let summary = run_blocking(move |cancel| manager.acquire_remote(&url, cancel)).await??;
    info!(file_id = %summary.track_id, duration = summary.duration, "download complete");
    Ok(Json(summary.into()))
}

/// POST /api/upload (multipart, one or more `files` parts)
#[instrument(skip_all)]
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Vec<TrackResponse>>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            debug!(field = ?field.name(), "skipping non-file multipart field");
            continue;
        };
        let bytes = field.bytes().await?;
        debug!(%filename, bytes = bytes.len(), "upload part received");
        files.push(UploadedFile::new(filename, bytes.to_vec()));
    }

    let manager = Arc::clone(&state.acquisition);
    let summaries = run_blocking(move |cancel| manager.acquire_uploads(files, cancel)).await??;
    info!(count = summaries.len(), "upload complete");
    Ok(Json(summaries.into_iter().map(TrackResponse::from).collect()))
}
