//! HTTP handlers. CPU-bound work runs on the blocking pool; if the client
//! disconnects, the request future is dropped and the work is cancelled.

mod acquire;
mod export;
mod health;
mod spectrogram;
mod tracks;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mmae_core::{Cancellation, ExportArchive, Track, TrackId};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub use health::health;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/download", post(acquire::download))
        .route("/upload", post(acquire::upload))
        .route("/audio/:id", get(tracks::audio))
        .route("/tracks", get(tracks::list))
        .route("/tracks/:id", delete(tracks::remove))
        .route("/spectrogram/:id", get(spectrogram::json))
        .route("/spectrogram/:id/image", get(spectrogram::image))
        .route("/clip", post(export::clip))
        .route("/clip-multi", post(export::clip_multi))
        .route("/export", post(export::export))
}

/// Runs `task` on the blocking pool with a cancellation flag that trips if
/// this future is dropped before the task finishes.
async fn run_blocking<T, F>(task: F) -> ApiResult<T>
where
    F: FnOnce(&Cancellation) -> T + Send + 'static,
    T: Send + 'static,
{
    let cancel = Cancellation::new();
    let guard = cancel.drop_guard();
    let worker = cancel.clone();
    let output = tokio::task::spawn_blocking(move || task(&worker))
        .await
        .map_err(|error| ApiError::Internal(format!("worker task failed: {error}")))?;
    guard.disarm();
    Ok(output)
}

fn require_track(state: &AppState, id: &TrackId) -> ApiResult<Arc<Track>> {
    state
        .registry
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("audio file {id} not found")))
}

/// Archive bytes inlined in a JSON response.
#[derive(Debug, Serialize)]
struct ArchivePayload {
    name: String,
    content_type: &'static str,
    size_bytes: usize,
    data: String,
}

impl From<&ExportArchive> for ArchivePayload {
    fn from(archive: &ExportArchive) -> Self {
        Self {
            name: archive.name.clone(),
            content_type: "application/zip",
            size_bytes: archive.bytes.len(),
            data: STANDARD.encode(&archive.bytes),
        }
    }
}
