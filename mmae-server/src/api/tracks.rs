use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use mmae_core::{OutputFormat, TrackId};
use tracing::{info, instrument};

use super::{acquire::TrackResponse, require_track, run_blocking};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// GET /api/tracks
pub async fn list(State(state): State<AppState>) -> Json<Vec<TrackResponse>> {
    Json(
        state
            .registry
            .summaries()
            .into_iter()
            .map(TrackResponse::from)
            .collect(),
    )
}

/// DELETE /api/tracks/:id
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
) -> ApiResult<StatusCode> {
    if state.registry.remove(&id).is_none() {
        return Err(ApiError::NotFound(format!("audio file {id} not found")));
    }
    let purged = state.spectrograms.purge_track(&id);
    info!(purged, "track deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/audio/:id — the canonical decoded track as WAV.
#[instrument(skip(state))]
pub async fn audio(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
) -> ApiResult<impl IntoResponse> {
    let track = require_track(&state, &id)?;
    let codec = Arc::clone(&state.codec);
    let wav = run_blocking(move |cancel| {
        codec.encode(track.pcm.as_slice(), OutputFormat::Wav, cancel)
    })
    .await??;

    Ok((
        [
            (header::CONTENT_TYPE, OutputFormat::Wav.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{id}.wav\""),
            ),
        ],
        wav,
    ))
}
