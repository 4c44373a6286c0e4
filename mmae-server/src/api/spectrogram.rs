use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mmae_core::{RenderedSpectrogram, SpectrogramInfo, TrackId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{require_track, run_blocking};
use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct SizeQuery {
    pub width: Option<usize>,
    pub height: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SpectrogramResponse {
    pub file_id: TrackId,
    pub mime: &'static str,
    /// Base64-encoded PNG.
    pub image: String,
    #[serde(flatten)]
    pub info: SpectrogramInfo,
}

async fn rendered(
    state: &AppState,
    id: &TrackId,
    size: SizeQuery,
) -> ApiResult<Arc<RenderedSpectrogram>> {
    let track = require_track(state, id)?;
    let config = state
        .spectrogram_config
        .as_ref()
        .clone()
        .with_output_size(size.width, size.height);
    let cache = Arc::clone(&state.spectrograms);
    let registry = Arc::clone(&state.registry);
    Ok(run_blocking(move |_cancel| cache.get_or_render(&track, &config, &registry)).await??)
}

/// GET /api/spectrogram/:id
#[instrument(skip(state, size))]
pub async fn json(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
    Query(size): Query<SizeQuery>,
) -> ApiResult<Json<SpectrogramResponse>> {
    let rendered = rendered(&state, &id, size).await?;
    Ok(Json(SpectrogramResponse {
        file_id: id,
        mime: "image/png",
        image: STANDARD.encode(&rendered.png),
        info: rendered.info.clone(),
    }))
}

/// GET /api/spectrogram/:id/image
#[instrument(skip(state, size))]
pub async fn image(
    State(state): State<AppState>,
    Path(id): Path<TrackId>,
    Query(size): Query<SizeQuery>,
) -> ApiResult<impl IntoResponse> {
    let rendered = rendered(&state, &id, size).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], rendered.png.clone()))
}
