use std::sync::Arc;

use axum::{Json, extract::State};
use mmae_core::{
    DataItem, Delivery, ExportFailure, ExportOptions, ExportReport, ExportRequest, OutputFormat,
    Region, TrackId,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::{ArchivePayload, require_track, run_blocking};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Upload when a store is configured, otherwise archive.
    #[default]
    Auto,
    Archive,
    Upload,
}

/// Runs an export on the blocking pool. Upload requests without a
/// configured store are served as archives.
async fn run_export(
    state: &AppState,
    requests: Vec<ExportRequest>,
    format: Option<OutputFormat>,
    mode: DeliveryMode,
) -> ApiResult<(ExportReport, DeliveryMode)> {
    let store = match mode {
        DeliveryMode::Archive => None,
        DeliveryMode::Auto => state.object_store.clone(),
        DeliveryMode::Upload => {
            if state.object_store.is_none() {
                warn!("upload delivery requested without object storage; using archive");
            }
            state.object_store.clone()
        }
    };
    let effective = if store.is_some() {
        DeliveryMode::Upload
    } else {
        DeliveryMode::Archive
    };

    let options = ExportOptions {
        format: format.unwrap_or(state.export_options.format),
        key_prefix: state.export_options.key_prefix.clone(),
    };
    let exporter = Arc::clone(&state.exporter);
    let report = run_blocking(move |cancel| {
        let delivery = match store.as_deref() {
            Some(store) => Delivery::Upload(store),
            None => Delivery::Archive,
        };
        exporter.export(&requests, &options, delivery, cancel)
    })
    .await?;

    info!(
        export_id = %report.export_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        delivery = ?effective,
        "export finished"
    );
    Ok((report, effective))
}

#[derive(Debug, Deserialize)]
pub struct ClipRequest {
    pub file_id: TrackId,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize)]
pub struct ClipLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ClipResponse {
    pub clips: Vec<ClipLink>,
    pub failures: Vec<ExportFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive: Option<ArchivePayload>,
}

/// POST /api/clip — regions of a single track.
#[instrument(skip(state, request), fields(file_id = %request.file_id, regions = request.regions.len()))]
pub async fn clip(
    State(state): State<AppState>,
    Json(request): Json<ClipRequest>,
) -> ApiResult<Json<ClipResponse>> {
    if request.regions.is_empty() {
        return Err(ApiError::BadRequest("No regions specified".to_string()));
    }
    require_track(&state, &request.file_id)?;

    let requests = vec![ExportRequest::new(request.file_id, request.regions)];
    let (report, _) = run_export(&state, requests, request.format, DeliveryMode::Auto).await?;

    let clips = report
        .results
        .iter()
        .filter_map(|result| result.clip())
        .map(|clip| ClipLink {
            name: clip.name.clone(),
            url: clip.location.as_str().to_string(),
        })
        .collect();
    let failures = report
        .results
        .iter()
        .filter_map(|result| result.failure().cloned())
        .collect();
    Ok(Json(ClipResponse {
        clips,
        failures,
        archive: report.archive.as_ref().map(ArchivePayload::from),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClipMultiRequest {
    #[serde(default)]
    pub tracks: Vec<ExportRequest>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize)]
pub struct ClipMultiInfo {
    pub data: Vec<DataItem>,
}

#[derive(Debug, Serialize)]
pub struct ClipMultiEntry {
    pub info: ClipMultiInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive: Option<ArchivePayload>,
}

/// POST /api/clip-multi — regions across several tracks, answered as a flat
/// list of title/audio/text items.
#[instrument(skip(state, request), fields(tracks = request.tracks.len()))]
pub async fn clip_multi(
    State(state): State<AppState>,
    Json(request): Json<ClipMultiRequest>,
) -> ApiResult<Json<Vec<ClipMultiEntry>>> {
    if request.tracks.is_empty() {
        return Err(ApiError::BadRequest("No tracks specified".to_string()));
    }
    for track in &request.tracks {
        require_track(&state, &track.track_id)?;
    }

    let (report, _) =
        run_export(&state, request.tracks, request.format, DeliveryMode::Auto).await?;
    Ok(Json(vec![ClipMultiEntry {
        info: ClipMultiInfo {
            data: report.data_items(),
        },
        archive: report.archive.as_ref().map(ArchivePayload::from),
    }]))
}

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    #[serde(alias = "tracks")]
    pub requests: Vec<ExportRequest>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub delivery: DeliveryMode,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    #[serde(flatten)]
    pub report: ExportReport,
    pub delivery: DeliveryMode,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive: Option<ArchivePayload>,
}

/// POST /api/export — full per-region report. Unknown tracks are reported
/// as failed regions rather than rejecting the request.
#[instrument(skip(state, body), fields(tracks = body.requests.len(), delivery = ?body.delivery))]
pub async fn export(
    State(state): State<AppState>,
    Json(body): Json<ExportBody>,
) -> ApiResult<Json<ExportResponse>> {
    if body.requests.is_empty() {
        return Err(ApiError::BadRequest("No tracks specified".to_string()));
    }
    let (report, delivery) = run_export(&state, body.requests, body.format, body.delivery).await?;
    let archive = report.archive.as_ref().map(ArchivePayload::from);
    Ok(Json(ExportResponse {
        succeeded: report.succeeded(),
        failed: report.failed(),
        delivery,
        archive,
        report,
    }))
}
