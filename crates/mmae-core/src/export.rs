use std::{collections::HashSet, fmt, ops::Range, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    archive::build_zip,
    cancel::Cancellation,
    codec::{AudioCodec, EncodeError, OutputFormat},
    model::{Pcm, Region, Track, TrackId},
    registry::TrackRegistry,
    storage::ObjectStore,
    time::{frame_period, seconds_to_frame},
};

pub const DEFAULT_KEY_PREFIX: &str = "clips";
const EXPORT_ID_SHORT_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRequest {
    #[serde(alias = "file_id")]
    pub track_id: TrackId,
    /// Folder name for this track's clips; the track's own label when absent.
    #[serde(default, alias = "track_name")]
    pub label: Option<String>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl ExportRequest {
    #[must_use]
    pub fn new(track_id: TrackId, regions: Vec<Region>) -> Self {
        Self {
            track_id,
            label: None,
            regions,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportOptions {
    pub format: OutputFormat,
    pub key_prefix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum Delivery<'a> {
    Archive,
    Upload(&'a dyn ObjectStore),
}

impl fmt::Debug for Delivery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => f.write_str("Archive"),
            Self::Upload(_) => f.write_str("Upload"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Resolve,
    Validate,
    Encode,
    Deliver,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Validate => "validate",
            Self::Encode => "encode",
            Self::Deliver => "deliver",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportFailureKind {
    TrackNotFound,
    InvalidRegion,
    Encode,
    Storage,
    Archive,
    Cancelled,
}

impl fmt::Display for ExportFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TrackNotFound => "track not found",
            Self::InvalidRegion => "invalid region",
            Self::Encode => "encode failed",
            Self::Storage => "storage failed",
            Self::Archive => "archive failed",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{kind} during {stage}: {message}")]
pub struct ExportFailure {
    pub kind: ExportFailureKind,
    pub stage: ExportStage,
    pub message: String,
}

impl ExportFailure {
    #[must_use]
    pub fn new(kind: ExportFailureKind, stage: ExportStage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    fn cancelled(stage: ExportStage) -> Self {
        Self::new(ExportFailureKind::Cancelled, stage, "export cancelled")
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum InvalidRegionError {
    #[error("region bounds must be finite, got {start}..{end}")]
    NonFinite { start: f64, end: f64 },
    #[error("region start {start} is negative")]
    NegativeStart { start: f64 },
    #[error("region start {start} must be before end {end}")]
    Empty { start: f64, end: f64 },
    #[error("region {start}..{end} exceeds track duration {duration:.3}s")]
    OutOfBounds { start: f64, end: f64, duration: f64 },
    #[error("region {start}..{end} is shorter than one sample")]
    ZeroFrames { start: f64, end: f64 },
}

/// Checks a region against a buffer and returns the frame range to slice.
///
/// An end up to one frame past the duration is clamped to the duration.
pub fn validate_region(region: Region, pcm: &Pcm) -> Result<Range<usize>, InvalidRegionError> {
    let Region { start, end } = region;
    if !start.is_finite() || !end.is_finite() {
        return Err(InvalidRegionError::NonFinite { start, end });
    }
    if start < 0.0 {
        return Err(InvalidRegionError::NegativeStart { start });
    }
    if start >= end {
        return Err(InvalidRegionError::Empty { start, end });
    }

    let duration = pcm.duration_seconds();
    let tolerance = frame_period(pcm.sample_rate());
    if end > duration + tolerance || start >= duration {
        return Err(InvalidRegionError::OutOfBounds {
            start,
            end,
            duration,
        });
    }

    let sample_rate = pcm.sample_rate();
    let start_frame = seconds_to_frame(start, sample_rate);
    let end_frame = seconds_to_frame(end.min(duration), sample_rate).min(pcm.frames());
    if end_frame <= start_frame {
        return Err(InvalidRegionError::ZeroFrames { start, end });
    }
    Ok(start_frame..end_frame)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClipLocation {
    Url { url: String },
    ArchiveEntry { path: String },
}

impl ClipLocation {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url { url } => url,
            Self::ArchiveEntry { path } => path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipDescriptor {
    pub name: String,
    pub location: ClipLocation,
    pub duration_seconds: f64,
    pub frames: usize,
    pub size_bytes: usize,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Succeeded(ClipDescriptor),
    Failed(ExportFailure),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportResult {
    pub track_id: TrackId,
    pub track_label: String,
    /// 1-based position within the originating request's region list.
    pub region_index: usize,
    pub region: Region,
    #[serde(flatten)]
    pub outcome: ExportOutcome,
}

impl ExportResult {
    #[must_use]
    pub fn clip(&self) -> Option<&ClipDescriptor> {
        match &self.outcome {
            ExportOutcome::Succeeded(clip) => Some(clip),
            ExportOutcome::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&ExportFailure> {
        match &self.outcome {
            ExportOutcome::Succeeded(_) => None,
            ExportOutcome::Failed(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArchive {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataItemKind {
    Title,
    Audio,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataItem {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: DataItemKind,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportReport {
    pub export_id: String,
    pub created_at: DateTime<Utc>,
    pub format: OutputFormat,
    pub results: Vec<ExportResult>,
    #[serde(skip)]
    pub archive: Option<ExportArchive>,
}

impl ExportReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|result| result.clip().is_some()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    #[must_use]
    pub fn data_items(&self) -> Vec<DataItem> {
        let mut items = Vec::with_capacity(self.succeeded() * 3);
        for result in &self.results {
            let Some(clip) = result.clip() else {
                continue;
            };
            items.push(DataItem {
                content: clip.name.clone(),
                kind: DataItemKind::Title,
            });
            items.push(DataItem {
                content: clip.location.as_str().to_string(),
                kind: DataItemKind::Audio,
            });
            items.push(DataItem {
                content: format!(
                    "start timestamp {:.3} / end timestamp {:.3}",
                    result.region.start, result.region.end
                ),
                kind: DataItemKind::Text,
            });
        }
        items
    }
}

#[must_use]
pub fn clip_file_name(index: usize, region: Region, format: OutputFormat) -> String {
    format!(
        "clip_{index:03}_{:.3}s-{:.3}s.{}",
        region.start,
        region.end,
        format.extension()
    )
}

/// Keeps alphanumerics, spaces, `-` and `_`; everything else becomes `_`.
/// Falls back to `fallback` when nothing usable remains.
#[must_use]
pub fn sanitize_folder_name(label: &str, fallback: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Default)]
struct FolderAllocator {
    used: HashSet<String>,
}

impl FolderAllocator {
    fn allocate(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.used.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}-{suffix}");
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

struct PendingEntry {
    result_index: usize,
    path: String,
    bytes: Vec<u8>,
}

pub struct RegionExporter {
    registry: Arc<TrackRegistry>,
    codec: Arc<dyn AudioCodec>,
}

impl RegionExporter {
    #[must_use]
    pub fn new(registry: Arc<TrackRegistry>, codec: Arc<dyn AudioCodec>) -> Self {
        Self { registry, codec }
    }

    #[instrument(
        skip(self, requests, options, cancel),
        fields(tracks = requests.len(), format = %options.format)
    )]
    pub fn export(
        &self,
        requests: &[ExportRequest],
        options: &ExportOptions,
        delivery: Delivery<'_>,
        cancel: &Cancellation,
    ) -> ExportReport {
        let created_at = Utc::now();
        let export_id = Uuid::new_v4().simple().to_string();
        let key_root = format!(
            "{}/{}_{}",
            options.key_prefix.trim_matches('/'),
            created_at.timestamp(),
            &export_id[..EXPORT_ID_SHORT_LEN]
        );

        let mut folders = FolderAllocator::default();
        let mut results = Vec::new();
        let mut pending = Vec::new();

        for request in requests {
            let track = self.registry.get(&request.track_id);
            let track_label = track
                .as_ref()
                .map_or_else(|| request.track_id.to_string(), |track| track.source_label.clone());
            let folder = folders.allocate(sanitize_folder_name(
                request.label.as_deref().unwrap_or(&track_label),
                request.track_id.as_str(),
            ));

            for (offset, region) in request.regions.iter().copied().enumerate() {
                let region_index = offset + 1;
                let outcome = match &track {
                    None => ExportOutcome::Failed(ExportFailure::new(
                        ExportFailureKind::TrackNotFound,
                        ExportStage::Resolve,
                        format!("track {} is not registered", request.track_id),
                    )),
                    Some(track) => {
                        let target = ClipTarget {
                            folder: &folder,
                            key_root: &key_root,
                            region_index,
                            region,
                        };
                        match self.export_region(track, &target, options.format, delivery, cancel)
                        {
                            Ok(RegionOutput::Delivered(clip)) => ExportOutcome::Succeeded(clip),
                            Ok(RegionOutput::Staged { clip, bytes }) => {
                                pending.push(PendingEntry {
                                    result_index: results.len(),
                                    path: clip.location.as_str().to_string(),
                                    bytes,
                                });
                                ExportOutcome::Succeeded(clip)
                            }
                            Err(failure) => ExportOutcome::Failed(failure),
                        }
                    }
                };

                if let ExportOutcome::Failed(failure) = &outcome {
                    warn!(
                        track_id = %request.track_id,
                        region_index,
                        stage = %failure.stage,
                        error = %failure.message,
                        "region export failed"
                    );
                }
                results.push(ExportResult {
                    track_id: request.track_id.clone(),
                    track_label: track_label.clone(),
                    region_index,
                    region,
                    outcome,
                });
            }
        }

        let archive = if pending.is_empty() {
            None
        } else {
            finish_archive(&created_at, pending, &mut results, cancel)
        };

        let report = ExportReport {
            export_id,
            created_at,
            format: options.format,
            results,
            archive,
        };
        info!(
            export_id = %report.export_id,
            delivery = ?delivery,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "export completed"
        );
        report
    }

    fn export_region(
        &self,
        track: &Track,
        target: &ClipTarget<'_>,
        format: OutputFormat,
        delivery: Delivery<'_>,
        cancel: &Cancellation,
    ) -> Result<RegionOutput, ExportFailure> {
        let frames = validate_region(target.region, &track.pcm).map_err(|error| {
            ExportFailure::new(
                ExportFailureKind::InvalidRegion,
                ExportStage::Validate,
                error.to_string(),
            )
        })?;
        if cancel.is_cancelled() {
            return Err(ExportFailure::cancelled(ExportStage::Encode));
        }

        let slice = track.pcm.slice_frames(frames.start, frames.end);
        let bytes = self
            .codec
            .encode(slice, format, cancel)
            .map_err(|error| match error {
                EncodeError::Cancelled => ExportFailure::cancelled(ExportStage::Encode),
                other => ExportFailure::new(
                    ExportFailureKind::Encode,
                    ExportStage::Encode,
                    other.to_string(),
                ),
            })?;
        if cancel.is_cancelled() {
            return Err(ExportFailure::cancelled(ExportStage::Deliver));
        }

        let name = clip_file_name(target.region_index, target.region, format);
        let relative = format!("{}/{name}", target.folder);
        debug!(
            track_id = %track.id,
            region_index = target.region_index,
            frames = slice.frames(),
            bytes = bytes.len(),
            path = %relative,
            "clip encoded"
        );

        let mut clip = ClipDescriptor {
            name,
            location: ClipLocation::ArchiveEntry {
                path: relative.clone(),
            },
            duration_seconds: slice.duration_seconds(),
            frames: slice.frames(),
            size_bytes: bytes.len(),
            content_type: format.content_type().to_string(),
        };

        match delivery {
            Delivery::Archive => Ok(RegionOutput::Staged { clip, bytes }),
            Delivery::Upload(store) => {
                let key = format!("{}/{relative}", target.key_root);
                let url = store
                    .put(bytes, &key, format.content_type())
                    .map_err(|error| {
                        ExportFailure::new(
                            ExportFailureKind::Storage,
                            ExportStage::Deliver,
                            error.to_string(),
                        )
                    })?;
                clip.location = ClipLocation::Url { url };
                Ok(RegionOutput::Delivered(clip))
            }
        }
    }
}

struct ClipTarget<'a> {
    folder: &'a str,
    key_root: &'a str,
    region_index: usize,
    region: Region,
}

enum RegionOutput {
    Delivered(ClipDescriptor),
    Staged { clip: ClipDescriptor, bytes: Vec<u8> },
}

/// Zips staged clips. If the archive cannot be produced, every staged
/// result is downgraded to a failure so nothing claims a missing entry.
fn finish_archive(
    created_at: &DateTime<Utc>,
    pending: Vec<PendingEntry>,
    results: &mut [ExportResult],
    cancel: &Cancellation,
) -> Option<ExportArchive> {
    let built = if cancel.is_cancelled() {
        Err(ExportFailure::cancelled(ExportStage::Deliver))
    } else {
        build_zip(
            pending
                .iter()
                .map(|entry| (entry.path.as_str(), entry.bytes.as_slice())),
        )
        .map_err(|error| {
            ExportFailure::new(
                ExportFailureKind::Archive,
                ExportStage::Deliver,
                error.to_string(),
            )
        })
    };

    match built {
        Ok(bytes) => Some(ExportArchive {
            name: format!("mmae_clips_{}.zip", created_at.timestamp()),
            bytes,
        }),
        Err(failure) => {
            warn!(error = %failure, "archive delivery failed");
            for entry in pending {
                if let Some(result) = results.get_mut(entry.result_index) {
                    result.outcome = ExportOutcome::Failed(failure.clone());
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_names_follow_index_and_bounds() {
        assert_eq!(
            clip_file_name(1, Region::new(0.0, 2.5), OutputFormat::Wav),
            "clip_001_0.000s-2.500s.wav"
        );
        assert_eq!(
            clip_file_name(12, Region::new(1.25, 3.0), OutputFormat::Mp3),
            "clip_012_1.250s-3.000s.mp3"
        );
    }

    #[test]
    fn folder_names_are_sanitized() {
        assert_eq!(sanitize_folder_name("My Song: Live!", "id"), "My Song_ Live_");
        assert_eq!(sanitize_folder_name("  ", "abc123"), "abc123");
        assert_eq!(sanitize_folder_name("a/b", "id"), "a_b");
    }

    #[test]
    fn folder_collisions_get_numbered_suffixes() {
        let mut folders = FolderAllocator::default();
        assert_eq!(folders.allocate("take".to_string()), "take");
        assert_eq!(folders.allocate("take".to_string()), "take-2");
        assert_eq!(folders.allocate("take-2".to_string()), "take-2-2");
        assert_eq!(folders.allocate("take".to_string()), "take-3");
    }

    #[test]
    fn region_validation_clamps_one_frame_overshoot() {
        let pcm = Pcm::silent(1_000, 1, 1_000);
        assert_eq!(validate_region(Region::new(0.0, 1.0), &pcm), Ok(0..1_000));
        assert_eq!(validate_region(Region::new(0.5, 1.000_5), &pcm), Ok(500..1_000));
        assert!(matches!(
            validate_region(Region::new(0.5, 1.01), &pcm),
            Err(InvalidRegionError::OutOfBounds { .. })
        ));
        assert!(matches!(
            validate_region(Region::new(0.5, 0.5), &pcm),
            Err(InvalidRegionError::Empty { .. })
        ));
        assert!(matches!(
            validate_region(Region::new(-0.1, 0.5), &pcm),
            Err(InvalidRegionError::NegativeStart { .. })
        ));
        assert!(matches!(
            validate_region(Region::new(0.0, f64::NAN), &pcm),
            Err(InvalidRegionError::NonFinite { .. })
        ));
        assert!(matches!(
            validate_region(Region::new(0.1, 0.1002), &pcm),
            Err(InvalidRegionError::ZeroFrames { .. })
        ));
    }
}
