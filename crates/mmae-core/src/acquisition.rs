use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    assets::{UnsupportedFormatError, label_from_filename, validate_upload_name},
    cancel::Cancellation,
    codec::{AudioCodec, DecodeError},
    fetcher::{FetchFailureKind, MediaFetcher},
    model::{Track, TrackOrigin, TrackSummary},
    registry::TrackRegistry,
};

pub const DEFAULT_DURATION_TOLERANCE_SECS: f64 = 1.0;
pub const DEFAULT_MAX_FILES_PER_UPLOAD: usize = 32;
const FALLBACK_LABEL: &str = "audio";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionPolicy {
    pub duration_tolerance_secs: f64,
    pub max_files_per_upload: usize,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            duration_tolerance_secs: DEFAULT_DURATION_TOLERANCE_SECS,
            max_files_per_upload: DEFAULT_MAX_FILES_PER_UPLOAD,
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("fetching {url} failed ({kind}): {message}")]
    Fetch {
        url: String,
        kind: FetchFailureKind,
        message: String,
    },
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),
    #[error("could not decode '{label}': {source}")]
    Decode {
        label: String,
        #[source]
        source: DecodeError,
    },
    #[error("upload '{0}' is empty")]
    EmptyUpload(String),
    #[error("no files supplied")]
    NoFiles,
    #[error("{count} files supplied, at most {limit} allowed")]
    TooManyFiles { count: usize, limit: usize },
    #[error("acquisition cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

pub struct AcquisitionManager {
    registry: Arc<TrackRegistry>,
    codec: Arc<dyn AudioCodec>,
    fetcher: Arc<dyn MediaFetcher>,
    policy: AcquisitionPolicy,
}

impl AcquisitionManager {
    #[must_use]
    pub fn new(
        registry: Arc<TrackRegistry>,
        codec: Arc<dyn AudioCodec>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            registry,
            codec,
            fetcher,
            policy: AcquisitionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AcquisitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.registry
    }

    #[instrument(skip(self, cancel))]
    pub fn acquire_remote(
        &self,
        url: &str,
        cancel: &Cancellation,
    ) -> Result<TrackSummary, AcquisitionError> {
        let media = self.fetcher.fetch(url, cancel).map_err(|error| {
            if error.kind == FetchFailureKind::Cancelled {
                AcquisitionError::Cancelled
            } else {
                AcquisitionError::Fetch {
                    url: url.to_string(),
                    kind: error.kind,
                    message: error.message,
                }
            }
        })?;

        let label = media
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(FALLBACK_LABEL)
            .to_string();
        let pcm = self
            .codec
            .decode(&media.bytes, media.extension.as_deref(), cancel)
            .map_err(|source| decode_failure(&label, source))?;

        if let Some(hint) = media.duration_hint {
            let decoded = pcm.duration_seconds();
            if (hint - decoded).abs() > self.policy.duration_tolerance_secs {
                warn!(hint, decoded, "decoded duration differs from source metadata");
            }
        }

        let track = Track::new(
            label,
            TrackOrigin::Remote {
                url: url.to_string(),
            },
            pcm,
        );
        self.register(vec![track], cancel)
            .map(|mut summaries| summaries.remove(0))
    }

    #[instrument(skip(self, file, cancel), fields(filename = %file.filename, bytes = file.bytes.len()))]
    pub fn acquire_upload(
        &self,
        file: UploadedFile,
        cancel: &Cancellation,
    ) -> Result<TrackSummary, AcquisitionError> {
        self.acquire_uploads(vec![file], cancel)
            .map(|mut summaries| summaries.remove(0))
    }

    /// All-or-nothing: every name is validated before any decode, and every
    /// file is decoded before any track is registered.
    #[instrument(skip(self, files, cancel), fields(count = files.len()))]
    pub fn acquire_uploads(
        &self,
        files: Vec<UploadedFile>,
        cancel: &Cancellation,
    ) -> Result<Vec<TrackSummary>, AcquisitionError> {
        if files.is_empty() {
            return Err(AcquisitionError::NoFiles);
        }
        if files.len() > self.policy.max_files_per_upload {
            return Err(AcquisitionError::TooManyFiles {
                count: files.len(),
                limit: self.policy.max_files_per_upload,
            });
        }

        let mut validated = Vec::with_capacity(files.len());
        for file in files {
            let extension = validate_upload_name(&file.filename)?;
            if file.bytes.is_empty() {
                return Err(AcquisitionError::EmptyUpload(file.filename));
            }
            validated.push((file, extension));
        }

        let mut tracks = Vec::with_capacity(validated.len());
        for (file, extension) in validated {
            if cancel.is_cancelled() {
                return Err(AcquisitionError::Cancelled);
            }
            let label = label_from_filename(&file.filename);
            let pcm = self
                .codec
                .decode(&file.bytes, Some(&extension), cancel)
                .map_err(|source| decode_failure(&file.filename, source))?;
            tracks.push(Track::new(
                label,
                TrackOrigin::Upload {
                    filename: file.filename,
                },
                pcm,
            ));
        }

        self.register(tracks, cancel)
    }

    fn register(
        &self,
        tracks: Vec<Track>,
        cancel: &Cancellation,
    ) -> Result<Vec<TrackSummary>, AcquisitionError> {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }

        let summaries: Vec<TrackSummary> = self
            .registry
            .insert_all(tracks)
            .iter()
            .map(|track| track.summary())
            .collect();
        for summary in &summaries {
            info!(
                track_id = %summary.track_id,
                label = %summary.source_label,
                duration = summary.duration,
                "track acquired"
            );
        }
        Ok(summaries)
    }
}

fn decode_failure(label: &str, source: DecodeError) -> AcquisitionError {
    if matches!(source, DecodeError::Cancelled) {
        return AcquisitionError::Cancelled;
    }
    AcquisitionError::Decode {
        label: label.to_string(),
        source,
    }
}
