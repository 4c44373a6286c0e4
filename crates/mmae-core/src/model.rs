use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::frames_to_seconds;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_CHANNELS: u16 = 2;
const TRACK_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
}

impl Pcm {
    /// Builds a buffer, dropping a trailing partial frame if `samples` is not
    /// a whole number of frames.
    #[must_use]
    pub fn new(sample_rate: u32, channels: u16, mut samples: Vec<f32>) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % usize::from(channels);
        samples.truncate(whole);
        Self {
            sample_rate: sample_rate.max(1),
            channels,
            samples,
        }
    }

    #[must_use]
    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self::new(
            sample_rate,
            channels,
            vec![0.0; frames * usize::from(channels.max(1))],
        )
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.frames(), self.sample_rate)
    }

    #[must_use]
    pub fn as_slice(&self) -> PcmSlice<'_> {
        PcmSlice {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: &self.samples,
        }
    }

    /// Frame range `[start_frame, end_frame)`, clamped to the buffer.
    #[must_use]
    pub fn slice_frames(&self, start_frame: usize, end_frame: usize) -> PcmSlice<'_> {
        let frames = self.frames();
        let end = end_frame.min(frames);
        let start = start_frame.min(end);
        let width = usize::from(self.channels);
        PcmSlice {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: &self.samples[start * width..end * width],
        }
    }

    #[must_use]
    pub fn to_mono(&self) -> Vec<f32> {
        self.as_slice().to_mono()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcmSlice<'a> {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: &'a [f32],
}

impl PcmSlice<'_> {
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        frames_to_seconds(self.frames(), self.sample_rate)
    }

    #[must_use]
    pub fn to_mono(&self) -> Vec<f32> {
        let width = usize::from(self.channels.max(1));
        if width == 1 {
            return self.samples.to_vec();
        }
        self.samples
            .chunks_exact(width)
            .map(|frame| frame.iter().sum::<f32>() / width as f32)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    #[must_use]
    pub fn generate() -> Self {
        let mut simple = Uuid::new_v4().simple().to_string();
        simple.truncate(TRACK_ID_LEN);
        Self(simple)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackOrigin {
    Upload { filename: String },
    Remote { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub source_label: String,
    pub origin: TrackOrigin,
    pub created_at: DateTime<Utc>,
    pub pcm: Pcm,
}

impl Track {
    #[must_use]
    pub fn new(source_label: impl Into<String>, origin: TrackOrigin, pcm: Pcm) -> Self {
        Self {
            id: TrackId::generate(),
            source_label: source_label.into(),
            origin,
            created_at: Utc::now(),
            pcm,
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.pcm.duration_seconds()
    }

    #[must_use]
    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            track_id: self.id.clone(),
            duration: self.duration_seconds(),
            source_label: self.source_label.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackSummary {
    pub track_id: TrackId,
    pub duration: f64,
    pub source_label: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub start: f64,
    pub end: f64,
}

impl Region {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
