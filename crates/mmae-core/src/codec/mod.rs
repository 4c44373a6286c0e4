mod decode;
mod ffmpeg;
mod layout;
mod resample;
mod wav;

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    cancel::Cancellation,
    model::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, Pcm, PcmSlice},
};

pub use wav::{decode_wav, encode_wav};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CanonicalFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Wav,
    Flac,
    Mp3,
    Ogg,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = EncodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "flac" => Ok(Self::Flac),
            "mp3" => Ok(Self::Mp3),
            "ogg" => Ok(Self::Ogg),
            other => Err(EncodeError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported audio container or codec: {0}")]
    Unsupported(String),
    #[error("corrupt or unreadable audio stream: {0}")]
    Corrupt(String),
    #[error("audio stream contains no decodable samples")]
    Empty,
    #[error("resampling from {from} Hz to {to} Hz failed: {message}")]
    Resample { from: u32, to: u32, message: String },
    #[error("external decoder failed: {0}")]
    External(String),
    #[error("decode cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode an empty slice")]
    EmptySlice,
    #[error("output format {0} is not available without an external encoder")]
    Unsupported(OutputFormat),
    #[error("unknown output format '{0}'")]
    UnknownFormat(String),
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("external encoder failed: {0}")]
    External(String),
    #[error("encode cancelled")]
    Cancelled,
}

pub trait AudioCodec: Send + Sync {
    fn canonical_format(&self) -> CanonicalFormat;

    /// Decodes `bytes` into canonical PCM. `extension_hint` is a container
    /// extension without the dot.
    fn decode(
        &self,
        bytes: &[u8],
        extension_hint: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Pcm, DecodeError>;

    /// Encodes a PCM slice; identical input yields identical bytes.
    fn encode(
        &self,
        pcm: PcmSlice<'_>,
        format: OutputFormat,
        cancel: &Cancellation,
    ) -> Result<Vec<u8>, EncodeError>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultCodec {
    canonical: CanonicalFormat,
    ffmpeg_binary: Option<PathBuf>,
}

impl DefaultCodec {
    #[must_use]
    pub fn new(canonical: CanonicalFormat) -> Self {
        Self {
            canonical,
            ffmpeg_binary: None,
        }
    }

    #[must_use]
    pub fn with_ffmpeg(mut self, binary: impl Into<PathBuf>) -> Self {
        self.ffmpeg_binary = Some(binary.into());
        self
    }

    #[must_use]
    pub fn ffmpeg_binary(&self) -> Option<&std::path::Path> {
        self.ffmpeg_binary.as_deref()
    }

    fn normalize(&self, decoded: Pcm) -> Result<Pcm, DecodeError> {
        let target = self.canonical;
        let remixed = layout::remix(decoded.samples(), decoded.channels(), target.channels);
        let samples = resample::resample(
            &remixed,
            target.channels,
            decoded.sample_rate(),
            target.sample_rate,
        )?;
        Ok(Pcm::new(target.sample_rate, target.channels, samples))
    }
}

impl AudioCodec for DefaultCodec {
    fn canonical_format(&self) -> CanonicalFormat {
        self.canonical
    }

    #[instrument(skip(self, bytes, cancel), fields(bytes = bytes.len()))]
    fn decode(
        &self,
        bytes: &[u8],
        extension_hint: Option<&str>,
        cancel: &Cancellation,
    ) -> Result<Pcm, DecodeError> {
        let pcm = match decode::decode_with_symphonia(bytes, extension_hint, cancel) {
            Ok(decoded) => self.normalize(decoded)?,
            Err(DecodeError::Unsupported(reason)) => {
                let Some(binary) = &self.ffmpeg_binary else {
                    return Err(DecodeError::Unsupported(reason));
                };
                warn!(%reason, "in-process decoder unsupported, falling back to ffmpeg");
                ffmpeg::decode(binary, bytes, extension_hint, self.canonical, cancel)?
            }
            Err(error) => return Err(error),
        };

        if pcm.is_empty() {
            return Err(DecodeError::Empty);
        }

        info!(
            frames = pcm.frames(),
            sample_rate = pcm.sample_rate(),
            channels = pcm.channels(),
            "audio decoded to canonical pcm"
        );
        Ok(pcm)
    }

    #[instrument(skip(self, pcm, cancel), fields(frames = pcm.frames(), format = %format))]
    fn encode(
        &self,
        pcm: PcmSlice<'_>,
        format: OutputFormat,
        cancel: &Cancellation,
    ) -> Result<Vec<u8>, EncodeError> {
        if pcm.is_empty() {
            return Err(EncodeError::EmptySlice);
        }
        if cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }

        let bytes = match format {
            OutputFormat::Wav => encode_wav(pcm)?,
            OutputFormat::Flac | OutputFormat::Mp3 | OutputFormat::Ogg => {
                let binary = self
                    .ffmpeg_binary
                    .as_deref()
                    .ok_or(EncodeError::Unsupported(format))?;
                ffmpeg::encode(binary, pcm, format, cancel)?
            }
        };

        debug!(bytes = bytes.len(), "clip encoded");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_with_or_without_dot() {
        assert_eq!("WAV".parse::<OutputFormat>().ok(), Some(OutputFormat::Wav));
        assert_eq!(".mp3".parse::<OutputFormat>().ok(), Some(OutputFormat::Mp3));
        assert!(matches!(
            "aiff".parse::<OutputFormat>(),
            Err(EncodeError::UnknownFormat(_))
        ));
    }

    #[test]
    fn compressed_output_requires_ffmpeg() {
        let codec = DefaultCodec::default();
        let pcm = Pcm::silent(8_000, 1, 16);
        let result = codec.encode(pcm.as_slice(), OutputFormat::Mp3, &Cancellation::new());
        assert!(matches!(
            result,
            Err(EncodeError::Unsupported(OutputFormat::Mp3))
        ));
    }

    #[test]
    fn empty_slice_is_rejected() {
        let codec = DefaultCodec::default();
        let pcm = Pcm::silent(8_000, 2, 0);
        let result = codec.encode(pcm.as_slice(), OutputFormat::Wav, &Cancellation::new());
        assert!(matches!(result, Err(EncodeError::EmptySlice)));
    }
}
