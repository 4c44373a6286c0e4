mod cache;
mod colormap;
mod image;
mod stft;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::Pcm;

pub use cache::SpectrogramCache;
pub use colormap::Colormap;
pub use image::{encode_png, render_rgb};

/// Larger windows sharpen frequency detail and blur timing.
pub const DEFAULT_WINDOW_SIZE: usize = 2_048;
/// `window - hop` samples overlap between successive frames.
pub const DEFAULT_HOP_SIZE: usize = 512;
/// Level given to silence so the log scale never reaches `-inf`.
pub const DEFAULT_FLOOR_DB: f32 = -120.0;
/// Span below the loudest cell that is spread over the colormap.
pub const DEFAULT_DYNAMIC_RANGE_DB: f32 = 80.0;
pub const DEFAULT_OUTPUT_WIDTH: usize = 1_600;
pub const DEFAULT_OUTPUT_HEIGHT: usize = 256;
/// Caps FFTs per output column, bounding cost for long tracks.
pub const DEFAULT_FRAMES_PER_COLUMN: usize = 4;
const MIN_WINDOW_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("invalid spectrogram configuration: {0}")]
    InvalidConfig(String),
    #[error("spectrogram image encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Normalization {
    /// `[loudest - range_db, loudest]`, never below the floor.
    DynamicRange { range_db: f32 },
    MinMax,
    FixedDb { min_db: f32, max_db: f32 },
}

impl Default for Normalization {
    fn default() -> Self {
        Self::DynamicRange {
            range_db: DEFAULT_DYNAMIC_RANGE_DB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectrogramConfig {
    pub window_size: usize,
    pub hop_size: usize,
    pub floor_db: f32,
    pub normalization: Normalization,
    pub max_width: usize,
    pub max_height: usize,
    pub frames_per_column: usize,
    pub colormap: Colormap,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            floor_db: DEFAULT_FLOOR_DB,
            normalization: Normalization::default(),
            max_width: DEFAULT_OUTPUT_WIDTH,
            max_height: DEFAULT_OUTPUT_HEIGHT,
            frames_per_column: DEFAULT_FRAMES_PER_COLUMN,
            colormap: Colormap::default(),
        }
    }
}

impl SpectrogramConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        let invalid = |message: String| Err(RenderError::InvalidConfig(message));

        if self.window_size < MIN_WINDOW_SIZE {
            return invalid(format!(
                "window_size must be at least {MIN_WINDOW_SIZE}, got {}",
                self.window_size
            ));
        }
        if self.hop_size == 0 || self.hop_size >= self.window_size {
            return invalid(format!(
                "hop_size must be in 1..{}, got {}",
                self.window_size, self.hop_size
            ));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return invalid("output dimensions must be non-zero".to_string());
        }
        if self.frames_per_column == 0 {
            return invalid("frames_per_column must be non-zero".to_string());
        }
        if !self.floor_db.is_finite() {
            return invalid("floor_db must be finite".to_string());
        }
        match self.normalization {
            Normalization::DynamicRange { range_db } if !(range_db.is_finite() && range_db > 0.0) => {
                invalid(format!("range_db must be positive, got {range_db}"))
            }
            Normalization::FixedDb { min_db, max_db }
                if !(min_db.is_finite() && max_db.is_finite() && min_db < max_db) =>
            {
                invalid(format!("fixed bounds must satisfy min < max, got {min_db}..{max_db}"))
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn with_output_size(mut self, width: Option<usize>, height: Option<usize>) -> Self {
        if let Some(width) = width {
            self.max_width = width.clamp(1, self.max_width.max(1));
        }
        if let Some(height) = height {
            self.max_height = height.clamp(1, self.max_height.max(1));
        }
        self
    }

    fn bin_count(&self) -> usize {
        self.window_size / 2 + 1
    }
}

/// Normalized magnitude grid, row-major, row 0 holding the highest band.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub width: usize,
    pub height: usize,
    pub time_resolution: f64,
    pub freq_resolution: f64,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    pub min_db: f32,
    pub max_db: f32,
    pub values: Vec<f32>,
}

impl Spectrogram {
    #[must_use]
    pub fn value(&self, column: usize, row: usize) -> f32 {
        self.values[row * self.width + column]
    }

    #[must_use]
    pub fn info(&self, colormap: Colormap) -> SpectrogramInfo {
        SpectrogramInfo {
            width: self.width,
            height: self.height,
            time_resolution: self.time_resolution,
            freq_resolution: self.freq_resolution,
            sample_rate: self.sample_rate,
            duration_seconds: self.duration_seconds,
            min_db: self.min_db,
            max_db: self.max_db,
            colormap,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectrogramInfo {
    pub width: usize,
    pub height: usize,
    pub time_resolution: f64,
    pub freq_resolution: f64,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    pub min_db: f32,
    pub max_db: f32,
    pub colormap: Colormap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSpectrogram {
    pub info: SpectrogramInfo,
    pub png: Vec<u8>,
}

#[instrument(skip(pcm, config), fields(frames = pcm.frames(), sample_rate = pcm.sample_rate()))]
pub fn compute(pcm: &Pcm, config: &SpectrogramConfig) -> Result<Spectrogram, RenderError> {
    config.validate()?;

    let mono = pcm.to_mono();
    let sample_rate = pcm.sample_rate();
    let analysis = stft::analyze(&mono, config);
    let magnitudes = analysis.magnitudes;

    let decibels: Vec<f32> = magnitudes
        .iter()
        .map(|&magnitude| {
            if magnitude > 0.0 {
                (20.0 * magnitude.log10()).max(config.floor_db)
            } else {
                config.floor_db
            }
        })
        .collect();

    let (min_db, max_db) = normalization_bounds(&decibels, config);
    let span = max_db - min_db;
    let values = decibels
        .iter()
        .map(|&level| {
            if span <= f32::EPSILON {
                0.0
            } else {
                ((level - min_db) / span).clamp(0.0, 1.0)
            }
        })
        .collect();

    let width = analysis.width;
    let height = analysis.height;
    let duration_seconds = pcm.duration_seconds();
    let time_resolution = if duration_seconds > 0.0 {
        duration_seconds / width as f64
    } else {
        config.hop_size as f64 / f64::from(sample_rate)
    };
    let bin_hz = f64::from(sample_rate) / config.window_size as f64;

    debug!(
        width,
        height,
        total_frames = analysis.total_frames,
        analysed_frames = analysis.analysed_frames,
        min_db,
        max_db,
        "spectrogram computed"
    );

    Ok(Spectrogram {
        width,
        height,
        time_resolution,
        freq_resolution: bin_hz * config.bin_count() as f64 / height as f64,
        sample_rate,
        duration_seconds,
        min_db,
        max_db,
        values,
    })
}

pub fn render(pcm: &Pcm, config: &SpectrogramConfig) -> Result<RenderedSpectrogram, RenderError> {
    let spectrogram = compute(pcm, config)?;
    let rgb = render_rgb(&spectrogram, config.colormap);
    let png = encode_png(spectrogram.width, spectrogram.height, &rgb)?;
    Ok(RenderedSpectrogram {
        info: spectrogram.info(config.colormap),
        png,
    })
}

fn normalization_bounds(decibels: &[f32], config: &SpectrogramConfig) -> (f32, f32) {
    let loudest = decibels.iter().copied().fold(config.floor_db, f32::max);
    let quietest = decibels.iter().copied().fold(loudest, f32::min);
    match config.normalization {
        Normalization::DynamicRange { range_db } => {
            ((loudest - range_db).max(config.floor_db), loudest)
        }
        Normalization::MinMax => (quietest, loudest),
        Normalization::FixedDb { min_db, max_db } => (min_db, max_db),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SpectrogramConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_degenerate_configs() {
        let base = SpectrogramConfig::default();
        let cases = [
            SpectrogramConfig {
                window_size: 0,
                ..base.clone()
            },
            SpectrogramConfig {
                hop_size: 0,
                ..base.clone()
            },
            SpectrogramConfig {
                hop_size: base.window_size,
                ..base.clone()
            },
            SpectrogramConfig {
                max_width: 0,
                ..base.clone()
            },
            SpectrogramConfig {
                normalization: Normalization::FixedDb {
                    min_db: -10.0,
                    max_db: -20.0,
                },
                ..base.clone()
            },
            SpectrogramConfig {
                normalization: Normalization::DynamicRange { range_db: 0.0 },
                ..base
            },
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(RenderError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn requested_size_is_clamped_to_limits() {
        let config = SpectrogramConfig::default().with_output_size(Some(10_000), Some(0));
        assert_eq!(config.max_width, DEFAULT_OUTPUT_WIDTH);
        assert_eq!(config.max_height, 1);
    }
}
