use std::{f32::consts::TAU, fs, path::Path};

use anyhow::{Context, Result};

use crate::{
    codec::encode_wav,
    model::{Pcm, PcmSlice},
};

#[must_use]
pub fn sine_pcm(
    frequency_hz: f32,
    seconds: f64,
    sample_rate: u32,
    channels: u16,
    amplitude: f32,
) -> Pcm {
    let frames = (seconds.max(0.0) * f64::from(sample_rate)).round() as usize;
    let step = TAU * frequency_hz / sample_rate.max(1) as f32;
    let mut samples = Vec::with_capacity(frames * usize::from(channels));
    for frame in 0..frames {
        let value = (step * frame as f32).sin() * amplitude;
        samples.extend(std::iter::repeat_n(value, usize::from(channels)));
    }
    Pcm::new(sample_rate, channels, samples)
}

/// Ramp from -1 to 1 so every frame carries a distinct value; handy for
/// checking that slices land on the expected samples.
#[must_use]
pub fn ramp_pcm(frames: usize, sample_rate: u32, channels: u16) -> Pcm {
    let denominator = frames.saturating_sub(1).max(1) as f32;
    let mut samples = Vec::with_capacity(frames * usize::from(channels));
    for frame in 0..frames {
        let value = -1.0 + 2.0 * frame as f32 / denominator;
        samples.extend(std::iter::repeat_n(value, usize::from(channels)));
    }
    Pcm::new(sample_rate, channels, samples)
}

#[must_use]
pub fn silence(seconds: f64, sample_rate: u32, channels: u16) -> Pcm {
    let frames = (seconds.max(0.0) * f64::from(sample_rate)).round() as usize;
    Pcm::silent(sample_rate, channels, frames)
}

pub fn wav_bytes(pcm: &Pcm) -> Result<Vec<u8>> {
    encode_wav(pcm.as_slice()).context("failed to encode fixture wav")
}

pub fn write_wav_fixture(dir: &Path, file_name: &str, pcm: PcmSlice<'_>) -> Result<()> {
    let path = dir.join(file_name);
    let bytes = encode_wav(pcm).context("failed to encode fixture wav")?;
    fs::write(&path, bytes)
        .with_context(|| format!("failed to write fixture: {}", path.display()))
}
