use std::f32::consts::PI;

use rustfft::{FftPlanner, num_complex::Complex};

use super::SpectrogramConfig;

/// Pooled magnitude grid before decibel conversion.
pub(super) struct Analysis {
    pub width: usize,
    pub height: usize,
    pub total_frames: usize,
    pub analysed_frames: usize,
    /// Row-major, row 0 is the highest frequency band.
    pub magnitudes: Vec<f32>,
}

pub(super) fn frame_count(samples: usize, window: usize, hop: usize) -> usize {
    if samples <= window {
        1
    } else {
        1 + (samples - window).div_ceil(hop)
    }
}

pub(super) fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denominator = (size - 1) as f32;
    (0..size)
        .map(|index| 0.5 - 0.5 * (2.0 * PI * index as f32 / denominator).cos())
        .collect()
}

/// Frames evaluated for one column: evenly spread across the column's
/// share of the timeline, at most `per_column` of them.
fn column_frames(column: usize, width: usize, total: usize, per_column: usize) -> Vec<usize> {
    let start = column * total / width;
    let end = ((column + 1) * total / width).max(start + 1);
    let span = end - start;
    if span <= per_column {
        return (start..end).collect();
    }
    (0..per_column)
        .map(|step| start + step * span / per_column)
        .collect()
}

pub(super) fn analyze(mono: &[f32], config: &SpectrogramConfig) -> Analysis {
    let window_size = config.window_size;
    let bins = config.bin_count();
    let total_frames = frame_count(mono.len(), window_size, config.hop_size);
    let width = total_frames.min(config.max_width);
    let height = bins.min(config.max_height);

    let window = hann_window(window_size);
    let window_sum: f32 = window.iter().sum();
    let scale = if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 };

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);
    let mut buffer = vec![Complex::new(0.0, 0.0); window_size];
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

    let mut magnitudes = vec![0.0_f32; width * height];
    let mut bin_magnitudes = vec![0.0_f32; bins];
    let mut analysed_frames = 0;

    for column in 0..width {
        for frame in column_frames(column, width, total_frames, config.frames_per_column) {
            let offset = frame * config.hop_size;
            for (index, slot) in buffer.iter_mut().enumerate() {
                let sample = mono.get(offset + index).copied().unwrap_or(0.0);
                *slot = Complex::new(sample * window[index], 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);
            analysed_frames += 1;

            for (bin, magnitude) in bin_magnitudes.iter_mut().enumerate() {
                *magnitude = buffer[bin].norm() * scale;
            }

            for band in 0..height {
                let first = band * bins / height;
                let last = ((band + 1) * bins / height).max(first + 1);
                let peak = bin_magnitudes[first..last]
                    .iter()
                    .copied()
                    .fold(0.0_f32, f32::max);
                let row = height - 1 - band;
                let cell = &mut magnitudes[row * width + column];
                *cell = cell.max(peak);
            }
        }
    }

    Analysis {
        width,
        height,
        total_frames,
        analysed_frames,
        magnitudes,
    }
}
