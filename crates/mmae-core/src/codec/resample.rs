use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::DecodeError;
use crate::time::rescale_frames;

const PROBE_CHUNK: usize = 1024;

/// Converts interleaved audio between sample rates.
///
/// The whole buffer is processed as one chunk, extended by holding the last
/// frame long enough to flush the interpolator's delay. The leading delay is
/// trimmed and the result truncated to exactly `round(frames * to / from)`.
pub(super) fn resample(
    samples: &[f32],
    channels: u16,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    let width = usize::from(channels.max(1));
    let input_frames = samples.len() / width;
    if from_rate == to_rate || input_frames == 0 {
        return Ok(samples.to_vec());
    }

    let target_frames = rescale_frames(input_frames, from_rate, to_rate);
    debug!(
        from_rate,
        to_rate, input_frames, target_frames, "resampling decoded audio"
    );

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut planar = deinterleave(samples, width);
    let failure = |message: String| DecodeError::Resample {
        from: from_rate,
        to: to_rate,
        message,
    };

    // The delay depends only on ratio and interpolation, not chunk size.
    let delay = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, PROBE_CHUNK, width)
        .map_err(|error| failure(error.to_string()))?
        .output_delay();
    let padding = tail_padding(delay, ratio);
    for channel in &mut planar {
        let last = channel.last().copied().unwrap_or(0.0);
        channel.resize(input_frames + padding, last);
    }

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Septic,
        input_frames + padding,
        width,
    )
    .map_err(|error| failure(error.to_string()))?;

    let mut output = resampler
        .process(&planar, None)
        .map_err(|error| failure(error.to_string()))?;

    for channel in &mut output {
        let skip = delay.min(channel.len());
        channel.drain(..skip);
        channel.resize(target_frames, 0.0);
    }

    Ok(interleave(&output, target_frames))
}

/// Input frames needed past the end so the output covers `delay` extra
/// frames plus the interpolator's look-ahead.
fn tail_padding(delay: usize, ratio: f64) -> usize {
    const LOOK_AHEAD: usize = 8;
    let frames = (delay as f64 / ratio).ceil() as usize;
    frames + LOOK_AHEAD
}

fn deinterleave(samples: &[f32], width: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / width); width];
    for frame in samples.chunks_exact(width) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>], frames: usize) -> Vec<f32> {
    let mut output = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            output.push(channel[frame]);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        let output = resample(&samples, 2, 44_100, 44_100).expect("passthrough");
        assert_eq!(output, samples);
    }

    #[test]
    fn output_length_tracks_rate_ratio() {
        let frames = 48_000;
        let samples: Vec<f32> = (0..frames * 2)
            .map(|index| ((index / 2) as f32 * 0.01).sin() * 0.5)
            .collect();
        let output = resample(&samples, 2, 48_000, 44_100).expect("resample should work");
        assert_eq!(output.len(), 44_100 * 2);
        assert!(output.iter().all(|sample| sample.is_finite()));
    }

    fn constant_mono(rate: u32, value: f32) -> Vec<f32> {
        vec![value; rate as usize]
    }

    #[test]
    fn constant_signal_survives_to_the_last_frame() {
        for from_rate in [48_000, 22_050, 8_000, 96_000] {
            let output = resample(&constant_mono(from_rate, 0.5), 1, from_rate, 44_100)
                .expect("resample should work");
            assert_eq!(output.len(), 44_100, "{from_rate} Hz");

            let tail = &output[output.len() - 64..];
            assert!(
                tail.iter().all(|sample| (sample - 0.5).abs() < 1e-3),
                "{from_rate} Hz tail: {:?}",
                &tail[tail.len() - 8..]
            );
            let middle = output[output.len() / 2];
            assert!((middle - 0.5).abs() < 1e-3, "{from_rate} Hz middle: {middle}");
        }
    }

    #[test]
    fn stereo_tail_keeps_each_channel() {
        let samples: Vec<f32> = (0..48_000).flat_map(|_| [0.25, -0.75]).collect();
        let output = resample(&samples, 2, 48_000, 44_100).expect("resample should work");
        let last = &output[output.len() - 2..];
        assert!((last[0] - 0.25).abs() < 1e-3, "{last:?}");
        assert!((last[1] + 0.75).abs() < 1e-3, "{last:?}");
    }

    #[test]
    fn planar_round_trip_preserves_order() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = deinterleave(&samples, 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(interleave(&planar, 3), samples.to_vec());
    }
}
