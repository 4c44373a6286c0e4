/// Nearest frame index for a time offset; negative and non-finite inputs
/// map to frame zero.
#[must_use]
pub fn seconds_to_frame(seconds: f64, sample_rate: u32) -> usize {
    if !seconds.is_finite() || seconds <= 0.0 || sample_rate == 0 {
        return 0;
    }

    (seconds * f64::from(sample_rate)).round() as usize
}

#[must_use]
pub fn frames_to_seconds(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frames as f64 / f64::from(sample_rate)
}

#[must_use]
pub fn frame_period(sample_rate: u32) -> f64 {
    frames_to_seconds(1, sample_rate)
}

#[must_use]
pub fn rescale_frames(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }

    (frames as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip_is_stable() {
        let sample_rate = 44_100;
        let frame = 98_765;
        let seconds = frames_to_seconds(frame, sample_rate);
        assert_eq!(seconds_to_frame(seconds, sample_rate), frame);
    }

    #[test]
    fn seconds_round_to_nearest_frame() {
        assert_eq!(seconds_to_frame(0.5, 8_000), 4_000);
        assert_eq!(seconds_to_frame(1.0 / 16_000.0, 8_000), 1);
        assert_eq!(seconds_to_frame(-3.0, 8_000), 0);
        assert_eq!(seconds_to_frame(f64::NAN, 8_000), 0);
    }

    #[test]
    fn rescale_preserves_duration() {
        assert_eq!(rescale_frames(48_000, 48_000, 44_100), 44_100);
        assert_eq!(rescale_frames(0, 48_000, 44_100), 0);
    }
}
