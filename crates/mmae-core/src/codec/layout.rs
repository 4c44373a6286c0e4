/// Maps interleaved frames from `from` channels onto `to` channels.
///
/// Mono fans out to every output channel. Downmixing to mono averages all
/// inputs; otherwise input channel `i` folds into output `i % to`, averaged
/// by the number of inputs landing on each output.
pub(super) fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = usize::from(from.max(1));
    let to = usize::from(to.max(1));
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);

    if from == 1 {
        for &sample in samples {
            output.extend(std::iter::repeat_n(sample, to));
        }
        return output;
    }

    let mut contributors = vec![0_u16; to];
    for input in 0..from {
        contributors[input % to] += 1;
    }

    let mut mixed = vec![0.0_f32; to];
    for frame in samples.chunks_exact(from) {
        mixed.fill(0.0);
        for (input, &sample) in frame.iter().enumerate() {
            mixed[input % to] += sample;
        }
        for (value, &count) in mixed.iter().zip(&contributors) {
            output.push(if count == 0 {
                0.0
            } else {
                *value / f32::from(count)
            });
        }
    }

    output
}
