use std::io::{Cursor, Read};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::model::{Pcm, PcmSlice};

/// 16-bit PCM WAV, written entirely in memory.
pub fn encode_wav(pcm: PcmSlice<'_>) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: pcm.channels.max(1),
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut bytes = Vec::with_capacity(44 + pcm.samples.len() * 2);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for &sample in pcm.samples {
            let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer.write_sample(quantized)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

/// Reads integer or float WAV into interleaved `f32`.
pub fn decode_wav<R: Read>(reader: R) -> Result<Pcm, hound::Error> {
    let reader = WavReader::new(reader)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(Pcm::new(spec.sample_rate, spec.channels, samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_round_trip_keeps_frame_count() {
        let pcm = Pcm::new(
            22_050,
            2,
            (0..2_000).map(|index| (index as f32 / 2_000.0) - 0.5).collect(),
        );
        let bytes = encode_wav(pcm.as_slice()).expect("encode");
        let decoded = decode_wav(Cursor::new(bytes)).expect("decode");
        assert_eq!(decoded.frames(), pcm.frames());
        assert_eq!(decoded.sample_rate(), 22_050);
        assert_eq!(decoded.channels(), 2);
        for (left, right) in decoded.samples().iter().zip(pcm.samples()) {
            assert!((left - right).abs() < 1.0e-3);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let pcm = Pcm::new(8_000, 1, vec![0.25; 400]);
        assert_eq!(
            encode_wav(pcm.as_slice()).expect("first"),
            encode_wav(pcm.as_slice()).expect("second")
        );
    }
}
