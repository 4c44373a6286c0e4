use std::io::{Cursor, ErrorKind};

use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, instrument, warn};

use super::DecodeError;
use crate::{cancel::Cancellation, model::Pcm};

const CANCEL_CHECK_PACKETS: usize = 64;

/// Decodes at the stream's native rate and channel count.
#[instrument(skip(bytes, cancel), fields(bytes = bytes.len()))]
pub(super) fn decode_with_symphonia(
    bytes: &[u8],
    extension_hint: Option<&str>,
    cancel: &Cancellation,
) -> Result<Pcm, DecodeError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension_hint {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(map_symphonia_error)?;
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Unsupported("no audio track in container".to_string()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(map_symphonia_error)?;

    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track
        .codec_params
        .channels
        .map(|value| value.count() as u16);
    let mut samples = Vec::new();
    let mut packets = 0_usize;
    let mut skipped = 0_usize;

    loop {
        packets += 1;
        if packets % CANCEL_CHECK_PACKETS == 0 && cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(DecodeError::Corrupt(
                    "audio stream reset required mid-decode".to_string(),
                ));
            }
            Err(error) => return Err(map_symphonia_error(error)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped += 1;
                debug!(reason, "skipping undecodable packet");
                continue;
            }
            Err(error) => return Err(map_symphonia_error(error)),
        };

        let spec = *decoded.spec();
        let packet_channels = spec.channels.count() as u16;
        match channels {
            Some(known) if known != packet_channels && !samples.is_empty() => {
                return Err(DecodeError::Corrupt(format!(
                    "channel count changed mid-stream from {known} to {packet_channels}"
                )));
            }
            _ => channels = Some(packet_channels),
        }
        sample_rate = Some(spec.rate);
        push_interleaved(decoded, &mut samples);
    }

    if skipped > 0 {
        warn!(skipped, "some packets could not be decoded");
    }

    let (Some(sample_rate), Some(channels)) = (sample_rate, channels) else {
        return Err(DecodeError::Empty);
    };
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    debug!(
        sample_rate,
        channels,
        total_samples = samples.len(),
        "symphonia decode complete"
    );
    Ok(Pcm::new(sample_rate, channels, samples))
}

fn push_interleaved(decoded: AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    let spec = *decoded.spec();
    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);
    samples.extend_from_slice(sample_buffer.samples());
}

fn map_symphonia_error(error: SymphoniaError) -> DecodeError {
    match error {
        SymphoniaError::Unsupported(reason) => DecodeError::Unsupported(reason.to_string()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}
