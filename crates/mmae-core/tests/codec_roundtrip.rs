use mmae_core::{
    AudioCodec, CanonicalFormat, Cancellation, DecodeError, DefaultCodec, EncodeError,
    OutputFormat,
    codec::decode_wav,
    fixtures::{ramp_pcm, sine_pcm, wav_bytes},
    model::Pcm,
};

#[test]
fn canonical_wav_decodes_to_same_frame_count() {
    let source = sine_pcm(440.0, 1.5, 44_100, 2, 0.5);
    let bytes = wav_bytes(&source).expect("fixture should encode");

    let codec = DefaultCodec::default();
    let decoded = codec
        .decode(&bytes, Some("wav"), &Cancellation::new())
        .expect("wav should decode");

    assert_eq!(decoded.sample_rate(), 44_100);
    assert_eq!(decoded.channels(), 2);
    assert_eq!(decoded.frames(), source.frames());
    let max_error = decoded
        .samples()
        .iter()
        .zip(source.samples())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);
    assert!(max_error < 1e-3, "16-bit quantization error too large: {max_error}");
}

#[test]
fn mono_low_rate_input_is_normalized_to_canonical_layout() {
    let source = sine_pcm(220.0, 2.0, 22_050, 1, 0.5);
    let bytes = wav_bytes(&source).expect("fixture should encode");

    let decoded = DefaultCodec::default()
        .decode(&bytes, None, &Cancellation::new())
        .expect("wav should decode");

    assert_eq!(decoded.sample_rate(), 44_100);
    assert_eq!(decoded.channels(), 2);
    assert_eq!(decoded.frames(), 88_200);
    assert!((decoded.duration_seconds() - source.duration_seconds()).abs() <= 1.0 / 44_100.0);
}

#[test]
fn mono_canonical_format_downmixes_stereo() {
    let source = sine_pcm(330.0, 0.5, 48_000, 2, 0.25);
    let bytes = wav_bytes(&source).expect("fixture should encode");
    let codec = DefaultCodec::new(CanonicalFormat {
        sample_rate: 48_000,
        channels: 1,
    });

    let decoded = codec
        .decode(&bytes, Some("wav"), &Cancellation::new())
        .expect("wav should decode");
    assert_eq!(decoded.channels(), 1);
    assert_eq!(decoded.frames(), source.frames());
}

#[test]
fn decode_then_encode_round_trips_within_one_frame() {
    let source = ramp_pcm(12_345, 44_100, 2);
    let codec = DefaultCodec::default();
    let cancel = Cancellation::new();

    let bytes = codec
        .encode(source.as_slice(), OutputFormat::Wav, &cancel)
        .expect("encode should succeed");
    let decoded = codec
        .decode(&bytes, Some("wav"), &cancel)
        .expect("decode should succeed");

    assert!(decoded.frames().abs_diff(source.frames()) <= 1);
}

#[test]
fn wav_encoding_is_deterministic() {
    let source = sine_pcm(1_000.0, 0.25, 44_100, 2, 0.8);
    let codec = DefaultCodec::default();
    let cancel = Cancellation::new();
    let first = codec
        .encode(source.as_slice(), OutputFormat::Wav, &cancel)
        .expect("encode should succeed");
    let second = codec
        .encode(source.as_slice(), OutputFormat::Wav, &cancel)
        .expect("encode should succeed");
    assert_eq!(first, second);

    let reread = decode_wav(std::io::Cursor::new(first)).expect("hound should read output");
    assert_eq!(reread.frames(), source.frames());
}

#[test]
fn garbage_bytes_are_rejected() {
    let result = DefaultCodec::default().decode(
        b"definitely not audio, just some text",
        Some("mp3"),
        &Cancellation::new(),
    );
    assert!(matches!(
        result,
        Err(DecodeError::Unsupported(_) | DecodeError::Corrupt(_))
    ));
}

#[test]
fn empty_slice_and_missing_encoder_are_reported() {
    let codec = DefaultCodec::default();
    let cancel = Cancellation::new();
    let empty = Pcm::silent(44_100, 2, 0);
    assert!(matches!(
        codec.encode(empty.as_slice(), OutputFormat::Wav, &cancel),
        Err(EncodeError::EmptySlice)
    ));

    let tone = sine_pcm(440.0, 0.1, 44_100, 2, 0.5);
    assert!(matches!(
        codec.encode(tone.as_slice(), OutputFormat::Mp3, &cancel),
        Err(EncodeError::Unsupported(OutputFormat::Mp3))
    ));
}

#[test]
fn cancelled_encode_produces_nothing() {
    let cancel = Cancellation::new();
    cancel.cancel();
    let tone = sine_pcm(440.0, 0.1, 44_100, 2, 0.5);
    assert!(matches!(
        DefaultCodec::default().encode(tone.as_slice(), OutputFormat::Wav, &cancel),
        Err(EncodeError::Cancelled)
    ));
}
