use std::sync::Arc;

use mmae_core::{
    AudioCodec, Cancellation, DefaultCodec, Delivery, ExportOptions, ExportRequest, Region,
    SpectrogramConfig, TrackRegistry,
    export::RegionExporter,
    fixtures::{sine_pcm, wav_bytes},
    model::{Track, TrackOrigin},
    spectrogram::compute,
};
use proptest::prelude::*;

fn no_panic_decode(bytes: &[u8], hint: Option<&str>) -> bool {
    std::panic::catch_unwind(|| {
        let _ = DefaultCodec::default().decode(bytes, hint, &Cancellation::new());
    })
    .is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_bytes_do_not_panic_the_decoder(raw in prop::collection::vec(any::<u8>(), 0..4096)) {
        prop_assert!(no_panic_decode(&raw, None));
        prop_assert!(no_panic_decode(&raw, Some("mp3")));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn truncated_wav_payloads_do_not_panic(prefix_len in 0usize..20_000usize) {
        let mut payload = wav_bytes(&sine_pcm(440.0, 0.2, 44_100, 2, 0.5))
            .expect("fixture should encode");
        payload.truncate(prefix_len.min(payload.len()));
        prop_assert!(no_panic_decode(&payload, Some("wav")));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn arbitrary_region_bounds_never_panic(
        start in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), -5.0f64..15.0],
        end in prop_oneof![Just(f64::NEG_INFINITY), -5.0f64..15.0],
    ) {
        let registry = Arc::new(TrackRegistry::default());
        let track = registry.insert(Track::new(
            "prop",
            TrackOrigin::Upload { filename: "prop.wav".to_string() },
            sine_pcm(440.0, 2.0, 8_000, 1, 0.5),
        ));
        let exporter = RegionExporter::new(Arc::clone(&registry), Arc::new(DefaultCodec::default()));
        let report = exporter.export(
            &[ExportRequest::new(track.id.clone(), vec![Region::new(start, end)])],
            &ExportOptions::default(),
            Delivery::Archive,
            &Cancellation::new(),
        );

        prop_assert_eq!(report.results.len(), 1);
        let valid = start.is_finite() && end.is_finite() && start >= 0.0 && start < end
            && start < 2.0 && end <= 2.0;
        if let Some(clip) = report.results[0].clip() {
            prop_assert!(clip.frames > 0);
            prop_assert!(clip.duration_seconds <= 2.0 + 1e-9);
        } else {
            prop_assert!(!valid || (end - start) * 8_000.0 < 1.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn spectrogram_values_stay_normalized(
        samples in prop::collection::vec(-1.0f32..1.0, 0..20_000),
        width in 1usize..400,
        height in 1usize..300,
    ) {
        let pcm = mmae_core::model::Pcm::new(16_000, 1, samples);
        let config = SpectrogramConfig::default().with_output_size(Some(width), Some(height));
        let spectrogram = compute(&pcm, &config).expect("valid config should render");
        prop_assert!(spectrogram.width <= width && spectrogram.height <= height);
        prop_assert_eq!(spectrogram.values.len(), spectrogram.width * spectrogram.height);
        prop_assert!(spectrogram.values.iter().all(|value| (0.0..=1.0).contains(value)));
    }
}
