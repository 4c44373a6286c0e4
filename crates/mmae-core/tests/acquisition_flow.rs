use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use mmae_core::{
    AcquisitionError, AcquisitionManager, AcquisitionPolicy, AudioCodec, CanonicalFormat,
    Cancellation, DecodeError, DefaultCodec, EncodeError, FetchError, FetchFailureKind,
    FetchedMedia, MediaFetcher, OutputFormat, TrackRegistry, UploadedFile,
    fixtures::{sine_pcm, wav_bytes},
    model::{Pcm, PcmSlice, TrackOrigin},
};

/// Decodes anything into a fixed tone unless the payload starts with `bad`.
#[derive(Default)]
struct CountingCodec {
    decodes: AtomicUsize,
}

impl AudioCodec for CountingCodec {
    fn canonical_format(&self) -> CanonicalFormat {
        CanonicalFormat::default()
    }

    fn decode(
        &self,
        bytes: &[u8],
        _extension_hint: Option<&str>,
        _cancel: &Cancellation,
    ) -> Result<Pcm, DecodeError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if bytes.starts_with(b"bad") {
            return Err(DecodeError::Corrupt("fixture marked bad".to_string()));
        }
        Ok(sine_pcm(440.0, 1.0, 44_100, 2, 0.5))
    }

    fn encode(
        &self,
        _pcm: PcmSlice<'_>,
        format: OutputFormat,
        _cancel: &Cancellation,
    ) -> Result<Vec<u8>, EncodeError> {
        Err(EncodeError::Unsupported(format))
    }
}

struct StaticFetcher {
    result: Result<FetchedMedia, FetchError>,
    cancel_during_fetch: bool,
}

impl MediaFetcher for StaticFetcher {
    fn fetch(&self, _url: &str, cancel: &Cancellation) -> Result<FetchedMedia, FetchError> {
        if self.cancel_during_fetch {
            cancel.cancel();
        }
        self.result.clone()
    }
}

fn fetched_tone(title: Option<&str>) -> FetchedMedia {
    FetchedMedia {
        bytes: wav_bytes(&sine_pcm(440.0, 2.0, 44_100, 2, 0.5)).expect("fixture should encode"),
        title: title.map(str::to_string),
        duration_hint: Some(2.0),
        extension: Some("wav".to_string()),
    }
}

fn manager_with(
    codec: Arc<dyn AudioCodec>,
    fetcher: StaticFetcher,
) -> (AcquisitionManager, Arc<TrackRegistry>) {
    let registry = Arc::new(TrackRegistry::default());
    let manager = AcquisitionManager::new(Arc::clone(&registry), codec, Arc::new(fetcher));
    (manager, registry)
}

fn idle_fetcher() -> StaticFetcher {
    StaticFetcher {
        result: Err(FetchError::new(FetchFailureKind::Tool, "unused")),
        cancel_during_fetch: false,
    }
}

#[test]
fn remote_acquisition_registers_titled_track() {
    let fetcher = StaticFetcher {
        result: Ok(fetched_tone(Some("Morning Birds"))),
        cancel_during_fetch: false,
    };
    let (manager, registry) = manager_with(Arc::new(DefaultCodec::default()), fetcher);

    let summary = manager
        .acquire_remote("https://example.com/watch?v=1", &Cancellation::new())
        .expect("acquisition should succeed");

    assert_eq!(summary.source_label, "Morning Birds");
    assert!((summary.duration - 2.0).abs() < 1e-6);
    let track = registry
        .get(&summary.track_id)
        .expect("track should be registered");
    assert_eq!(
        track.origin,
        TrackOrigin::Remote {
            url: "https://example.com/watch?v=1".to_string()
        }
    );
}

#[test]
fn missing_title_falls_back_to_audio_label() {
    let fetcher = StaticFetcher {
        result: Ok(fetched_tone(Some("   "))),
        cancel_during_fetch: false,
    };
    let (manager, _registry) = manager_with(Arc::new(DefaultCodec::default()), fetcher);
    let summary = manager
        .acquire_remote("https://example.com/a", &Cancellation::new())
        .expect("acquisition should succeed");
    assert_eq!(summary.source_label, "audio");
}

#[test]
fn fetch_failures_keep_their_kind() {
    let fetcher = StaticFetcher {
        result: Err(FetchError::new(
            FetchFailureKind::Restricted,
            "video not available in your country",
        )),
        cancel_during_fetch: false,
    };
    let (manager, registry) = manager_with(Arc::new(DefaultCodec::default()), fetcher);
    let error = manager
        .acquire_remote("https://example.com/geo", &Cancellation::new())
        .expect_err("fetch failure should propagate");
    assert!(matches!(
        error,
        AcquisitionError::Fetch {
            kind: FetchFailureKind::Restricted,
            ..
        }
    ));
    assert!(registry.is_empty());
}

#[test]
fn cancellation_during_fetch_registers_nothing() {
    let fetcher = StaticFetcher {
        result: Ok(fetched_tone(Some("late"))),
        cancel_during_fetch: true,
    };
    let codec = Arc::new(CountingCodec::default());
    let (manager, registry) = manager_with(codec, fetcher);
    let error = manager
        .acquire_remote("https://example.com/slow", &Cancellation::new())
        .expect_err("cancelled acquisition should fail");
    assert!(matches!(error, AcquisitionError::Cancelled));
    assert!(registry.is_empty());
}

#[test]
fn unsupported_extension_is_rejected_before_decoding() {
    let codec = Arc::new(CountingCodec::default());
    let (manager, registry) = manager_with(codec.clone(), idle_fetcher());

    let error = manager
        .acquire_upload(
            UploadedFile::new("notes.xyz", b"RIFF".to_vec()),
            &Cancellation::new(),
        )
        .expect_err("xyz should be rejected");

    assert!(matches!(error, AcquisitionError::UnsupportedFormat(_)));
    assert_eq!(codec.decodes.load(Ordering::SeqCst), 0);
    assert!(registry.is_empty());
}

#[test]
fn upload_labels_use_file_stem_and_extension_is_case_insensitive() {
    let codec = Arc::new(CountingCodec::default());
    let (manager, registry) = manager_with(codec, idle_fetcher());
    let summary = manager
        .acquire_upload(
            UploadedFile::new("Field Recording.FLAC", b"fake".to_vec()),
            &Cancellation::new(),
        )
        .expect("upload should succeed");
    assert_eq!(summary.source_label, "Field Recording");
    assert_eq!(registry.len(), 1);
}

#[test]
fn batch_upload_is_all_or_nothing() {
    let codec = Arc::new(CountingCodec::default());
    let (manager, registry) = manager_with(codec.clone(), idle_fetcher());

    let error = manager
        .acquire_uploads(
            vec![
                UploadedFile::new("one.wav", b"good".to_vec()),
                UploadedFile::new("two.mp3", b"bad payload".to_vec()),
                UploadedFile::new("three.ogg", b"good".to_vec()),
            ],
            &Cancellation::new(),
        )
        .expect_err("second file should fail to decode");

    assert!(matches!(error, AcquisitionError::Decode { .. }));
    assert_eq!(codec.decodes.load(Ordering::SeqCst), 2);
    assert!(registry.is_empty(), "no orphan tracks after a failed batch");

    let summaries = manager
        .acquire_uploads(
            vec![
                UploadedFile::new("one.wav", b"good".to_vec()),
                UploadedFile::new("two.mp3", b"good".to_vec()),
            ],
            &Cancellation::new(),
        )
        .expect("batch should succeed");
    assert_eq!(summaries.len(), 2);
    assert_eq!(registry.len(), 2);
}

#[test]
fn empty_and_oversized_batches_are_rejected() {
    let codec = Arc::new(CountingCodec::default());
    let (manager, registry) = manager_with(codec, idle_fetcher());
    let manager = manager.with_policy(AcquisitionPolicy {
        max_files_per_upload: 1,
        ..AcquisitionPolicy::default()
    });

    assert!(matches!(
        manager.acquire_uploads(Vec::new(), &Cancellation::new()),
        Err(AcquisitionError::NoFiles)
    ));
    assert!(matches!(
        manager.acquire_uploads(
            vec![
                UploadedFile::new("a.wav", b"good".to_vec()),
                UploadedFile::new("b.wav", b"good".to_vec()),
            ],
            &Cancellation::new(),
        ),
        Err(AcquisitionError::TooManyFiles { count: 2, limit: 1 })
    ));
    assert!(matches!(
        manager.acquire_upload(UploadedFile::new("a.wav", Vec::new()), &Cancellation::new()),
        Err(AcquisitionError::EmptyUpload(_))
    ));
    assert!(registry.is_empty());
}

#[test]
fn pre_cancelled_upload_registers_nothing() {
    let codec = Arc::new(CountingCodec::default());
    let (manager, registry) = manager_with(codec, idle_fetcher());
    let cancel = Cancellation::new();
    cancel.cancel();
    let error = manager
        .acquire_upload(UploadedFile::new("a.wav", b"good".to_vec()), &cancel)
        .expect_err("cancelled upload should fail");
    assert!(matches!(error, AcquisitionError::Cancelled));
    assert!(registry.is_empty());
}
