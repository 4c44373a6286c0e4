use std::sync::Arc;

use mmae_core::{
    AcquisitionManager, AudioCodec, DefaultCodec, ExportOptions, MediaFetcher, ObjectStore,
    RegionExporter, SpectrogramCache, SpectrogramConfig, TrackRegistry, YtDlpFetcher,
};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::{config::AppConfig, storage::S3ObjectStore};

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TrackRegistry>,
    pub acquisition: Arc<AcquisitionManager>,
    pub exporter: Arc<RegionExporter>,
    pub codec: Arc<dyn AudioCodec>,
    pub spectrograms: Arc<SpectrogramCache>,
    pub spectrogram_config: Arc<SpectrogramConfig>,
    pub export_options: Arc<ExportOptions>,
    /// `None` when no bucket is configured; exports then fall back to
    /// archive delivery.
    pub object_store: Option<Arc<dyn ObjectStore>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: &AppConfig,
        codec: Arc<dyn AudioCodec>,
        fetcher: Arc<dyn MediaFetcher>,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let registry = Arc::new(TrackRegistry::new(config.registry_policy()));
        let acquisition = AcquisitionManager::new(Arc::clone(&registry), Arc::clone(&codec), fetcher)
            .with_policy(config.acquisition_policy());
        let exporter = RegionExporter::new(Arc::clone(&registry), Arc::clone(&codec));

        Self {
            registry,
            acquisition: Arc::new(acquisition),
            exporter: Arc::new(exporter),
            codec,
            spectrograms: Arc::new(SpectrogramCache::new(config.spectrogram.cache_capacity)),
            spectrogram_config: Arc::new(config.spectrogram_config()),
            export_options: Arc::new(config.export_options()),
            object_store,
        }
    }

    /// Builds the production components: symphonia/ffmpeg codec, yt-dlp
    /// fetcher and, when credentials are complete, the S3 store.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        config
            .spectrogram_config()
            .validate()
            .map_err(|error| anyhow::anyhow!("[spectrogram] {error}"))?;

        let mut codec = DefaultCodec::new(config.canonical_format());
        if config.codec.ffmpeg_fallback {
            codec = codec.with_ffmpeg(&config.codec.ffmpeg_binary);
        }
        let fetcher = YtDlpFetcher::new(&config.fetcher.binary)
            .with_proxy(config.fetcher.proxy.clone())
            .with_format_selector(&config.fetcher.format_selector);

        let object_store: Option<Arc<dyn ObjectStore>> = match config.storage.resolve() {
            Some(settings) => {
                info!(
                    endpoint = settings.endpoint_url,
                    bucket = settings.bucket_name,
                    "object storage configured"
                );
                Some(Arc::new(S3ObjectStore::new(&settings, Handle::try_current()?)))
            }
            None => {
                warn!("object storage not configured; clips will be delivered as archives");
                None
            }
        };

        Ok(Self::new(config, Arc::new(codec), Arc::new(fetcher), object_store))
    }
}
