use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use mmae_core::{
    AcquisitionPolicy, CanonicalFormat, Colormap, ExportOptions, Normalization, OutputFormat,
    RegistryPolicy, SpectrogramConfig,
    acquisition::{DEFAULT_DURATION_TOLERANCE_SECS, DEFAULT_MAX_FILES_PER_UPLOAD},
    diagnostics::{DEFAULT_LOG_FILTER, DEFAULT_LOG_PREFIX},
    export::DEFAULT_KEY_PREFIX,
    fetcher::DEFAULT_FORMAT_SELECTOR,
    model::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE},
    registry::DEFAULT_IDLE_TTL_SECS,
    spectrogram::{
        DEFAULT_DYNAMIC_RANGE_DB, DEFAULT_FLOOR_DB, DEFAULT_FRAMES_PER_COLUMN, DEFAULT_HOP_SIZE,
        DEFAULT_OUTPUT_HEIGHT, DEFAULT_OUTPUT_WIDTH, DEFAULT_WINDOW_SIZE,
    },
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "mmae.config.toml";
pub const CONFIG_PATH_ENV: &str = "MMAE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub codec: CodecConfig,
    pub fetcher: FetcherConfig,
    pub registry: RegistryConfig,
    pub spectrogram: SpectrogramSettings,
    pub export: ExportSettings,
    pub storage: StorageConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_files_per_upload: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodecConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub ffmpeg_binary: String,
    /// Use ffmpeg for containers the in-process decoder rejects and for
    /// compressed clip formats.
    pub ffmpeg_fallback: bool,
    pub duration_tolerance_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetcherConfig {
    pub binary: String,
    pub proxy: Option<String>,
    pub format_selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectrogramSettings {
    pub window_size: usize,
    pub hop_size: usize,
    pub floor_db: f32,
    pub dynamic_range_db: f32,
    pub max_width: usize,
    pub max_height: usize,
    pub frames_per_column: usize,
    pub colormap: Colormap,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportSettings {
    pub default_format: OutputFormat,
    pub key_prefix: String,
}

/// S3-compatible bucket (Cloudflare R2 in production).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket_name: Option<String>,
    pub public_url: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            static_dir: PathBuf::from("static"),
            max_upload_bytes: 512 * 1024 * 1024,
            max_files_per_upload: DEFAULT_MAX_FILES_PER_UPLOAD,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            ffmpeg_binary: "ffmpeg".to_string(),
            ffmpeg_fallback: true,
            duration_tolerance_secs: DEFAULT_DURATION_TOLERANCE_SECS,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            proxy: None,
            format_selector: DEFAULT_FORMAT_SELECTOR.to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: DEFAULT_IDLE_TTL_SECS,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for SpectrogramSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            floor_db: DEFAULT_FLOOR_DB,
            dynamic_range_db: DEFAULT_DYNAMIC_RANGE_DB,
            max_width: DEFAULT_OUTPUT_WIDTH,
            max_height: DEFAULT_OUTPUT_HEIGHT,
            frames_per_column: DEFAULT_FRAMES_PER_COLUMN,
            colormap: Colormap::default(),
            cache_capacity: 32,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            default_format: OutputFormat::Wav,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            bucket_name: None,
            public_url: None,
            region: "auto".to_string(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: DEFAULT_LOG_PREFIX.to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Reads the config file (explicit path, `MMAE_CONFIG_PATH`, then the
    /// cwd and its parent) and applies environment overrides. A missing file
    /// yields defaults; the returned path is `None` in that case.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let source = discover_config_path(explicit)?;
        let mut config = match &source {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| env::var(key).ok());
        Ok((config, source))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))
    }

    /// Environment variables take precedence over file values. Blank values
    /// are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(proxy) = read("MMAE_PROXY") {
            self.fetcher.proxy = Some(proxy);
        }
        let storage = &mut self.storage;
        for (key, slot) in [
            ("R2_ENDPOINT_URL", &mut storage.endpoint_url),
            ("R2_ACCESS_KEY_ID", &mut storage.access_key_id),
            ("R2_SECRET_ACCESS_KEY", &mut storage.secret_access_key),
            ("R2_BUCKET_NAME", &mut storage.bucket_name),
            ("R2_PUBLIC_URL", &mut storage.public_url),
        ] {
            if let Some(value) = read(key) {
                *slot = Some(value);
            }
        }
        if let Some(region) = read("R2_REGION") {
            storage.region = region;
        }
    }

    #[must_use]
    pub fn canonical_format(&self) -> CanonicalFormat {
        CanonicalFormat {
            sample_rate: self.codec.sample_rate,
            channels: self.codec.channels,
        }
    }

    #[must_use]
    pub fn acquisition_policy(&self) -> AcquisitionPolicy {
        AcquisitionPolicy {
            duration_tolerance_secs: self.codec.duration_tolerance_secs,
            max_files_per_upload: self.server.max_files_per_upload,
        }
    }

    #[must_use]
    pub fn registry_policy(&self) -> RegistryPolicy {
        RegistryPolicy {
            idle_ttl_secs: self.registry.idle_ttl_secs,
        }
    }

    #[must_use]
    pub fn spectrogram_config(&self) -> SpectrogramConfig {
        let settings = &self.spectrogram;
        SpectrogramConfig {
            window_size: settings.window_size,
            hop_size: settings.hop_size,
            floor_db: settings.floor_db,
            normalization: Normalization::DynamicRange {
                range_db: settings.dynamic_range_db,
            },
            max_width: settings.max_width,
            max_height: settings.max_height,
            frames_per_column: settings.frames_per_column,
            colormap: settings.colormap,
        }
    }

    #[must_use]
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            format: self.export.default_format,
            key_prefix: self.export.key_prefix.clone(),
        }
    }
}

/// Connection details when every required storage field is present.
pub struct ResolvedStorage<'a> {
    pub endpoint_url: &'a str,
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub bucket_name: &'a str,
    pub public_url: &'a str,
    pub region: &'a str,
}

impl StorageConfig {
    #[must_use]
    pub fn resolve(&self) -> Option<ResolvedStorage<'_>> {
        Some(ResolvedStorage {
            endpoint_url: self.endpoint_url.as_deref()?,
            access_key_id: self.access_key_id.as_deref()?,
            secret_access_key: self.secret_access_key.as_deref()?,
            bucket_name: self.bucket_name.as_deref()?,
            public_url: self.public_url.as_deref()?,
            region: &self.region,
        })
    }
}

fn discover_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.is_file(), "config file {} does not exist", path.display());
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];
    Ok(candidates.into_iter().find(|path| path.is_file()))
}
