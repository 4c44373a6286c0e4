use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use mmae_core::{
    AcquisitionManager, Cancellation, Colormap, DefaultCodec, Delivery, DirectoryObjectStore,
    ExportOptions, ExportRequest, OutputFormat, Region, SpectrogramConfig, TrackRegistry,
    UploadedFile, YtDlpFetcher, diagnostics::init_tracing, scan_audio_files, spectrogram,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "mmae-cli")]
#[command(about = "Headless tools for decoding, rendering and clipping local audio files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// ffmpeg binary used for containers symphonia cannot read and for
    /// non-WAV output.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode a file and print its canonical duration and layout.
    Probe { input: PathBuf },
    /// Render a spectrogram PNG.
    Spectrogram {
        input: PathBuf,
        #[arg(long, default_value = "spectrogram.png")]
        output: PathBuf,
        #[arg(long)]
        width: Option<usize>,
        #[arg(long)]
        height: Option<usize>,
        #[arg(long, value_enum, default_value = "viridis")]
        colormap: ColormapArg,
    },
    /// Cut `START:END` regions (seconds) into clips under a directory.
    Clip {
        input: PathBuf,
        #[arg(long = "region", value_parser = parse_region, required = true)]
        regions: Vec<Region>,
        #[arg(long, default_value = "data/clips")]
        output_dir: PathBuf,
        #[arg(long, default_value = "wav")]
        format: OutputFormat,
    },
    /// List supported audio files below a directory.
    Scan { dir: PathBuf },
}

#[derive(Debug, Clone, ValueEnum)]
enum ColormapArg {
    Viridis,
    Grayscale,
}

impl From<ColormapArg> for Colormap {
    fn from(value: ColormapArg) -> Self {
        match value {
            ColormapArg::Viridis => Self::Viridis,
            ColormapArg::Grayscale => Self::Grayscale,
        }
    }
}

fn parse_region(raw: &str) -> Result<Region, String> {
    let (start, end) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{raw}'"))?;
    let start: f64 = start
        .trim()
        .parse()
        .map_err(|error| format!("invalid start '{start}': {error}"))?;
    let end: f64 = end
        .trim()
        .parse()
        .map_err(|error| format!("invalid end '{end}': {error}"))?;
    Ok(Region::new(start, end))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_tracing(&cli.log_dir)?;

    let codec = Arc::new(match cli.ffmpeg {
        Some(binary) => DefaultCodec::default().with_ffmpeg(binary),
        None => DefaultCodec::default(),
    });
    let registry = Arc::new(TrackRegistry::default());
    let manager = AcquisitionManager::new(
        Arc::clone(&registry),
        codec.clone(),
        Arc::new(YtDlpFetcher::default()),
    );
    let cancel = Cancellation::new();

    let load = |input: &PathBuf| -> anyhow::Result<_> {
        let bytes =
            fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
        let filename = input
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let summary = manager.acquire_upload(UploadedFile::new(filename, bytes), &cancel)?;
        registry
            .get(&summary.track_id)
            .context("acquired track vanished from registry")
    };

    match cli.command {
        Commands::Probe { input } => {
            let track = load(&input)?;
            let report = json!({
                "path": input.display().to_string(),
                "label": track.source_label,
                "sample_rate": track.pcm.sample_rate(),
                "channels": track.pcm.channels(),
                "frames": track.pcm.frames(),
                "duration": track.duration_seconds(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Spectrogram {
            input,
            output,
            width,
            height,
            colormap,
        } => {
            let track = load(&input)?;
            let config = SpectrogramConfig {
                colormap: colormap.into(),
                ..SpectrogramConfig::default()
            }
            .with_output_size(width, height);
            let rendered = spectrogram::render(&track.pcm, &config)?;
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&output, &rendered.png)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("{}", serde_json::to_string_pretty(&rendered.info)?);
        }
        Commands::Clip {
            input,
            regions,
            output_dir,
            format,
        } => {
            let track = load(&input)?;
            let store = DirectoryObjectStore::new(&output_dir);
            let exporter = mmae_core::RegionExporter::new(Arc::clone(&registry), codec);
            let request = ExportRequest::new(track.id.clone(), regions);
            let options = ExportOptions {
                format,
                ..ExportOptions::default()
            };
            let report = exporter.export(&[request], &options, Delivery::Upload(&store), &cancel);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed() > 0 {
                bail!("{} of {} regions failed", report.failed(), report.results.len());
            }
        }
        Commands::Scan { dir } => {
            let entries = scan_audio_files(&dir)?;
            let listing: Vec<_> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "path": entry.path,
                        "extension": entry.extension,
                        "size_bytes": entry.size_bytes,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}
