use std::{
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    assets::extension_of,
    cancel::Cancellation,
    process::{ToolError, run_tool},
};

pub const DEFAULT_FORMAT_SELECTOR: &str = "bestaudio/best";
const OUTPUT_STEM: &str = "source";

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub title: Option<String>,
    pub duration_hint: Option<f64>,
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Unreachable,
    NoAudio,
    Restricted,
    Tool,
    Cancelled,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unreachable => "source unreachable",
            Self::NoAudio => "no audio stream",
            Self::Restricted => "source restricted",
            Self::Tool => "fetcher failure",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchError {
    #[must_use]
    pub fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, url: &str, cancel: &Cancellation) -> Result<FetchedMedia, FetchError>;
}

/// Downloads the best available audio stream with the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
    proxy: Option<String>,
    format_selector: String,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    ext: Option<String>,
}

impl YtDlpFetcher {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            proxy: None,
            format_selector: DEFAULT_FORMAT_SELECTOR.to_string(),
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|value| !value.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_format_selector(mut self, selector: impl Into<String>) -> Self {
        self.format_selector = selector.into();
        self
    }

    fn command(&self, url: &str, output_dir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["--no-playlist", "--no-warnings", "--no-progress"])
            .args(["--dump-json", "--no-simulate"])
            .arg("-f")
            .arg(&self.format_selector)
            .arg("-o")
            .arg(output_dir.join(format!("{OUTPUT_STEM}.%(ext)s")));
        if let Some(proxy) = &self.proxy {
            command.arg("--proxy").arg(proxy);
        }
        command.arg("--").arg(url);
        command
    }
}

impl MediaFetcher for YtDlpFetcher {
    #[instrument(skip(self, cancel), fields(binary = %self.binary.display()))]
    fn fetch(&self, url: &str, cancel: &Cancellation) -> Result<FetchedMedia, FetchError> {
        let download_dir = tempfile::tempdir()
            .map_err(|error| FetchError::new(FetchFailureKind::Tool, error.to_string()))?;

        let output = run_tool(self.command(url, download_dir.path()), cancel).map_err(|error| {
            match error {
                ToolError::Cancelled => FetchError::new(FetchFailureKind::Cancelled, "fetch cancelled"),
                other => FetchError::new(FetchFailureKind::Tool, other.to_string()),
            }
        })?;

        if !output.status.success() {
            let kind = classify_failure(&output.stderr);
            return Err(FetchError::new(
                kind,
                if output.stderr.is_empty() {
                    format!("yt-dlp exited with status {}", output.status)
                } else {
                    output.stderr
                },
            ));
        }

        let info = parse_info(&output.stdout);
        let path = find_download(download_dir.path()).ok_or_else(|| {
            FetchError::new(
                FetchFailureKind::NoAudio,
                "fetcher finished without producing an audio file",
            )
        })?;
        let bytes = fs::read(&path)
            .map_err(|error| FetchError::new(FetchFailureKind::Tool, error.to_string()))?;
        let extension = path
            .to_str()
            .and_then(extension_of)
            .or_else(|| info.as_ref().and_then(|info| info.ext.clone()));

        let (title, duration_hint) = info
            .map(|info| (info.title, info.duration))
            .unwrap_or_default();
        info!(
            bytes = bytes.len(),
            title = title.as_deref().unwrap_or("-"),
            extension = extension.as_deref().unwrap_or("-"),
            "remote media fetched"
        );

        Ok(FetchedMedia {
            bytes,
            title,
            duration_hint,
            extension,
        })
    }
}

fn parse_info(stdout: &[u8]) -> Option<YtDlpInfo> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().rev().find(|line| line.trim_start().starts_with('{'))?;
    match serde_json::from_str(line) {
        Ok(info) => Some(info),
        Err(error) => {
            debug!(?error, "fetcher metadata was not valid json");
            None
        }
    }
}

fn find_download(directory: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(directory)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_stem().and_then(|stem| stem.to_str()) == Some(OUTPUT_STEM)
                && path.extension().and_then(|ext| ext.to_str()) != Some("part")
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

#[must_use]
pub fn classify_failure(stderr: &str) -> FetchFailureKind {
    const RESTRICTED: [&str; 8] = [
        "geo",
        "available in your country",
        "private video",
        "sign in",
        "members-only",
        "age-restricted",
        "copyright",
        "this video is unavailable",
    ];
    const NO_AUDIO: [&str; 3] = [
        "requested format is not available",
        "no video formats found",
        "no audio",
    ];
    const UNREACHABLE: [&str; 8] = [
        "unable to download webpage",
        "unsupported url",
        "name or service not known",
        "failed to resolve",
        "timed out",
        "connection refused",
        "http error 404",
        "is not a valid url",
    ];

    let lowered = stderr.to_ascii_lowercase();
    let matches = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));
    if matches(&RESTRICTED) {
        FetchFailureKind::Restricted
    } else if matches(&NO_AUDIO) {
        FetchFailureKind::NoAudio
    } else if matches(&UNREACHABLE) {
        FetchFailureKind::Unreachable
    } else {
        FetchFailureKind::Tool
    }
}
