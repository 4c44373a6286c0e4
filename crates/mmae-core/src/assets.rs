use std::{fmt, path::Path};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 9] = [
    "aac", "flac", "m4a", "mp3", "ogg", "opus", "wav", "webm", "wma",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFileEntry {
    pub path: String,
    pub extension: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct UnsupportedFormatError {
    pub filename: String,
    pub extension: String,
}

impl fmt::Display for UnsupportedFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.extension.is_empty() {
            String::new()
        } else {
            format!(".{}", self.extension)
        };
        write!(
            f,
            "unsupported file type '{shown}' for '{}'. Allowed: {}",
            self.filename,
            allowed_extensions_display()
        )
    }
}

#[must_use]
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|value| !value.is_empty())
}

#[must_use]
pub fn is_supported_extension(extension: &str) -> bool {
    let lowered = extension.trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_AUDIO_EXTENSIONS.contains(&lowered.as_str())
}

/// Checks `filename` against the allow-list and returns its extension.
pub fn validate_upload_name(filename: &str) -> Result<String, UnsupportedFormatError> {
    match extension_of(filename) {
        Some(extension) if is_supported_extension(&extension) => Ok(extension),
        other => Err(UnsupportedFormatError {
            filename: filename.to_string(),
            extension: other.unwrap_or_default(),
        }),
    }
}

/// File stem used as a human-readable label, `"audio"` when absent.
#[must_use]
pub fn label_from_filename(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|value| value.to_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("audio")
        .to_string()
}

#[instrument(fields(directory = %directory.display()))]
pub fn scan_audio_files(directory: &Path) -> Result<Vec<AudioFileEntry>> {
    if !directory.is_dir() {
        return Err(anyhow::anyhow!(
            "audio scan path is not a directory: {}",
            directory.display()
        ));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "ignoring unreadable entry while scanning audio files");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(extension) = entry
            .path()
            .to_str()
            .and_then(extension_of)
            .filter(|extension| is_supported_extension(extension))
        else {
            continue;
        };

        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        entries.push(AudioFileEntry {
            path: entry.path().display().to_string(),
            extension,
            size_bytes,
        });
    }

    entries.sort_by(|left, right| left.path.cmp(&right.path));
    debug!(count = entries.len(), "audio file scan complete");
    Ok(entries)
}

fn allowed_extensions_display() -> String {
    SUPPORTED_AUDIO_EXTENSIONS
        .iter()
        .map(|extension| format!(".{extension}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_names_are_checked_case_insensitively() {
        assert_eq!(validate_upload_name("Song.MP3").as_deref(), Ok("mp3"));
        assert_eq!(validate_upload_name("take.opus").as_deref(), Ok("opus"));
    }

    #[test]
    fn unknown_or_missing_extensions_are_rejected() {
        let error = validate_upload_name("notes.xyz").unwrap_err();
        assert_eq!(error.extension, "xyz");
        assert!(error.to_string().contains(".wav"));

        let error = validate_upload_name("README").unwrap_err();
        assert!(error.extension.is_empty());
    }

    #[test]
    fn labels_fall_back_when_stem_missing() {
        assert_eq!(label_from_filename("My Song.flac"), "My Song");
        assert_eq!(label_from_filename(""), "audio");
    }
}
