use std::{fs, io::BufReader, path::Path, process::Command};

use tracing::{debug, instrument};

use super::{CanonicalFormat, DecodeError, EncodeError, OutputFormat, wav};
use crate::{
    cancel::Cancellation,
    model::{Pcm, PcmSlice},
    process::{ToolError, run_tool},
};

const DECODED_NAME: &str = "decoded.wav";
const STAGED_NAME: &str = "staged.wav";

/// Decodes through ffmpeg straight into canonical float WAV.
#[instrument(skip(bytes, cancel), fields(binary = %binary.display(), bytes = bytes.len()))]
pub(super) fn decode(
    binary: &Path,
    bytes: &[u8],
    extension_hint: Option<&str>,
    canonical: CanonicalFormat,
    cancel: &Cancellation,
) -> Result<Pcm, DecodeError> {
    let external = |message: String| DecodeError::External(message);

    let work_dir = tempfile::tempdir().map_err(|error| external(error.to_string()))?;
    let input = work_dir
        .path()
        .join(format!("input.{}", extension_hint.unwrap_or("bin")));
    let output = work_dir.path().join(DECODED_NAME);
    fs::write(&input, bytes).map_err(|error| external(error.to_string()))?;

    let mut command = Command::new(binary);
    command
        .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
        .arg(&input)
        .args(["-vn", "-map_metadata", "-1", "-ac"])
        .arg(canonical.channels.to_string())
        .arg("-ar")
        .arg(canonical.sample_rate.to_string())
        .args(["-c:a", "pcm_f32le", "-f", "wav"])
        .arg(&output);

    let result = run_tool(command, cancel).map_err(|error| match error {
        ToolError::Cancelled => DecodeError::Cancelled,
        other => external(other.to_string()),
    })?;
    if !result.status.success() {
        return Err(DecodeError::Unsupported(format!(
            "ffmpeg exited with status {}: {}",
            result.status, result.stderr
        )));
    }

    let file = fs::File::open(&output).map_err(|error| external(error.to_string()))?;
    let pcm = wav::decode_wav(BufReader::new(file))
        .map_err(|error| DecodeError::Corrupt(error.to_string()))?;
    debug!(frames = pcm.frames(), "ffmpeg decode complete");
    Ok(pcm)
}

/// Encodes a compressed clip by staging WAV and transcoding with bit-exact
/// flags so repeated runs produce the same bytes.
#[instrument(skip(pcm, cancel), fields(binary = %binary.display(), frames = pcm.frames(), format = %format))]
pub(super) fn encode(
    binary: &Path,
    pcm: PcmSlice<'_>,
    format: OutputFormat,
    cancel: &Cancellation,
) -> Result<Vec<u8>, EncodeError> {
    let external = |message: String| EncodeError::External(message);

    let work_dir = tempfile::tempdir().map_err(|error| external(error.to_string()))?;
    let staged = work_dir.path().join(STAGED_NAME);
    let output = work_dir
        .path()
        .join(format!("clip.{}", format.extension()));
    fs::write(&staged, wav::encode_wav(pcm)?).map_err(|error| external(error.to_string()))?;

    let mut command = Command::new(binary);
    command
        .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
        .arg(&staged)
        .args([
            "-map_metadata",
            "-1",
            "-fflags",
            "+bitexact",
            "-flags:a",
            "+bitexact",
        ])
        .args(codec_args(format))
        .arg(&output);

    let result = run_tool(command, cancel).map_err(|error| match error {
        ToolError::Cancelled => EncodeError::Cancelled,
        other => external(other.to_string()),
    })?;
    if !result.status.success() {
        return Err(external(format!(
            "ffmpeg exited with status {} while encoding {format}: {}",
            result.status, result.stderr
        )));
    }

    fs::read(&output).map_err(|error| external(error.to_string()))
}

fn codec_args(format: OutputFormat) -> &'static [&'static str] {
    match format {
        OutputFormat::Wav => &["-codec:a", "pcm_s16le"],
        OutputFormat::Flac => &["-codec:a", "flac"],
        OutputFormat::Mp3 => &["-codec:a", "libmp3lame", "-qscale:a", "2"],
        OutputFormat::Ogg => &["-codec:a", "libvorbis", "-qscale:a", "5"],
    }
}
