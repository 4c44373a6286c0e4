use std::{
    fs::{self, File},
    io,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread,
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cancel::Cancellation;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub(crate) enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error while running external tool: {0}")]
    Io(#[from] io::Error),
    #[error("external tool cancelled")]
    Cancelled,
}

/// Runs `command` to completion, polling `cancel` and killing the child if it
/// fires. Output is captured through files in a private temp dir so a chatty
/// child cannot block on a full pipe.
#[instrument(skip(command, cancel), fields(program = %program_name(&command)))]
pub(crate) fn run_tool(mut command: Command, cancel: &Cancellation) -> Result<ToolOutput, ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    let capture_dir = tempfile::tempdir()?;
    let stdout_path = capture_dir.path().join("stdout");
    let stderr_path = capture_dir.path().join("stderr");

    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(File::create(&stdout_path)?))
        .stderr(Stdio::from(File::create(&stderr_path)?));

    let mut child = command.spawn().map_err(|source| ToolError::Spawn {
        program: program_name(&command),
        source,
    })?;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            if let Err(error) = child.kill() {
                warn!(?error, "failed to kill cancelled external tool");
            }
            let _ = child.wait();
            debug!("external tool killed after cancellation");
            return Err(ToolError::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = fs::read(&stdout_path)?;
    let stderr = String::from_utf8_lossy(&fs::read(&stderr_path)?).trim().to_string();
    debug!(%status, stdout_bytes = stdout.len(), "external tool finished");
    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

pub(crate) fn program_name(command: &Command) -> String {
    PathBuf::from(command.get_program()).display().to_string()
}
