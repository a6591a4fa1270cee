//! Subprocess plumbing shared by the encoder and the backend adapters.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::errors::{DriverError, DriverResult, ExitStatus};

/// Captured output of one backend invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Process exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr interleaved the way the translators expect.
    pub fn merged(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}{}", self.stdout, self.stderr)
        }
    }
}

pub fn log_call(cmd: &[String]) {
    debug!("executing {}", cmd.join(" "));
}

/// Run a command, capturing stdout and stderr.
pub fn run_captured(cmd: &[String], cwd: &Path) -> DriverResult<CmdOutput> {
    let (exe, args) = cmd
        .split_first()
        .ok_or_else(|| DriverError::backend("Empty command line"))?;
    let output = Command::new(exe)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| {
            DriverError::new(
                ExitStatus::NotFound,
                format!("Failed to run '{}': {}", exe, e),
            )
        })?;
    Ok(CmdOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Locate an executable on PATH.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// The system timeout wrapper (`timeout` on Linux, `gtimeout` where
/// coreutils is prefixed).
pub fn timeout_cmd() -> DriverResult<String> {
    for name in ["timeout", "gtimeout"] {
        if let Some(p) = find_in_path(name) {
            return Ok(p.to_string_lossy().into_owned());
        }
    }
    Err(DriverError::new(
        ExitStatus::Failed,
        "Cannot find timeout command.",
    ))
}
