//! Script process spawner.
//!
//! Launches `interpreter [interpreter_args…] <script>` with all three stdio
//! handles piped and `kill_on_drop(true)`. On unix the child leads its own
//! process group so a stop request reaches anything the script forks.
//!
//! # Working directory
//!
//! | Configured `working_dir` | Caller fallback | Child runs in          |
//! |--------------------------|-----------------|------------------------|
//! | set                      | any             | `working_dir`          |
//! | unset                    | given           | the fallback           |
//! | unset                    | none            | the script's directory |
//!
//! # Usage
//!
//! [`spawn_script`] validates the target before launching anything: a
//! missing path or a directory is reported as
//! [`AppError::Spawn`](crate::AppError::Spawn) without touching the
//! interpreter. The returned [`SpawnedScript`] owns every pipe; the caller
//! hands them to the reader tasks and the stdin writer.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::config::RunnerConfig;
use crate::{AppError, Result};

/// A freshly spawned script process with its captured pipes.
#[derive(Debug)]
pub struct SpawnedScript {
    /// Absolute path of the script being run.
    pub script: PathBuf,
    /// Child process handle.
    pub child: Child,
    /// Pipe to the script's stdin.
    pub stdin: ChildStdin,
    /// Pipe from the script's stdout.
    pub stdout: ChildStdout,
    /// Pipe from the script's stderr.
    pub stderr: ChildStderr,
}

/// Resolve the working directory for a run.
///
/// The configured `working_dir` wins; otherwise `fallback` is used, and when
/// that is absent too the child inherits the current directory.
#[must_use]
pub fn resolve_working_dir(config: &RunnerConfig, fallback: Option<&Path>) -> Option<PathBuf> {
    config
        .working_dir
        .clone()
        .or_else(|| fallback.map(Path::to_path_buf))
}

/// Spawn the configured interpreter on `script`.
///
/// `cwd` of `None` means the script's parent directory.
///
/// # Errors
///
/// - `AppError::Spawn("script not found: …")` if `script` is not a file.
/// - `AppError::Spawn("failed to spawn …")` if the OS could not start the
///   interpreter (missing binary, permission denied).
pub fn spawn_script(
    config: &RunnerConfig,
    script: &Path,
    cwd: Option<&Path>,
) -> Result<SpawnedScript> {
    let script = script
        .canonicalize()
        .map_err(|err| AppError::Spawn(format!("script not found: {}: {err}", script.display())))?;
    if !script.is_file() {
        return Err(AppError::Spawn(format!(
            "script is not a file: {}",
            script.display()
        )));
    }

    let working_dir = resolve_working_dir(config, cwd.or_else(|| script.parent()));

    let mut cmd = Command::new(&config.interpreter);
    cmd.args(&config.interpreter_args).arg(&script);
    if let Some(dir) = &working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!("failed to spawn {}: {err}", config.interpreter))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture script stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture script stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture script stderr".into()))?;

    info!(
        pid = child.id().unwrap_or(0),
        interpreter = config.interpreter,
        script = %script.display(),
        "script process spawned"
    );

    Ok(SpawnedScript {
        script,
        child,
        stdin,
        stdout,
        stderr,
    })
}
