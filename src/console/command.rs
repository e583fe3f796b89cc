//! Ad-hoc command execution for the console command line.
//!
//! These commands do not occupy the run slot: they have no stdin, cannot be
//! stopped individually, and stream their output straight to the caller's
//! sender.
//!
//! Once the command itself exits its output pipes get `drain_timeout` to
//! reach end of file. A background process started by the command (for
//! example `sleep 30 &`) keeps them open, so after the deadline the readers
//! are cancelled and the command completes without waiting for it.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures_util::future;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::output::{OutputEvent, StreamKind};
use crate::models::run::{ExitReason, RunExit};
use crate::runner::reader;
use crate::{AppError, Result};

/// Run `program args…` to completion, streaming its output to `event_tx`.
///
/// Output still open `drain_timeout` after the program exits is abandoned.
///
/// # Errors
///
/// - `AppError::Spawn` if the program cannot be started.
/// - `AppError::Io` if reading its output or collecting its status fails.
pub async fn run_program(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    drain_timeout: Duration,
    event_tx: mpsc::Sender<OutputEvent>,
) -> Result<RunExit> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {program}: {err}")))?;
    let pid = child.id().unwrap_or(0);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture command stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture command stderr".into()))?;

    let span = info_span!("console_command", program, pid);
    async move {
        let cancel = CancellationToken::new();
        let readers = future::join(
            reader::run_reader(StreamKind::Stdout, stdout, event_tx.clone(), cancel.clone()),
            reader::run_reader(StreamKind::Stderr, stderr, event_tx, cancel.clone()),
        );
        tokio::pin!(readers);

        let mut drained = None;
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                outputs = &mut readers, if drained.is_none() => drained = Some(outputs),
            }
        };

        let (out, err) = match drained {
            Some(outputs) => outputs,
            None => match tokio::time::timeout(drain_timeout, &mut readers).await {
                Ok(outputs) => outputs,
                Err(_) => {
                    warn!(
                        drain = ?drain_timeout,
                        "command output still open after exit, abandoning pipes"
                    );
                    cancel.cancel();
                    readers.await
                }
            },
        };
        out?;
        err?;

        let exit = RunExit::from_status(status, ExitReason::Exited, started.elapsed());
        info!(exit = %exit.describe(), "console command finished");
        Ok::<_, AppError>(exit)
    }
    .instrument(span)
    .await
}

/// Run a command line through the platform shell (`sh -c` / `cmd /C`).
///
/// # Errors
///
/// - `AppError::InvalidInput` for a blank command line.
/// - Otherwise as [`run_program`].
pub async fn run_shell_command(
    command_line: &str,
    cwd: Option<&Path>,
    drain_timeout: Duration,
    event_tx: mpsc::Sender<OutputEvent>,
) -> Result<RunExit> {
    let command_line = command_line.trim();
    if command_line.is_empty() {
        return Err(AppError::InvalidInput("command line is empty".into()));
    }

    let (shell, flag) = shell_invocation();
    run_program(
        shell,
        &[flag.to_owned(), command_line.to_owned()],
        cwd,
        drain_timeout,
        event_tx,
    )
    .await
}

#[cfg(unix)]
fn shell_invocation() -> (&'static str, &'static str) {
    ("sh", "-c")
}

#[cfg(not(unix))]
fn shell_invocation() -> (&'static str, &'static str) {
    ("cmd", "/C")
}
