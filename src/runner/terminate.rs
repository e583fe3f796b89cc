//! Graceful-then-forced process termination.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, info, warn};

/// Terminate `child`, escalating to a forced kill after `grace`.
///
/// 1. Returns immediately if the child has already exited.
/// 2. Sends SIGTERM to the child's process group (unix) or kills it outright
///    (other platforms).
/// 3. Waits up to `grace` for the exit.
/// 4. Sends SIGKILL to the group and waits for the OS to reap the child.
///
/// # Errors
///
/// Returns the underlying I/O error if the exit status cannot be collected.
pub async fn terminate_then_kill(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        debug!(?status, "child already exited before termination");
        return Ok(status);
    }

    request_terminate(child);

    if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
        info!("child process exited within grace period");
        return result;
    }

    warn!(
        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        "child did not exit within grace period, forcing kill"
    );
    force_kill(child);
    child.wait().await
}

#[cfg(unix)]
fn group_pid(child: &Child) -> Option<nix::unistd::Pid> {
    let pid = child.id()?;
    i32::try_from(pid).ok().map(nix::unistd::Pid::from_raw)
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};

    let Some(pgid) = group_pid(child) else {
        return;
    };
    if let Err(err) = killpg(pgid, Signal::SIGTERM) {
        debug!(%err, "SIGTERM to process group failed");
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "terminate request failed");
    }
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};

    if let Some(pgid) = group_pid(child) {
        if let Err(err) = killpg(pgid, Signal::SIGKILL) {
            debug!(%err, "SIGKILL to process group failed");
        }
    }
    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill failed");
    }
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "start_kill failed");
    }
}
