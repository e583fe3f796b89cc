//! Run session model and lifecycle helpers.
//!
//! # State machine
//!
//! | From       | To         | Trigger                                   |
//! |------------|------------|-------------------------------------------|
//! | `Idle`     | `Running`  | a script was spawned                      |
//! | `Running`  | `Finished` | exit, stop, timeout, or stream failure    |
//! | `Finished` | `Idle`     | the UI acknowledged the result            |
//! | `Finished` | `Running`  | a new run replaced the unacknowledged one |
//!
//! A [`RunSession`] records one run: its script, process id, timestamps,
//! the most recent output (bounded by [`OutputBuffer`]), and the [`RunExit`]
//! once the process is gone.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle state of the run slot.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing running and no unacknowledged result.
    #[default]
    Idle,
    /// A child process is executing.
    Running,
    /// The last run ended; its exit record is still available.
    Finished,
}

impl RunState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle | RunState::Finished, RunState::Running)
                | (RunState::Running, RunState::Finished)
                | (RunState::Finished, RunState::Idle)
        )
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The process exited on its own.
    Exited,
    /// Terminated by an explicit stop request.
    Stopped,
    /// Terminated after exceeding the configured run timeout.
    TimedOut,
    /// Terminated after a stream read or write failed.
    IoFailure,
}

/// Terminal record of a finished run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunExit {
    /// Exit code, absent when the process died from a signal.
    pub code: Option<i32>,
    /// Terminating signal number (unix only).
    pub signal: Option<i32>,
    /// Why the run ended.
    pub reason: ExitReason,
    /// Wall time from spawn to confirmed exit.
    pub elapsed: Duration,
}

impl RunExit {
    /// Build an exit record from an OS exit status.
    #[must_use]
    pub fn from_status(status: ExitStatus, reason: ExitReason, elapsed: Duration) -> Self {
        Self {
            code: status.code(),
            signal: exit_signal(status),
            reason,
            elapsed,
        }
    }

    /// Build an exit record when the OS status could not be collected.
    #[must_use]
    pub fn unknown(reason: ExitReason, elapsed: Duration) -> Self {
        Self {
            code: None,
            signal: None,
            reason,
            elapsed,
        }
    }

    /// True only for a natural exit with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.reason == ExitReason::Exited && self.code == Some(0)
    }

    /// Process exit status mirroring this run, as a shell would report it.
    ///
    /// | Run ended with           | Status     |
    /// |--------------------------|------------|
    /// | code `0..=255`           | the code   |
    /// | code outside that range  | `1`        |
    /// | signal `N` (`1..=127`)   | `128 + N`  |
    /// | anything else            | `1`        |
    #[must_use]
    pub fn process_exit_code(&self) -> u8 {
        match (self.code, self.signal) {
            (Some(code), _) => u8::try_from(code).unwrap_or(1),
            (None, Some(signal)) if (1..=127).contains(&signal) => {
                u8::try_from(128 + signal).unwrap_or(1)
            }
            _ => 1,
        }
    }

    /// Human-readable exit description.
    #[must_use]
    pub fn describe(&self) -> String {
        let status = match (self.code, self.signal) {
            (Some(code), _) => format!("exited with code {code}"),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "status unknown".to_owned(),
        };
        match self.reason {
            ExitReason::Exited => status,
            ExitReason::Stopped => format!("stopped ({status})"),
            ExitReason::TimedOut => format!("timed out ({status})"),
            ExitReason::IoFailure => format!("stream failure ({status})"),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Bounded byte buffer holding the most recent output of a session.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
    dropped: u64,
}

impl OutputBuffer {
    /// Create a buffer retaining at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Append a chunk, evicting the oldest bytes past capacity.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.capacity == 0 {
            self.dropped += chunk.len() as u64;
            return;
        }
        self.bytes.extend(chunk);
        let overflow = self.bytes.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.bytes.drain(..overflow);
            self.dropped += overflow as u64;
        }
    }

    /// Number of bytes evicted so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Retained bytes in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    /// Retained output decoded lossily.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }
}

/// One execution of a target script as a child process.
#[derive(Debug, Clone)]
pub struct RunSession {
    /// Unique session identifier.
    pub id: String,
    /// Script being executed.
    pub path: PathBuf,
    /// OS process id, once spawned.
    pub pid: Option<u32>,
    /// Current lifecycle state.
    pub status: RunState,
    /// Spawn timestamp.
    pub started_at: DateTime<Utc>,
    /// Confirmed exit timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// Exit record once finished.
    pub exit: Option<RunExit>,
    /// Recent combined output.
    pub output: OutputBuffer,
}

impl RunSession {
    /// Construct a running session for `path` with a generated identifier.
    #[must_use]
    pub fn new(path: PathBuf, pid: Option<u32>, buffer_capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            pid,
            status: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            exit: None,
            output: OutputBuffer::new(buffer_capacity),
        }
    }

    /// Record the exit and move to `Finished`.
    pub fn finish(&mut self, exit: RunExit) {
        self.status = RunState::Finished;
        self.finished_at = Some(Utc::now());
        self.exit = Some(exit);
    }

    /// Whether the session is still executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RunState::Running
    }
}
