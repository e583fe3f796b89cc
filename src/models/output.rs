//! Output and run event models delivered to the display sink.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::models::run::RunExit;

/// Child process stream an output chunk came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamKind {
    /// Lower-case stream name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// One chunk of captured process output.
///
/// `seq` counts chunks per stream starting at 0, so consumers can verify
/// ordering within a stream. No ordering is implied between streams.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutputEvent {
    /// Originating stream.
    pub stream: StreamKind,
    /// Per-stream sequence number.
    pub seq: u64,
    /// Raw bytes as read from the pipe.
    #[serde(rename = "text", serialize_with = "serialize_lossy")]
    pub data: Bytes,
}

impl OutputEvent {
    /// Construct an event from raw bytes.
    #[must_use]
    pub fn new(stream: StreamKind, seq: u64, data: impl Into<Bytes>) -> Self {
        Self {
            stream,
            seq,
            data: data.into(),
        }
    }

    /// The chunk decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Whether the chunk ends mid-line.
    ///
    /// A running process whose last stdout chunk is unterminated is most
    /// likely sitting at an input prompt.
    #[must_use]
    pub fn is_partial_line(&self) -> bool {
        !self.data.ends_with(b"\n")
    }
}

fn serialize_lossy<S>(data: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&String::from_utf8_lossy(data))
}

/// Event envelope pushed onto the run manager's channel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A child process was spawned.
    Started {
        /// Session identifier.
        session_id: String,
        /// Script being executed.
        path: PathBuf,
        /// OS process id, when available.
        pid: Option<u32>,
    },
    /// A chunk of process output.
    Output(OutputEvent),
    /// A stream read or stdin write failed; the session is being finished.
    IoFailure {
        /// Session identifier.
        session_id: String,
        /// Error description.
        message: String,
    },
    /// The session reached its terminal state. Always the last event of a run.
    Finished {
        /// Session identifier.
        session_id: String,
        /// Exit record.
        exit: RunExit,
    },
}
