//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all run-manager failure modes.
#[derive(Debug)]
pub enum AppError {
    /// A run was requested while another session is still running.
    Busy(String),
    /// The child process could not be created.
    Spawn(String),
    /// Input was sent while no session is running.
    NotRunning(String),
    /// Read or write failure on a process stream or the file system.
    Io(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// Caller-supplied value failed validation.
    InvalidInput(String),
}

impl AppError {
    /// Whether the caller can simply report the error and carry on.
    ///
    /// `Busy` and `NotRunning` never disturb an existing session.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::NotRunning(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::NotRunning(msg) => write!(f, "not running: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
