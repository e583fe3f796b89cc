//! Runner configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_interpreter() -> String {
    "python3".into()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-u".into()]
}

fn default_grace_period_ms() -> u64 {
    2000
}

fn default_drain_timeout_ms() -> u64 {
    1000
}

fn default_max_buffered_bytes() -> usize {
    1_048_576
}

fn default_event_capacity() -> usize {
    256
}

fn default_script_extension() -> String {
    ".py".into()
}

fn default_package_module() -> String {
    "pip".into()
}

/// Runner configuration parsed from `config.toml`.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Interpreter binary used to execute scripts (e.g., `python3`).
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Arguments passed to the interpreter before the script path.
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,
    /// Fixed working directory; when absent the script's parent is used.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Wait after the graceful stop signal before a forced kill.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Bound on waiting for output readers to hit EOF after the child exits.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Wall-clock limit for a single run; 0 means no limit.
    #[serde(default)]
    pub run_timeout_seconds: u64,
    /// Maximum bytes of combined output retained per session.
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
    /// Capacity of the run event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// File suffix used when running an unsaved buffer.
    #[serde(default = "default_script_extension")]
    pub script_extension: String,
    /// Interpreter module that manages packages (`interpreter -m <module>`).
    #[serde(default = "default_package_module")]
    pub package_module: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            working_dir: None,
            grace_period_ms: default_grace_period_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            run_timeout_seconds: 0,
            max_buffered_bytes: default_max_buffered_bytes(),
            event_capacity: default_event_capacity(),
            script_extension: default_script_extension(),
            package_module: default_package_module(),
        }
    }
}

impl RunnerConfig {
    /// Build a default configuration for the given interpreter.
    #[must_use]
    pub fn with_interpreter(interpreter: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_args: args,
            ..Self::default()
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Grace period between the stop signal and the forced kill.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Upper bound on waiting for stream readers after exit.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Configured run timeout, if any.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_seconds > 0).then(|| Duration::from_secs(self.run_timeout_seconds))
    }

    /// Validate field ranges and canonicalize the working directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&mut self) -> Result<()> {
        if self.interpreter.trim().is_empty() {
            return Err(AppError::Config("interpreter must not be empty".into()));
        }

        if self.grace_period_ms == 0 {
            return Err(AppError::Config(
                "grace_period_ms must be greater than zero".into(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(AppError::Config(
                "event_capacity must be greater than zero".into(),
            ));
        }

        if self.package_module.trim().is_empty() {
            return Err(AppError::Config("package_module must not be empty".into()));
        }

        if let Some(dir) = &self.working_dir {
            let canonical = dir
                .canonicalize()
                .map_err(|err| AppError::Config(format!("working_dir invalid: {err}")))?;
            self.working_dir = Some(canonical);
        }

        Ok(())
    }
}
