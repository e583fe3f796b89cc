#![forbid(unsafe_code)]

//! Run session manager for the Halyra scripting IDE.
//!
//! Runs one script at a time under the configured interpreter, streams its
//! stdout/stderr as ordered [`models::output::OutputEvent`]s over a channel,
//! and forwards console input to the child's stdin.

pub mod config;
pub mod console;
pub mod errors;
pub mod models;
pub mod runner;

pub use config::RunnerConfig;
pub use errors::{AppError, Result};
pub use runner::RunManager;
