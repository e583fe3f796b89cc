//! Interpreter package management (`interpreter -m pip install …`).
//!
//! Package commands run through the configured interpreter so they affect the
//! same environment scripts run in. The module is `package_module` from the
//! config (`pip` by default).
//!
//! | Action                       | Command line                                  |
//! |------------------------------|-----------------------------------------------|
//! | [`PackageAction::Install`]   | `interpreter -m <module> install <name>`      |
//! | [`PackageAction::Uninstall`] | `interpreter -m <module> uninstall -y <name>` |
//!
//! Names are checked by [`validate_package_name`] first, so an argument such
//! as `-r` can never be smuggled in as an option.

use std::fmt::{Display, Formatter};

use tokio::sync::mpsc;
use tracing::info;

use crate::config::RunnerConfig;
use crate::console::command::run_program;
use crate::models::output::OutputEvent;
use crate::models::run::RunExit;
use crate::{AppError, Result};

/// Package operation requested from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    /// Install a package.
    Install,
    /// Remove a package without prompting.
    Uninstall,
}

impl Display for PackageAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Uninstall => f.write_str("uninstall"),
        }
    }
}

/// Reject package names that are blank, contain whitespace, or look like
/// an option.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` describing the problem.
pub fn validate_package_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("package name is empty".into()));
    }
    if name.starts_with('-') {
        return Err(AppError::InvalidInput(format!(
            "package name must not start with '-': {name}"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AppError::InvalidInput(format!(
            "package name must not contain whitespace: {name}"
        )));
    }
    Ok(name)
}

/// Interpreter arguments for `action` on `name`.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if `name` fails validation.
pub fn package_args(config: &RunnerConfig, action: PackageAction, name: &str) -> Result<Vec<String>> {
    let name = validate_package_name(name)?;
    let mut args = vec!["-m".to_owned(), config.package_module.clone()];
    match action {
        PackageAction::Install => args.push("install".into()),
        PackageAction::Uninstall => args.extend(["uninstall".to_owned(), "-y".to_owned()]),
    }
    args.push(name.to_owned());
    Ok(args)
}

/// Run a package operation through the configured interpreter.
///
/// # Errors
///
/// - `AppError::InvalidInput` for an invalid package name.
/// - Otherwise as [`run_program`].
pub async fn run_package_command(
    config: &RunnerConfig,
    action: PackageAction,
    name: &str,
    event_tx: mpsc::Sender<OutputEvent>,
) -> Result<RunExit> {
    let args = package_args(config, action, name)?;
    info!(%action, package = name.trim(), "package command requested");
    run_program(
        &config.interpreter,
        &args,
        config.working_dir.as_deref(),
        config.drain_timeout(),
        event_tx,
    )
    .await
}
