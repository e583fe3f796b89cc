//! Integration tests for console shell commands and package commands.

use std::time::Duration;

use tokio::sync::mpsc;

use halyra_run::console::{run_package_command, run_program, run_shell_command, PackageAction};
use halyra_run::models::output::{OutputEvent, StreamKind};
use halyra_run::{AppError, RunnerConfig};

const DRAIN: Duration = Duration::from_millis(300);

fn text_of(events: &[OutputEvent], stream: StreamKind) -> String {
    events
        .iter()
        .filter(|event| event.stream == stream)
        .map(OutputEvent::text)
        .collect()
}

async fn drain(mut rx: mpsc::Receiver<OutputEvent>) -> Vec<OutputEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn shell_command_streams_both_outputs() {
    let (tx, rx) = mpsc::channel(16);
    let collector = tokio::spawn(drain(rx));

    let exit = run_shell_command("echo out; echo err 1>&2; exit 4", None, DRAIN, tx)
        .await
        .expect("command runs");
    let events = collector.await.expect("join");

    assert_eq!(exit.code, Some(4));
    assert_eq!(text_of(&events, StreamKind::Stdout), "out\n");
    assert_eq!(text_of(&events, StreamKind::Stderr), "err\n");
}

#[tokio::test]
async fn shell_command_honours_working_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (tx, rx) = mpsc::channel(16);
    let collector = tokio::spawn(drain(rx));

    let exit = run_shell_command("pwd", Some(dir.path()), DRAIN, tx)
        .await
        .expect("command runs");
    let events = collector.await.expect("join");

    assert!(exit.success());
    let expected = dir.path().canonicalize().expect("canonical");
    assert_eq!(
        text_of(&events, StreamKind::Stdout).trim_end(),
        expected.to_str().expect("utf8")
    );
}

#[tokio::test]
async fn blank_shell_command_is_invalid_input() {
    let (tx, _rx) = mpsc::channel(1);
    let result = run_shell_command("   ", None, DRAIN, tx).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn missing_program_is_spawn_error() {
    let (tx, _rx) = mpsc::channel(1);
    let result = run_program("/definitely/not/a/program", &[], None, DRAIN, tx).await;
    assert!(matches!(result, Err(AppError::Spawn(_))));
}

#[tokio::test]
async fn package_command_invokes_interpreter_module() {
    // `sh -m pip install demo` is not valid shell usage, so use `echo` as the
    // interpreter to observe the exact argument list.
    let config = RunnerConfig::with_interpreter("echo", Vec::new());
    let (tx, rx) = mpsc::channel(16);
    let collector = tokio::spawn(drain(rx));

    let exit = run_package_command(&config, PackageAction::Install, "demo", tx)
        .await
        .expect("command runs");
    let events = collector.await.expect("join");

    assert!(exit.success());
    assert_eq!(
        text_of(&events, StreamKind::Stdout),
        "-m pip install demo\n"
    );
}

#[tokio::test]
async fn invalid_package_name_never_spawns() {
    let config = RunnerConfig::with_interpreter("/definitely/not/a/program", Vec::new());
    let (tx, _rx) = mpsc::channel(1);
    let result = run_package_command(&config, PackageAction::Uninstall, "-r", tx).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn background_process_does_not_hold_command_open() {
    let (tx, rx) = mpsc::channel(16);
    let collector = tokio::spawn(drain(rx));

    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        run_shell_command("sleep 20 & echo started", None, DRAIN, tx),
    )
    .await
    .expect("command returns once its output drain deadline passes")
    .expect("command runs");
    let events = collector.await.expect("join");

    assert!(exit.success());
    assert_eq!(text_of(&events, StreamKind::Stdout), "started\n");
}
