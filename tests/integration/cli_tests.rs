//! End-to-end tests for the `halyra-run` binary's exit status.

use std::process::{Command, Output, Stdio};

use super::test_helpers::write_script;

fn run_binary(script: &std::path::Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_halyra-run"))
        .args(["--interpreter", "/bin/sh", "run"])
        .arg(script)
        .stdin(Stdio::null())
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary runs")
}

#[test]
fn exit_status_mirrors_script_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(&dir, "three.sh", "echo hi\nexit 3\n");

    let output = run_binary(&script);

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hi\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("exited with code 3"));
}

#[test]
fn successful_script_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(&dir, "ok.sh", "exit 0\n");

    assert_eq!(run_binary(&script).status.code(), Some(0));
}

#[test]
fn signalled_script_reports_128_plus_signal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(&dir, "term.sh", "kill -TERM $$\nsleep 5\n");

    assert_eq!(run_binary(&script).status.code(), Some(143));
}
