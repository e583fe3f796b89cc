//! Shared helpers for process-level integration tests.
//!
//! Scripts are plain POSIX shell run under `/bin/sh`, so the tests do not
//! depend on any particular scripting runtime being installed.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use halyra_run::models::output::{OutputEvent, RunEvent, StreamKind};
use halyra_run::models::run::RunExit;
use halyra_run::{RunManager, RunnerConfig};

/// Upper bound for any single test run.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Shell script that never exits on its own.
pub const INFINITE_LOOP: &str = "while true; do sleep 0.1; done\n";

/// `RunnerConfig` executing scripts with `/bin/sh` and short timeouts.
pub fn sh_config() -> RunnerConfig {
    RunnerConfig {
        grace_period_ms: 500,
        drain_timeout_ms: 500,
        ..RunnerConfig::with_interpreter("/bin/sh", Vec::new())
    }
}

/// Manager over [`sh_config`].
pub fn sh_manager() -> (RunManager, mpsc::Receiver<RunEvent>) {
    RunManager::new(sh_config())
}

/// Write `body` to `name` inside `dir`.
pub fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write script");
    path
}

/// Collect events until `Finished`, failing the test on timeout.
pub async fn collect_run(events: &mut mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    tokio::time::timeout(TEST_TIMEOUT, async {
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            let done = matches!(event, RunEvent::Finished { .. });
            collected.push(event);
            if done {
                break;
            }
        }
        collected
    })
    .await
    .expect("run did not finish in time")
}

/// Output events of one stream, in delivery order.
pub fn outputs(events: &[RunEvent], stream: StreamKind) -> Vec<OutputEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Output(output) if output.stream == stream => Some(output.clone()),
            _ => None,
        })
        .collect()
}

/// Concatenated text of one stream.
pub fn stream_text(events: &[RunEvent], stream: StreamKind) -> String {
    outputs(events, stream)
        .iter()
        .map(OutputEvent::text)
        .collect()
}

/// Exit record of the terminal `Finished` event.
pub fn finished_exit(events: &[RunEvent]) -> RunExit {
    match events.last() {
        Some(RunEvent::Finished { exit, .. }) => exit.clone(),
        other => panic!("last event must be Finished, got {other:?}"),
    }
}

/// Wait for the next output event whose text contains `needle`.
pub async fn wait_for_output(events: &mut mpsc::Receiver<RunEvent>, needle: &str) -> OutputEvent {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(RunEvent::Output(output)) if output.text().contains(needle) => {
                    return output;
                }
                Some(RunEvent::Finished { exit, .. }) => {
                    panic!("run finished ({exit:?}) before output containing {needle:?}")
                }
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected output did not arrive in time")
}
