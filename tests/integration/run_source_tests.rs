//! Integration tests for running unsaved editor buffers.

use halyra_run::models::output::StreamKind;
use halyra_run::models::run::RunState;
use halyra_run::{AppError, RunManager, RunnerConfig};

use super::test_helpers::{
    collect_run, finished_exit, sh_config, sh_manager, stream_text, write_script, INFINITE_LOOP,
};

#[tokio::test]
async fn buffer_runs_from_temporary_script() {
    let (manager, mut events) = RunManager::new(RunnerConfig {
        script_extension: ".sh".into(),
        ..sh_config()
    });

    let session = manager
        .run_source("echo from-buffer\n")
        .await
        .expect("run source");
    assert!(session
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("halyra-") && name.ends_with(".sh")));

    let collected = collect_run(&mut events).await;
    assert_eq!(stream_text(&collected, StreamKind::Stdout), "from-buffer\n");
    assert!(finished_exit(&collected).success());
    assert!(
        !session.path.exists(),
        "temporary script is removed after the run"
    );
}

#[tokio::test]
async fn buffer_run_is_rejected_while_busy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let looping = write_script(&dir, "loop.sh", INFINITE_LOOP);
    let (manager, _events) = sh_manager();

    manager.start_run(&looping).await.expect("start");
    let result = manager.run_source("echo nope\n").await;

    assert!(matches!(result, Err(AppError::Busy(_))));
    assert_eq!(manager.state(), RunState::Running);
    manager.stop().await.expect("stop");
}
