use std::time::Duration;

use halyra_run::{config::RunnerConfig, AppError};

fn sample_toml(workspace: &str) -> String {
    format!(
        r#"
interpreter = "/usr/bin/python3"
interpreter_args = ["-u", "-X", "utf8"]
working_dir = '{workspace}'
grace_period_ms = 750
drain_timeout_ms = 300
run_timeout_seconds = 30
max_buffered_bytes = 4096
event_capacity = 16
script_extension = ".pyw"
package_module = "uv"
"#
    )
}

#[test]
fn empty_config_uses_defaults() {
    let config = RunnerConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, RunnerConfig::default());
    assert_eq!(config.interpreter, "python3");
    assert_eq!(config.interpreter_args, vec!["-u".to_owned()]);
    assert_eq!(config.grace_period(), Duration::from_secs(2));
    assert_eq!(config.script_extension, ".py");
    assert_eq!(config.package_module, "pip");
    assert!(config.working_dir.is_none());
}

#[test]
fn full_config_parses_every_field() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = temp.path().to_str().expect("utf8 path");
    let config = RunnerConfig::from_toml_str(&sample_toml(workspace)).expect("valid config");

    assert_eq!(config.interpreter, "/usr/bin/python3");
    assert_eq!(config.interpreter_args.len(), 3);
    assert_eq!(config.grace_period(), Duration::from_millis(750));
    assert_eq!(config.drain_timeout(), Duration::from_millis(300));
    assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.max_buffered_bytes, 4096);
    assert_eq!(config.event_capacity, 16);
    assert_eq!(config.script_extension, ".pyw");
    assert_eq!(config.package_module, "uv");
    assert_eq!(
        config.working_dir,
        Some(temp.path().canonicalize().expect("canonical"))
    );
}

#[test]
fn zero_run_timeout_means_unlimited() {
    let config = RunnerConfig::from_toml_str("run_timeout_seconds = 0").expect("valid");
    assert_eq!(config.run_timeout(), None);
}

#[test]
fn zero_grace_period_is_rejected() {
    let result = RunnerConfig::from_toml_str("grace_period_ms = 0");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("grace_period_ms")));
}

#[test]
fn zero_event_capacity_is_rejected() {
    let result = RunnerConfig::from_toml_str("event_capacity = 0");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("event_capacity")));
}

#[test]
fn blank_interpreter_is_rejected() {
    let result = RunnerConfig::from_toml_str("interpreter = \"  \"");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("interpreter")));
}

#[test]
fn missing_working_dir_is_rejected() {
    let result = RunnerConfig::from_toml_str("working_dir = '/definitely/not/a/real/dir'");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("working_dir")));
}

#[test]
fn malformed_toml_maps_to_config_error() {
    let result = RunnerConfig::from_toml_str("interpreter = [");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.starts_with("invalid config")));
}

#[test]
fn load_from_missing_path_fails() {
    let result = RunnerConfig::load_from_path("/definitely/not/here/config.toml");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("failed to read config")));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "interpreter = \"python3.12\"\n").expect("write config");

    let config = RunnerConfig::load_from_path(&path).expect("load");
    assert_eq!(config.interpreter, "python3.12");
}

#[test]
fn with_interpreter_keeps_other_defaults() {
    let config = RunnerConfig::with_interpreter("/bin/sh", Vec::new());
    assert_eq!(config.interpreter, "/bin/sh");
    assert!(config.interpreter_args.is_empty());
    assert_eq!(config.grace_period_ms, RunnerConfig::default().grace_period_ms);
}
