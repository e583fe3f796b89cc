//! Unit tests for `AppError` display format and classification.

use halyra_run::AppError;

#[test]
fn display_uses_kind_prefix() {
    assert_eq!(AppError::Busy("x".into()).to_string(), "busy: x");
    assert_eq!(AppError::Spawn("x".into()).to_string(), "spawn: x");
    assert_eq!(AppError::NotRunning("x".into()).to_string(), "not running: x");
    assert_eq!(AppError::Io("x".into()).to_string(), "io: x");
    assert_eq!(AppError::Config("x".into()).to_string(), "config: x");
    assert_eq!(AppError::InvalidInput("x".into()).to_string(), "invalid input: x");
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Spawn("failed to spawn python3".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn busy_and_not_running_are_recoverable() {
    assert!(AppError::Busy("running".into()).is_recoverable());
    assert!(AppError::NotRunning("idle".into()).is_recoverable());
}

#[test]
fn spawn_and_io_are_not_recoverable() {
    assert!(!AppError::Spawn("missing".into()).is_recoverable());
    assert!(!AppError::Io("broken pipe".into()).is_recoverable());
    assert!(!AppError::Config("bad".into()).is_recoverable());
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}

#[test]
fn implements_std_error_trait() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Busy("test".into());
    assert_error(&err);
    assert!(!format!("{err:?}").is_empty());
}
