//! Single-slot run manager.
//!
//! Owns at most one running script. Every state transition happens under the
//! slot lock and is published on a `watch` channel; output and lifecycle
//! events flow to the display layer through one bounded `mpsc` channel.
//!
//! Per run, four tasks cooperate:
//! - two readers (stdout, stderr) drain the pipes into an internal channel,
//! - a pump appends chunks to the session buffer and forwards them,
//! - a supervisor awaits exit, stop, or timeout and records the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::RunnerConfig;
use crate::models::output::{OutputEvent, RunEvent, StreamKind};
use crate::models::run::{ExitReason, RunExit, RunSession, RunState};
use crate::runner::{reader, spawner, terminate};
use crate::{AppError, Result};

/// Capacity of the internal reader-to-pump channel.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// Control handles of the running process.
struct ActiveRun {
    stdin: SharedStdin,
    stop_tx: Option<oneshot::Sender<ExitReason>>,
    done_rx: watch::Receiver<Option<RunExit>>,
}

#[derive(Default)]
struct Slot {
    state: RunState,
    session: Option<RunSession>,
    active: Option<ActiveRun>,
}

struct Inner {
    config: RunnerConfig,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<RunState>,
    events: mpsc::Sender<RunEvent>,
}

impl Inner {
    fn set_state(&self, slot: &mut Slot, next: RunState) {
        debug_assert!(
            slot.state.can_transition_to(next),
            "invalid run state transition {:?} -> {next:?}",
            slot.state
        );
        slot.state = next;
        self.state_tx.send_replace(next);
    }

    async fn emit(&self, event: RunEvent) {
        if self.events.send(event).await.is_err() {
            debug!("run event receiver dropped");
        }
    }

    /// Force the session `session_id` to finish after a stream failure.
    ///
    /// Only the first terminal request for the current session wins: when a
    /// stop or timeout is already tearing the run down, or the session has
    /// been replaced, the failure is a side effect and no event is emitted.
    async fn fail(&self, session_id: &str, message: String) {
        let forced = {
            let mut slot = self.slot.lock().await;
            let current = slot.session.as_ref().is_some_and(|s| s.id == session_id);
            let stop_tx = if current {
                slot.active.as_mut().and_then(|a| a.stop_tx.take())
            } else {
                None
            };
            // The supervisor may already have exited; nothing to stop then.
            stop_tx.is_some_and(|tx| {
                let _ = tx.send(ExitReason::IoFailure);
                true
            })
        };
        if !forced {
            debug!(session_id, message = %message, "stream failure during shutdown");
            return;
        }
        warn!(session_id, message = %message, "run stream failure");
        self.emit(RunEvent::IoFailure {
            session_id: session_id.to_owned(),
            message,
        })
        .await;
    }
}

/// Run session manager: one script at a time.
///
/// Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct RunManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RunManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunManager")
            .field("state", &*self.inner.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl RunManager {
    /// Create a manager and the receiver its events are delivered to.
    #[must_use]
    pub fn new(config: RunnerConfig) -> (Self, mpsc::Receiver<RunEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let (state_tx, _) = watch::channel(RunState::Idle);
        let inner = Inner {
            config,
            slot: Mutex::new(Slot::default()),
            state_tx,
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot of the current or most recent session.
    pub async fn session(&self) -> Option<RunSession> {
        self.inner.slot.lock().await.session.clone()
    }

    /// Exit record of the most recent finished session.
    pub async fn last_exit(&self) -> Option<RunExit> {
        self.inner
            .slot
            .lock()
            .await
            .session
            .as_ref()
            .and_then(|s| s.exit.clone())
    }

    /// Buffered output of the current or most recent session.
    pub async fn output_snapshot(&self) -> Option<String> {
        self.inner
            .slot
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.output.to_string_lossy())
    }

    /// Run `path` under the configured interpreter.
    ///
    /// # Errors
    ///
    /// - `AppError::Busy` if a script is already running; nothing changes.
    /// - `AppError::Spawn` if the script is missing or the interpreter could
    ///   not be started; the state is left as it was.
    pub async fn start_run(&self, path: impl AsRef<Path>) -> Result<RunSession> {
        self.start(path.as_ref(), None, None).await
    }

    /// Run an unsaved editor buffer by writing it to a temporary script.
    ///
    /// The temporary file lives until the run finishes. The child inherits
    /// the current directory unless `working_dir` is configured.
    ///
    /// # Errors
    ///
    /// Same as [`RunManager::start_run`], plus `AppError::Io` if the
    /// temporary file cannot be written.
    pub async fn run_source(&self, source: &str) -> Result<RunSession> {
        if self.state() == RunState::Running {
            return Err(AppError::Busy("a script is already running".into()));
        }

        let mut script = tempfile::Builder::new()
            .prefix("halyra-")
            .suffix(&self.inner.config.script_extension)
            .tempfile()?;
        std::io::Write::write_all(&mut script, source.as_bytes())?;
        std::io::Write::flush(&mut script)?;

        let path = script.path().to_path_buf();
        let cwd = std::env::current_dir().ok();
        self.start(&path, cwd, Some(script)).await
    }

    async fn start(
        &self,
        path: &Path,
        cwd: Option<PathBuf>,
        temp_script: Option<NamedTempFile>,
    ) -> Result<RunSession> {
        let mut slot = self.inner.slot.lock().await;
        if slot.state == RunState::Running {
            let running = slot
                .session
                .as_ref()
                .map(|s| s.path.display().to_string())
                .unwrap_or_default();
            info!(requested = %path.display(), running = %running, "run rejected, slot busy");
            return Err(AppError::Busy(format!("already running {running}")));
        }

        let spawned = spawner::spawn_script(&self.inner.config, path, cwd.as_deref())?;
        let started = Instant::now();
        let pid = spawned.child.id();
        let session = RunSession::new(
            spawned.script.clone(),
            pid,
            self.inner.config.max_buffered_bytes,
        );
        let session_id = session.id.clone();

        let stdin: SharedStdin = Arc::new(Mutex::new(Some(spawned.stdin)));
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(None);
        let readers_cancel = CancellationToken::new();
        let span = info_span!("run", session_id = %session_id, pid = pid.unwrap_or(0));

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let readers = [
            self.spawn_reader(
                &session_id,
                StreamKind::Stdout,
                spawned.stdout,
                chunk_tx.clone(),
                readers_cancel.clone(),
            ),
            self.spawn_reader(
                &session_id,
                StreamKind::Stderr,
                spawned.stderr,
                chunk_tx,
                readers_cancel.clone(),
            ),
        ];
        let pump = tokio::spawn(
            pump(
                Arc::clone(&self.inner),
                RunEvent::Started {
                    session_id: session_id.clone(),
                    path: spawned.script.clone(),
                    pid,
                },
                session_id.clone(),
                chunk_rx,
            )
            .instrument(span.clone()),
        );

        tokio::spawn(
            supervise(Supervision {
                inner: Arc::clone(&self.inner),
                session_id: session_id.clone(),
                child: spawned.child,
                started,
                stop_rx,
                done_tx,
                stdin: Arc::clone(&stdin),
                pump,
                readers,
                readers_cancel,
                temp_script,
            })
            .instrument(span),
        );

        slot.session = Some(session.clone());
        slot.active = Some(ActiveRun {
            stdin,
            stop_tx: Some(stop_tx),
            done_rx,
        });
        self.inner.set_state(&mut slot, RunState::Running);
        info!(session_id = %session_id, script = %session.path.display(), "run started");

        Ok(session)
    }

    fn spawn_reader<R>(
        &self,
        session_id: &str,
        stream: StreamKind,
        pipe: R,
        chunk_tx: mpsc::Sender<OutputEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let session_id = session_id.to_owned();
        tokio::spawn(async move {
            if let Err(err) = reader::run_reader(stream, pipe, chunk_tx, cancel).await {
                inner
                    .fail(&session_id, format!("{} read failed: {err}", stream.as_str()))
                    .await;
            }
        })
    }

    /// Write `text` to the running script's stdin.
    ///
    /// # Errors
    ///
    /// - `AppError::NotRunning` if no script is running or its stdin is
    ///   already closed.
    /// - `AppError::Io` if the write fails; the session is then finished.
    pub async fn send_input(&self, text: &str) -> Result<()> {
        let (session_id, stdin) = {
            let slot = self.inner.slot.lock().await;
            match (&slot.session, &slot.active) {
                (Some(session), Some(active)) if slot.state == RunState::Running => {
                    (session.id.clone(), Arc::clone(&active.stdin))
                }
                _ => return Err(AppError::NotRunning("no script is running".into())),
            }
        };

        let mut guard = stdin.lock().await;
        let Some(pipe) = guard.as_mut() else {
            return Err(AppError::NotRunning("script input is closed".into()));
        };

        let written = async {
            pipe.write_all(text.as_bytes()).await?;
            pipe.flush().await
        }
        .await;

        if let Err(err) = written {
            *guard = None;
            drop(guard);
            let message = format!("stdin write failed: {err}");
            self.inner.fail(&session_id, message.clone()).await;
            return Err(AppError::Io(message));
        }

        debug!(session_id = %session_id, bytes = text.len(), "input forwarded");
        Ok(())
    }

    /// Close the running script's stdin so it sees end of input.
    ///
    /// Returns `false` when nothing is running or input is already closed.
    pub async fn close_input(&self) -> bool {
        let stdin = {
            let slot = self.inner.slot.lock().await;
            match &slot.active {
                Some(active) if slot.state == RunState::Running => Arc::clone(&active.stdin),
                _ => return false,
            }
        };
        let closed = stdin.lock().await.take().is_some();
        if closed {
            debug!("script input closed");
        }
        closed
    }

    /// Stop the running script and wait for its exit.
    ///
    /// Returns `None` when nothing was running.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` is kept for API symmetry with the
    /// other slot operations.
    pub async fn stop(&self) -> Result<Option<RunExit>> {
        let done_rx = {
            let mut slot = self.inner.slot.lock().await;
            if slot.state != RunState::Running {
                return Ok(None);
            }
            let Some(active) = slot.active.as_mut() else {
                return Ok(None);
            };
            if let Some(tx) = active.stop_tx.take() {
                // A closed receiver means the supervisor already saw the exit.
                let _ = tx.send(ExitReason::Stopped);
                info!("stop requested");
            }
            active.done_rx.clone()
        };

        Ok(self.await_done(done_rx).await)
    }

    /// Wait until the current run, if any, has finished.
    pub async fn wait_finished(&self) -> Option<RunExit> {
        let done_rx = {
            let slot = self.inner.slot.lock().await;
            match &slot.active {
                Some(active) => active.done_rx.clone(),
                None => return slot.session.as_ref().and_then(|s| s.exit.clone()),
            }
        };
        self.await_done(done_rx).await
    }

    async fn await_done(&self, mut done_rx: watch::Receiver<Option<RunExit>>) -> Option<RunExit> {
        if let Ok(exit) = done_rx.wait_for(Option::is_some).await {
            return exit.clone();
        }
        self.last_exit().await
    }

    /// Mark a finished run as consumed by the UI, returning to `Idle`.
    ///
    /// Returns `false` in any state other than `Finished`.
    pub async fn acknowledge(&self) -> bool {
        let mut slot = self.inner.slot.lock().await;
        if slot.state != RunState::Finished {
            return false;
        }
        self.inner.set_state(&mut slot, RunState::Idle);
        true
    }
}

async fn pump(
    inner: Arc<Inner>,
    started: RunEvent,
    session_id: String,
    mut chunk_rx: mpsc::Receiver<OutputEvent>,
) {
    inner.emit(started).await;
    while let Some(event) = chunk_rx.recv().await {
        {
            let mut slot = inner.slot.lock().await;
            if let Some(session) = slot.session.as_mut() {
                if session.id == session_id {
                    session.output.push(&event.data);
                }
            }
        }
        inner.emit(RunEvent::Output(event)).await;
    }
}

struct Supervision {
    inner: Arc<Inner>,
    session_id: String,
    child: Child,
    started: Instant,
    stop_rx: oneshot::Receiver<ExitReason>,
    done_tx: watch::Sender<Option<RunExit>>,
    stdin: SharedStdin,
    pump: JoinHandle<()>,
    readers: [JoinHandle<()>; 2],
    readers_cancel: CancellationToken,
    temp_script: Option<NamedTempFile>,
}

async fn run_timeout(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

async fn supervise(mut run: Supervision) {
    let grace = run.inner.config.grace_period();

    let outcome = tokio::select! {
        status = run.child.wait() => Ok(status),
        requested = &mut run.stop_rx => Err(requested.unwrap_or(ExitReason::Stopped)),
        () = run_timeout(run.inner.config.run_timeout()) => {
            warn!("run timeout exceeded");
            Err(ExitReason::TimedOut)
        }
    };
    let (status, reason) = match outcome {
        Ok(status) => (status, ExitReason::Exited),
        Err(reason) => (
            terminate::terminate_then_kill(&mut run.child, grace).await,
            reason,
        ),
    };

    let elapsed = run.started.elapsed();
    let exit = match status {
        Ok(status) => RunExit::from_status(status, reason, elapsed),
        Err(err) => {
            warn!(%err, "failed to collect exit status");
            RunExit::unknown(reason, elapsed)
        }
    };

    run.stdin.lock().await.take();

    let drain = run.inner.config.drain_timeout();
    if tokio::time::timeout(drain, &mut run.pump).await.is_err() {
        warn!(?drain, "output still open after exit, abandoning pipes");
        run.readers_cancel.cancel();
        if tokio::time::timeout(drain, &mut run.pump).await.is_err() {
            warn!("event consumer stalled, dropping undelivered output");
            for handle in &run.readers {
                handle.abort();
            }
            run.pump.abort();
        }
    }

    if let Some(script) = run.temp_script.take() {
        if let Err(err) = script.close() {
            warn!(%err, "failed to remove temporary script");
        }
    }

    {
        let mut slot = run.inner.slot.lock().await;
        if let Some(session) = slot.session.as_mut() {
            if session.id == run.session_id {
                session.finish(exit.clone());
            }
        }
        slot.active = None;
        run.inner.set_state(&mut slot, RunState::Finished);
    }
    run.done_tx.send_replace(Some(exit.clone()));

    info!(
        exit = %exit.describe(),
        elapsed_ms = u64::try_from(exit.elapsed.as_millis()).unwrap_or(u64::MAX),
        "run finished"
    );

    run.inner
        .emit(RunEvent::Finished {
            session_id: run.session_id,
            exit,
        })
        .await;
}
