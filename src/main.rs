#![forbid(unsafe_code)]

//! `halyra-run`: terminal console for the Halyra run session manager.
//!
//! Runs a script under the configured interpreter with live output and
//! stdin forwarding, or runs one-shot console commands (shell command lines,
//! package install/uninstall).

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use halyra_run::console::{self, PackageAction};
use halyra_run::models::output::{OutputEvent, RunEvent, StreamKind};
use halyra_run::models::run::RunExit;
use halyra_run::{AppError, Result, RunManager, RunnerConfig};

/// Time allowed for blocking stdin reads to unwind at exit.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(200);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum EventFormat {
    /// Raw script output on stdout/stderr.
    Text,
    /// One JSON event per line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "halyra-run", about = "Halyra script runner console", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured interpreter binary.
    #[arg(long)]
    interpreter: Option<String>,

    /// How run events are printed.
    #[arg(long, value_enum, default_value_t = EventFormat::Text)]
    events: EventFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script file; terminal input is forwarded to it.
    Run {
        /// Script to execute.
        file: PathBuf,
    },

    /// Run a command line through the platform shell.
    Exec {
        /// Command line words, joined with spaces.
        #[arg(required = true, trailing_var_arg = true)]
        command_line: Vec<String>,
    },

    /// Manage interpreter packages.
    Pip {
        #[command(subcommand)]
        action: PipAction,
    },
}

#[derive(Debug, Subcommand)]
enum PipAction {
    /// Install a package.
    Install {
        /// Package name.
        name: String,
    },
    /// Uninstall a package.
    Uninstall {
        /// Package name.
        name: String,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

async fn run(args: Cli) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load_from_path(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(interpreter) = args.interpreter {
        config.interpreter = interpreter;
        config.validate()?;
    }
    info!(interpreter = config.interpreter, "configuration loaded");

    match args.command {
        Command::Run { file } => run_script(config, &file, args.events).await,
        Command::Exec { command_line } => {
            let line = command_line.join(" ");
            let cwd = config.working_dir.clone();
            let drain = config.drain_timeout();
            run_console(args.events, move |tx| async move {
                console::run_shell_command(&line, cwd.as_deref(), drain, tx).await
            })
            .await
        }
        Command::Pip { action } => {
            let (action, name) = match action {
                PipAction::Install { name } => (PackageAction::Install, name),
                PipAction::Uninstall { name } => (PackageAction::Uninstall, name),
            };
            run_console(args.events, move |tx| async move {
                console::run_package_command(&config, action, &name, tx).await
            })
            .await
        }
    }
}

async fn run_script(
    config: RunnerConfig,
    file: &std::path::Path,
    format: EventFormat,
) -> Result<ExitCode> {
    let (manager, mut events) = RunManager::new(config);
    manager.start_run(file).await?;

    let input = tokio::spawn(forward_stdin(manager.clone()));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut code = ExitCode::FAILURE;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_run_event(&event, format)?;
                if let RunEvent::Finished { exit, .. } = &event {
                    code = exit_code(exit);
                    break;
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                info!("interrupt received, stopping script");
                // Stop waits for exit, which needs this loop to keep draining.
                let stopper = manager.clone();
                tokio::spawn(async move {
                    if let Err(err) = stopper.stop().await {
                        warn!(%err, "stop failed");
                    }
                });
            }
        }
    }

    input.abort();
    Ok(code)
}

async fn forward_stdin(manager: RunManager) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(err) = manager.send_input(&format!("{line}\n")).await {
                    if !err.is_recoverable() {
                        warn!(%err, "input forwarding failed");
                    }
                    break;
                }
            }
            Ok(None) => {
                manager.close_input().await;
                break;
            }
            Err(err) => {
                warn!(%err, "terminal input read failed");
                break;
            }
        }
    }
}

async fn run_console<F, Fut>(format: EventFormat, command: F) -> Result<ExitCode>
where
    F: FnOnce(mpsc::Sender<OutputEvent>) -> Fut,
    Fut: std::future::Future<Output = Result<RunExit>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(256);
    let task = tokio::spawn(command(tx));
    while let Some(event) = rx.recv().await {
        print_output(&event, format)?;
    }
    let exit = task
        .await
        .map_err(|err| AppError::Io(format!("console command task failed: {err}")))??;
    print_summary(&exit, format)?;
    Ok(exit_code(&exit))
}

fn print_run_event(event: &RunEvent, format: EventFormat) -> Result<()> {
    if format == EventFormat::Json {
        return print_json(event);
    }
    match event {
        RunEvent::Started { path, pid, .. } => {
            info!(script = %path.display(), pid = pid.unwrap_or(0), "script started");
            Ok(())
        }
        RunEvent::Output(output) => print_output(output, format),
        RunEvent::IoFailure { message, .. } => {
            eprintln!("\n[{message}]");
            Ok(())
        }
        RunEvent::Finished { exit, .. } => print_summary(exit, format),
    }
}

fn print_output(event: &OutputEvent, format: EventFormat) -> Result<()> {
    if format == EventFormat::Json {
        return print_json(event);
    }
    match event.stream {
        StreamKind::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(&event.data)?;
            out.flush()?;
        }
        StreamKind::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(&event.data)?;
            err.flush()?;
        }
    }
    Ok(())
}

fn print_summary(exit: &RunExit, format: EventFormat) -> Result<()> {
    if format == EventFormat::Text {
        eprintln!(
            "\n[Execution finished in {:.2}s, {}]",
            exit.elapsed.as_secs_f64(),
            exit.describe()
        );
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| AppError::Io(format!("failed to serialise event: {err}")))?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

fn exit_code(exit: &RunExit) -> ExitCode {
    ExitCode::from(exit.process_exit_code())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
