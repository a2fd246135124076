//! Payphone gateway daemon
//!
//! With no action the gateway runs in the foreground unless an instance is
//! already running. `start` launches a detached copy of this program, `stop`
//! asks the recorded instance to shut down, `status` reports it.

mod logging;
mod loopback;
mod pidfile;
mod settings;
mod signals;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use loopback::LoopbackSignaling;
use payphone_core::{PhoneController, SerialPortOpener};
use pidfile::PidFile;
use settings::Settings;
use signals::SignalWatcher;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How long `stop` waits for the old instance to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Delay before the loopback stack answers an outbound call
const LOOPBACK_ANSWER_DELAY: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "payphone")]
#[command(version, about = "Payphone to VoIP gateway")]
struct Cli {
    /// Service action; runs in the foreground when omitted
    #[arg(value_enum)]
    action: Option<ServiceAction>,

    /// Enable debug output to the console, overrides the config file
    #[arg(short, long)]
    debug: bool,

    /// Override the console log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[arg(short, long, value_name = "LEVEL")]
    log: Option<String>,

    /// Configuration file
    #[arg(short, long, default_value = "./PayPhone.toml")]
    config: PathBuf,

    /// PID file of the background instance
    #[arg(long, default_value = "./PayPhone.pid")]
    pid_file: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ServiceAction {
    /// Start as a background service
    Start,
    /// Stop the background service if running
    Stop,
    /// Restart the background service
    Restart,
    /// Report whether the service is running
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let pid_file = PidFile::new(&cli.pid_file);

    match cli.action {
        None => run_foreground(&cli, &pid_file).await,
        Some(ServiceAction::Start) => start_background(&cli, &pid_file),
        Some(ServiceAction::Stop) => stop_background(&pid_file).await,
        Some(ServiceAction::Restart) => {
            stop_background(&pid_file).await?;
            start_background(&cli, &pid_file)
        }
        Some(ServiceAction::Status) => {
            match pid_file.running_pid()? {
                Some(pid) => println!("payphone is running (PID {})", pid),
                None => println!("payphone is not running"),
            }
            Ok(())
        }
    }
}

async fn run_foreground(cli: &Cli, pid_file: &PidFile) -> Result<()> {
    let settings = Settings::load(&cli.config)?;
    let _log_guard = logging::init(&settings.debug, cli.debug, cli.log.as_deref())?;
    info!("Starting payphone gateway v{}", payphone_core::VERSION);

    let _pid_guard = pid_file
        .acquire()
        .with_context(|| format!("cannot start gateway with {}", pid_file.path().display()))?;

    let shutdown = CancellationToken::new();
    let signals = SignalWatcher::install(shutdown.clone())?;

    let signaling = Arc::new(LoopbackSignaling::new(LOOPBACK_ANSWER_DELAY));
    let opener = SerialPortOpener::from_config(
        &settings.serial,
        settings.controller.serial_read_timeout(),
    );
    let controller = PhoneController::new(
        settings.controller,
        settings.account,
        signaling.clone(),
        Arc::new(opener),
        shutdown,
    )?;
    signaling.set_event_handler(Arc::new(controller.notification_handler()));

    controller.run().await.context("payphone gateway stopped")?;

    if signals.terminated() {
        bail!("terminated by SIGHUP");
    }
    info!("Exiting");
    Ok(())
}

fn start_background(cli: &Cli, pid_file: &PidFile) -> Result<()> {
    if let Some(pid) = pid_file.running_pid()? {
        println!("payphone is already running (PID {})", pid);
        return Ok(());
    }

    let exe = std::env::current_exe().context("cannot locate the payphone executable")?;
    let mut command = Command::new(exe);
    command
        .arg("--config")
        .arg(&cli.config)
        .arg("--pid-file")
        .arg(&cli.pid_file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if cli.debug {
        command.arg("--debug");
    }
    if let Some(level) = &cli.log {
        command.arg("--log").arg(level);
    }
    // Own process group, so a terminal hangup does not reach the service
    std::os::unix::process::CommandExt::process_group(&mut command, 0);

    let child = command.spawn().context("failed to start background service")?;
    println!("payphone started (PID {})", child.id());
    Ok(())
}

async fn stop_background(pid_file: &PidFile) -> Result<()> {
    let Some(pid) = pid_file.running_pid()? else {
        println!("payphone is not running");
        return Ok(());
    };

    pidfile::terminate(pid)?;
    debug!("Sent SIGTERM to {}", pid);

    let deadline = tokio::time::Instant::now() + STOP_TIMEOUT;
    while pidfile::is_running(pid) {
        if tokio::time::Instant::now() >= deadline {
            bail!("payphone (PID {}) did not stop within {:?}", pid, STOP_TIMEOUT);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("payphone stopped (PID {})", pid);
    Ok(())
}
