//! Console and file logging setup
//!
//! The console only shows warnings and errors unless debugging is enabled on
//! the command line or in `[Debug]`. File logging is independent and has its
//! own level.

use crate::settings::DebugSettings;
use anyhow::{anyhow, bail, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Parse a level name, accepting the `WARNING` and `CRITICAL` spellings
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::TRACE),
        "DEBUG" => Ok(LevelFilter::DEBUG),
        "INFO" => Ok(LevelFilter::INFO),
        "WARN" | "WARNING" => Ok(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::ERROR),
        "OFF" => Ok(LevelFilter::OFF),
        _ => bail!("invalid log level: {}", name),
    }
}

/// Console level from the command line and the `[Debug]` section
pub fn console_level(
    debug: &DebugSettings,
    cli_debug: bool,
    cli_level: Option<&str>,
) -> Result<LevelFilter> {
    if !(cli_debug || debug.console_debug) {
        return Ok(LevelFilter::WARN);
    }
    parse_level(cli_level.unwrap_or(&debug.console_level))
}

fn gateway_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::new(format!("warn,payphone={level},payphone_core={level}"))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer and must be kept alive for
/// the lifetime of the process.
pub fn init(
    debug: &DebugSettings,
    cli_debug: bool,
    cli_level: Option<&str>,
) -> Result<Option<WorkerGuard>> {
    let level = console_level(debug, cli_debug, cli_level)?;
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| gateway_filter(level));
    let console = fmt::layer().with_target(true).with_filter(console_filter);

    let (file, guard) = if debug.file_debug {
        let file_level = parse_level(&debug.file_level)?;
        let path = Path::new(&debug.log_file);
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("invalid log file name: {}", debug.log_file))?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_filter(gateway_filter(file_level));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))?;

    if debug.file_debug {
        let log_file = &debug.log_file;
        tracing::info!("File logging started: {}", log_file);
    }
    Ok(guard)
}
