use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the daily log files.
pub const LOG_PREFIX: &str = "config-log";

/// Build the level filter.
///
/// `RUST_LOG` wins when set; otherwise debug mode selects `debug`, else `info`.
pub fn build_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Setup logging with a daily rotating file appender.
///
/// Text-destination lines (target `config_log`) end up in these files along
/// with the application's own diagnostics.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(log_dir: &Utf8Path, debug_mode: bool) -> Result<WorkerGuard> {
    setup_logging_with_console(log_dir, debug_mode, false)
}

/// Setup logging with optional console output on stderr.
///
/// Stdout is left to command output.
///
/// # Arguments
/// * `log_dir` - Directory for log files
/// * `debug_mode` - If true, use debug level; otherwise use info level
/// * `console_output` - If true, also log to stderr
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging_with_console(
    log_dir: &Utf8Path,
    debug_mode: bool,
    console_output: bool,
) -> Result<WorkerGuard> {
    ensure_log_dir(log_dir)?;

    let file_appender = rolling::daily(log_dir.as_std_path(), LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(build_filter(debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, debug={}, console={}",
        log_dir,
        debug_mode,
        console_output
    );

    Ok(guard)
}
