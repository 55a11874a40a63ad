//! Process-wide tracing setup: console output plus a daily rolling log file.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,traymonitor_lib=debug";

const LOG_FILE_PREFIX: &str = "traymonitor";
const MAX_LOG_FILES: usize = 7;

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// `<data_local_dir>/traymonitor/logs`
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("traymonitor").join("logs"))
}

/// `RUST_LOG` if set and valid, otherwise [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn file_writer(log_dir: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    std::fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log directory: {e}"))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(|e| format!("Failed to open log file: {e}"))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber. File logging is skipped (with a console
/// warning) when `log_dir` is `None` or cannot be opened.
///
/// Errors if a global subscriber is already set.
pub fn init(log_dir: Option<&Path>) -> Result<LogGuard, String> {
    let (file_layer, guard, file_error) = match log_dir.map(file_writer) {
        Some(Ok((writer, guard))) => {
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    let console_layer = fmt::layer()
        .with_ansi(!cfg!(target_os = "windows"))
        .with_thread_names(true)
        .with_filter(env_filter());

    let registry = tracing_subscriber::registry().with(file_layer).with(console_layer);

    #[cfg(feature = "tokio-console")]
    let registry = registry.with(console_subscriber::spawn());

    registry.try_init().map_err(|e| format!("Failed to install tracing subscriber: {e}"))?;

    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {e}");
    }
    Ok(LogGuard { _file: guard })
}
