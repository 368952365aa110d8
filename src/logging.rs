//! Logging setup for the command line tool.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the binary, which calls [`init`] once at startup.

use crate::config::LoggingConfig;
use crate::error::{EngineError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` when set, the configured directive otherwise.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter)
        .map_err(|e| EngineError::Config(format!("invalid log filter `{}`: {}", config.filter, e)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file when dropped; keep it alive for the
/// lifetime of the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = filter(config)?;
    let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(config.ansi);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| EngineError::Config(format!("failed to install logger: {e}")))?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .ok_or_else(|| EngineError::Config(format!("log file `{}` has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Ok((dir, name))
}
