//! Logging setup and log-line conventions.
//!
//! Chain-level events carry a `marker` field: [`marker::MSG`] for progress
//! and [`marker::ERR`] for failures. `tracing` has no fatal level, so fatal
//! events are errors tagged `severity = "fatal"` via [`fatal!`](crate::fatal).

use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod marker {
    /// Progress messages.
    pub const MSG: &str = "msg";
    /// Failures.
    pub const ERR: &str = "err";
}

/// Emit an error event tagged with fatal severity.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        ::tracing::error!(severity = "fatal", $($arg)+)
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. When `log_file` is given, events
/// are also appended to it without ANSI colors; keep the returned guard alive
/// until exit so buffered lines are flushed.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> LoadchainResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoadchainError::Config(format!("invalid log level {:?}: {}", level, e)))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path.file_name().ok_or_else(|| {
                LoadchainError::Config(format!("log file path has no file name: {}", path.display()))
            })?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoadchainError::Internal(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}
