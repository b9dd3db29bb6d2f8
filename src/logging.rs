//! Tracing subscriber setup.
//!
//! Every engine event carries `rule` and `path` fields. Successful actions
//! and lifecycle changes log at `info`, reported failures at `warn`, and the
//! failures the engine swallows (vanished sources, best-effort deletes, failed
//! sweeps) at `debug`, so `--verbose` is what surfaces them.
//!
//! The console always gets human-readable output on stderr. With a log
//! directory, a daily-rotated JSON file is written as well, with event fields
//! flattened to the top level so `rule` and `path` can be filtered directly.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Base name of the rotated log file inside the log directory.
pub const LOG_FILE_NAME: &str = "filemover.log";

/// Filter used when `RUST_LOG` is unset. The platform watcher is noisy at
/// `debug`, so it stays at `warn` either way.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "info,filemover=debug,notify=warn"
    } else {
        "info,notify=warn"
    }
}

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides [`default_directives`]. When `log_dir` is given the
/// directory is created and JSON logs are written to
/// `{log_dir}/filemover.log.YYYY-MM-DD`; the returned guard must then be kept
/// alive for log flushing.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> anyhow::Result<Option<LoggingGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                anyhow::anyhow!("failed to create logs directory {}: {e}", dir.display())
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(writer);
            (Some(layer), Some(LoggingGuard { _guard: guard }))
        }
        None => (None, None),
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(guard)
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}
