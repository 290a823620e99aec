//! Logging infrastructure.
//!
//! Provides structured logging with file output and console output:
//! - Writes to the configured log file (cleared on session start)
//! - Also prints to stdout, or to stderr for child workers whose stdout
//!   carries the worker protocol
//! - Configurable via RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Where console output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Console {
    #[default]
    Stdout,
    Stderr,
}

/// Logging setup for one process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoggingOptions {
    /// Log file, cleared on start; `None` logs to the console only
    pub file: Option<PathBuf>,
    /// Lower the default level from info to debug
    pub debug: bool,
    pub console: Console,
}

impl LoggingOptions {
    /// Filter used when RUST_LOG is not set.
    pub fn default_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize logging system.
///
/// Creates the log directory if needed, clears the previous log file and
/// installs the global subscriber.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or the log file
/// cannot be cleared
pub fn init_logging(options: &LoggingOptions) -> Result<LoggingGuard, io::Error> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_filter()));

    let (file_layer, file_guard) = match &options.file {
        Some(path) => {
            let (dir, name) = prepare_log_file(path)?;
            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (stdout_layer, stderr_layer) = match options.console {
        Console::Stdout => (
            Some(tracing_subscriber::fmt::layer().with_writer(io::stdout)),
            None,
        ),
        Console::Stderr => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(false),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Creates the parent directory and truncates the file.
///
/// Returns the directory and file name for the appender.
fn prepare_log_file(path: &Path) -> Result<(PathBuf, PathBuf), io::Error> {
    let (dir, name) = split_log_path(path)?;
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(&name), "")?;
    Ok((dir, name))
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), io::Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?;
    Ok((dir, name))
}
