//! Worker command - child process side of the process pool.
//!
//! Reads the worker spec and orders from stdin and writes report frames to
//! stdout, so all logging goes to stderr. Ctrl-C is ignored: the parent
//! stops its children with the stop order.

use std::io;
use tilepyramid::logging::{init_logging, Console, LoggingOptions};
use tilepyramid::worker::serve_stdio;
use tracing::debug;

use crate::error::CliError;

/// Run the worker command.
pub fn run(debug: bool) -> Result<(), CliError> {
    let _logging_guard = init_logging(&LoggingOptions {
        file: None,
        debug,
        console: Console::Stderr,
    })
    .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    ctrlc::set_handler(|| {})
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    debug!(pid = std::process::id(), "worker process ready");
    serve_stdio(io::stdin().lock(), io::stdout().lock()).map_err(CliError::Worker)
}
