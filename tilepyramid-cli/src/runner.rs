//! CLI runner for common setup.
//!
//! Encapsulates config loading and logging initialization so command
//! handlers start from the same state.

use crate::error::CliError;
use tilepyramid::config::ConfigFile;
use tilepyramid::logging::{init_logging, Console, LoggingGuard, LoggingOptions};
use tracing::info;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Load config and initialize logging to the configured file and stdout.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging unless RUST_LOG is set
    pub fn with_debug(debug_mode: bool) -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = ConfigFile::load()?;

        let logging_guard = init_logging(&LoggingOptions {
            file: Some(config.logging.file.clone()),
            debug: debug_mode,
            console: Console::Stdout,
        })
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("TilePyramid v{}", tilepyramid::VERSION);
        info!("TilePyramid CLI: {} command", command);
    }
}
