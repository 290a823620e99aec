//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;
use tilepyramid::config::ConfigFileError;
use tilepyramid::generator::GenerateError;
use tilepyramid::scheduler::SchedulerError;
use tilepyramid::worker::WorkerError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to read or write the config file
    ConfigFile(ConfigFileError),
    /// Generator run failed
    Generate(GenerateError),
    /// Child worker failed
    Worker(WorkerError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Generate(GenerateError::Interrupted(_)) => {
                eprintln!();
                eprintln!("Tiles stored so far were kept.");
                eprintln!("Rerun with --skip-existing to continue where the run stopped.");
            }
            CliError::Generate(GenerateError::Scheduler(SchedulerError::Stalled { .. })) => {
                eprintln!();
                eprintln!("In strict mode a skipped metatile never reports back.");
                eprintln!("Use --termination lenient together with --skip-existing or --skip-newer.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Generate(e) => write!(f, "{}", e),
            CliError::Worker(e) => write!(f, "Worker failed: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Generate(e) => Some(e),
            CliError::Worker(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<GenerateError> for CliError {
    fn from(e: GenerateError) -> Self {
        CliError::Generate(e)
    }
}
