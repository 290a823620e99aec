//! User configuration.
//!
//! Settings come from `~/.tilepyramid/config.ini` when it exists and fall
//! back to built-in defaults otherwise. Command line flags override both.
//!
//! # Example
//!
//! ```
//! use tilepyramid::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.render.metatile_size, 8);
//! assert!(config.bbox("alps").is_none());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    num_cpus, DEFAULT_LOG_FILE, DEFAULT_MAX_ZOOM, DEFAULT_METATILE_SIZE, DEFAULT_MIN_ZOOM,
    DEFAULT_OUTPUT_DIR,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, LoggingSettings, OutputSettings, RenderSettings};
