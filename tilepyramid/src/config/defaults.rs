//! Default values for every configuration setting.
//!
//! Holds the `DEFAULT_*` constants, the CPU-aware worker count and the
//! `ConfigFile::default()` implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::pool::ExecutionModel;
use crate::storage::OutputFormat;
use crate::worker::{EmptyTilePolicy, TerminationMode};

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default metatile side in tiles.
pub const DEFAULT_METATILE_SIZE: u32 = 8;

/// Default lowest zoom of a bounding box run.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Default deepest zoom of a run.
pub const DEFAULT_MAX_ZOOM: u8 = 18;

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "tiles";

/// Default log file name inside the config directory.
pub const DEFAULT_LOG_FILE: &str = "tilepyramid.log";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            render: RenderSettings {
                metatile_size: DEFAULT_METATILE_SIZE,
                threads: num_cpus(),
                parallel: ExecutionModel::default(),
                empty: EmptyTilePolicy::default(),
                termination: TerminationMode::default(),
            },
            output: OutputSettings {
                directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
                format: OutputFormat::default(),
            },
            logging: LoggingSettings {
                file: config_directory().join(DEFAULT_LOG_FILE),
            },
            bboxes: BTreeMap::new(),
        }
    }
}
