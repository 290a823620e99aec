//! Settings structs for the configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::pool::ExecutionModel;
use crate::projection::GeoBounds;
use crate::storage::OutputFormat;
use crate::worker::{EmptyTilePolicy, TerminationMode};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Rendering and worker settings
    pub render: RenderSettings,
    /// Output settings
    pub output: OutputSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Named bounding boxes from `[bbox.<name>]` sections
    pub bboxes: BTreeMap<String, GeoBounds>,
}

/// Render configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Metatile side in tiles (power of two)
    pub metatile_size: u32,
    /// Number of workers
    pub threads: usize,
    /// Execution model for the workers
    pub parallel: ExecutionModel,
    /// Whether fully transparent tiles are stored
    pub empty: EmptyTilePolicy,
    /// What a worker reports for a skipped metatile
    pub termination: TerminationMode,
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    /// Tile tree root, or the MBTiles file
    pub directory: PathBuf,
    /// Persisted layout
    pub format: OutputFormat,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}

impl ConfigFile {
    /// Looks up a named bounding box.
    pub fn bbox(&self, name: &str) -> Option<GeoBounds> {
        self.bboxes.get(name).copied()
    }
}
