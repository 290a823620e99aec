//! Persisted tile storage.
//!
//! Workers talk to storage through the [`TileStorage`] trait only, so the
//! physical layout is a property of the backend:
//!
//! - [`DiskStorage`] - one PNG file per tile under a root directory
//! - [`MbTilesStorage`] - one SQLite file in the MBTiles layout
//! - [`MemoryStorage`] - an in-process map, for tests and throwaway runs
//!
//! Backends are shared by every worker of a thread pool and must accept
//! concurrent writes of distinct tiles.

mod disk;
mod mbtiles;
mod memory;

pub use disk::{tile_path, DiskStorage};
pub use mbtiles::MbTilesStorage;
pub use memory::MemoryStorage;

use crate::coord::TileCoord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O failure on a tile or directory path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SQLite failure on an MBTiles file
    #[error("Database error on {path}: {source}")]
    Database {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn database(path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        Self::Database {
            path: path.into(),
            source,
        }
    }
}

/// Storage backend for rendered tiles.
pub trait TileStorage: Send + Sync {
    /// Returns true if the tile has been stored.
    fn exists(&self, tile: TileCoord) -> bool;

    /// Returns true if the tile exists and was stored after `cutoff`.
    fn newer_than(&self, tile: TileCoord, cutoff: SystemTime) -> bool;

    /// Stores the encoded tile, replacing any previous version.
    fn store(&self, tile: TileCoord, data: &[u8]) -> Result<(), StorageError>;

    /// Marks the end of a metatile's batch of writes.
    fn commit(&self) -> Result<(), StorageError>;
}

/// Serializable storage selection, handed to child worker processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Tiles under `<root>/<z>/<x>/<y>.png`
    Disk { root: PathBuf },
    /// Tiles in one MBTiles file
    MbTiles { path: PathBuf },
    /// Tiles kept in memory for the life of the process
    Memory,
}

impl StorageConfig {
    /// Storage for an output `format` at `path`.
    ///
    /// An MBTiles path without an extension gets `.mbtiles`.
    pub fn for_output(format: OutputFormat, path: &Path) -> Self {
        match format {
            OutputFormat::Tiles => StorageConfig::Disk {
                root: path.to_path_buf(),
            },
            OutputFormat::MbTiles if path.extension().is_none() => StorageConfig::MbTiles {
                path: path.with_extension("mbtiles"),
            },
            OutputFormat::MbTiles => StorageConfig::MbTiles {
                path: path.to_path_buf(),
            },
        }
    }

    /// Opens the configured backend.
    pub fn open(&self) -> Result<Arc<dyn TileStorage>, StorageError> {
        match self {
            StorageConfig::Disk { root } => Ok(Arc::new(DiskStorage::new(root.clone())?)),
            StorageConfig::MbTiles { path } => Ok(Arc::new(MbTilesStorage::open(path.clone())?)),
            StorageConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
        }
    }
}

/// Persisted output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A `<z>/<x>/<y>.png` directory tree
    #[default]
    Tiles,
    /// A single MBTiles file
    MbTiles,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Tiles => write!(f, "tiles"),
            OutputFormat::MbTiles => write!(f, "mbtiles"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiles" => Ok(OutputFormat::Tiles),
            "mbtiles" => Ok(OutputFormat::MbTiles),
            _ => Err(format!(
                "unknown output format '{}' (expected tiles or mbtiles)",
                s
            )),
        }
    }
}
