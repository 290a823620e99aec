//! TilePyramid - quad-tree map tile pyramid generation
//!
//! This library renders the tiles of a slippy map from a minimum zoom down
//! to a maximum zoom, one metatile at a time, and skips every branch of the
//! quad-tree whose parent area turned out to be empty.
//!
//! # High-Level API
//!
//! For most use cases, the [`generator`] module provides a simplified facade:
//!
//! ```ignore
//! use tilepyramid::generator::{GenerateConfig, PyramidGenerator, Target};
//! use tilepyramid::storage::StorageConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = GenerateConfig {
//!     target: Target::BoundingBox { bounds: "5.5,43.5,16.5,48.5".parse()?, min_zoom: 4 },
//!     max_zoom: 12,
//!     storage: StorageConfig::Disk { root: "tiles".into() },
//!     ..GenerateConfig::default()
//! };
//! let summary = PyramidGenerator::new(config).run(CancellationToken::new())?;
//! ```
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────┐  WorkOrder   ┌──────────┐
//!  seed ──────►│  Scheduler   │─────────────►│ Worker×N │──► Renderer
//!              │ (WorkTracker)│◄─────────────│          │──► TileStorage
//!              └──────────────┘ WorkerReport └──────────┘
//! ```

pub mod config;
pub mod coord;
pub mod generator;
pub mod logging;
pub mod pool;
pub mod projection;
pub mod render;
pub mod scheduler;
pub mod storage;
pub mod tracker;
pub mod worker;

/// Version of the TilePyramid library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
