//! Tile workers.
//!
//! A [`Worker`] turns one [`WorkOrder::Render`] into stored tiles and the
//! reports that drive the scheduler:
//!
//! 1. **Skip check** - if a [`SkipPolicy`] is set and every tile of the
//!    metatile passes it, nothing is rendered. In [`TerminationMode::Strict`]
//!    no report is produced at all; in [`TerminationMode::Lenient`] a single
//!    [`WorkerReport::Skipped`] is.
//! 2. **Render** - the metatile image comes from a [`Renderer`], or, in a dry
//!    run, a random sleep stands in for the work.
//! 3. **Slice and store** - non-empty tiles are PNG-encoded and stored; the
//!    backend is committed once per metatile.
//! 4. **Verdicts** - exactly four [`WorkerReport::Verdict`]s, one per child,
//!    regardless of zoom. The scheduler discards those it does not need.
//!
//! Workers are execution-model agnostic: pools call [`Worker::process`]
//! from threads, child processes (see [`serve_stdio`]) or a task on the
//! scheduler's own runtime.

mod content;
mod slice;
mod stdio;

pub use stdio::{serve_stdio, WorkerFrame, WorkerSpec, WorkerSpecMode};

use crate::coord::{CoordError, TileCoord};
use crate::render::{MetatileRequest, RenderError, Renderer, RendererFactory};
use crate::scheduler::{WorkOrder, WorkerReport};
use crate::storage::{StorageError, TileStorage};
use content::ContentMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Worker errors.
///
/// Per-tile failures (rendering, storage) are logged and never surface
/// here; these errors prevent a worker from running at all.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to create renderer: {0}")]
    Renderer(#[from] RenderError),

    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed worker message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Worker input ended before the worker spec")]
    MissingSpec,

    #[error("Invalid worker spec: {0}")]
    Coord(#[from] CoordError),
}

/// When to leave an already rendered metatile alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkipPolicy {
    /// Always render
    #[default]
    Never,
    /// Skip if every tile already exists
    Existing,
    /// Skip if every tile was stored after the cutoff
    NewerThan(SystemTime),
}

impl SkipPolicy {
    /// Returns true if the policy never skips.
    pub fn is_never(&self) -> bool {
        matches!(self, SkipPolicy::Never)
    }
}

/// What to do with sliced tiles that have no content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmptyTilePolicy {
    /// Leave empty tiles out of storage
    #[default]
    Skip,
    /// Store empty tiles too
    Render,
}

impl fmt::Display for EmptyTilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyTilePolicy::Skip => write!(f, "skip"),
            EmptyTilePolicy::Render => write!(f, "render"),
        }
    }
}

impl FromStr for EmptyTilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(EmptyTilePolicy::Skip),
            "render" => Ok(EmptyTilePolicy::Render),
            _ => Err(format!("unknown empty tile policy '{}' (expected skip or render)", s)),
        }
    }
}

/// How a skipped metatile is reported.
///
/// `Strict` reports nothing, so the scheduler keeps waiting for the four
/// verdicts a rendered metatile would have produced; only a stall timeout
/// ends such a run. `Lenient` sends a skip notice so the scheduler can
/// release the metatile's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TerminationMode {
    Strict,
    #[default]
    Lenient,
}

impl fmt::Display for TerminationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationMode::Strict => write!(f, "strict"),
            TerminationMode::Lenient => write!(f, "lenient"),
        }
    }
}

impl FromStr for TerminationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(TerminationMode::Strict),
            "lenient" => Ok(TerminationMode::Lenient),
            _ => Err(format!("unknown termination mode '{}' (expected strict or lenient)", s)),
        }
    }
}

/// Worker settings shared by every worker of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub metatile_size: u32,
    pub skip: SkipPolicy,
    pub empty: EmptyTilePolicy,
    pub termination: TerminationMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            metatile_size: 8,
            skip: SkipPolicy::Never,
            empty: EmptyTilePolicy::Skip,
            termination: TerminationMode::Lenient,
        }
    }
}

/// Simulated rendering: sleep, then flip a coin per child.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DryRun {
    /// Upper bound of the random sleep per metatile
    pub max_delay: Duration,
    /// Probability that a child is reported as having content
    pub render_probability: f64,
}

impl Default for DryRun {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(3),
            render_probability: 0.75,
        }
    }
}

/// Where a worker's pixels come from.
pub enum WorkerMode {
    Render(Box<dyn Renderer>),
    Simulate(DryRun),
}

impl fmt::Debug for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMode::Render(_) => f.write_str("Render(..)"),
            WorkerMode::Simulate(dry_run) => f.debug_tuple("Simulate").field(dry_run).finish(),
        }
    }
}

/// Renderer source used to build workers in-process.
#[derive(Clone)]
pub enum RenderSource {
    Renderer(Arc<dyn RendererFactory>),
    DryRun(DryRun),
}

/// Builds identical workers for a pool.
#[derive(Clone)]
pub struct WorkerFactory {
    pub config: WorkerConfig,
    pub source: RenderSource,
    pub storage: Arc<dyn TileStorage>,
}

impl WorkerFactory {
    pub fn new(config: WorkerConfig, source: RenderSource, storage: Arc<dyn TileStorage>) -> Self {
        Self {
            config,
            source,
            storage,
        }
    }

    /// Builds one worker, with its own renderer.
    pub fn build(&self) -> Result<Worker, WorkerError> {
        let mode = match &self.source {
            RenderSource::Renderer(factory) => WorkerMode::Render(factory.create()?),
            RenderSource::DryRun(dry_run) => WorkerMode::Simulate(*dry_run),
        };
        Ok(Worker::new(self.config.clone(), mode, self.storage.clone()))
    }
}

/// Renders metatiles and reports child verdicts.
pub struct Worker {
    config: WorkerConfig,
    mode: WorkerMode,
    storage: Arc<dyn TileStorage>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(config: WorkerConfig, mode: WorkerMode, storage: Arc<dyn TileStorage>) -> Self {
        Self {
            config,
            mode,
            storage,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handles one metatile and returns the reports to send, in order.
    pub fn process(&mut self, tile: TileCoord) -> Vec<WorkerReport> {
        if let Some(reason) = self.skip_reason(tile) {
            info!(%tile, reason, "skipping metatile");
            return match self.config.termination {
                TerminationMode::Strict => Vec::new(),
                TerminationMode::Lenient => vec![WorkerReport::Skipped { tile }],
            };
        }

        let metatile_size = self.config.metatile_size;
        let reports = match &mut self.mode {
            WorkerMode::Render(renderer) => {
                render_metatile(renderer.as_mut(), self.storage.as_ref(), &self.config, tile)
                    .verdicts()
            }
            WorkerMode::Simulate(dry_run) => simulate_metatile(dry_run, tile, metatile_size),
        };

        debug!(%tile, ?reports, "metatile done");
        reports
    }

    /// Runs a worker loop over blocking channel operations.
    ///
    /// Returns when a `Stop` order arrives or the order channel closes.
    /// Reports that cannot be delivered because the scheduler is gone are
    /// dropped so the worker still reaches its `Stop`.
    pub fn run_blocking(
        &mut self,
        mut next_order: impl FnMut() -> Option<WorkOrder>,
        reports: &tokio::sync::mpsc::Sender<WorkerReport>,
    ) {
        while let Some(WorkOrder::Render(tile)) = next_order() {
            for report in self.process(tile) {
                if reports.blocking_send(report).is_err() {
                    debug!(%tile, "scheduler gone, report dropped");
                }
            }
        }
        debug!("worker loop ended");
    }

    fn skip_reason(&self, tile: TileCoord) -> Option<&'static str> {
        let storage = self.storage.as_ref();
        let mut footprint = tile.footprint(self.config.metatile_size);

        match self.config.skip {
            SkipPolicy::Never => None,
            SkipPolicy::Existing => footprint
                .all(|single| storage.exists(single))
                .then_some("present"),
            SkipPolicy::NewerThan(cutoff) => footprint
                .all(|single| storage.newer_than(single, cutoff))
                .then_some("too new"),
        }
    }
}

/// Renders, slices and stores one metatile, returning its content map.
fn render_metatile(
    renderer: &mut dyn Renderer,
    storage: &dyn TileStorage,
    config: &WorkerConfig,
    tile: TileCoord,
) -> ContentMap {
    let request = MetatileRequest::new(tile, config.metatile_size);
    let mut content = ContentMap::new(tile, config.metatile_size);

    let start = Instant::now();
    let image = match renderer.render(&request) {
        Ok(image) if image.width() == request.image_size && image.height() == request.image_size => {
            image
        }
        Ok(image) => {
            let err = RenderError::WrongSize {
                width: image.width(),
                height: image.height(),
                expected: request.image_size,
            };
            warn!(%tile, error = %err, "render failed");
            return content;
        }
        Err(err) => {
            warn!(%tile, error = %err, "render failed");
            return content;
        }
    };
    let rendered = Instant::now();

    let span = content.span();
    for i in 0..span {
        for j in 0..span {
            let single = TileCoord::new(tile.zoom, tile.x + i, tile.y + j);
            let view = slice::tile_view(&image, i, j);
            let empty = slice::is_empty(&view);

            if empty {
                debug!(tile = %single, "empty");
                if config.empty == EmptyTilePolicy::Skip {
                    continue;
                }
            } else {
                content.mark(i, j);
            }

            match slice::encode_png(view) {
                Ok(bytes) => {
                    if let Err(err) = storage.store(single, &bytes) {
                        error!(tile = %single, error = %err, "failed to store tile");
                    }
                }
                Err(err) => error!(tile = %single, error = %err, "failed to encode tile"),
            }
        }
    }

    if let Err(err) = storage.commit() {
        error!(%tile, error = %err, "failed to commit metatile");
    }

    info!(
        %tile,
        render_secs = (rendered - start).as_secs_f64(),
        store_secs = rendered.elapsed().as_secs_f64(),
        "metatile rendered"
    );
    content
}

/// Sleeps for a random time, then reports random verdicts for the children
/// that exist.
fn simulate_metatile(dry_run: &DryRun, tile: TileCoord, metatile_size: u32) -> Vec<WorkerReport> {
    let mut rng = rand::rng();

    let max_ms = u64::try_from(dry_run.max_delay.as_millis()).unwrap_or(u64::MAX);
    let delay = Duration::from_millis(rng.random_range(0..=max_ms));
    std::thread::sleep(delay);

    let probability = dry_run.render_probability.clamp(0.0, 1.0);
    let reports = ContentMap::new(tile, metatile_size).verdicts_with(|| rng.random_bool(probability));

    info!(%tile, delay_ms = delay.as_millis() as u64, "metatile simulated");
    reports
}

#[cfg(test)]
mod tests;
