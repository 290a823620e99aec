//! Run orchestration.
//!
//! [`PyramidGenerator`] turns a [`GenerateConfig`] into one complete run:
//! it validates the settings, opens the tile store, starts the worker pool
//! for the chosen [`ExecutionModel`], drives the [`Scheduler`] on a
//! current-thread runtime and always stops the pool before returning.
//!
//! ```text
//!  GenerateConfig ──► validate ──► open storage ──► runtime
//!                                                     │
//!                    channel(N) ──► pool.start ◄──────┘
//!                         │
//!                    seed / tile list ──► scheduler.run ──► pool.shutdown
//! ```

use crate::config::num_cpus;
use crate::coord::{validate_metatile_size, CoordError, TileCoord, MAX_ZOOM};
use crate::pool::{
    ExecutionModel, InlineRunner, PoolError, SpawnPool, ThreadPool, WorkerCommand, WorkerPool,
};
use crate::projection::GeoBounds;
use crate::render::{RendererConfig, RendererFactory};
use crate::scheduler::{
    channel, RunStats, Scheduler, SchedulerError, SchedulerLink, WorkerLink,
};
use crate::storage::{StorageConfig, StorageError, TileStorage};
use crate::worker::{
    DryRun, EmptyTilePolicy, RenderSource, SkipPolicy, TerminationMode, WorkerConfig,
    WorkerFactory, WorkerSpec, WorkerSpecMode,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors from a generator run.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Settings are inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A coordinate or metatile size is invalid
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// The tile store could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Workers could not be started or stopped cleanly
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// The scheduler aborted the run
    #[error("Scheduler error: {0}")]
    Scheduler(SchedulerError),

    /// The run was cancelled; tiles stored so far remain
    #[error(
        "Run interrupted after {} metatiles ({} verdicts received)",
        .0.dispatched,
        .0.verdicts_received
    )]
    Interrupted(RunStats),

    /// The async runtime could not be built
    #[error("Failed to start runtime: {0}")]
    Runtime(std::io::Error),
}

/// What to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Descend from the metatiles covering `bounds` at `min_zoom`
    BoundingBox { bounds: GeoBounds, min_zoom: u8 },
    /// Render exactly these metatiles, no descent
    Tiles(Vec<TileCoord>),
}

impl Default for Target {
    fn default() -> Self {
        Target::BoundingBox {
            bounds: GeoBounds::world(),
            min_zoom: 0,
        }
    }
}

/// Settings of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateConfig {
    pub target: Target,
    pub max_zoom: u8,
    pub metatile_size: u32,
    pub workers: usize,
    pub execution: ExecutionModel,
    pub skip: SkipPolicy,
    pub empty: EmptyTilePolicy,
    pub termination: TerminationMode,
    /// Abort when no report arrives for this long
    pub stall_timeout: Option<Duration>,
    pub storage: StorageConfig,
    pub renderer: RendererConfig,
    /// Simulate rendering instead of calling the renderer
    pub dry_run: Option<DryRun>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            target: Target::default(),
            max_zoom: 18,
            metatile_size: 8,
            workers: num_cpus(),
            execution: ExecutionModel::default(),
            skip: SkipPolicy::default(),
            empty: EmptyTilePolicy::default(),
            termination: TerminationMode::default(),
            stall_timeout: None,
            storage: StorageConfig::Memory,
            renderer: RendererConfig::coverage(vec![GeoBounds::world()]),
            dry_run: None,
        }
    }
}

impl GenerateConfig {
    /// Settings every worker of the run shares.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            metatile_size: self.metatile_size,
            skip: self.skip,
            empty: self.empty,
            termination: self.termination,
        }
    }

    /// Checks the settings before anything is started.
    pub fn validate(&self) -> Result<(), GenerateError> {
        validate_metatile_size(self.metatile_size)?;

        if self.max_zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(self.max_zoom).into());
        }
        match &self.target {
            Target::BoundingBox { min_zoom, .. } if *min_zoom > self.max_zoom => {
                return Err(GenerateError::Config(format!(
                    "minimum zoom {} is above maximum zoom {}",
                    min_zoom, self.max_zoom
                )));
            }
            Target::Tiles(tiles) => {
                for tile in tiles {
                    TileCoord::try_new(tile.zoom, tile.x, tile.y)?;
                }
            }
            Target::BoundingBox { .. } => {}
        }
        if self.workers == 0 {
            return Err(GenerateError::Config(
                "at least one worker is required".to_string(),
            ));
        }
        if let Some(dry_run) = &self.dry_run {
            if !(0.0..=1.0).contains(&dry_run.render_probability) {
                return Err(GenerateError::Config(format!(
                    "dry run probability {} is outside 0..=1",
                    dry_run.render_probability
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub stats: RunStats,
    pub elapsed: Duration,
}

/// Generates a tile pyramid.
pub struct PyramidGenerator {
    config: GenerateConfig,
    renderer: Option<Arc<dyn RendererFactory>>,
    storage: Option<Arc<dyn TileStorage>>,
    command: Option<WorkerCommand>,
}

impl PyramidGenerator {
    pub fn new(config: GenerateConfig) -> Self {
        Self {
            config,
            renderer: None,
            storage: None,
            command: None,
        }
    }

    /// Uses `factory` instead of the configured renderer.
    ///
    /// Only in-process execution models can use a custom factory.
    pub fn with_renderer_factory(mut self, factory: Arc<dyn RendererFactory>) -> Self {
        self.renderer = Some(factory);
        self
    }

    /// Uses an already opened store instead of the configured one.
    pub fn with_storage(mut self, storage: Arc<dyn TileStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Command that starts a child worker, required for process pools.
    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.command = Some(command);
        self
    }

    pub fn config(&self) -> &GenerateConfig {
        &self.config
    }

    /// Runs to completion or until `cancel` fires.
    ///
    /// Blocks the calling thread; the scheduler runs on its own
    /// current-thread runtime.
    pub fn run(&self, cancel: CancellationToken) -> Result<RunSummary, GenerateError> {
        self.config.validate()?;
        self.validate_execution()?;

        let storage = match &self.storage {
            Some(storage) => Arc::clone(storage),
            None => self.config.storage.open()?,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(GenerateError::Runtime)?;

        let started = Instant::now();
        info!(
            max_zoom = self.config.max_zoom,
            metatile_size = self.config.metatile_size,
            workers = self.effective_workers(),
            execution = %self.config.execution,
            "starting tile pyramid run"
        );

        let stats = runtime.block_on(self.execute(storage, cancel))?;
        let elapsed = started.elapsed();

        info!(
            dispatched = stats.dispatched,
            verdicts = stats.verdicts_received,
            skipped = stats.skipped,
            elapsed_secs = elapsed.as_secs_f64(),
            "tile pyramid run complete"
        );
        Ok(RunSummary { stats, elapsed })
    }

    fn effective_workers(&self) -> usize {
        self.config.execution.effective_workers(self.config.workers)
    }

    fn validate_execution(&self) -> Result<(), GenerateError> {
        if self.config.execution != ExecutionModel::Processes {
            return Ok(());
        }
        if self.command.is_none() {
            return Err(GenerateError::Config(
                "process workers need a worker command".to_string(),
            ));
        }
        if self.renderer.is_some() || self.storage.is_some() {
            return Err(GenerateError::Config(
                "custom renderers and stores cannot cross a process boundary".to_string(),
            ));
        }
        if self.config.storage == StorageConfig::Memory {
            warn!("memory storage with process workers keeps tiles in each child only");
        }
        Ok(())
    }

    async fn execute(
        &self,
        storage: Arc<dyn TileStorage>,
        cancel: CancellationToken,
    ) -> Result<RunStats, GenerateError> {
        let workers = self.effective_workers();
        let (mut link, worker_link) = channel(workers);
        let pool = self.start_pool(workers, storage, worker_link)?;

        let outcome = self.schedule(&mut link, &cancel).await;
        let shutdown = pool.shutdown(link).await;

        match outcome {
            Ok(stats) => {
                shutdown?;
                Ok(stats)
            }
            Err((SchedulerError::Cancelled, stats)) => {
                if let Err(err) = shutdown {
                    warn!(error = %err, "worker pool did not stop cleanly");
                }
                Err(GenerateError::Interrupted(stats))
            }
            Err((SchedulerError::WorkerFailed, _)) => Err(match shutdown {
                Err(pool_err) => GenerateError::Pool(pool_err),
                Ok(()) => GenerateError::Scheduler(SchedulerError::WorkerFailed),
            }),
            Err((err, _)) => {
                if let Err(pool_err) = shutdown {
                    warn!(error = %pool_err, "worker pool did not stop cleanly");
                }
                Err(GenerateError::Scheduler(err))
            }
        }
    }

    fn start_pool(
        &self,
        workers: usize,
        storage: Arc<dyn TileStorage>,
        link: WorkerLink,
    ) -> Result<Box<dyn WorkerPool>, GenerateError> {
        let config = self.config.worker_config();

        let pool: Box<dyn WorkerPool> = match self.config.execution {
            ExecutionModel::Processes => {
                let command = self.command.as_ref().ok_or_else(|| {
                    GenerateError::Config("process workers need a worker command".to_string())
                })?;
                let spec = WorkerSpec {
                    config,
                    mode: match self.config.dry_run {
                        Some(dry_run) => WorkerSpecMode::DryRun(dry_run),
                        None => WorkerSpecMode::Render(self.config.renderer.clone()),
                    },
                    storage: self.config.storage.clone(),
                };
                Box::new(SpawnPool::start(workers, command, &spec, link)?)
            }
            ExecutionModel::Threads => {
                Box::new(ThreadPool::start(workers, &self.factory(config, storage), link)?)
            }
            ExecutionModel::Single => {
                Box::new(InlineRunner::start(&self.factory(config, storage), link)?)
            }
        };
        Ok(pool)
    }

    fn factory(&self, config: WorkerConfig, storage: Arc<dyn TileStorage>) -> WorkerFactory {
        let source = match (self.config.dry_run, &self.renderer) {
            (Some(dry_run), _) => RenderSource::DryRun(dry_run),
            (None, Some(factory)) => RenderSource::Renderer(Arc::clone(factory)),
            (None, None) => RenderSource::Renderer(Arc::new(self.config.renderer.clone())),
        };
        WorkerFactory::new(config, source, storage)
    }

    /// Runs the scheduler, returning its counters alongside any error.
    async fn schedule(
        &self,
        link: &mut SchedulerLink,
        cancel: &CancellationToken,
    ) -> Result<RunStats, (SchedulerError, RunStats)> {
        let m = self.config.metatile_size;

        let (mut scheduler, tiles) = match &self.config.target {
            Target::BoundingBox { bounds, min_zoom } => {
                let mut scheduler = Scheduler::new(self.config.max_zoom, m)
                    .with_stall_timeout(self.config.stall_timeout);
                if let Err(err) = scheduler.seed(bounds, *min_zoom) {
                    return Err((err, scheduler.stats()));
                }
                (scheduler, None)
            }
            Target::Tiles(tiles) => {
                let tiles = align_tiles(tiles, m);
                let max_zoom = tiles.iter().map(|t| t.zoom).max().unwrap_or(0);
                let scheduler =
                    Scheduler::new(max_zoom, m).with_stall_timeout(self.config.stall_timeout);
                (scheduler, Some(tiles))
            }
        };

        let result = match tiles {
            Some(tiles) => scheduler.run_tiles(tiles, link, cancel).await,
            None => scheduler.run(link, cancel).await,
        };
        result.map_err(|err| (err, scheduler.stats()))
    }
}

/// Snaps tiles to the metatile grid and drops duplicates.
///
/// Order of first appearance is kept.
pub fn align_tiles(tiles: &[TileCoord], metatile_size: u32) -> Vec<TileCoord> {
    let mut seen = BTreeSet::new();
    tiles
        .iter()
        .map(|t| {
            TileCoord::new(
                t.zoom,
                t.x - t.x % metatile_size,
                t.y - t.y % metatile_size,
            )
        })
        .filter(|t| seen.insert(*t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn config(execution: ExecutionModel) -> GenerateConfig {
        GenerateConfig {
            max_zoom: 2,
            metatile_size: 1,
            workers: 2,
            execution,
            ..GenerateConfig::default()
        }
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut bad = config(ExecutionModel::Threads);
        bad.metatile_size = 3;
        assert!(matches!(bad.validate(), Err(GenerateError::Coord(_))));

        let mut bad = config(ExecutionModel::Threads);
        bad.metatile_size = 1 << 24;
        assert!(matches!(bad.validate(), Err(GenerateError::Coord(_))));

        let mut bad = config(ExecutionModel::Threads);
        bad.max_zoom = 31;
        assert!(matches!(bad.validate(), Err(GenerateError::Coord(_))));

        let mut bad = config(ExecutionModel::Threads);
        bad.target = Target::BoundingBox {
            bounds: GeoBounds::world(),
            min_zoom: 3,
        };
        assert!(matches!(bad.validate(), Err(GenerateError::Config(_))));

        let mut bad = config(ExecutionModel::Threads);
        bad.workers = 0;
        assert!(matches!(bad.validate(), Err(GenerateError::Config(_))));

        let mut bad = config(ExecutionModel::Threads);
        bad.dry_run = Some(DryRun {
            max_delay: Duration::ZERO,
            render_probability: 1.5,
        });
        assert!(matches!(bad.validate(), Err(GenerateError::Config(_))));
    }

    #[test]
    fn test_processes_need_command() {
        let generator = PyramidGenerator::new(config(ExecutionModel::Processes));
        let result = generator.run(CancellationToken::new());
        assert!(matches!(result, Err(GenerateError::Config(_))));
    }

    #[test]
    fn test_processes_reject_custom_storage() {
        let generator = PyramidGenerator::new(config(ExecutionModel::Processes))
            .with_worker_command(WorkerCommand::new("tilepyramid").arg("worker"))
            .with_storage(Arc::new(MemoryStorage::new()));
        let result = generator.run(CancellationToken::new());
        assert!(matches!(result, Err(GenerateError::Config(_))));
    }

    #[test]
    fn test_cancelled_run_is_interrupted() {
        let storage = Arc::new(MemoryStorage::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let generator =
            PyramidGenerator::new(config(ExecutionModel::Threads)).with_storage(storage);
        let result = generator.run(cancel);

        assert!(matches!(result, Err(GenerateError::Interrupted(_))));
    }

    #[test]
    fn test_world_run_single() {
        let storage = Arc::new(MemoryStorage::new());
        let generator = PyramidGenerator::new(config(ExecutionModel::Single))
            .with_storage(storage.clone());

        let summary = generator.run(CancellationToken::new()).unwrap();

        assert_eq!(summary.stats.dispatched, 21);
        assert_eq!(summary.stats.verdicts_received, 84);
        assert_eq!(storage.len(), 21);
    }

    #[test]
    fn test_align_tiles() {
        let tiles = vec![
            TileCoord::new(5, 3, 9),
            TileCoord::new(5, 1, 14),
            TileCoord::new(5, 8, 8),
        ];

        assert_eq!(
            align_tiles(&tiles, 8),
            vec![TileCoord::new(5, 0, 8), TileCoord::new(5, 8, 8)]
        );
        assert_eq!(align_tiles(&tiles, 1), tiles);
    }

    #[test]
    fn test_worker_config_mirrors_settings() {
        let mut config = config(ExecutionModel::Threads);
        config.termination = TerminationMode::Strict;
        config.skip = SkipPolicy::Existing;

        let worker = config.worker_config();
        assert_eq!(worker.metatile_size, 1);
        assert_eq!(worker.termination, TerminationMode::Strict);
        assert_eq!(worker.skip, SkipPolicy::Existing);
    }
}
