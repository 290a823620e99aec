//! Generate command - render a tile pyramid.

use clap::{ArgAction, Args};
use std::path::PathBuf;
use std::time::Duration;
use tilepyramid::config::{ConfigFile, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use tilepyramid::coord::TileCoord;
use tilepyramid::generator::{GenerateConfig, PyramidGenerator, RunSummary, Target};
use tilepyramid::pool::{ExecutionModel, WorkerCommand};
use tilepyramid::projection::GeoBounds;
use tilepyramid::render::RendererConfig;
use tilepyramid::storage::StorageConfig;
use tilepyramid::worker::DryRun;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{
    parse_metatile_size, resolve_bounds, resolve_skip, EmptyMode, FormatArg, ParallelMode,
    TerminationArg,
};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the generate command.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Bounding box to render: minlon,minlat,maxlon,maxlat
    #[arg(short = 'b', long, allow_hyphen_values = true, conflicts_with = "bbox_name")]
    pub bbox: Option<GeoBounds>,

    /// Named bounding box from config.ini
    #[arg(short = 'B', long)]
    pub bbox_name: Option<String>,

    /// Zoom level the bounding box is seeded at
    #[arg(short = 'n', long, default_value_t = DEFAULT_MIN_ZOOM)]
    pub min_zoom: u8,

    /// Deepest zoom level to render
    #[arg(short = 'x', long, default_value_t = DEFAULT_MAX_ZOOM)]
    pub max_zoom: u8,

    /// Render exactly these metatiles (Z,X,Y), without descending
    #[arg(long, num_args = 1.., conflicts_with_all = ["bbox", "bbox_name"])]
    pub tiles: Vec<TileCoord>,

    /// Output directory, or MBTiles file with --format mbtiles (default: from config)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Output layout (default: from config)
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<FormatArg>,

    /// Metatile side in tiles, a power of two (default: from config)
    #[arg(short = 'm', long, value_parser = parse_metatile_size)]
    pub metatile_size: Option<u32>,

    /// Number of workers (default: from config, else CPU count)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// How workers run (default: from config)
    #[arg(short = 'p', long, value_enum)]
    pub parallel: Option<ParallelMode>,

    /// Skip metatiles whose tiles all exist
    #[arg(short = 'X', long)]
    pub skip_existing: bool,

    /// Skip metatiles whose tiles are all newer than this many days
    #[arg(short = 'N', long, value_name = "DAYS")]
    pub skip_newer: Option<u32>,

    /// Fully transparent tiles (default: from config)
    #[arg(short = 'E', long, value_enum)]
    pub empty: Option<EmptyMode>,

    /// What a worker reports for a skipped metatile (default: from config)
    #[arg(long, value_enum)]
    pub termination: Option<TerminationArg>,

    /// Abort when no worker reports for this many seconds
    #[arg(long, value_name = "SECS")]
    pub stall_timeout: Option<u64>,

    /// Area the coverage renderer paints, repeatable (default: the bounding box)
    #[arg(long, action = ArgAction::Append, allow_hyphen_values = true, value_name = "BBOX")]
    pub coverage: Vec<GeoBounds>,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Simulate rendering with random delays and verdicts
    #[arg(long)]
    pub dry_run: bool,

    /// Longest simulated render time per metatile
    #[arg(long, value_name = "MS", requires = "dry_run")]
    pub dry_run_delay_ms: Option<u64>,
}

impl GenerateArgs {
    /// Builds the run settings: flags first, then config, then defaults.
    pub fn to_config(&self, config: &ConfigFile) -> Result<GenerateConfig, CliError> {
        let bounds = resolve_bounds(self.bbox, self.bbox_name.as_deref(), config)?;

        let target = if self.tiles.is_empty() {
            Target::BoundingBox {
                bounds,
                min_zoom: self.min_zoom,
            }
        } else {
            Target::Tiles(self.tiles.clone())
        };

        let coverage = if self.coverage.is_empty() {
            vec![bounds]
        } else {
            self.coverage.clone()
        };

        let dry_run = self.dry_run.then(|| {
            let mut dry_run = DryRun::default();
            if let Some(ms) = self.dry_run_delay_ms {
                dry_run.max_delay = Duration::from_millis(ms);
            }
            dry_run
        });

        Ok(GenerateConfig {
            target,
            max_zoom: self.max_zoom,
            metatile_size: self.metatile_size.unwrap_or(config.render.metatile_size),
            workers: self.threads.unwrap_or(config.render.threads),
            execution: self
                .parallel
                .map(ExecutionModel::from)
                .unwrap_or(config.render.parallel),
            skip: resolve_skip(self.skip_existing, self.skip_newer)?,
            empty: self.empty.map(Into::into).unwrap_or(config.render.empty),
            termination: self
                .termination
                .map(Into::into)
                .unwrap_or(config.render.termination),
            stall_timeout: self.stall_timeout.map(Duration::from_secs),
            storage: StorageConfig::for_output(
                self.format.map(Into::into).unwrap_or(config.output.format),
                self.output_dir.as_deref().unwrap_or(&config.output.directory),
            ),
            renderer: RendererConfig::coverage(coverage),
            dry_run,
        })
    }
}

/// Run the generate command.
pub fn run(args: GenerateArgs) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(args.debug)?;
    runner.log_startup("generate");

    let config = args.to_config(runner.config())?;
    print_banner(&config);

    let mut generator = PyramidGenerator::new(config);
    if generator.config().execution == ExecutionModel::Processes {
        generator = generator.with_worker_command(worker_command(args.debug)?);
    }

    // Set up signal handler for graceful shutdown
    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        handler_cancel.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!("Press Ctrl+C to stop");
    println!();

    let summary = generator.run(cancel)?;
    print_summary(&summary);
    Ok(())
}

/// Command line of a child worker: this executable's `worker` subcommand.
fn worker_command(debug: bool) -> Result<WorkerCommand, CliError> {
    let exe = std::env::current_exe()
        .map_err(|e| CliError::Config(format!("Cannot locate own executable: {}", e)))?;
    let command = WorkerCommand::new(exe).arg("worker");
    Ok(if debug { command.arg("--debug") } else { command })
}

fn print_banner(config: &GenerateConfig) {
    println!("TilePyramid v{}", tilepyramid::VERSION);
    println!("================================");
    println!();
    match &config.target {
        Target::BoundingBox { bounds, min_zoom } => {
            println!("Bounds:     {}", bounds);
            println!("Zoom:       {}..={}", min_zoom, config.max_zoom);
        }
        Target::Tiles(tiles) => {
            println!("Tiles:      {} listed", tiles.len());
        }
    }
    match &config.storage {
        StorageConfig::Disk { root } => println!("Output:     {}", root.display()),
        StorageConfig::MbTiles { path } => println!("Output:     {} (mbtiles)", path.display()),
        StorageConfig::Memory => {}
    }
    println!("Metatile:   {}x{}", config.metatile_size, config.metatile_size);
    println!(
        "Workers:    {} ({})",
        config.execution.effective_workers(config.workers),
        config.execution
    );
    if config.dry_run.is_some() {
        println!("Mode:       dry run");
    }
    println!();
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    info!(
        dispatched = stats.dispatched,
        skipped = stats.skipped,
        "generate finished"
    );
    println!();
    println!("Done in {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Metatiles rendered: {}", stats.dispatched - stats.skipped);
    println!("  Metatiles skipped:  {}", stats.skipped);
    println!("  Verdicts received:  {}", stats.verdicts_received);
}
