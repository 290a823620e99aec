use super::*;
use crate::coord::TILE_SIZE;
use crate::render::RendererConfig;
use crate::storage::{MemoryStorage, StorageConfig};
use image::{Rgba, RgbaImage};
use std::io::Cursor;

/// Paints the listed single tiles of every metatile, leaves the rest blank.
struct PaintTiles(Vec<(u32, u32)>);

impl Renderer for PaintTiles {
    fn render(&mut self, request: &MetatileRequest) -> Result<RgbaImage, RenderError> {
        let mut image = RgbaImage::new(request.image_size, request.image_size);
        for (i, j) in &self.0 {
            image.put_pixel(i * TILE_SIZE + 10, j * TILE_SIZE + 10, Rgba([255, 0, 0, 255]));
        }
        Ok(image)
    }
}

struct Failing;

impl Renderer for Failing {
    fn render(&mut self, request: &MetatileRequest) -> Result<RgbaImage, RenderError> {
        Err(RenderError::Failed {
            tile: request.tile,
            reason: "boom".to_string(),
        })
    }
}

struct TooSmall;

impl Renderer for TooSmall {
    fn render(&mut self, _request: &MetatileRequest) -> Result<RgbaImage, RenderError> {
        Ok(RgbaImage::new(16, 16))
    }
}

fn config(metatile_size: u32) -> WorkerConfig {
    WorkerConfig {
        metatile_size,
        ..WorkerConfig::default()
    }
}

fn worker(config: WorkerConfig, renderer: impl Renderer + 'static) -> (Worker, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let worker = Worker::new(config, WorkerMode::Render(Box::new(renderer)), storage.clone());
    (worker, storage)
}

fn verdicts(reports: &[WorkerReport]) -> Vec<(TileCoord, bool)> {
    reports
        .iter()
        .map(|report| match report {
            WorkerReport::Verdict { tile, render } => (*tile, *render),
            WorkerReport::Skipped { tile } => panic!("unexpected skip of {}", tile),
        })
        .collect()
}

#[test]
fn test_full_tile_stores_and_reports_four_positive_verdicts() {
    let (mut worker, storage) = worker(config(1), PaintTiles(vec![(0, 0)]));
    let tile = TileCoord::new(2, 1, 3);

    let reports = worker.process(tile);

    let expected: Vec<_> = tile.children(1).into_iter().map(|c| (c, true)).collect();
    assert_eq!(verdicts(&reports), expected);
    assert_eq!(storage.tiles(), vec![tile]);
    assert_eq!(storage.commits(), 1);
}

#[test]
fn test_stored_tile_is_png() {
    let (mut worker, storage) = worker(config(1), PaintTiles(vec![(0, 0)]));
    let tile = TileCoord::new(0, 0, 0);

    worker.process(tile);

    let bytes = storage.get(tile).unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (TILE_SIZE, TILE_SIZE));
    assert_eq!(*decoded.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
}

#[test]
fn test_empty_metatile_reports_four_negative_verdicts() {
    let (mut worker, storage) = worker(config(1), PaintTiles(Vec::new()));

    let reports = worker.process(TileCoord::new(1, 0, 0));

    assert_eq!(reports.len(), 4);
    assert!(verdicts(&reports).iter().all(|(_, render)| !render));
    assert!(storage.is_empty());
    assert_eq!(storage.commits(), 1, "commit happens even with nothing stored");
}

#[test]
fn test_empty_tiles_stored_under_render_policy() {
    let config = WorkerConfig {
        empty: EmptyTilePolicy::Render,
        ..config(2)
    };
    let (mut worker, storage) = worker(config, PaintTiles(vec![(0, 0)]));

    let reports = worker.process(TileCoord::new(3, 2, 2));

    assert_eq!(storage.len(), 4);
    // empty tiles never mark a quadrant
    let renders: Vec<_> = verdicts(&reports).into_iter().map(|(_, r)| r).collect();
    assert_eq!(renders, vec![true, false, false, false]);
}

#[test]
fn test_metatile_slices_only_painted_tiles() {
    let (mut worker, storage) = worker(config(2), PaintTiles(vec![(1, 1)]));
    let tile = TileCoord::new(3, 4, 6);

    let reports = worker.process(tile);

    assert_eq!(storage.tiles(), vec![TileCoord::new(3, 5, 7)]);
    let renders: Vec<_> = verdicts(&reports).into_iter().map(|(_, r)| r).collect();
    assert_eq!(renders, vec![false, false, false, true]);
}

#[test]
fn test_low_zoom_metatile_is_clipped_to_world() {
    let all: Vec<_> = (0..4).flat_map(|i| (0..4).map(move |j| (i, j))).collect();
    let (mut worker, storage) = worker(config(4), PaintTiles(all));

    let reports = worker.process(TileCoord::new(1, 0, 0));

    // only the 2x2 tiles of zoom 1 exist
    assert_eq!(storage.len(), 4);
    let renders: Vec<_> = verdicts(&reports).into_iter().map(|(_, r)| r).collect();
    assert_eq!(renders, vec![true, false, false, false]);
}

#[test]
fn test_verdicts_sent_beyond_any_zoom_limit() {
    // workers know nothing about max zoom
    let (mut worker, _storage) = worker(config(1), PaintTiles(vec![(0, 0)]));
    let reports = worker.process(TileCoord::new(18, 5, 5));
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.tile().zoom == 19));
}

#[test]
fn test_render_failure_yields_negative_verdicts() {
    let (mut worker, storage) = worker(config(1), Failing);

    let reports = worker.process(TileCoord::new(4, 1, 1));

    assert_eq!(reports.len(), 4);
    assert!(verdicts(&reports).iter().all(|(_, render)| !render));
    assert!(storage.is_empty());
}

#[test]
fn test_wrong_image_size_is_a_render_failure() {
    let (mut worker, storage) = worker(config(1), TooSmall);

    let reports = worker.process(TileCoord::new(4, 1, 1));

    assert_eq!(reports.len(), 4);
    assert!(storage.is_empty());
}

#[test]
fn test_skip_existing_strict_emits_nothing() {
    let config = WorkerConfig {
        skip: SkipPolicy::Existing,
        termination: TerminationMode::Strict,
        ..config(2)
    };
    let (mut worker, storage) = worker(config, PaintTiles(vec![(0, 0)]));
    let tile = TileCoord::new(3, 0, 0);
    for single in tile.footprint(2) {
        storage.store(single, b"old").unwrap();
    }

    let reports = worker.process(tile);

    assert!(reports.is_empty());
    assert_eq!(storage.get(tile), Some(b"old".to_vec()), "nothing re-rendered");
}

#[test]
fn test_skip_existing_lenient_sends_skip_notice() {
    let config = WorkerConfig {
        skip: SkipPolicy::Existing,
        termination: TerminationMode::Lenient,
        ..config(2)
    };
    let (mut worker, storage) = worker(config, PaintTiles(vec![(0, 0)]));
    let tile = TileCoord::new(3, 0, 0);
    for single in tile.footprint(2) {
        storage.store(single, b"old").unwrap();
    }

    let reports = worker.process(tile);

    assert_eq!(reports, vec![WorkerReport::Skipped { tile }]);
}

#[test]
fn test_partially_present_metatile_is_rendered() {
    let config = WorkerConfig {
        skip: SkipPolicy::Existing,
        ..config(2)
    };
    let (mut worker, storage) = worker(config, PaintTiles(vec![(0, 0)]));
    let tile = TileCoord::new(3, 0, 0);
    storage.store(tile, b"old").unwrap();

    let reports = worker.process(tile);

    assert_eq!(reports.len(), 4);
    assert_ne!(storage.get(tile), Some(b"old".to_vec()));
}

#[test]
fn test_skip_newer_than_cutoff() {
    let now = SystemTime::now();
    let config = WorkerConfig {
        skip: SkipPolicy::NewerThan(now - Duration::from_secs(86_400)),
        ..config(1)
    };
    let (mut worker, storage) = worker(config, PaintTiles(vec![(0, 0)]));
    let fresh = TileCoord::new(2, 0, 0);
    let stale = TileCoord::new(2, 1, 0);
    storage.insert_at(fresh, b"fresh".to_vec(), now);
    storage.insert_at(stale, b"stale".to_vec(), now - Duration::from_secs(7 * 86_400));

    assert_eq!(worker.process(fresh), vec![WorkerReport::Skipped { tile: fresh }]);
    assert_eq!(worker.process(stale).len(), 4);
}

#[test]
fn test_dry_run_reports_four_verdicts_without_storing() {
    let storage = Arc::new(MemoryStorage::new());
    let dry_run = DryRun {
        max_delay: Duration::ZERO,
        render_probability: 1.0,
    };
    let mut worker = Worker::new(config(1), WorkerMode::Simulate(dry_run), storage.clone());
    let tile = TileCoord::new(5, 3, 3);

    let reports = worker.process(tile);

    let expected: Vec<_> = tile.children(1).into_iter().map(|c| (c, true)).collect();
    assert_eq!(verdicts(&reports), expected);
    assert!(storage.is_empty());
}

#[test]
fn test_dry_run_never_renders_children_outside_world() {
    let storage = Arc::new(MemoryStorage::new());
    let dry_run = DryRun {
        max_delay: Duration::ZERO,
        render_probability: 1.0,
    };
    let mut worker = Worker::new(config(8), WorkerMode::Simulate(dry_run), storage);

    let reports = worker.process(TileCoord::new(0, 0, 0));

    let renders: Vec<_> = verdicts(&reports).into_iter().map(|(_, r)| r).collect();
    assert_eq!(renders, vec![true, false, false, false]);
}

#[test]
fn test_factory_builds_workers_from_renderer_config() {
    let factory = WorkerFactory::new(
        config(1),
        RenderSource::Renderer(Arc::new(RendererConfig::coverage(vec![
            crate::projection::GeoBounds::world(),
        ]))),
        Arc::new(MemoryStorage::new()),
    );

    let mut worker = factory.build().unwrap();
    let reports = worker.process(TileCoord::new(0, 0, 0));

    assert!(verdicts(&reports).iter().all(|(_, render)| *render));
}

#[test]
fn test_run_blocking_stops_on_stop_order() {
    let (mut worker, storage) = worker(config(1), PaintTiles(vec![(0, 0)]));
    let (reports_tx, mut reports_rx) = tokio::sync::mpsc::channel(16);
    let mut orders = vec![
        WorkOrder::Render(TileCoord::new(1, 0, 0)),
        WorkOrder::Stop,
        WorkOrder::Render(TileCoord::new(1, 1, 1)),
    ]
    .into_iter();

    worker.run_blocking(|| orders.next(), &reports_tx);

    assert_eq!(storage.tiles(), vec![TileCoord::new(1, 0, 0)]);
    let mut received = 0;
    while reports_rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 4);
    assert_eq!(orders.next(), Some(WorkOrder::Render(TileCoord::new(1, 1, 1))));
}

#[test]
fn test_run_blocking_survives_closed_report_channel() {
    let (mut worker, storage) = worker(config(1), PaintTiles(vec![(0, 0)]));
    let (reports_tx, reports_rx) = tokio::sync::mpsc::channel(1);
    drop(reports_rx);
    let mut orders = vec![
        WorkOrder::Render(TileCoord::new(1, 0, 0)),
        WorkOrder::Render(TileCoord::new(1, 1, 0)),
    ]
    .into_iter();

    worker.run_blocking(|| orders.next(), &reports_tx);

    assert_eq!(storage.len(), 2);
}

#[test]
fn test_serve_stdio_round_trip() {
    let spec = WorkerSpec {
        config: config(1),
        mode: WorkerSpecMode::DryRun(DryRun {
            max_delay: Duration::ZERO,
            render_probability: 0.0,
        }),
        storage: StorageConfig::Memory,
    };
    let tile = TileCoord::new(2, 1, 1);
    let input = format!(
        "{}\n{}\n{}\n",
        serde_json::to_string(&spec).unwrap(),
        serde_json::to_string(&WorkOrder::Render(tile)).unwrap(),
        serde_json::to_string(&WorkOrder::Stop).unwrap(),
    );
    let mut output = Vec::new();

    serve_stdio(Cursor::new(input), &mut output).unwrap();

    let frames: Vec<WorkerFrame> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[4], WorkerFrame::Done);
    for (frame, child) in frames.iter().zip(tile.children(1)) {
        assert_eq!(
            *frame,
            WorkerFrame::Report(WorkerReport::Verdict {
                tile: child,
                render: false
            })
        );
    }
}

#[test]
fn test_serve_stdio_requires_spec() {
    let result = serve_stdio(Cursor::new(String::new()), Vec::new());
    assert!(matches!(result, Err(WorkerError::MissingSpec)));
}

#[test]
fn test_serve_stdio_rejects_garbage() {
    let result = serve_stdio(Cursor::new("not json\n".to_string()), Vec::new());
    assert!(matches!(result, Err(WorkerError::Protocol(_))));
}

#[test]
fn test_serve_stdio_rejects_oversized_metatile() {
    let spec = WorkerSpec {
        config: config(1 << 24),
        mode: WorkerSpecMode::DryRun(DryRun::default()),
        storage: StorageConfig::Memory,
    };
    let input = format!("{}\n", serde_json::to_string(&spec).unwrap());

    let result = serve_stdio(Cursor::new(input), Vec::new());
    assert!(matches!(result, Err(WorkerError::Coord(_))));
}

#[test]
fn test_mode_names_parse() {
    assert_eq!("Strict".parse::<TerminationMode>(), Ok(TerminationMode::Strict));
    assert_eq!("lenient".parse::<TerminationMode>(), Ok(TerminationMode::Lenient));
    assert!("maybe".parse::<TerminationMode>().is_err());
    assert_eq!("render".parse::<EmptyTilePolicy>(), Ok(EmptyTilePolicy::Render));
    assert_eq!(EmptyTilePolicy::Skip.to_string(), "skip");
}
