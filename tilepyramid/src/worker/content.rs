//! Per-metatile content map and child verdicts.
//!
//! A metatile rooted at `(z, x, y)` with side `m` has four children at
//! `z + 1`. The child at offsets `(dx, dy)` (each `0` or `m`) covers the
//! parent-level tiles `i ∈ [dx/2, dx/2 + max(m/2, 1))` and
//! `j ∈ [dy/2, dy/2 + max(m/2, 1))`, clipped to the metatile span. A child
//! has content when any tile it covers was non-empty.

use crate::coord::TileCoord;
use crate::scheduler::WorkerReport;
use std::ops::Range;

/// Child offsets in units of the metatile size, in `TileCoord::children`
/// order.
const CHILD_OFFSETS: [(u32, u32); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

/// Which single tiles of a metatile had content.
#[derive(Debug, Clone)]
pub(crate) struct ContentMap {
    tile: TileCoord,
    metatile_size: u32,
    span: u32,
    cells: Vec<bool>,
}

impl ContentMap {
    pub(crate) fn new(tile: TileCoord, metatile_size: u32) -> Self {
        let span = tile.span(metatile_size);
        Self {
            tile,
            metatile_size,
            span,
            cells: vec![false; (span * span) as usize],
        }
    }

    /// Tiles per axis actually present in the world.
    pub(crate) fn span(&self) -> u32 {
        self.span
    }

    /// Records that tile `(i, j)` of the metatile has content.
    pub(crate) fn mark(&mut self, i: u32, j: u32) {
        debug_assert!(i < self.span && j < self.span);
        self.cells[(i * self.span + j) as usize] = true;
    }

    fn covered(&self, offset: u32) -> Range<u32> {
        let half = (self.metatile_size / 2).max(1);
        let start = (offset * self.metatile_size / 2).min(self.span);
        let end = (offset * self.metatile_size / 2 + half).min(self.span);
        start..end
    }

    /// Returns true if child `k` covers at least one tile of the world.
    pub(crate) fn is_covered(&self, k: usize) -> bool {
        let (dx, dy) = CHILD_OFFSETS[k];
        !self.covered(dx).is_empty() && !self.covered(dy).is_empty()
    }

    /// Returns true if any tile covered by child `k` has content.
    pub(crate) fn has_content(&self, k: usize) -> bool {
        let (dx, dy) = CHILD_OFFSETS[k];
        self.covered(dx).any(|i| {
            self.covered(dy)
                .any(|j| self.cells[(i * self.span + j) as usize])
        })
    }

    /// The four child verdicts, in `TileCoord::children` order.
    pub(crate) fn verdicts(&self) -> Vec<WorkerReport> {
        self.tile
            .children(self.metatile_size)
            .into_iter()
            .enumerate()
            .map(|(k, child)| WorkerReport::Verdict {
                tile: child,
                render: self.has_content(k),
            })
            .collect()
    }

    /// The four child verdicts with content decided by `decide` for each
    /// covered child; uncovered children are always negative.
    pub(crate) fn verdicts_with(&self, mut decide: impl FnMut() -> bool) -> Vec<WorkerReport> {
        self.tile
            .children(self.metatile_size)
            .into_iter()
            .enumerate()
            .map(|(k, child)| WorkerReport::Verdict {
                tile: child,
                render: self.is_covered(k) && decide(),
            })
            .collect()
    }
}
