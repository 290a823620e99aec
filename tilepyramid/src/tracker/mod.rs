//! Work tracking for the render quad-tree.
//!
//! The [`WorkTracker`] is the arena of in-flight work. Every coordinate it
//! knows about is in exactly one place:
//!
//! ```text
//!             push                 notify(render)            confirm
//!  created ─────────► pending ─────────────────────► ready ─────────► dispatched
//!                        │                      (stack/current)          │
//!                        │ notify(!render)                               │ z < max_zoom
//!                        ▼                                               ▼
//!                     pruned                                  4 children pushed
//! ```
//!
//! The tracker is owned by the scheduler's control loop and never shared,
//! so it carries no locking.

use crate::coord::TileCoord;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, trace};

/// Protocol violations detected by the tracker.
///
/// Any of these means the scheduler and the workers disagree about which
/// tiles are in flight, which cannot be recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// A verdict arrived for a coordinate that is not awaiting one
    #[error("verdict for {0} which is not awaiting a verdict")]
    UnexpectedVerdict(TileCoord),
}

/// Quad-tree work-item state machine.
#[derive(Debug, Clone)]
pub struct WorkTracker {
    /// Next tile eligible for dispatch
    current: Option<TileCoord>,
    /// Eligible tiles behind `current`, last in first out
    ready: Vec<TileCoord>,
    /// Provisional children waiting for their parent's render verdict
    pending: HashSet<TileCoord>,
    max_zoom: u8,
    metatile_size: u32,
}

impl WorkTracker {
    /// Creates an empty tracker.
    pub fn new(max_zoom: u8, metatile_size: u32) -> Self {
        Self {
            current: None,
            ready: Vec::new(),
            pending: HashSet::new(),
            max_zoom,
            metatile_size,
        }
    }

    /// Deepest zoom level that is ever dispatched.
    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Metatile side, in tiles, used for child offsets.
    pub fn metatile_size(&self) -> u32 {
        self.metatile_size
    }

    /// Registers a coordinate as awaiting a verdict.
    ///
    /// Pushing a coordinate that is already pending is a no-op.
    pub fn push(&mut self, tile: TileCoord) {
        if !self.pending.insert(tile) {
            debug!(%tile, "tile already awaiting a verdict");
        }
        trace!(state = ?self, "push");
    }

    /// The next tile eligible for dispatch, if any.
    #[inline]
    pub fn peek(&self) -> Option<TileCoord> {
        self.current
    }

    /// Marks `current` as handed to a worker.
    ///
    /// Call only after the send succeeded. Below `max_zoom` the tile's four
    /// children become pending; then the next ready tile (most recently
    /// readied first) becomes `current`.
    pub fn confirm(&mut self) {
        if let Some(tile) = self.current.take() {
            if tile.zoom < self.max_zoom {
                for child in tile.children(self.metatile_size) {
                    self.push(child);
                }
            }
        }

        self.current = self.ready.pop();
        trace!(state = ?self, "confirm");
    }

    /// Applies a render verdict for `tile`.
    ///
    /// Verdicts beyond `max_zoom` are ignored: those tiles were never
    /// pushed. Otherwise the tile must be pending. A positive verdict makes
    /// it `current`, stacking the previous `current` so descent stays depth
    /// first; a negative verdict prunes it together with its subtree.
    pub fn notify(&mut self, tile: TileCoord, render: bool) -> Result<(), TrackerError> {
        if tile.zoom > self.max_zoom {
            trace!(%tile, "verdict beyond max zoom ignored");
            return Ok(());
        }

        if !self.pending.remove(&tile) {
            return Err(TrackerError::UnexpectedVerdict(tile));
        }

        if render {
            if let Some(previous) = self.current.replace(tile) {
                self.ready.push(previous);
            }
        } else {
            debug!(%tile, "pruned");
        }

        trace!(state = ?self, "notify");
        Ok(())
    }

    /// Drops the pending children of a tile whose worker skipped it.
    ///
    /// Returns how many children were still pending. Children beyond
    /// `max_zoom` were never pushed and are not counted.
    pub fn abandon_children(&mut self, tile: TileCoord) -> usize {
        if tile.zoom >= self.max_zoom {
            return 0;
        }

        let abandoned = tile
            .children(self.metatile_size)
            .into_iter()
            .filter(|child| self.pending.remove(child))
            .count();

        debug!(%tile, abandoned, "children of skipped tile abandoned");
        abandoned
    }

    /// Number of coordinates the tracker still holds.
    ///
    /// Zero means no tracked work is left, although verdicts for tiles
    /// dispatched at `max_zoom` may still be in the channel.
    #[inline]
    pub fn size(&self) -> usize {
        usize::from(self.current.is_some()) + self.ready.len() + self.pending.len()
    }

    /// Returns true if the tracker holds nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of coordinates awaiting a verdict.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of ready coordinates, `current` included.
    pub fn ready_len(&self) -> usize {
        usize::from(self.current.is_some()) + self.ready.len()
    }

    /// Returns true if `tile` is awaiting a verdict.
    pub fn is_pending(&self, tile: &TileCoord) -> bool {
        self.pending.contains(tile)
    }
}

#[cfg(test)]
mod tests;
