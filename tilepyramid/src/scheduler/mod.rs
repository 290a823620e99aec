//! The scheduler control loop.
//!
//! The [`Scheduler`] owns the [`WorkTracker`] and the completion counters
//! and is the only code that touches them. It talks to workers over two
//! bounded channels (see [`channel`]) and runs on a current-thread tokio
//! runtime.
//!
//! # Pump cycle
//!
//! ```text
//!  ┌─► drain    try_recv until empty, feed every report to the tracker
//!  │   dispatch try_send peek() until full, confirm() after each send
//!  │   wait     biased select: cancel > failure > report > send slot > stall
//!  └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Draining always runs before dispatching, so a full verdict channel can
//! never block a worker while the scheduler waits for an order slot. The
//! loop ends when the tracker is empty; [`Scheduler::drain_to_completion`]
//! then absorbs the verdicts still in flight until
//! `verdicts_received == 4 × (dispatched − skipped)`.

mod error;
mod link;

pub use error::SchedulerError;
pub use link::{
    channel, channel_with_capacity, order_capacity, report_capacity, SchedulerLink, WorkOrder,
    WorkerLink, WorkerReport,
};

use crate::coord::TileCoord;
use crate::projection::{covering_metatiles, GeoBounds};
use crate::tracker::WorkTracker;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Counters of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Metatiles handed to workers
    pub dispatched: u64,
    /// Verdict messages absorbed, including discarded ones
    pub verdicts_received: u64,
    /// Metatiles workers skipped with a notice
    pub skipped: u64,
    /// Root metatiles seeded
    pub seeded: u64,
}

impl RunStats {
    /// Verdicts owed by the workers for the metatiles dispatched so far.
    pub fn expected_verdicts(&self) -> u64 {
        4 * self.dispatched.saturating_sub(self.skipped)
    }

    /// Returns true once every owed verdict has arrived.
    pub fn is_balanced(&self) -> bool {
        self.verdicts_received >= self.expected_verdicts()
    }
}

/// Where dispatchable work comes from.
#[derive(Debug)]
enum WorkSource {
    /// Quad-tree descent through the tracker
    Descend,
    /// A fixed list of metatiles, no descent
    List(VecDeque<TileCoord>),
}

/// Drives workers through a quad-tree of metatiles.
#[derive(Debug)]
pub struct Scheduler {
    tracker: WorkTracker,
    source: WorkSource,
    stats: RunStats,
    stall_timeout: Option<Duration>,
}

impl Scheduler {
    pub fn new(max_zoom: u8, metatile_size: u32) -> Self {
        Self {
            tracker: WorkTracker::new(max_zoom, metatile_size),
            source: WorkSource::Descend,
            stats: RunStats::default(),
            stall_timeout: None,
        }
    }

    /// Aborts a run when no report arrives for this long.
    pub fn with_stall_timeout(mut self, stall_timeout: Option<Duration>) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn tracker(&self) -> &WorkTracker {
        &self.tracker
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Seeds the metatiles covering `bounds` at `min_zoom` as roots.
    ///
    /// Roots are rendered unconditionally. Returns the number of roots.
    pub fn seed(&mut self, bounds: &GeoBounds, min_zoom: u8) -> Result<usize, SchedulerError> {
        if min_zoom > self.tracker.max_zoom() {
            return Err(SchedulerError::InvalidSeed(format!(
                "minimum zoom {} is above maximum zoom {}",
                min_zoom,
                self.tracker.max_zoom()
            )));
        }

        let roots = covering_metatiles(bounds, min_zoom, self.tracker.metatile_size());
        for root in &roots {
            self.tracker.push(*root);
            self.tracker.notify(*root, true)?;
        }

        self.stats.seeded += roots.len() as u64;
        info!(
            bounds = %bounds,
            zoom = min_zoom,
            roots = roots.len(),
            "seeded render roots"
        );
        Ok(roots.len())
    }

    /// Pumps work until the tracker is empty.
    pub async fn pump(
        &mut self,
        link: &mut SchedulerLink,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        while self.outstanding() > 0 {
            if cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }

            self.drain(link)?;
            self.dispatch(link)?;

            if self.outstanding() == 0 {
                break;
            }
            self.wait(link, cancel).await?;
        }

        debug!(stats = ?self.stats, "pump finished");
        Ok(())
    }

    /// Absorbs reports until every dispatched metatile is accounted for.
    pub async fn drain_to_completion(
        &mut self,
        link: &mut SchedulerLink,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        while !self.stats.is_balanced() {
            self.wait(link, cancel).await?;
        }

        debug!(stats = ?self.stats, "all verdicts received");
        Ok(())
    }

    /// Runs the seeded quad-tree to completion.
    pub async fn run(
        &mut self,
        link: &mut SchedulerLink,
        cancel: &CancellationToken,
    ) -> Result<RunStats, SchedulerError> {
        self.pump(link, cancel).await?;
        self.drain_to_completion(link, cancel).await?;
        Ok(self.stats)
    }

    /// Renders exactly `tiles`, without descending into children.
    ///
    /// Verdicts are counted for completion and otherwise ignored.
    pub async fn run_tiles(
        &mut self,
        tiles: Vec<TileCoord>,
        link: &mut SchedulerLink,
        cancel: &CancellationToken,
    ) -> Result<RunStats, SchedulerError> {
        info!(tiles = tiles.len(), "rendering tile list");
        self.source = WorkSource::List(tiles.into());
        self.run(link, cancel).await
    }

    /// Work not yet dispatched or still awaiting a verdict.
    fn outstanding(&self) -> usize {
        match &self.source {
            WorkSource::Descend => self.tracker.size(),
            WorkSource::List(tiles) => tiles.len(),
        }
    }

    fn next_tile(&self) -> Option<TileCoord> {
        match &self.source {
            WorkSource::Descend => self.tracker.peek(),
            WorkSource::List(tiles) => tiles.front().copied(),
        }
    }

    /// Records a successful send of `tile`.
    fn confirm(&mut self, tile: TileCoord) {
        match &mut self.source {
            WorkSource::Descend => self.tracker.confirm(),
            WorkSource::List(tiles) => {
                tiles.pop_front();
            }
        }
        self.stats.dispatched += 1;
        debug!(%tile, dispatched = self.stats.dispatched, "dispatched");
    }

    fn absorb(&mut self, report: WorkerReport) -> Result<(), SchedulerError> {
        let descend = matches!(self.source, WorkSource::Descend);

        match report {
            WorkerReport::Verdict { tile, render } => {
                self.stats.verdicts_received += 1;
                if descend {
                    self.tracker.notify(tile, render)?;
                }
                trace!(%tile, render, "verdict");
            }
            WorkerReport::Skipped { tile } => {
                self.stats.skipped += 1;
                if descend {
                    self.tracker.abandon_children(tile);
                }
                debug!(%tile, "metatile skipped by worker");
            }
        }
        Ok(())
    }

    /// Absorbs every report already waiting.
    fn drain(&mut self, link: &mut SchedulerLink) -> Result<(), SchedulerError> {
        loop {
            match link.reports.try_recv() {
                Ok(report) => self.absorb(report)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(SchedulerError::WorkersGone),
            }
        }
    }

    /// Sends ready tiles until the order channel is full.
    fn dispatch(&mut self, link: &mut SchedulerLink) -> Result<(), SchedulerError> {
        while let Some(tile) = self.next_tile() {
            match link.orders.try_send(WorkOrder::Render(tile)) {
                Ok(()) => self.confirm(tile),
                Err(TrySendError::Full(_)) => {
                    trace!(%tile, "order channel full");
                    break;
                }
                Err(TrySendError::Closed(_)) => return Err(SchedulerError::WorkersGone),
            }
        }
        Ok(())
    }

    /// Waits for the next event on either channel.
    async fn wait(
        &mut self,
        link: &mut SchedulerLink,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        let candidate = self.next_tile();
        let stall_timeout = self.stall_timeout;
        let stall = async move {
            match stall_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(SchedulerError::Cancelled),

            _ = link.failure.cancelled() => Err(SchedulerError::WorkerFailed),

            report = link.reports.recv() => match report {
                Some(report) => self.absorb(report),
                None => Err(SchedulerError::WorkersGone),
            },

            permit = link.orders.reserve(), if candidate.is_some() => {
                let permit = permit.map_err(|_| SchedulerError::WorkersGone)?;
                if let Some(tile) = candidate {
                    permit.send(WorkOrder::Render(tile));
                    self.confirm(tile);
                }
                Ok(())
            }

            _ = stall => Err(SchedulerError::Stalled {
                dispatched: self.stats.dispatched,
                received: self.stats.verdicts_received,
                pending: self.tracker.pending_len(),
            }),
        }
    }
}
