//! Messages and bounded channels between the scheduler and its workers.
//!
//! ```text
//!               orders (capacity N + 1)
//!  Scheduler ─────────────────────────────► workers
//!            ◄─────────────────────────────
//!               reports (capacity 4N + 1)
//! ```
//!
//! Both channels are bounded: the outbound bound limits the work handed
//! out ahead of the workers and the inbound bound pushes back on workers
//! when the scheduler falls behind.
//!
//! Both sides also share a failure token. A pool cancels it when one of
//! its workers dies, since the reports owed by that worker will never
//! arrive while the others keep the report channel open.

use crate::coord::TileCoord;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Order sent to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrder {
    /// Render the metatile rooted at this tile
    Render(TileCoord),
    /// Exit the worker loop; sent once per worker at shutdown
    Stop,
}

/// Report sent back by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerReport {
    /// Whether a child of a rendered metatile has content
    Verdict { tile: TileCoord, render: bool },
    /// The metatile was skipped and no verdicts follow for its children
    Skipped { tile: TileCoord },
}

impl WorkerReport {
    /// The coordinate the report is about.
    pub fn tile(&self) -> TileCoord {
        match self {
            WorkerReport::Verdict { tile, .. } | WorkerReport::Skipped { tile } => *tile,
        }
    }
}

/// Scheduler side of the channels.
#[derive(Debug)]
pub struct SchedulerLink {
    pub orders: mpsc::Sender<WorkOrder>,
    pub reports: mpsc::Receiver<WorkerReport>,
    /// Cancelled by the pool when a worker dies mid-run
    pub failure: CancellationToken,
}

/// Worker side of the channels, shared by every worker of a pool.
#[derive(Debug)]
pub struct WorkerLink {
    pub orders: mpsc::Receiver<WorkOrder>,
    pub reports: mpsc::Sender<WorkerReport>,
    pub failure: CancellationToken,
}

/// Outbound capacity for `workers` workers.
pub fn order_capacity(workers: usize) -> usize {
    workers + 1
}

/// Inbound capacity for `workers` workers.
pub fn report_capacity(workers: usize) -> usize {
    4 * workers + 1
}

/// Creates the channel pair sized for a pool of `workers`.
pub fn channel(workers: usize) -> (SchedulerLink, WorkerLink) {
    channel_with_capacity(order_capacity(workers), report_capacity(workers))
}

/// Creates the channel pair with explicit capacities.
///
/// # Panics
///
/// Panics if either capacity is zero.
pub fn channel_with_capacity(orders: usize, reports: usize) -> (SchedulerLink, WorkerLink) {
    let (order_tx, order_rx) = mpsc::channel(orders);
    let (report_tx, report_rx) = mpsc::channel(reports);
    let failure = CancellationToken::new();

    (
        SchedulerLink {
            orders: order_tx,
            reports: report_rx,
            failure: failure.clone(),
        },
        WorkerLink {
            orders: order_rx,
            reports: report_tx,
            failure,
        },
    )
}
