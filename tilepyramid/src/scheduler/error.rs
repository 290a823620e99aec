//! Scheduler errors.

use crate::tracker::TrackerError;
use thiserror::Error;

/// Reasons a scheduler run ends early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Scheduler and workers disagree about in-flight work
    #[error("Protocol violation: {0}")]
    Protocol(#[from] TrackerError),

    /// The run was interrupted
    #[error("Run cancelled")]
    Cancelled,

    /// A channel closed while work was outstanding
    #[error("Workers exited while work was outstanding")]
    WorkersGone,

    /// A worker died while the run was in progress
    #[error("A worker died while work was outstanding")]
    WorkerFailed,

    /// Nothing arrived from the workers within the stall timeout
    #[error(
        "No progress within the stall timeout \
         (dispatched {dispatched}, verdicts received {received}, awaiting {pending})"
    )]
    Stalled {
        dispatched: u64,
        received: u64,
        pending: usize,
    },

    /// Seeding parameters are unusable
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),
}
