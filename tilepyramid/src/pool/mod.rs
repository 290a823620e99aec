//! Worker pools.
//!
//! A pool starts N workers on the worker side of the channels and stops
//! them again. Three execution models share the same [`WorkerPool`]
//! interface, so the scheduler never knows which one it is driving:
//!
//! | Model | Pool | Workers |
//! |-------|------|---------|
//! | [`ExecutionModel::Processes`] | [`SpawnPool`] | child processes, one bridge thread each |
//! | [`ExecutionModel::Threads`] | [`ThreadPool`] | OS threads sharing one storage handle |
//! | [`ExecutionModel::Single`] | [`InlineRunner`] | one task on the scheduler's thread |
//!
//! # Shutdown
//!
//! Shutdown drops the scheduler's report receiver first, so no worker can
//! stay blocked on a full report channel, then sends one
//! [`WorkOrder::Stop`] per worker and waits for every worker to exit.
//!
//! # Failures
//!
//! A worker that dies mid-run cancels the link's failure token, which ends
//! the scheduler's wait with [`SchedulerError::WorkerFailed`]. The cause is
//! returned by `shutdown`.
//!
//! [`SchedulerError::WorkerFailed`]: crate::scheduler::SchedulerError::WorkerFailed

mod inline;
mod spawn;
mod threads;

pub use inline::InlineRunner;
pub use spawn::{SpawnPool, WorkerCommand};
pub use threads::ThreadPool;

use crate::scheduler::{SchedulerLink, WorkOrder};
use crate::worker::WorkerError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::debug;

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker could not be built
    #[error("Failed to start worker: {0}")]
    Worker(#[from] WorkerError),

    /// A thread or process could not be started
    #[error("Failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread or task panicked
    #[error("Worker {0} panicked")]
    Panicked(usize),

    /// A child process broke the worker protocol or exited badly
    #[error("Worker process {index} failed: {reason}")]
    Child { index: usize, reason: String },

    /// Waiting for the worker threads failed
    #[error("Failed to wait for workers: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How workers are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionModel {
    /// Isolated child processes
    Processes,
    /// Threads of this process
    #[default]
    Threads,
    /// One worker on the scheduler's own thread
    Single,
}

impl ExecutionModel {
    /// Number of workers actually started for a requested count.
    pub fn effective_workers(&self, requested: usize) -> usize {
        match self {
            ExecutionModel::Single => 1,
            _ => requested.max(1),
        }
    }
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionModel::Processes => write!(f, "processes"),
            ExecutionModel::Threads => write!(f, "threads"),
            ExecutionModel::Single => write!(f, "single"),
        }
    }
}

impl FromStr for ExecutionModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processes" | "fork" => Ok(ExecutionModel::Processes),
            "threads" | "threading" => Ok(ExecutionModel::Threads),
            "single" => Ok(ExecutionModel::Single),
            _ => Err(format!(
                "unknown execution model '{}' (expected processes, threads or single)",
                s
            )),
        }
    }
}

/// Boxed shutdown future.
pub type ShutdownFuture = Pin<Box<dyn Future<Output = Result<(), PoolError>> + Send>>;

/// A running set of workers.
pub trait WorkerPool: Send {
    /// Number of workers started.
    fn workers(&self) -> usize;

    /// Stops every worker and waits for it to exit.
    fn shutdown(self: Box<Self>, link: SchedulerLink) -> ShutdownFuture;
}

/// Drops the report receiver and sends one stop order per worker.
async fn send_stops(link: SchedulerLink, workers: usize) {
    let SchedulerLink { orders, reports, .. } = link;
    drop(reports);

    for sent in 0..workers {
        if orders.send(WorkOrder::Stop).await.is_err() {
            debug!(sent, "order channel closed, remaining workers already gone");
            break;
        }
    }
}

/// Joins OS threads on the blocking pool, keeping the runtime thread free.
async fn join_threads<T: Send + 'static>(
    handles: Vec<JoinHandle<T>>,
) -> Result<Vec<thread::Result<T>>, PoolError> {
    let joined =
        tokio::task::spawn_blocking(move || handles.into_iter().map(JoinHandle::join).collect())
            .await?;
    Ok(joined)
}
