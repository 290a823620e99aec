//! Shared-memory thread pool.

use super::{join_threads, send_stops, PoolError, ShutdownFuture, WorkerPool};
use crate::scheduler::{SchedulerLink, WorkerLink};
use crate::worker::WorkerFactory;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// N worker threads pulling orders from one shared receiver.
///
/// Every thread owns its own renderer; storage is shared.
pub struct ThreadPool {
    handles: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Builds `workers` workers and starts one thread for each.
    pub fn start(workers: usize, factory: &WorkerFactory, link: WorkerLink) -> Result<Self, PoolError> {
        let WorkerLink {
            orders,
            reports,
            failure,
        } = link;
        let orders = Arc::new(Mutex::new(orders));

        info!(workers, "starting worker threads");

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let mut worker = factory.build()?;
            let orders = Arc::clone(&orders);
            let reports = reports.clone();
            let guard = PanicGuard(failure.clone());

            let handle = thread::Builder::new()
                .name(format!("tile-worker-{}", index))
                .spawn(move || {
                    let _guard = guard;
                    worker.run_blocking(|| orders.lock().blocking_recv(), &reports);
                })
                .map_err(|source| PoolError::Spawn { index, source })?;
            handles.push(handle);
        }

        Ok(Self { handles })
    }
}

/// Cancels the failure token when a worker thread unwinds.
struct PanicGuard(CancellationToken);

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

impl WorkerPool for ThreadPool {
    fn workers(&self) -> usize {
        self.handles.len()
    }

    fn shutdown(self: Box<Self>, link: SchedulerLink) -> ShutdownFuture {
        Box::pin(async move {
            send_stops(link, self.handles.len()).await;

            let mut result = Ok(());
            for (index, joined) in join_threads(self.handles).await?.into_iter().enumerate() {
                if joined.is_err() {
                    error!(index, "worker thread panicked");
                    result = Err(PoolError::Panicked(index));
                }
            }

            info!("worker threads stopped");
            result
        })
    }
}
