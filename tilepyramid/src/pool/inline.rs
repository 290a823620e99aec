//! Single worker on the scheduler's own runtime.

use super::{send_stops, PoolError, ShutdownFuture, WorkerPool};
use crate::scheduler::{SchedulerLink, WorkOrder, WorkerLink};
use crate::worker::WorkerFactory;
use tokio::task::JoinHandle;
use tracing::debug;

/// One worker task on the current-thread runtime.
///
/// Rendering blocks the only thread, so scheduler and worker take turns:
/// the scheduler fills the order channel, the worker processes one order,
/// the scheduler drains its verdicts.
pub struct InlineRunner {
    handle: JoinHandle<()>,
}

impl InlineRunner {
    /// Builds the worker and spawns its task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(factory: &WorkerFactory, link: WorkerLink) -> Result<Self, PoolError> {
        let mut worker = factory.build()?;
        let WorkerLink {
            mut orders,
            reports,
            ..
        } = link;

        let handle = tokio::spawn(async move {
            while let Some(WorkOrder::Render(tile)) = orders.recv().await {
                for report in worker.process(tile) {
                    if reports.send(report).await.is_err() {
                        debug!(%tile, "scheduler gone, report dropped");
                    }
                }
            }
            debug!("inline worker stopped");
        });

        Ok(Self { handle })
    }
}

impl WorkerPool for InlineRunner {
    fn workers(&self) -> usize {
        1
    }

    fn shutdown(self: Box<Self>, link: SchedulerLink) -> ShutdownFuture {
        Box::pin(async move {
            send_stops(link, 1).await;
            self.handle.await.map_err(|_| PoolError::Panicked(0))
        })
    }
}
