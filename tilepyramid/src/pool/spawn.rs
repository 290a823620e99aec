//! Isolated child-process pool.
//!
//! Each child runs [`serve_stdio`](crate::worker::serve_stdio) and owns its
//! own renderer and storage handle. A bridge thread per child pulls orders
//! from the shared order channel, forwards one at a time over the child's
//! stdin and relays the reports it reads back until the `Done` frame.
//! A bridge whose child fails cancels the link's failure token.

use super::{join_threads, send_stops, PoolError, ShutdownFuture, WorkerPool};
use crate::scheduler::{SchedulerLink, WorkOrder, WorkerLink, WorkerReport};
use crate::worker::{WorkerError, WorkerFrame, WorkerSpec};
use parking_lot::Mutex;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How to start a child worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }
}

type SharedOrders = Arc<Mutex<mpsc::Receiver<WorkOrder>>>;

/// N child processes behind bridge threads.
pub struct SpawnPool {
    bridges: Vec<JoinHandle<Result<(), PoolError>>>,
}

impl SpawnPool {
    /// Starts `workers` children and their bridge threads.
    pub fn start(
        workers: usize,
        command: &WorkerCommand,
        spec: &WorkerSpec,
        link: WorkerLink,
    ) -> Result<Self, PoolError> {
        let spec_line = serde_json::to_string(spec).map_err(WorkerError::from)?;
        let WorkerLink {
            orders,
            reports,
            failure,
        } = link;
        let orders: SharedOrders = Arc::new(Mutex::new(orders));

        info!(
            workers,
            program = %command.program.display(),
            "starting worker processes"
        );

        let mut bridges = Vec::with_capacity(workers);
        for index in 0..workers {
            let mut child = command
                .command()
                .spawn()
                .map_err(|source| PoolError::Spawn { index, source })?;
            let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
                return Err(child_error(index, "stdio not captured"));
            };
            debug!(index, pid = child.id(), "worker process started");

            let bridge = Bridge {
                index,
                stdin,
                stdout: BufReader::new(stdout),
                orders: Arc::clone(&orders),
                reports: reports.clone(),
                failure: failure.clone(),
            };
            let spec_line = spec_line.clone();

            let handle = thread::Builder::new()
                .name(format!("tile-bridge-{}", index))
                .spawn(move || bridge.run(child, &spec_line))
                .map_err(|source| PoolError::Spawn { index, source })?;
            bridges.push(handle);
        }

        Ok(Self { bridges })
    }
}

impl WorkerPool for SpawnPool {
    fn workers(&self) -> usize {
        self.bridges.len()
    }

    fn shutdown(self: Box<Self>, link: SchedulerLink) -> ShutdownFuture {
        Box::pin(async move {
            send_stops(link, self.bridges.len()).await;

            let mut result = Ok(());
            for (index, joined) in join_threads(self.bridges).await?.into_iter().enumerate() {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                    Err(_) => {
                        error!(index, "bridge thread panicked");
                        result = Err(PoolError::Panicked(index));
                    }
                }
            }

            info!("worker processes stopped");
            result
        })
    }
}

/// Parent-side end of one child's pipes.
struct Bridge {
    index: usize,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    orders: SharedOrders,
    reports: mpsc::Sender<WorkerReport>,
    failure: CancellationToken,
}

impl Bridge {
    fn run(mut self, mut child: Child, spec_line: &str) -> Result<(), PoolError> {
        let index = self.index;
        let failure = self.failure.clone();
        let relayed = self.relay(spec_line);
        if relayed.is_err() {
            failure.cancel();
        }

        // closing stdin ends the child's loop even after a failed relay
        drop(self);
        let status = child.wait().map_err(|e| {
            failure.cancel();
            child_error(index, e)
        })?;

        if let Err(err) = relayed {
            error!(index, error = %err, "worker process failed");
            return Err(err);
        }
        if !status.success() {
            failure.cancel();
            error!(index, %status, "worker process exited abnormally");
            return Err(child_error(index, format!("exited with {}", status)));
        }

        debug!(index, "worker process exited");
        Ok(())
    }

    fn relay(&mut self, spec_line: &str) -> Result<(), PoolError> {
        writeln!(self.stdin, "{}", spec_line).map_err(|e| child_error(self.index, e))?;

        loop {
            let order = self.orders.lock().blocking_recv();
            let tile = match order {
                Some(WorkOrder::Render(tile)) => tile,
                Some(WorkOrder::Stop) | None => {
                    self.send(&WorkOrder::Stop)?;
                    return Ok(());
                }
            };

            self.send(&WorkOrder::Render(tile))?;
            self.relay_reports()?;
        }
    }

    fn send(&mut self, order: &WorkOrder) -> Result<(), PoolError> {
        let line = serde_json::to_string(order).map_err(|e| child_error(self.index, e))?;
        writeln!(self.stdin, "{}", line)
            .and_then(|()| self.stdin.flush())
            .map_err(|e| child_error(self.index, e))
    }

    /// Forwards frames until `Done`.
    fn relay_reports(&mut self) -> Result<(), PoolError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| child_error(self.index, e))?;
            if read == 0 {
                return Err(child_error(self.index, "exited in the middle of an order"));
            }

            match serde_json::from_str::<WorkerFrame>(line.trim()) {
                Ok(WorkerFrame::Report(report)) => {
                    if self.reports.blocking_send(report).is_err() {
                        debug!(index = self.index, "scheduler gone, report dropped");
                    }
                }
                Ok(WorkerFrame::Done) => return Ok(()),
                Err(err) => {
                    return Err(child_error(
                        self.index,
                        format!("malformed frame {:?}: {}", line.trim(), err),
                    ))
                }
            }
        }
    }
}

fn child_error(index: usize, reason: impl fmt::Display) -> PoolError {
    PoolError::Child {
        index,
        reason: reason.to_string(),
    }
}
