//! Line-delimited JSON protocol of child worker processes.
//!
//! ```text
//! parent → child   {"config":..,"mode":..,"storage":..}      (once)
//! parent → child   {"Render":{"zoom":3,"x":0,"y":0}}
//! child  → parent  {"Report":{"Verdict":{..}}}               (0..=4 times)
//! child  → parent  "Done"
//! parent → child   "Stop"
//! ```
//!
//! Logging goes to stderr; stdout carries nothing but frames.

use super::{DryRun, RenderSource, WorkerConfig, WorkerError, WorkerFactory};
use crate::coord::validate_metatile_size;
use crate::render::RendererConfig;
use crate::scheduler::{WorkOrder, WorkerReport};
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Renderer selection that can cross a process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerSpecMode {
    Render(RendererConfig),
    DryRun(DryRun),
}

/// Everything a child process needs to build its worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub config: WorkerConfig,
    pub mode: WorkerSpecMode,
    pub storage: StorageConfig,
}

impl WorkerSpec {
    /// Opens storage and returns a factory for this spec.
    pub fn factory(&self) -> Result<WorkerFactory, WorkerError> {
        validate_metatile_size(self.config.metatile_size)?;
        let source = match &self.mode {
            WorkerSpecMode::Render(renderer) => RenderSource::Renderer(Arc::new(renderer.clone())),
            WorkerSpecMode::DryRun(dry_run) => RenderSource::DryRun(*dry_run),
        };
        Ok(WorkerFactory::new(
            self.config.clone(),
            source,
            self.storage.open()?,
        ))
    }
}

/// Frame written by a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerFrame {
    Report(WorkerReport),
    /// All reports of the current order have been written
    Done,
}

/// Runs a worker over line-delimited JSON.
///
/// Reads the [`WorkerSpec`] from the first line, then serves orders until
/// `Stop` or end of input.
pub fn serve_stdio(mut input: impl BufRead, mut output: impl Write) -> Result<(), WorkerError> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(WorkerError::MissingSpec);
    }
    let spec: WorkerSpec = serde_json::from_str(line.trim())?;
    let mut worker = spec.factory()?.build()?;
    info!(pid = std::process::id(), "worker ready");

    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            debug!("worker input closed");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let tile = match serde_json::from_str::<WorkOrder>(line.trim())? {
            WorkOrder::Render(tile) => tile,
            WorkOrder::Stop => break,
        };

        for report in worker.process(tile) {
            write_frame(&mut output, &WorkerFrame::Report(report))?;
        }
        write_frame(&mut output, &WorkerFrame::Done)?;
        output.flush()?;
    }

    info!(pid = std::process::id(), "worker stopped");
    Ok(())
}

/// Writes one frame as a JSON line.
fn write_frame(output: &mut impl Write, frame: &WorkerFrame) -> Result<(), WorkerError> {
    serde_json::to_writer(&mut *output, frame)?;
    output.write_all(b"\n")?;
    Ok(())
}
