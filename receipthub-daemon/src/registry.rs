//! Printer registry: one entry per configured printer, each owning its own
//! [`JobQueue`] and the observable state of its worker.
//!
//! Routing lives here. A job for printer `P` only ever lands in `P`'s queue,
//! so ordering is preserved per printer and nothing is shared across them.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use receipthub_core::{Job, JobId, NewJob, PrinterConfig};

use crate::error::SubmitError;
use crate::protocol::PrinterStatus;
use crate::queue::JobQueue;

/// Liveness label reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Waiting for the next due job.
    Idle,
    /// Processing a job.
    Busy,
    /// No worker is running for this printer.
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Busy => "busy",
            WorkerState::Stopped => "stopped",
        }
    }
}

pub struct PrinterEntry {
    config: PrinterConfig,
    queue: Arc<JobQueue>,
    state: Mutex<WorkerState>,
}

impl PrinterEntry {
    fn new(config: PrinterConfig) -> Self {
        Self {
            config,
            queue: Arc::new(JobQueue::new()),
            state: Mutex::new(WorkerState::Stopped),
        }
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    fn status(&self) -> PrinterStatus {
        PrinterStatus {
            name: self.config.name.0.clone(),
            state: self.state(),
            host: self.config.host.clone(),
            port: self.config.port,
            cols: self.config.cols,
            pending: self.queue.depth(),
        }
    }
}

/// Entries are kept in config order so `status` lists printers as configured.
pub struct PrinterRegistry {
    entries: Vec<Arc<PrinterEntry>>,
}

impl PrinterRegistry {
    pub fn from_config(printers: &[PrinterConfig]) -> Self {
        Self {
            entries: printers
                .iter()
                .cloned()
                .map(|config| Arc::new(PrinterEntry::new(config)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PrinterEntry>> {
        self.entries
            .iter()
            .find(|entry| entry.config.name.as_str() == name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<PrinterEntry>> {
        self.entries.iter()
    }

    /// Route a submission to its printer's queue and return the assigned id.
    ///
    /// Unknown printers are rejected before anything is queued.
    pub fn enqueue(&self, new: NewJob) -> Result<JobId, SubmitError> {
        let entry = self
            .get(new.printer.as_str())
            .ok_or_else(|| SubmitError::UnknownPrinter(new.printer.0.clone()))?;

        let job = Job::assign(JobId::generate(), new, Utc::now());
        let job_id = job.job_id().clone();
        tracing::debug!(
            printer = %job.printer(),
            job_id = %job_id,
            run_at = %job.run_at().to_rfc3339(),
            "job enqueued",
        );
        entry.queue.push(job);
        Ok(job_id)
    }

    /// Pending jobs across all printers.
    pub fn depth(&self) -> usize {
        self.entries.iter().map(|entry| entry.queue.depth()).sum()
    }

    pub fn status(&self) -> Vec<PrinterStatus> {
        self.entries.iter().map(|entry| entry.status()).collect()
    }
}
