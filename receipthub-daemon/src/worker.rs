//! Per-printer worker pool.
//!
//! One long-lived task per registry entry, named `worker:<printer>`. Each task
//! loops on its printer's [`JobQueue::take_next_due`](crate::queue::JobQueue::take_next_due)
//! and hands the job to the [`JobProcessor`]. Cancellation is only observed
//! while waiting for the next job; a job already being processed always runs
//! to completion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use receipthub_core::{Job, PrinterConfig, PrinterName};

use crate::error::ProcessError;
use crate::registry::{PrinterEntry, PrinterRegistry, WorkerState};

/// The printing collaborator. Called once per dequeued job.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, printer: &PrinterConfig, job: &Job) -> Result<(), ProcessError>;
}

/// Logs each job and simulates a short print.
#[derive(Debug, Clone)]
pub struct LogProcessor {
    print_time: Duration,
}

impl LogProcessor {
    pub fn new(print_time: Duration) -> Self {
        Self { print_time }
    }
}

impl Default for LogProcessor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl JobProcessor for LogProcessor {
    async fn process(&self, printer: &PrinterConfig, job: &Job) -> Result<(), ProcessError> {
        tracing::info!(
            printer = %printer.name,
            job_id = %job.job_id(),
            job_type = job.job_type(),
            source = job.source(),
            run_at = job.run_at().timestamp(),
            "printing job",
        );
        tokio::time::sleep(self.print_time).await;
        Ok(())
    }
}

struct WorkerHandle {
    printer: PrinterName,
    name: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Running workers, in registry order.
pub struct PrinterWorkerPool {
    token: CancellationToken,
    workers: Vec<WorkerHandle>,
}

impl PrinterWorkerPool {
    /// Spawn one worker per registry entry. Must be called inside a runtime.
    pub fn start(registry: &PrinterRegistry, processor: Arc<dyn JobProcessor>) -> Self {
        let token = CancellationToken::new();
        let workers = registry
            .entries()
            .map(|entry| {
                let printer = entry.config().name.clone();
                let name = printer.worker_name();
                let worker_token = token.child_token();
                // Marked idle before spawning so `status` never reports a
                // started pool as stopped.
                entry.set_state(WorkerState::Idle);
                let handle = tokio::spawn(
                    run_worker(entry.clone(), processor.clone(), worker_token.clone())
                        .instrument(tracing::info_span!("worker", printer = %printer)),
                );
                WorkerHandle {
                    printer,
                    name,
                    token: worker_token,
                    handle,
                }
            })
            .collect();

        Self { token, workers }
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop the worker for one printer, leaving the others running. Its queue
    /// keeps accepting jobs; they stay pending. Returns `false` if no worker
    /// runs for `printer`.
    pub async fn stop_worker(&mut self, printer: &str) -> bool {
        let Some(index) = self
            .workers
            .iter()
            .position(|w| w.printer.as_str() == printer)
        else {
            return false;
        };
        let worker = self.workers.remove(index);
        worker.token.cancel();
        join_worker(worker).await;
        true
    }

    /// Cancel every worker and wait for all of them to exit. In-flight jobs
    /// finish first.
    pub async fn stop(self) {
        self.token.cancel();
        for worker in self.workers {
            join_worker(worker).await;
        }
    }
}

async fn join_worker(worker: WorkerHandle) {
    match worker.handle.await {
        Ok(()) => tracing::debug!(worker = %worker.name, "worker joined"),
        Err(err) => tracing::error!(worker = %worker.name, error = %err, "worker task failed"),
    }
}

async fn run_worker(
    entry: Arc<PrinterEntry>,
    processor: Arc<dyn JobProcessor>,
    token: CancellationToken,
) {
    let queue = entry.queue().clone();
    loop {
        let job = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            job = queue.take_next_due() => job,
        };

        entry.set_state(WorkerState::Busy);
        process_job(&entry, &processor, job).await;
        entry.set_state(WorkerState::Idle);
    }

    entry.set_state(WorkerState::Stopped);
    tracing::info!("worker stopped");
}

/// Run the processor in its own task so a panic is contained to the job.
/// Failed jobs are logged and dropped.
async fn process_job(entry: &Arc<PrinterEntry>, processor: &Arc<dyn JobProcessor>, job: Job) {
    let job_id = job.job_id().clone();
    tracing::info!(
        job_id = %job_id,
        job_type = job.job_type(),
        source = job.source(),
        run_at = job.run_at().timestamp(),
        "job dequeued",
    );

    let printer = entry.config().clone();
    let processor = processor.clone();
    let outcome = tokio::spawn(async move { processor.process(&printer, &job).await })
        .await
        .unwrap_or_else(|err| Err(ProcessError::Crashed(err.to_string())));

    match outcome {
        Ok(()) => tracing::debug!(job_id = %job_id, "job processed"),
        Err(err) => tracing::error!(job_id = %job_id, error = %err, "job processing failed; dropping"),
    }
}
