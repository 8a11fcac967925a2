//! ReceiptHub daemon: time-ordered job queues, per-printer workers, and the
//! UNIX socket control server that feeds them.

mod error;
pub mod paths;
pub mod protocol;
pub mod queue;
pub mod registry;
mod runtime;
pub mod server;
mod shutdown;
pub mod worker;

pub use error::{DaemonError, ProcessError, SubmitError};
pub use protocol::{
    request_status, request_submit, send_request, JobSpec, PrinterStatus, Request, Response,
};
pub use queue::JobQueue;
pub use registry::{PrinterRegistry, WorkerState};
pub use runtime::{init_tracing, start_blocking, Daemon};
pub use server::{ControlServer, ServerHandle};
pub use shutdown::install_shutdown_handler;
pub use worker::{JobProcessor, LogProcessor, PrinterWorkerPool};
