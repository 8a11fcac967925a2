use std::path::PathBuf;

use thiserror::Error;

/// Error surface for daemon startup, runtime, and the socket client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] receipthub_core::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon socket already in use: {socket}")]
    SocketInUse { socket: PathBuf },

    #[error("unknown socket group '{0}'")]
    UnknownGroup(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon rejected request: {0}")]
    Rejected(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("cannot connect to daemon socket: {socket}")]
    ConnectionRefused { socket: PathBuf },

    #[error("{task} task join failure: {reason}")]
    Join { task: String, reason: String },
}

/// Submission rejected before it reaches a queue. The `Display` form is the
/// `error` string sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("unknown_printer: {0}")]
    UnknownPrinter(String),

    #[error("invalid_job: {0}")]
    InvalidJob(String),

    #[error("invalid_run_at: {0}")]
    InvalidRunAt(String),
}

/// Failure reported by a [`JobProcessor`](crate::worker::JobProcessor).
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("cannot render payload: {0}")]
    Payload(String),

    #[error("processor task failed: {0}")]
    Crashed(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
