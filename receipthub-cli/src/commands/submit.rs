//! `rh submit`: enqueue one print job.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde_json::{json, Value};

use receipthub_daemon::paths::default_socket_path;
use receipthub_daemon::{request_submit, DaemonError, JobSpec};

use super::client_failure;

/// Arguments for `rh submit`.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Target printer name, as configured in the daemon.
    #[arg(long, short = 'p')]
    pub printer: String,

    /// Payload interpretation tag.
    #[arg(long = "type", short = 't', default_value = "text")]
    pub job_type: String,

    /// Free-text origin label.
    #[arg(long, default_value = "cli")]
    pub source: String,

    /// Raw JSON payload.
    #[arg(long, conflicts_with = "body")]
    pub payload: Option<String>,

    /// Text body; shorthand for `--payload '{"body": "<text>"}'`.
    #[arg(long)]
    pub body: Option<String>,

    /// Due time as UNIX seconds.
    #[arg(long, conflicts_with = "delay")]
    pub run_at: Option<f64>,

    /// Due time as seconds from now.
    #[arg(long)]
    pub delay: Option<f64>,

    /// Path to UDS (default: ./run/receipthub.sock or $RECEIPTHUB_SOCKET).
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

impl SubmitArgs {
    pub fn run(self) -> Result<ExitCode> {
        let socket = self.socket.clone().unwrap_or_else(default_socket_path);
        let spec = self.into_spec()?;

        match request_submit(&socket, spec) {
            Ok(job_id) => {
                println!("{job_id}");
                Ok(ExitCode::SUCCESS)
            }
            Err(DaemonError::Rejected(reason)) => {
                eprintln!("submit rejected: {reason}");
                Ok(ExitCode::FAILURE)
            }
            Err(err) => Ok(client_failure(&err)),
        }
    }

    fn into_spec(self) -> Result<JobSpec> {
        let payload = match (self.payload, self.body) {
            (Some(raw), _) => {
                serde_json::from_str::<Value>(&raw).context("--payload is not valid JSON")?
            }
            (None, Some(body)) => json!({ "body": body }),
            (None, None) => Value::Null,
        };

        // Non-finite floats serialize as JSON null, which the daemon reads as "now".
        let run_at = match (self.run_at, self.delay) {
            (Some(at), _) if !at.is_finite() || at < 0.0 => {
                bail!("--run-at must be a finite, non-negative UNIX timestamp")
            }
            (Some(at), _) => Some(at),
            (None, Some(delay)) if !delay.is_finite() || delay < 0.0 => {
                bail!("--delay must be a finite, non-negative number of seconds")
            }
            (None, Some(delay)) => Some(Utc::now().timestamp_millis() as f64 / 1000.0 + delay),
            (None, None) => None,
        };

        Ok(JobSpec {
            job_type: self.job_type,
            source: self.source,
            printer: self.printer,
            payload,
            run_at,
        })
    }
}
