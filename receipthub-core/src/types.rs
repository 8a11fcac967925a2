//! Domain types for ReceiptHub.
//!
//! Jobs are immutable once built: the queue only moves them between the
//! pending set and the worker that dequeues them. Configuration types are
//! serde-deserializable straight from the YAML config file.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed printer name. Unique key for routing and worker identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrinterName(pub String);

impl PrinterName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic worker task name, e.g. `worker:default`.
    pub fn worker_name(&self) -> String {
        format!("worker:{}", self.0)
    }
}

impl fmt::Display for PrinterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PrinterName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PrinterName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque job identifier, assigned when a job is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// A validated submission that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub source: String,
    pub printer: PrinterName,
    pub payload: Value,
    /// `None` means "as soon as possible".
    pub run_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(
        job_type: impl Into<String>,
        source: impl Into<String>,
        printer: impl Into<PrinterName>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            source: source.into(),
            printer: printer.into(),
            payload: Value::Null,
            run_at: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }
}

/// One unit of print work. Fields are read-only after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    job_id: JobId,
    job_type: String,
    source: String,
    printer: PrinterName,
    payload: Value,
    run_at: DateTime<Utc>,
}

impl Job {
    /// Materialize a submission, defaulting `run_at` to `now`.
    pub fn assign(job_id: JobId, new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            job_type: new.job_type,
            source: new.source,
            printer: new.printer,
            payload: new.payload,
            run_at: new.run_at.unwrap_or(now),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn printer(&self) -> &PrinterName {
        &self.printer
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn run_at(&self) -> DateTime<Utc> {
        self.run_at
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_SOCKET_MODE: u32 = 0o660;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PRINTER_PORT: u16 = 9100;
pub const DEFAULT_PRINTER_COLS: u16 = 42;

/// Control socket settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    pub path: PathBuf,
    /// Permission bits applied after bind. YAML strings are read as octal
    /// (`"0660"`); integers are taken literally (`0o660` or `432`).
    #[serde(
        default = "default_socket_mode",
        deserialize_with = "deserialize_mode"
    )]
    pub mode: u32,
    /// Owning group applied after bind: a group name or a numeric gid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

/// One configured printer. Transport fields are only reported, never dialed
/// by the queue or the workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub name: PrinterName,
    pub host: String,
    #[serde(default = "default_printer_port")]
    pub port: u16,
    #[serde(default = "default_printer_cols")]
    pub cols: u16,
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub socket: SocketConfig,
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,
}

impl Config {
    pub fn printer(&self, name: &str) -> Option<&PrinterConfig> {
        self.printers.iter().find(|p| p.name.as_str() == name)
    }
}

fn default_socket_mode() -> u32 {
    DEFAULT_SOCKET_MODE
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_printer_port() -> u16 {
    DEFAULT_PRINTER_PORT
}

fn default_printer_cols() -> u16 {
    DEFAULT_PRINTER_COLS
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeRepr {
    Bits(u32),
    Octal(String),
}

fn deserialize_mode<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match ModeRepr::deserialize(deserializer)? {
        ModeRepr::Bits(bits) => Ok(bits),
        ModeRepr::Octal(text) => parse_octal_mode(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse `"0660"`, `"660"` or `"0o660"` as octal permission bits.
pub fn parse_octal_mode(text: &str) -> Result<u32, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 8).map_err(|_| format!("invalid octal mode '{text}'"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
