//! ReceiptHub core library: domain types and configuration.
//!
//! - [`types`]: newtypes, jobs and config structs
//! - [`config`]: load / validate / summarize `config.yaml`
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{load_config, resolve_config_path, summarize_config};
pub use error::ConfigError;
pub use types::{Config, Job, JobId, NewJob, PrinterConfig, PrinterName, SocketConfig};
