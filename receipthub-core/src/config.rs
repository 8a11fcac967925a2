//! Daemon configuration file.
//!
//! # Lookup order
//!
//! 1. explicit `--config <path>`
//! 2. `$RECEIPTHUB_CONFIG`
//! 3. [`DEFAULT_CONFIG_PATH`]
//!
//! # Example
//!
//! ```yaml
//! socket:
//!   path: ./run/receipthub.sock
//!   mode: "0660"
//!   group: lp
//! printers:
//!   - name: default
//!     host: 192.168.1.50
//!     port: 9100
//!     cols: 42
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::Config;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/receipthub/config.yaml";
pub const CONFIG_ENV: &str = "RECEIPTHUB_CONFIG";

/// Pick the config path from an explicit flag, the environment, or the default.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read, parse and validate the config at `path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents, path)
}

/// Parse and validate YAML text. `origin` is only used in error messages.
pub fn parse_config(contents: &str, origin: &Path) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket.path must not be empty".into()));
        }
        if self.socket.mode > 0o7777 {
            return Err(ConfigError::Invalid(format!(
                "socket.mode {:o} is not a permission mode",
                self.socket.mode
            )));
        }
        if self.socket.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "socket.read_timeout_secs must be at least 1".into(),
            ));
        }
        if self.printers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one printer must be configured".into(),
            ));
        }

        let mut seen = HashSet::new();
        for printer in &self.printers {
            let name = printer.name.as_str();
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("printer name must not be empty".into()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate printer name '{name}'"
                )));
            }
            if printer.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "printer '{name}' has port 0"
                )));
            }
            if printer.cols == 0 {
                return Err(ConfigError::Invalid(format!(
                    "printer '{name}' has cols 0"
                )));
            }
        }
        Ok(())
    }
}

/// Human-readable multi-line summary, logged at daemon startup.
pub fn summarize_config(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "socket: {} (mode {:04o}, group {})",
        config.socket.path.display(),
        config.socket.mode,
        config.socket.group.as_deref().unwrap_or("-"),
    );
    let _ = write!(out, "printers: {}", config.printers.len());
    for printer in &config.printers {
        let _ = write!(
            out,
            "\n  {} -> {}:{} ({} cols)",
            printer.name, printer.host, printer.port, printer.cols
        );
    }
    out
}
