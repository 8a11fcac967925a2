use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "ReceiptHub";

pub const SOCKET_ENV: &str = "RECEIPTHUB_SOCKET";
pub const DEFAULT_SOCKET: &str = "./run/receipthub.sock";

/// Upper bound on one request line, newline excluded.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Client-side bound on waiting for the daemon's reply.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

pub const LOG_FORMAT_ENV: &str = "RECEIPTHUB_LOG_FORMAT";

/// `$RECEIPTHUB_SOCKET`, else `./run/receipthub.sock`.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET))
}
