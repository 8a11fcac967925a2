pub mod daemon;
pub mod status;
pub mod submit;

use std::process::ExitCode;

use receipthub_daemon::DaemonError;

/// Exit codes for socket failures, shared by every client command.
pub(crate) fn client_failure(err: &DaemonError) -> ExitCode {
    match err {
        DaemonError::DaemonNotRunning { socket } => {
            println!("Socket not found: {}", socket.display());
            ExitCode::from(2)
        }
        DaemonError::ConnectionRefused { socket } => {
            println!("Cannot connect to socket: {}", socket.display());
            ExitCode::from(3)
        }
        other => {
            println!("Error: {other}");
            ExitCode::from(4)
        }
    }
}
