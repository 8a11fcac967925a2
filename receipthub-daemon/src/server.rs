//! Control socket: one JSON request line in, one JSON reply line out, then
//! the connection is closed.
//!
//! Every connection runs in its own task and only touches shared state
//! through the [`PrinterRegistry`], so a stalled client cannot hold up other
//! clients or the workers.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::Group;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use receipthub_core::SocketConfig;

use crate::error::{io_err, DaemonError, SubmitError};
use crate::paths::MAX_REQUEST_BYTES;
use crate::protocol::{JobSpec, Response};
use crate::registry::PrinterRegistry;

pub struct ControlServer {
    socket: PathBuf,
    listener: UnixListener,
    registry: Arc<PrinterRegistry>,
    read_timeout: Duration,
}

impl ControlServer {
    /// Prepare and bind the control socket.
    ///
    /// Creates the parent directory, removes a stale socket file, binds, then
    /// applies mode and group. If anything after bind fails, the socket file
    /// (and a directory this call created) is removed again.
    pub fn bind(config: &SocketConfig, registry: Arc<PrinterRegistry>) -> Result<Self, DaemonError> {
        let socket = config.path.clone();
        let created_dir = ensure_parent_dir(&socket)?;

        let bound = prepare_socket_for_bind(&socket).and_then(|()| {
            let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
            if let Err(err) = apply_socket_access(&socket, config) {
                drop(listener);
                let _ = fs::remove_file(&socket);
                return Err(err);
            }
            Ok(listener)
        });

        let listener = match bound {
            Ok(listener) => listener,
            Err(err) => {
                if let Some(dir) = created_dir {
                    let _ = fs::remove_dir(dir);
                }
                return Err(err);
            }
        };

        Ok(Self {
            socket,
            listener,
            registry,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        })
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Start accepting connections on a background task.
    pub fn spawn(self) -> ServerHandle {
        let token = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(self, token.clone()));
        ServerHandle { token, handle }
    }
}

pub struct ServerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting new connections, drop the listener, then wait for every
    /// accepted connection to reply. A stalled client holds this up for at
    /// most the read timeout. The socket file is left for [`remove_socket`].
    pub async fn stop(self) -> Result<(), DaemonError> {
        self.token.cancel();
        self.handle.await.map_err(|err| DaemonError::Join {
            task: "control_server".to_string(),
            reason: err.to_string(),
        })
    }
}

/// Unlink the socket file. Missing files are fine.
pub fn remove_socket(socket: &Path) -> Result<(), DaemonError> {
    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn accept_loop(server: ControlServer, token: CancellationToken) {
    let ControlServer {
        socket,
        listener,
        registry,
        read_timeout,
    } = server;

    let clients = TaskTracker::new();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let registry = registry.clone();
                    clients.spawn(async move {
                        if let Err(err) = handle_client(stream, registry, read_timeout).await {
                            tracing::warn!(error = %err, "socket client error");
                        }
                    });
                }
                Err(err) => {
                    tracing::error!(socket = %socket.display(), error = %err, "failed to accept client connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
    drop(listener);
    tracing::debug!(socket = %socket.display(), "stopped accepting connections");

    clients.close();
    if !clients.is_empty() {
        tracing::debug!(connections = clients.len(), "waiting for open connections");
    }
    clients.wait().await;
}

enum LineRead {
    Line(Vec<u8>),
    Eof,
    TooLarge,
    TimedOut,
}

async fn read_request_line<R>(reader: R, read_timeout: Duration) -> Result<LineRead, DaemonError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    // One extra byte for the newline and one more to detect overflow.
    let limit = MAX_REQUEST_BYTES;
    let mut reader = BufReader::new(reader.take(limit as u64 + 2));
    let mut buf = Vec::new();

    let read = match tokio::time::timeout(read_timeout, reader.read_until(b'\n', &mut buf)).await {
        Ok(result) => result.map_err(|e| io_err("daemon socket read", e))?,
        Err(_) => return Ok(LineRead::TimedOut),
    };

    if read == 0 {
        return Ok(LineRead::Eof);
    }
    let content = buf.strip_suffix(b"\n").map_or(buf.len(), <[u8]>::len);
    if content > limit {
        return Ok(LineRead::TooLarge);
    }
    Ok(LineRead::Line(buf))
}

async fn handle_client(
    stream: UnixStream,
    registry: Arc<PrinterRegistry>,
    read_timeout: Duration,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();

    let response = match read_request_line(reader, read_timeout).await? {
        LineRead::Eof => return Ok(()),
        LineRead::TimedOut => Response::error("read_timeout"),
        LineRead::TooLarge => Response::error("request_too_large"),
        LineRead::Line(bytes) => match String::from_utf8(bytes) {
            Ok(line) => dispatch_line(&registry, &line),
            Err(err) => Response::error(format!("invalid_json: {err}")),
        },
    };

    write_response(&mut writer, &response).await?;
    let _ = writer.shutdown().await;
    Ok(())
}

/// Decode one request line and run it against the registry.
pub fn dispatch_line(registry: &PrinterRegistry, line: &str) -> Response {
    let value: Value = match serde_json::from_str(line.trim()) {
        Ok(value) => value,
        Err(err) => return Response::error(format!("invalid_json: {err}")),
    };
    let Value::Object(mut request) = value else {
        return Response::error("invalid_json: expected a JSON object");
    };

    match request.get("cmd").and_then(Value::as_str) {
        Some("status") => Response::status(registry.depth(), registry.status()),
        Some("submit") => match submit(registry, request.remove("job")) {
            Ok(job_id) => Response::submitted(&job_id),
            Err(err) => {
                tracing::info!(error = %err, "submit rejected");
                Response::error(err.to_string())
            }
        },
        _ => {
            let cmd = request.get("cmd").cloned().unwrap_or(Value::Null);
            Response::error(format!("unknown_cmd: {cmd}"))
        }
    }
}

fn submit(
    registry: &PrinterRegistry,
    job: Option<Value>,
) -> Result<receipthub_core::JobId, SubmitError> {
    let job = match job {
        Some(job @ Value::Object(_)) => job,
        _ => return Err(SubmitError::InvalidJob("missing 'job' object".to_string())),
    };
    let spec: JobSpec =
        serde_json::from_value(job).map_err(|err| SubmitError::InvalidJob(err.to_string()))?;
    registry.enqueue(spec.into_new_job()?)
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

/// Returns the directory if this call created it.
fn ensure_parent_dir(socket: &Path) -> Result<Option<PathBuf>, DaemonError> {
    let parent = match socket.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(None),
    };
    if parent.exists() {
        return Ok(None);
    }
    fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    Ok(Some(parent.to_path_buf()))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if fs::symlink_metadata(socket).is_err() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::SocketInUse {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    remove_socket(socket)
}

fn apply_socket_access(socket: &Path, config: &SocketConfig) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(socket, fs::Permissions::from_mode(config.mode))
        .map_err(|e| io_err(socket, e))?;

    if let Some(group) = config.group.as_deref() {
        let gid = resolve_gid(group)?;
        std::os::unix::fs::chown(socket, None, Some(gid)).map_err(|e| io_err(socket, e))?;
    }
    Ok(())
}

/// Numeric gids pass through; names go through NSS (`getgrnam`).
fn resolve_gid(group: &str) -> Result<u32, DaemonError> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }
    match Group::from_name(group) {
        Ok(Some(entry)) => Ok(entry.gid.as_raw()),
        Ok(None) => Err(DaemonError::UnknownGroup(group.to_string())),
        Err(errno) => Err(io_err(
            format!("group lookup '{group}'"),
            std::io::Error::from(errno),
        )),
    }
}
