use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use receipthub_core::{JobId, NewJob, PrinterName};

use crate::error::{io_err, DaemonError, SubmitError};
use crate::paths::CLIENT_TIMEOUT;
use crate::registry::WorkerState;

/// JSON newline-delimited request. One per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Request {
    Status,
    Submit { job: JobSpec },
}

/// The `job` object of a `submit` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: String,
    pub source: String,
    pub printer: String,
    #[serde(default)]
    pub payload: Value,
    /// UNIX seconds; absent means "now".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<f64>,
}

impl JobSpec {
    pub fn into_new_job(self) -> Result<NewJob, SubmitError> {
        let run_at = self.run_at.map(unix_seconds_to_datetime).transpose()?;
        Ok(NewJob {
            job_type: self.job_type,
            source: self.source,
            printer: PrinterName::from(self.printer),
            payload: self.payload,
            run_at,
        })
    }
}

fn unix_seconds_to_datetime(secs: f64) -> Result<DateTime<Utc>, SubmitError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(SubmitError::InvalidRunAt(secs.to_string()));
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        .ok_or_else(|| SubmitError::InvalidRunAt(secs.to_string()))
}

/// One printer as reported by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub name: String,
    pub state: WorkerState,
    pub host: String,
    pub port: u16,
    pub cols: u16,
    #[serde(default)]
    pub pending: usize,
}

/// JSON newline-delimited response. Always carries `ok`; the remaining
/// fields depend on the command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printers: Option<Vec<PrinterStatus>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn status(queue_depth: usize, printers: Vec<PrinterStatus>) -> Self {
        Self {
            ok: true,
            queue_depth: Some(queue_depth),
            printers: Some(printers),
            ..Self::default()
        }
    }

    pub fn submitted(job_id: &JobId) -> Self {
        Self {
            ok: true,
            job_id: Some(job_id.0.clone()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Turn an `ok:false` reply into [`DaemonError::Rejected`].
    pub fn into_result(self) -> Result<Self, DaemonError> {
        if self.ok {
            Ok(self)
        } else {
            Err(DaemonError::Rejected(
                self.error
                    .unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(socket: &Path, request: &Request) -> Result<Response, DaemonError> {
    let mut stream = UnixStream::connect(socket).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        },
        std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset => {
            DaemonError::ConnectionRefused {
                socket: socket.to_path_buf(),
            }
        }
        _ => io_err(socket, err),
    })?;
    stream
        .set_read_timeout(Some(CLIENT_TIMEOUT))
        .map_err(|e| io_err(socket, e))?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: Response = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

pub fn request_status(socket: &Path) -> Result<Response, DaemonError> {
    send_request(socket, &Request::Status)?.into_result()
}

pub fn request_submit(socket: &Path, job: JobSpec) -> Result<JobId, DaemonError> {
    let response = send_request(socket, &Request::Submit { job })?.into_result()?;
    response
        .job_id
        .map(JobId)
        .ok_or_else(|| DaemonError::Protocol("submit reply carried no job_id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let status = serde_json::to_value(Request::Status).expect("encode");
        assert_eq!(status, json!({"cmd": "status"}));

        let submit = Request::Submit {
            job: JobSpec {
                job_type: "text".into(),
                source: "dev".into(),
                printer: "default".into(),
                payload: json!({"body": "hi"}),
                run_at: None,
            },
        };
        assert_eq!(
            serde_json::to_value(submit).expect("encode"),
            json!({"cmd": "submit", "job": {"type": "text", "source": "dev", "printer": "default", "payload": {"body": "hi"}}})
        );
    }

    #[test]
    fn error_response_omits_success_fields() {
        let encoded = serde_json::to_string(&Response::error("unknown_cmd: \"x\"")).expect("encode");
        assert_eq!(encoded, r#"{"ok":false,"error":"unknown_cmd: \"x\""}"#);
    }

    #[test]
    fn submitted_response_shape() {
        let encoded =
            serde_json::to_value(Response::submitted(&JobId::from("abc"))).expect("encode");
        assert_eq!(encoded, json!({"ok": true, "job_id": "abc"}));
    }

    #[test]
    fn job_spec_payload_and_run_at_are_optional() {
        let spec: JobSpec =
            serde_json::from_value(json!({"type": "raw", "source": "pos", "printer": "bar"}))
                .expect("decode");
        assert_eq!(spec.payload, Value::Null);
        let new = spec.into_new_job().expect("convert");
        assert!(new.run_at.is_none());
    }

    #[test]
    fn run_at_seconds_convert_to_utc() {
        let spec = JobSpec {
            job_type: "text".into(),
            source: "dev".into(),
            printer: "default".into(),
            payload: Value::Null,
            run_at: Some(1_700_000_000.5),
        };
        let new = spec.into_new_job().expect("convert");
        let run_at = new.run_at.expect("run_at");
        assert_eq!(run_at.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn negative_run_at_is_rejected() {
        let spec = JobSpec {
            job_type: "text".into(),
            source: "dev".into(),
            printer: "default".into(),
            payload: Value::Null,
            run_at: Some(-5.0),
        };
        let err = spec.into_new_job().unwrap_err();
        assert!(matches!(err, SubmitError::InvalidRunAt(_)));
        assert!(err.to_string().starts_with("invalid_run_at"));
    }

    #[test]
    fn into_result_maps_rejections() {
        let err = Response::error("unknown_printer: x").into_result().unwrap_err();
        assert!(matches!(err, DaemonError::Rejected(ref msg) if msg == "unknown_printer: x"));
    }

    #[test]
    fn missing_socket_reports_not_running() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = send_request(&dir.path().join("absent.sock"), &Request::Status).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }
}
