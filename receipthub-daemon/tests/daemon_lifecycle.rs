//! End-to-end daemon behaviour over a real UNIX socket in a temp dir.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use receipthub_core::{Config, Job, PrinterConfig, PrinterName, SocketConfig};
use receipthub_daemon::{Daemon, DaemonError, JobProcessor, ProcessError};

/// Holds every job until a permit is released, recording sources in
/// completion order.
struct Held {
    permits: Semaphore,
    done: Mutex<Vec<String>>,
}

impl Held {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: Semaphore::new(0),
            done: Mutex::new(Vec::new()),
        })
    }

    fn done(&self) -> Vec<String> {
        self.done.lock().clone()
    }
}

#[async_trait]
impl JobProcessor for Held {
    async fn process(&self, _printer: &PrinterConfig, job: &Job) -> Result<(), ProcessError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ProcessError::Crashed(e.to_string()))?;
        permit.forget();
        self.done.lock().push(job.source().to_string());
        Ok(())
    }
}

fn config(socket: PathBuf) -> Config {
    Config {
        socket: SocketConfig {
            path: socket,
            mode: 0o600,
            group: None,
            read_timeout_secs: 5,
        },
        printers: ["default", "bar"]
            .into_iter()
            .map(|name| PrinterConfig {
                name: PrinterName::from(name),
                host: "127.0.0.1".to_string(),
                port: 9100,
                cols: 42,
            })
            .collect(),
    }
}

struct Running {
    _dir: TempDir,
    socket: PathBuf,
    token: CancellationToken,
    handle: JoinHandle<Result<(), DaemonError>>,
}

async fn start(processor: Arc<Held>) -> Running {
    let dir = TempDir::new().expect("tempdir");
    let socket = dir.path().join("run").join("receipthub.sock");
    let token = CancellationToken::new();
    let handle = tokio::spawn(
        Daemon::new(config(socket.clone()))
            .with_processor(processor)
            .run(token.clone()),
    );

    wait_until(|| async { try_roundtrip(&socket, r#"{"cmd":"status"}"#).await.is_some() }).await;
    Running {
        _dir: dir,
        socket,
        token,
        handle,
    }
}

async fn try_roundtrip(socket: &Path, line: &str) -> Option<Value> {
    let mut stream = UnixStream::connect(socket).await.ok()?;
    stream.write_all(line.as_bytes()).await.ok()?;
    stream.write_all(b"\n").await.ok()?;
    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(3), stream.read_to_string(&mut reply))
        .await
        .ok()?
        .ok()?;
    serde_json::from_str(reply.trim_end()).ok()
}

async fn roundtrip(socket: &Path, line: &str) -> Value {
    try_roundtrip(socket, line).await.expect("daemon replied")
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn submit_line(source: &str, printer: &str, run_at: Option<f64>) -> String {
    let mut job = json!({"type": "text", "source": source, "printer": printer, "payload": {"body": "hi"}});
    if let Some(run_at) = run_at {
        job["run_at"] = json!(run_at);
    }
    json!({"cmd": "submit", "job": job}).to_string()
}

fn printer_state(status: &Value, name: &str) -> String {
    status["printers"]
        .as_array()
        .expect("printers")
        .iter()
        .find(|p| p["name"] == name)
        .and_then(|p| p["state"].as_str())
        .expect("state")
        .to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_increases_depth_until_the_worker_dequeues() {
    let held = Held::new();
    let daemon = start(held.clone()).await;

    // Occupy the worker so the next job stays pending.
    let first = roundtrip(&daemon.socket, &submit_line("blocker", "default", None)).await;
    assert_eq!(first["ok"], json!(true));
    wait_until(|| async {
        printer_state(&roundtrip(&daemon.socket, r#"{"cmd":"status"}"#).await, "default") == "busy"
    })
    .await;

    let before = roundtrip(&daemon.socket, r#"{"cmd":"status"}"#).await["queue_depth"]
        .as_u64()
        .expect("depth");
    let reply = roundtrip(
        &daemon.socket,
        r#"{"cmd":"submit","job":{"type":"text","source":"dev","printer":"default","payload":{"body":"hi"}}}"#,
    )
    .await;
    assert_eq!(reply["ok"], json!(true));
    assert!(reply["job_id"].as_str().is_some_and(|id| !id.is_empty()));

    let status = roundtrip(&daemon.socket, r#"{"cmd":"status"}"#).await;
    assert_eq!(status["queue_depth"].as_u64(), Some(before + 1));
    assert_eq!(status["printers"][0]["name"], json!("default"));
    assert_eq!(status["printers"][0]["port"], json!(9100));
    assert_eq!(printer_state(&status, "bar"), "idle");

    held.permits.add_permits(2);
    wait_until(|| async { held.done().len() == 2 }).await;
    let status = roundtrip(&daemon.socket, r#"{"cmd":"status"}"#).await;
    assert_eq!(status["queue_depth"], json!(0));

    daemon.token.cancel();
    daemon.handle.await.expect("join").expect("clean exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_printer_is_rejected_and_depth_unchanged() {
    let held = Held::new();
    let daemon = start(held).await;

    let reply = roundtrip(&daemon.socket, &submit_line("dev", "nonexistent", None)).await;
    assert_eq!(reply["ok"], json!(false));
    assert!(reply["error"].as_str().expect("error").contains("nonexistent"));

    let status = roundtrip(&daemon.socket, r#"{"cmd":"status"}"#).await;
    assert_eq!(status["queue_depth"], json!(0));

    let reply = roundtrip(&daemon.socket, "{broken").await;
    assert_eq!(reply["ok"], json!(false));
    assert!(reply["error"].as_str().expect("error").contains("invalid_json"));

    daemon.token.cancel();
    daemon.handle.await.expect("join").expect("clean exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_run_at_jobs_are_processed_in_submission_order() {
    let held = Held::new();
    let daemon = start(held.clone()).await;

    let run_at = chrono::Utc::now().timestamp_millis() as f64 / 1000.0 + 0.3;
    for source in ["one", "two", "three"] {
        let reply = roundtrip(&daemon.socket, &submit_line(source, "default", Some(run_at))).await;
        assert_eq!(reply["ok"], json!(true));
    }

    held.permits.add_permits(3);
    wait_until(|| async { held.done().len() == 3 }).await;
    assert_eq!(held.done(), vec!["one", "two", "three"]);

    daemon.token.cancel();
    daemon.handle.await.expect("join").expect("clean exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_finishes_in_flight_job_and_removes_socket() {
    let held = Held::new();
    let daemon = start(held.clone()).await;

    roundtrip(&daemon.socket, &submit_line("in-flight", "default", None)).await;
    roundtrip(&daemon.socket, &submit_line("queued", "default", None)).await;
    wait_until(|| async {
        printer_state(&roundtrip(&daemon.socket, r#"{"cmd":"status"}"#).await, "default") == "busy"
    })
    .await;

    daemon.token.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!daemon.handle.is_finished(), "stop waits for the in-flight job");
    held.permits.add_permits(5);

    daemon.handle.await.expect("join").expect("clean exit");
    assert_eq!(held.done(), vec!["in-flight"]);
    assert!(!daemon.socket.exists(), "socket removed on shutdown");
}

#[tokio::test]
async fn startup_failure_leaves_no_socket_behind() {
    let dir = TempDir::new().expect("tempdir");
    let socket = dir.path().join("rh.sock");

    let mut bad_group = config(socket.clone());
    bad_group.socket.group = Some("receipthub-no-such-group".to_string());
    let err = Daemon::new(bad_group)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::UnknownGroup(_)), "got: {err}");
    assert!(!socket.exists());

    let mut no_printers = config(socket.clone());
    no_printers.printers.clear();
    let err = Daemon::new(no_printers)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
    assert!(!socket.exists());
}
