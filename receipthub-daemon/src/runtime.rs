use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use receipthub_core::{summarize_config, Config};

use crate::error::{io_err, DaemonError};
use crate::paths::{APP_NAME, LOG_FORMAT_ENV};
use crate::registry::PrinterRegistry;
use crate::server::{remove_socket, ControlServer};
use crate::shutdown::install_shutdown_handler;
use crate::worker::{JobProcessor, LogProcessor, PrinterWorkerPool};

/// Daemon orchestration: owns startup and shutdown ordering.
///
/// Startup: bind socket → start workers → accept connections.
/// Shutdown: stop accepting → cancel and drain workers → remove socket.
pub struct Daemon {
    config: Config,
    processor: Arc<dyn JobProcessor>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            processor: Arc::new(LogProcessor::default()),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn JobProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Run until `shutdown` is cancelled. A startup failure returns before
    /// any worker is spawned and leaves no socket file behind.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        tracing::info!("{APP_NAME} daemon starting");
        self.config.validate()?;
        tracing::info!("{}", summarize_config(&self.config));

        let registry = Arc::new(PrinterRegistry::from_config(&self.config.printers));
        let server = ControlServer::bind(&self.config.socket, registry.clone())?;
        let socket = server.socket_path().to_path_buf();
        tracing::info!("UDS listening at {}", socket.display());

        let pool = PrinterWorkerPool::start(&registry, self.processor);
        tracing::info!(workers = ?pool.worker_names(), "workers started");

        let server = server.spawn();
        tracing::info!("accepting commands: status, submit");

        shutdown.cancelled().await;
        tracing::info!("shutdown requested; no longer accepting connections");

        let server_result = server.stop().await;
        pool.stop().await;

        let pending = registry.depth();
        if pending > 0 {
            tracing::warn!(pending, "discarding jobs still pending at shutdown");
        }

        let removed = remove_socket(&socket);
        server_result?;
        removed?;
        tracing::info!("{APP_NAME} daemon exited cleanly");
        Ok(())
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async move {
        let shutdown = install_shutdown_handler()?;
        Daemon::new(config).run(shutdown).await
    })
}

/// Install the global subscriber. `RUST_LOG` filters (default `info`);
/// `RECEIPTHUB_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
