//! `rh status`: queue depth and per-printer worker state.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use receipthub_daemon::paths::default_socket_path;
use receipthub_daemon::{request_status, PrinterStatus, Response, WorkerState};

use super::client_failure;

/// Arguments for `rh status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path to UDS (default: ./run/receipthub.sock or $RECEIPTHUB_SOCKET).
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Emit the raw status reply as pretty JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PrinterRow {
    #[tabled(rename = "printer")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "address")]
    address: String,
    #[tabled(rename = "cols")]
    cols: u16,
    #[tabled(rename = "pending")]
    pending: usize,
}

impl StatusArgs {
    pub fn run(self) -> Result<ExitCode> {
        let socket = self.socket.unwrap_or_else(default_socket_path);
        let response = match request_status(&socket) {
            Ok(response) => response,
            Err(err) => return Ok(client_failure(&err)),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&response).context("failed to render status JSON")?
            );
        } else {
            print_table(response);
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_table(response: Response) {
    let printers = response.printers.unwrap_or_default();
    println!(
        "ReceiptHub | queue depth {} | {} printers",
        response.queue_depth.unwrap_or(0),
        printers.len(),
    );
    if printers.is_empty() {
        return;
    }

    println!(
        "Workers: {} {}",
        summarize_states(&printers),
        "(idle / busy / stopped)".bright_black()
    );
    let rows: Vec<PrinterRow> = printers
        .into_iter()
        .map(|p| PrinterRow {
            address: format!("{}:{}", p.host, p.port),
            state: p.state.as_str().to_string(),
            name: p.name,
            cols: p.cols,
            pending: p.pending,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn summarize_states(printers: &[PrinterStatus]) -> String {
    let count = |state: WorkerState| printers.iter().filter(|p| p.state == state).count();
    format!(
        "{} / {} / {}",
        count(WorkerState::Idle).to_string().green().bold(),
        count(WorkerState::Busy).to_string().yellow().bold(),
        count(WorkerState::Stopped).to_string().red().bold(),
    )
}
