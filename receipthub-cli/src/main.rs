//! ReceiptHub CLI.
//!
//! # Usage
//!
//! ```text
//! rh daemon start [--config <path>]
//! rh daemon check-config [--config <path>]
//! rh status [--socket <path>] [--json]
//! rh submit --printer <name> [--type text] [--source cli] [--body <text> | --payload <json>]
//!           [--run-at <unix secs> | --delay <secs>] [--socket <path>]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, status::StatusArgs, submit::SubmitArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rh",
    version,
    about = "ReceiptHub CLI",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or check the ReceiptHub daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Query daemon status.
    Status(StatusArgs),

    /// Submit a print job.
    Submit(SubmitArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result: Result<ExitCode> = match cli.command {
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Status(args) => args.run(),
        Commands::Submit(args) => args.run(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
