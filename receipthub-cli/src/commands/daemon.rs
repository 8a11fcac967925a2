//! `rh daemon`: run the daemon in the foreground or validate its config.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use receipthub_core::{load_config, resolve_config_path, summarize_config};
use receipthub_daemon::start_blocking;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground until SIGINT/SIGTERM.
    Start(ConfigArgs),
    /// Load and validate the config, then print its summary.
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config file (default: $RECEIPTHUB_CONFIG or /etc/receipthub/config.yaml).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

pub fn run(command: DaemonCommand) -> Result<ExitCode> {
    match command {
        DaemonCommand::Start(args) => {
            let path = resolve_config_path(args.config);
            let config = load_config(&path).context("Config error")?;
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::CheckConfig(args) => {
            let path = resolve_config_path(args.config);
            let config = load_config(&path).context("Config error")?;
            println!("config ok: {}", path.display());
            println!("{}", summarize_config(&config));
        }
    }
    Ok(ExitCode::SUCCESS)
}
