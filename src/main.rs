//! Daily Backup Tool
//!
//! Standalone host for the backup orchestrator: loads the config, then
//! delivers one synthetic "new record" event (or one per stdin line).

// dailybackup/src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dailybackup::backup::{self, EventSource};
use dailybackup::config::{RawJsonConfig, load_backup_config_from_json};
use dailybackup::utils::setup_logging;

#[derive(Parser, Debug)]
#[command(name = "dailybackup", version, about = "Rotating daily backup of a code tree and its SQLite databases")]
struct Cli {
    /// Force the backup to run.
    #[arg(long = "force-backup")]
    force_backup: bool,

    /// Run even when the configuration sets "enable": false (a missing
    /// "enable" key already counts as enabled).
    #[arg(long)]
    enable: bool,

    /// Debug-level diagnostics.
    #[arg(short, long)]
    verbose: bool,

    /// Treat every line on stdin as a new-record event instead of firing once.
    #[arg(long)]
    events_from_stdin: bool,

    /// JSON configuration file.
    config_file: PathBuf,
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    info!("Version is {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::path::absolute(&cli.config_file)
        .with_context(|| format!("Invalid config path {}", cli.config_file.display()))?;
    let mut raw_config = RawJsonConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            config_path.display()
        )
    })?;

    if cli.force_backup {
        raw_config.force_backup = Some(true);
    }
    if cli.enable {
        raw_config.enable = Some(true);
    }
    if !raw_config.is_enabled() {
        info!("Backup is not enabled, exiting");
        return Ok(());
    }

    let config_dir = config_path.parent().unwrap_or(Path::new("/"));
    let backup_config = load_backup_config_from_json(&raw_config, config_dir)
        .context("Failed to load backup configuration from JSON")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling the current run");
            on_signal.cancel();
        }
    });

    let events = if cli.events_from_stdin {
        EventSource::Stdin
    } else {
        EventSource::Once
    };
    backup::run_backup_flow(backup_config, events, cancel)
        .await
        .context("Backup process failed")?;
    Ok(())
}
