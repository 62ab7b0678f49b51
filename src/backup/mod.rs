mod logic;
pub mod db_snapshot; // sqlite3 integrity checks and online copies
pub mod rotation;    // per-weekday current/previous generations
pub mod run_log;     // backup.txt / backup_err.txt
pub mod tree_copy;   // rsync mirror of the source tree

pub use logic::{Orchestrator, ResolvedTools, RunOutcome, RunState, RunSummary};

use chrono::Local;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::BackupConfig;
use crate::errors::{AppError, Result};
use crate::tools::ToolRunner;

/// Where trigger events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// A single synthetic event at the current time.
    Once,
    /// One event per line read from stdin, until EOF.
    Stdin,
}

/// Public entry point for the backup process.
pub async fn run_backup_flow(
    config: BackupConfig,
    events: EventSource,
    cancel: CancellationToken,
) -> Result<()> {
    let mut orchestrator = Orchestrator::with_system_tools(config, cancel.clone())?;
    match events {
        EventSource::Once => {
            let outcome = orchestrator.on_new_record(Local::now()).await?;
            report(&outcome);
            Ok(())
        }
        EventSource::Stdin => {
            pump_events(&mut orchestrator, BufReader::new(tokio::io::stdin()), &cancel).await
        }
    }
}

/// Treats every line from `reader` as one new-record event until EOF.
async fn pump_events<R, S>(
    orchestrator: &mut Orchestrator<R>,
    reader: S,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: ToolRunner,
    S: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = cancel.cancelled() => return Err(AppError::Cancelled("event stream".into())),
        };
        let Some(line) = line else {
            info!("Event stream closed.");
            return Ok(());
        };
        debug!(event = %line.trim(), "Received new record event");
        handle_streamed_event(orchestrator).await?;
    }
}

/// Run-level failures are logged and the stream keeps going; cancellation
/// ends it.
async fn handle_streamed_event<R: ToolRunner>(orchestrator: &mut Orchestrator<R>) -> Result<()> {
    match orchestrator.on_new_record(Local::now()).await {
        Ok(outcome) => {
            report(&outcome);
            Ok(())
        }
        Err(e @ AppError::Cancelled(_)) => Err(e),
        Err(e) => {
            error!(error = %e, "Backup run failed, waiting for the next event");
            Ok(())
        }
    }
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Skipped(reason) => debug!("No backup: {}", reason),
        RunOutcome::Completed(summary) => {
            for db in summary.failed_databases() {
                error!(
                    database = %db.name,
                    source_check = ?db.source_check,
                    snapshot = ?db.snapshot,
                    destination_check = ?db.destination_check,
                    "Database backup incomplete"
                );
            }
            if let Some(stats) = summary.stats {
                info!(
                    files = stats.files,
                    bytes = stats.bytes,
                    "Generation {} written",
                    summary.current_dir.display()
                );
            }
        }
    }
}
