// dailybackup/src/backup/logic.rs
use chrono::{DateTime, Local};
use std::fs;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::db_snapshot::{DatabaseOutcome, DatabaseSnapshotter, StepStatus};
use super::rotation::{self, GenerationSlot, GenerationStats};
use super::run_log::RunLog;
use super::tree_copy::{self, TreeCopier};
use crate::config::BackupConfig;
use crate::errors::{AppError, Result};
use crate::schedule::{self, Decision, SkipReason};
use crate::state::LastRunStore;
use crate::tools::{SystemTool, ToolRunner, find_executable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Deciding,
    Running,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub weekday: u32,
    pub current_dir: PathBuf,
    pub previous_dir: PathBuf,
    pub tree_copy: StepStatus,
    pub databases: Vec<DatabaseOutcome>,
    pub stats: Option<GenerationStats>,
}

impl RunSummary {
    pub fn failed_databases(&self) -> impl Iterator<Item = &DatabaseOutcome> {
        self.databases.iter().filter(|db| !db.succeeded())
    }

    pub fn fully_succeeded(&self) -> bool {
        !matches!(self.tree_copy, StepStatus::Failed(_)) && self.failed_databases().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Completed(RunSummary),
}

/// Absolute paths of the external tools, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ResolvedTools {
    pub rsync: PathBuf,
    pub sqlite3: PathBuf,
}

impl ResolvedTools {
    pub fn resolve(config: &BackupConfig) -> Result<Self> {
        let rsync = find_executable("rsync", config.rsync_path.as_deref())?;
        let sqlite3 = find_executable("sqlite3", config.sqlite3_path.as_deref())?;
        debug!("Using rsync at {} and sqlite3 at {}", rsync.display(), sqlite3.display());
        Ok(ResolvedTools { rsync, sqlite3 })
    }
}

/// Per-event backup driver: decides whether today's backup is due and, if
/// so, runs rotation, tree copy and the database sequence.
pub struct Orchestrator<R: ToolRunner> {
    config: BackupConfig,
    store: LastRunStore,
    runner: R,
    copier: TreeCopier,
    snapshotter: DatabaseSnapshotter,
    cancel: CancellationToken,
    state: RunState,
}

impl Orchestrator<SystemTool> {
    pub fn with_system_tools(config: BackupConfig, cancel: CancellationToken) -> Result<Self> {
        let tools = ResolvedTools::resolve(&config)?;
        let runner = SystemTool::new(config.tool_timeout, cancel.clone());
        Orchestrator::new(config, runner, tools, cancel)
    }
}

impl<R: ToolRunner> Orchestrator<R> {
    pub fn new(
        config: BackupConfig,
        runner: R,
        tools: ResolvedTools,
        cancel: CancellationToken,
    ) -> Result<Self> {
        fs::create_dir_all(&config.working_dir)
            .map_err(|e| AppError::fs(&config.working_dir, e))?;
        info!("'backup log file': {}.", config.log_path().display());
        info!("'backup error file': {}.", config.err_path().display());

        Ok(Orchestrator {
            store: LastRunStore::new(config.last_run_path()),
            copier: TreeCopier::new(tools.rsync, &config),
            snapshotter: DatabaseSnapshotter::new(tools.sqlite3),
            config,
            runner,
            cancel,
            state: RunState::Idle,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    /// Handles one "new data recorded" trigger observed at `now`.
    pub async fn on_new_record(&mut self, now: DateTime<Local>) -> Result<RunOutcome> {
        self.state = RunState::Deciding;
        let result = self.decide_and_run(now).await;
        self.state = RunState::Idle;
        result
    }

    async fn decide_and_run(&mut self, now: DateTime<Local>) -> Result<RunOutcome> {
        let today = now.date_naive();
        let last_run = self.store.get(today)?;

        let decision = schedule::decide(
            &self.config.window,
            now.time(),
            last_run,
            today,
            self.config.force_backup,
        );
        let forced = match decision {
            Decision::Skip(reason) => {
                debug!("Backup not due at {}: {}", now.format("%H:%M:%S"), reason);
                return Ok(RunOutcome::Skipped(reason));
            }
            Decision::Run { forced } => forced,
        };

        info!(forced, "Backup started.");
        // Persisted first: a crash mid-run must not cause a second run today.
        self.store.set(today)?;
        self.state = RunState::Running;

        let summary = self.do_backup(now).await?;
        if summary.fully_succeeded() {
            info!("Backup completed.");
        } else {
            warn!(
                failed_databases = summary.failed_databases().count(),
                "Backup completed with failures, see {}.",
                self.config.err_path().display()
            );
        }
        Ok(RunOutcome::Completed(summary))
    }

    async fn do_backup(&self, now: DateTime<Local>) -> Result<RunSummary> {
        let mut log = RunLog::open(&self.config.log_path(), &self.config.err_path(), now)?;
        match self.execute(&mut log, now).await {
            Ok(summary) => {
                log.finish()?;
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Backup aborted");
                // The run is already failing; the log gets what it can.
                let _ = log.problem(&format!("Backup aborted: {}", e));
                let _ = log.finish();
                Err(e)
            }
        }
    }

    async fn execute(&self, log: &mut RunLog, now: DateTime<Local>) -> Result<RunSummary> {
        let slot = GenerationSlot::for_date(now.date_naive());
        log.note(&format!("Rotating generation for weekday {}", slot.weekday()))?;
        let (current_dir, previous_dir) = rotation::rotate(&self.config.working_dir, slot)?;
        self.check_cancelled("tree copy")?;

        let pattern = tree_copy::source_pattern(&self.config.source_root);
        log.note(&format!("Copying {} into {}", pattern, current_dir.display()))?;
        let tree_copy = match self.copier.copy_tree(&self.runner, &[pattern], &current_dir).await? {
            Some(run) => {
                log.record(&run.invocation, None, &run.output)?;
                if run.output.success() {
                    StepStatus::Ok
                } else {
                    StepStatus::Failed(format!("exit code {}", run.output.exit_label()))
                }
            }
            None => {
                log.note("Source tree is empty, nothing copied")?;
                StepStatus::Skipped("no source entries".into())
            }
        };

        let db_dir = current_dir.join(&self.config.db_location);
        fs::create_dir_all(&db_dir).map_err(|e| AppError::fs(&db_dir, e))?;

        let mut databases = Vec::with_capacity(self.config.db_names.len());
        for name in &self.config.db_names {
            self.check_cancelled(name)?;
            let source = self.config.source_db_path(name);
            let destination = db_dir.join(name);
            let outcome = self
                .snapshotter
                .backup_database(&self.runner, log, name, &source, &destination)
                .await?;
            databases.push(outcome);
        }

        let stats = match rotation::generation_stats(&current_dir) {
            Ok(stats) => {
                log.note(&format!(
                    "Generation {} holds {} files, {} bytes",
                    current_dir.display(),
                    stats.files,
                    stats.bytes
                ))?;
                Some(stats)
            }
            Err(e) => {
                warn!(error = %e, "Could not measure {}", current_dir.display());
                None
            }
        };

        Ok(RunSummary {
            weekday: slot.weekday(),
            current_dir,
            previous_dir,
            tree_copy,
            databases,
            stats,
        })
    }

    fn check_cancelled(&self, next_step: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!("before {}", next_step)));
        }
        Ok(())
    }
}
