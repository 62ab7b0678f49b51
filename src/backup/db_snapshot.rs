// dailybackup/src/backup/db_snapshot.rs
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::run_log::RunLog;
use crate::errors::Result;
use crate::tools::{ToolInvocation, ToolOutput, ToolRun, ToolRunner};

/// How long `sqlite3` waits on a locked source before giving up, in ms.
pub const BUSY_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    Failed(String),
    Skipped(String),
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Ok)
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub run: ToolRun,
    pub status: StepStatus,
}

/// Result of the check → snapshot → check sequence for one database.
#[derive(Debug, Clone)]
pub struct DatabaseOutcome {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub source_check: StepStatus,
    pub snapshot: StepStatus,
    pub destination_check: StepStatus,
}

impl DatabaseOutcome {
    pub fn succeeded(&self) -> bool {
        self.source_check.is_ok() && self.snapshot.is_ok() && self.destination_check.is_ok()
    }
}

/// Integrity checks and online copies of SQLite files through the `sqlite3` shell.
#[derive(Debug, Clone)]
pub struct DatabaseSnapshotter {
    sqlite3: PathBuf,
}

impl DatabaseSnapshotter {
    pub fn new(sqlite3: PathBuf) -> Self {
        DatabaseSnapshotter { sqlite3 }
    }

    /// Opened read-only so a missing file is reported instead of created.
    pub fn integrity_invocation(&self, db: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.sqlite3)
            .args(["-readonly", "-line"])
            .arg(db)
            .arg("pragma integrity_check")
    }

    /// Uses the SQLite online backup API, so writers on the source never
    /// leave a torn copy.
    pub fn snapshot_invocation(&self, source: &Path, destination: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.sqlite3)
            .arg("-cmd")
            .arg(format!(".timeout {}", BUSY_TIMEOUT_MS))
            .arg(source)
            .arg(format!(".backup main {}", dot_command_quote(destination)))
    }

    pub async fn check_integrity<R: ToolRunner>(&self, runner: &R, db: &Path) -> Result<StepReport> {
        let invocation = self.integrity_invocation(db);
        debug!(command = %invocation.command_line(), "Checking database integrity");
        let output = runner.run(&invocation).await?;
        let status = integrity_status(&output);
        if let StepStatus::Failed(reason) = &status {
            error!(
                command = %invocation.command_line(),
                stderr = %output.stderr.trim_end(),
                "Integrity check of {} failed: {}",
                db.display(),
                reason
            );
        }
        Ok(StepReport {
            run: ToolRun { invocation, output },
            status,
        })
    }

    pub async fn snapshot<R: ToolRunner>(
        &self,
        runner: &R,
        source: &Path,
        destination: &Path,
    ) -> Result<StepReport> {
        let invocation = self.snapshot_invocation(source, destination);
        debug!(command = %invocation.command_line(), "Snapshotting database");
        let output = runner.run(&invocation).await?;
        let status = if output.success() {
            StepStatus::Ok
        } else {
            error!(
                command = %invocation.command_line(),
                stderr = %output.stderr.trim_end(),
                "{} had a return code of {}",
                invocation.command_line(),
                output.exit_label()
            );
            StepStatus::Failed(format!("exit code {}", output.exit_label()))
        };
        Ok(StepReport {
            run: ToolRun { invocation, output },
            status,
        })
    }

    /// Verifies the source, snapshots it to `destination`, verifies the copy.
    ///
    /// Tool failures are recorded in the outcome and the run log; only
    /// run-aborting errors (log I/O, timeout, cancellation) are returned.
    pub async fn backup_database<R: ToolRunner>(
        &self,
        runner: &R,
        log: &mut RunLog,
        name: &str,
        source: &Path,
        destination: &Path,
    ) -> Result<DatabaseOutcome> {
        info!("Backing up database {} to {}", source.display(), destination.display());
        let mut outcome = DatabaseOutcome {
            name: name.to_string(),
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            source_check: StepStatus::Skipped("not started".into()),
            snapshot: StepStatus::Skipped("not started".into()),
            destination_check: StepStatus::Skipped("not started".into()),
        };

        if !source.is_file() {
            let reason = format!("database file {} does not exist", source.display());
            error!("{}", reason);
            log.problem(&reason)?;
            outcome.source_check = StepStatus::Failed(reason);
            return Ok(outcome);
        }

        let report = self.check_integrity(runner, source).await?;
        log.record(&report.run.invocation, Some(source), &report.run.output)?;
        outcome.source_check = report.status;

        let report = self.snapshot(runner, source, destination).await?;
        log.record(&report.run.invocation, Some(source), &report.run.output)?;
        outcome.snapshot = report.status;

        if destination.is_file() {
            let report = self.check_integrity(runner, destination).await?;
            log.record(&report.run.invocation, Some(destination), &report.run.output)?;
            outcome.destination_check = report.status;
        } else {
            let reason = format!("no snapshot produced at {}", destination.display());
            log.problem(&reason)?;
            outcome.destination_check = StepStatus::Skipped(reason);
        }

        Ok(outcome)
    }
}

/// `pragma integrity_check` exits 0 even when it finds problems, so the
/// report itself must read `ok`.
fn integrity_status(output: &ToolOutput) -> StepStatus {
    if !output.success() {
        return StepStatus::Failed(format!("exit code {}", output.exit_label()));
    }
    let findings: Vec<&str> = output
        .stdout
        .lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix("integrity_check")
                .map(|rest| rest.trim_start().trim_start_matches('=').trim())
                .unwrap_or(line)
        })
        .filter(|line| !line.is_empty())
        .collect();
    match findings.as_slice() {
        ["ok"] => StepStatus::Ok,
        [] => StepStatus::Failed("empty integrity report".into()),
        _ => StepStatus::Failed(findings.join("; ")),
    }
}

/// Double-quoted argument for a `sqlite3` dot-command.
fn dot_command_quote(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{ScriptedTool, failed, mentions, ok};
    use chrono::Local;
    use std::fs;
    use tempfile::tempdir;

    fn snapshotter() -> DatabaseSnapshotter {
        DatabaseSnapshotter::new(PathBuf::from("sqlite3"))
    }

    #[test]
    fn test_invocations() {
        let s = snapshotter();
        assert_eq!(
            s.integrity_invocation(Path::new("/srv/archive/weewx.sdb")).command_line(),
            "sqlite3 -readonly -line /srv/archive/weewx.sdb 'pragma integrity_check'"
        );
        assert_eq!(
            s.snapshot_invocation(Path::new("/srv/archive/weewx.sdb"), Path::new("/b/bkup0/archive/weewx.sdb"))
                .command_line(),
            "sqlite3 -cmd '.timeout 30000' /srv/archive/weewx.sdb '.backup main \"/b/bkup0/archive/weewx.sdb\"'"
        );
    }

    #[test]
    fn test_integrity_report_parsing() {
        assert_eq!(integrity_status(&ok("integrity_check = ok\n")), StepStatus::Ok);
        assert_eq!(integrity_status(&ok("ok\n")), StepStatus::Ok);
        assert!(matches!(
            integrity_status(&ok("integrity_check = *** in database main ***\nintegrity_check = Page 4 is never used\n")),
            StepStatus::Failed(_)
        ));
        assert!(matches!(integrity_status(&ok("")), StepStatus::Failed(_)));
        assert!(matches!(
            integrity_status(&failed(1, "Error: file is not a database")),
            StepStatus::Failed(_)
        ));
    }

    #[test]
    fn test_dot_command_quote_escapes() {
        assert_eq!(dot_command_quote(Path::new("/a b/\"c\"")), "\"/a b/\\\"c\\\"\"");
    }

    #[tokio::test]
    async fn test_full_sequence_records_three_steps() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("weewx.sdb");
        let destination = dir.path().join("copy/weewx.sdb");
        fs::create_dir_all(destination.parent().unwrap())?;
        fs::write(&source, b"SQLite format 3\0")?;

        let dest_for_tool = destination.clone();
        let tool = ScriptedTool::new(move |inv| {
            if mentions(inv, ".backup") {
                fs::write(&dest_for_tool, b"SQLite format 3\0")?;
            }
            Ok(ok("integrity_check = ok\n"))
        });
        let mut log = RunLog::open(&dir.path().join("out.txt"), &dir.path().join("err.txt"), Local::now())?;

        let outcome = snapshotter()
            .backup_database(&tool, &mut log, "weewx.sdb", &source, &destination)
            .await?;
        log.finish()?;

        assert!(outcome.succeeded());
        let calls = tool.calls();
        assert_eq!(calls.len(), 3);
        assert!(mentions(&calls[0], "pragma integrity_check"));
        assert_eq!(calls[0].args[2], source.as_os_str());
        assert!(mentions(&calls[1], ".backup main"));
        assert_eq!(calls[2].args[2], destination.as_os_str());

        let out = fs::read_to_string(dir.path().join("out.txt"))?;
        assert!(out.contains(&format!("{}\nintegrity_check = ok", source.display())));
        assert!(out.contains(&format!("{}\nintegrity_check = ok", destination.display())));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_snapshot_skips_destination_check() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("weewx.sdb");
        fs::write(&source, b"SQLite format 3\0")?;
        let tool = ScriptedTool::new(|inv| {
            if mentions(inv, ".backup") {
                Ok(failed(1, "Error: database is locked"))
            } else {
                Ok(ok("integrity_check = ok\n"))
            }
        });
        let mut log = RunLog::open(&dir.path().join("out.txt"), &dir.path().join("err.txt"), Local::now())?;

        let outcome = snapshotter()
            .backup_database(&tool, &mut log, "weewx.sdb", &source, &dir.path().join("missing/weewx.sdb"))
            .await?;
        log.finish()?;

        assert!(outcome.source_check.is_ok());
        assert!(matches!(outcome.snapshot, StepStatus::Failed(_)));
        assert!(matches!(outcome.destination_check, StepStatus::Skipped(_)));
        assert_eq!(tool.calls().len(), 2);
        let err = fs::read_to_string(dir.path().join("err.txt"))?;
        assert!(err.contains("Error: database is locked"));
        assert!(err.contains("no snapshot produced"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_source_never_invokes_sqlite() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let tool = ScriptedTool::succeeding("integrity_check = ok\n");
        let mut log = RunLog::open(&dir.path().join("out.txt"), &dir.path().join("err.txt"), Local::now())?;

        let outcome = snapshotter()
            .backup_database(&tool, &mut log, "gone.sdb", &dir.path().join("gone.sdb"), &dir.path().join("c.sdb"))
            .await?;

        assert!(!outcome.succeeded());
        assert!(tool.calls().is_empty());
        assert!(!dir.path().join("gone.sdb").exists());
        Ok(())
    }
}
