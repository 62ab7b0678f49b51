// dailybackup/src/backup/run_log.rs
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{AppError, Result};
use crate::tools::{ToolInvocation, ToolOutput};

/// The per-run pair of text logs: combined tool stdout and combined stderr.
///
/// Both files are truncated when the run starts and begin with the run
/// timestamp. Buffers are flushed on `finish` and, best effort, on drop.
pub struct RunLog {
    out: BufWriter<File>,
    err: BufWriter<File>,
    out_path: PathBuf,
    err_path: PathBuf,
}

impl RunLog {
    pub fn open(out_path: &Path, err_path: &Path, started: DateTime<Local>) -> Result<Self> {
        let out = File::create(out_path).map_err(|e| AppError::fs(out_path, e))?;
        let err = File::create(err_path).map_err(|e| AppError::fs(err_path, e))?;
        let mut log = RunLog {
            out: BufWriter::new(out),
            err: BufWriter::new(err),
            out_path: out_path.to_path_buf(),
            err_path: err_path.to_path_buf(),
        };
        let header = started.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        log.write_out(&header)?;
        log.write_err(&header)?;
        Ok(log)
    }

    /// Progress line, log file only.
    pub fn note(&mut self, message: &str) -> Result<()> {
        let line = format!("{} {}", stamp(), message);
        self.write_out(&line)
    }

    /// Problem line, error file only.
    pub fn problem(&mut self, message: &str) -> Result<()> {
        let line = format!("{} {}", stamp(), message);
        self.write_err(&line)
    }

    /// Appends one tool invocation and its captured streams.
    ///
    /// `tag` names the subject (e.g. the database path) and is written ahead
    /// of the output in both files.
    pub fn record(
        &mut self,
        invocation: &ToolInvocation,
        tag: Option<&Path>,
        output: &ToolOutput,
    ) -> Result<()> {
        let command = format!("{} $ {}", stamp(), invocation.command_line());
        self.write_out(&command)?;
        self.write_err(&command)?;
        if !output.success() {
            self.write_err(&format!(
                "{} had a return code of {}",
                invocation.command_line(),
                output.exit_label()
            ))?;
        }
        if let Some(tag) = tag {
            let tag = tag.display().to_string();
            self.write_out(&tag)?;
            self.write_err(&tag)?;
        }
        self.write_out(output.stdout.trim_end())?;
        self.write_err(output.stderr.trim_end())?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| AppError::fs(&self.out_path, e))?;
        self.err.flush().map_err(|e| AppError::fs(&self.err_path, e))?;
        Ok(())
    }

    fn write_out(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "{}", text).map_err(|e| AppError::fs(&self.out_path, e))
    }

    fn write_err(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        writeln!(self.err, "{}", text).map_err(|e| AppError::fs(&self.err_path, e))
    }
}

fn stamp() -> String {
    Local::now().format("[%H:%M:%S]").to_string()
}
