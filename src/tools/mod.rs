// dailybackup/src/tools/mod.rs
//! Child-process seam for the external copy and database tools.

use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

#[cfg(test)]
pub mod testing;

/// One external command: program plus literal arguments. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ToolInvocation {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Human-readable command line for logs.
    pub fn command_line(&self) -> String {
        let mut line = quote(self.program.as_os_str());
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }
}

fn quote(value: &OsStr) -> String {
    let text = value.to_string_lossy();
    if text.is_empty() || text.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", text.replace('\'', "'\\''"))
    } else {
        text.into_owned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn exit_label(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// A finished invocation together with what it produced.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub invocation: ToolInvocation,
    pub output: ToolOutput,
}

/// Runs an external command to completion and captures its output.
///
/// A non-zero exit is not an error at this level; `Err` is reserved for
/// failures that should abort a run (spawn failure, timeout, cancellation).
pub trait ToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> impl Future<Output = Result<ToolOutput>>;
}

/// Real child-process runner with a per-invocation timeout.
#[derive(Debug, Clone)]
pub struct SystemTool {
    timeout: Duration,
    cancel: CancellationToken,
}

impl SystemTool {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        SystemTool { timeout, cancel }
    }
}

impl ToolRunner for SystemTool {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let command_line = invocation.command_line();
        debug!(command = %command_line, "Running external tool");

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    AppError::ToolNotFound(invocation.program.display().to_string())
                } else {
                    AppError::fs(&invocation.program, e)
                }
            })?;

        // Dropping the wait future kills the child (kill_on_drop).
        let output = tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    return Err(AppError::ToolTimeout {
                        command: command_line,
                        secs: self.timeout.as_secs(),
                    });
                }
            },
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled(command_line)),
        };

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Resolves a tool on PATH, or validates an explicitly configured path.
pub fn find_executable(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => which(path).map_err(|_| {
            AppError::ToolNotFound(format!(
                "{} (configured as {}) is not an executable file",
                name,
                path.display()
            ))
        }),
        None => which(name).map_err(|_| {
            AppError::ToolNotFound(format!(
                "{} executable not found in PATH. Please ensure it is installed and in your PATH.",
                name
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_awkward_args() {
        let inv = ToolInvocation::new("sqlite3")
            .arg("-line")
            .arg("/data/my db.sdb")
            .arg("pragma integrity_check")
            .arg("");
        assert_eq!(
            inv.command_line(),
            "sqlite3 -line '/data/my db.sdb' 'pragma integrity_check' ''"
        );
    }

    #[tokio::test]
    async fn test_system_tool_captures_output_and_exit_code() -> anyhow::Result<()> {
        let tool = SystemTool::new(Duration::from_secs(10), CancellationToken::new());
        let out = tool
            .run(&ToolInvocation::new("sh").arg("-c").arg("echo out; echo err >&2; exit 3"))
            .await?;
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        Ok(())
    }

    #[tokio::test]
    async fn test_system_tool_times_out() {
        let tool = SystemTool::new(Duration::from_millis(100), CancellationToken::new());
        let err = tool
            .run(&ToolInvocation::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ToolTimeout { .. }));
    }

    #[tokio::test]
    async fn test_system_tool_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tool = SystemTool::new(Duration::from_secs(10), cancel);
        let err = tool
            .run(&ToolInvocation::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let tool = SystemTool::new(Duration::from_secs(10), CancellationToken::new());
        let err = tool
            .run(&ToolInvocation::new("/nonexistent/dailybackup-tool"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ToolNotFound(_)));
        assert!(find_executable("dailybackup-no-such-tool", None).is_err());
    }
}
