// dailybackup/src/backup/tree_copy.rs
use glob::{MatchOptions, Pattern, glob_with};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::errors::{AppError, Result};
use crate::tools::{ToolInvocation, ToolRun, ToolRunner};

/// Paths never mirrored into a generation: trash, earlier backups, live
/// database archives, runtime state, filesystem recovery and VCS metadata.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".Trash*/",
    "*bkup/",
    "bkup[0-6]/",
    "prevbkup[0-6]/",
    "archive*/",
    "run/",
    "lost+found/",
    ".git/",
];

/// Mirrors the source tree into a generation with `rsync`.
#[derive(Debug, Clone)]
pub struct TreeCopier {
    rsync: PathBuf,
    verbose: Vec<String>,
    excludes: Vec<String>,
}

impl TreeCopier {
    pub fn new(rsync: PathBuf, config: &BackupConfig) -> Self {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();

        let db_dir = format!("{}/", config.db_location.display());
        if !Pattern::new("archive*/").is_ok_and(|p| p.matches(&db_dir)) {
            excludes.push(db_dir);
        }

        // Keep the backups themselves out of the copy when they live under the source.
        if let Ok(relative) = config.working_dir.strip_prefix(&config.source_root) {
            if !relative.as_os_str().is_empty() {
                excludes.push(format!("/{}/", relative.display()));
            }
        }

        excludes.extend(config.extra_excludes.iter().cloned());

        TreeCopier {
            rsync,
            verbose: config.verbose.split_whitespace().map(str::to_string).collect(),
            excludes,
        }
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Builds the rsync command: preserve permissions and times, follow
    /// symlinks, recurse, skip the exclusion set.
    pub fn invocation(&self, sources: &[PathBuf], dest: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.rsync)
            .args(["-p", "-a", "-L"])
            .args(&self.verbose)
            .args(self.excludes.iter().map(|e| format!("--exclude={}", e)))
            .args(sources)
            .arg(dest)
    }

    /// Copies everything matching `source_patterns` into `dest`.
    ///
    /// `dest` always exists afterwards. Returns `None` when the patterns
    /// matched nothing and the tool was not run. A non-zero exit is reported
    /// through the returned output, not as an error.
    pub async fn copy_tree<R: ToolRunner>(
        &self,
        runner: &R,
        source_patterns: &[String],
        dest: &Path,
    ) -> Result<Option<ToolRun>> {
        fs::create_dir_all(dest).map_err(|e| AppError::fs(dest, e))?;

        let mut sources = Vec::new();
        for pattern in source_patterns {
            sources.extend(expand_sources(pattern)?);
        }
        if sources.is_empty() {
            info!("Source patterns {:?} matched nothing, skipping tree copy.", source_patterns);
            return Ok(None);
        }
        debug!("Copying {} source entries into {}", sources.len(), dest.display());

        let invocation = self.invocation(&sources, dest);
        let output = runner.run(&invocation).await?;
        if !output.success() {
            warn!(
                command = %invocation.command_line(),
                code = %output.exit_label(),
                stderr = %output.stderr.trim_end(),
                "Tree copy failed"
            );
        }
        Ok(Some(ToolRun { invocation, output }))
    }
}

/// Glob pattern for "every top-level entry under `root`".
pub fn source_pattern(root: &Path) -> String {
    format!("{}/*", Pattern::escape(&root.to_string_lossy()))
}

/// Expands a glob into literal paths, sorted. Hidden entries only match when
/// the pattern spells out the leading dot.
pub fn expand_sources(pattern: &str) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let mut paths = Vec::new();
    for entry in glob_with(pattern, options)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => warn!("Skipping unreadable source {}: {}", e.path().display(), e.error()),
        }
    }
    paths.sort();
    Ok(paths)
}
