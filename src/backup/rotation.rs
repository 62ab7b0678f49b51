// dailybackup/src/backup/rotation.rs
use chrono::{Datelike, NaiveDate};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

pub const CURRENT_PREFIX: &str = "bkup";
pub const PREVIOUS_PREFIX: &str = "prevbkup";

/// One weekday's current/previous pair of generation directories.
/// Weekdays count from Monday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSlot {
    weekday: u32,
}

impl GenerationSlot {
    pub fn new(weekday: u32) -> Result<Self> {
        if weekday > 6 {
            return Err(AppError::Config(format!(
                "weekday must be within 0..=6, got {}",
                weekday
            )));
        }
        Ok(GenerationSlot { weekday })
    }

    pub fn for_date(date: NaiveDate) -> Self {
        GenerationSlot {
            weekday: date.weekday().num_days_from_monday(),
        }
    }

    pub fn weekday(&self) -> u32 {
        self.weekday
    }

    pub fn current_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(format!("{}{}", CURRENT_PREFIX, self.weekday))
    }

    pub fn previous_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(format!("{}{}", PREVIOUS_PREFIX, self.weekday))
    }
}

/// Drops the previous generation and demotes the current one.
///
/// Returns `(current, previous)`. `current` does not exist afterwards; the
/// caller recreates it. Missing directories are expected (first run for the
/// weekday) and only logged.
pub fn rotate(working_dir: &Path, slot: GenerationSlot) -> Result<(PathBuf, PathBuf)> {
    let current = slot.current_dir(working_dir);
    let previous = slot.previous_dir(working_dir);
    debug!("Current backup directory {}.", current.display());
    debug!("Previous backup directory {}.", previous.display());

    match fs::remove_dir_all(&previous) {
        Ok(()) => debug!("Removed previous generation {}", previous.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Directory {} does not exist, nothing to remove.", previous.display());
        }
        Err(e) => return Err(AppError::fs(&previous, e)),
    }

    match fs::rename(&current, &previous) {
        Ok(()) => debug!("Moved {} to {}", current.display(), previous.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Directory {} does not exist, nothing to demote.", current.display());
        }
        Err(e) => return Err(AppError::fs(&current, e)),
    }

    Ok((current, previous))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub files: u64,
    pub bytes: u64,
}

/// Counts regular files and their total size under a generation directory.
/// Symlinks are not followed.
pub fn generation_stats(dir: &Path) -> Result<GenerationStats> {
    let mut stats = GenerationStats::default();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            AppError::fs(path, e.into())
        })?;
        if entry.file_type().is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| AppError::fs(entry.path(), e.into()))?;
            stats.files += 1;
            stats.bytes += metadata.len();
        }
    }
    Ok(stats)
}
