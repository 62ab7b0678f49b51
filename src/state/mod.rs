// dailybackup/src/state/mod.rs
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{AppError, Result};

/// Durable marker holding the date of the last backup.
///
/// A missing marker is treated as "already ran today": the first trigger
/// after install records today's date instead of firing a backfill.
#[derive(Debug, Clone)]
pub struct LastRunStore {
    path: PathBuf,
}

impl LastRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LastRunStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the last-run date, initializing the marker to `today` if absent.
    pub fn get(&self, today: NaiveDate) -> Result<NaiveDate> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Last run not found, setting to today: {}", today);
                self.set(today)?;
                return Ok(today);
            }
            Err(e) => return Err(AppError::fs(&self.path, e)),
        };

        let date = parse_marker(&content).ok_or_else(|| AppError::LastRunCorrupt {
            path: self.path.clone(),
            content: content.clone(),
        })?;
        debug!("Last backup ran on {}", date);
        Ok(date)
    }

    pub fn set(&self, date: NaiveDate) -> Result<()> {
        fs::write(&self.path, date.format("%Y-%m-%d").to_string())
            .map_err(|e| AppError::fs(&self.path, e))
    }
}

/// Parses `YYYY-M-D`; zero padding is optional.
fn parse_marker(content: &str) -> Option<NaiveDate> {
    let mut parts = content.trim().split('-');
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_missing_marker_initializes_to_today() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = LastRunStore::new(dir.path().join("last_backup.txt"));
        let today = d(2026, 10, 19);

        assert_eq!(store.get(today)?, today);
        assert_eq!(fs::read_to_string(store.path())?, "2026-10-19");

        // Second read sees the persisted value, even on a later day.
        assert_eq!(store.get(d(2026, 10, 20))?, today);
        Ok(())
    }

    #[test]
    fn test_set_overwrites() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = LastRunStore::new(dir.path().join("last_backup.txt"));
        store.set(d(2026, 1, 2))?;
        store.set(d(2026, 3, 4))?;
        assert_eq!(fs::read_to_string(store.path())?, "2026-03-04");
        assert_eq!(store.get(d(2026, 10, 19))?, d(2026, 3, 4));
        Ok(())
    }

    #[test]
    fn test_unpadded_and_trailing_newline_are_accepted() {
        assert_eq!(parse_marker("2026-3-4\n"), Some(d(2026, 3, 4)));
        assert_eq!(parse_marker("2026-03-04"), Some(d(2026, 3, 4)));
    }

    #[test]
    fn test_corrupt_marker_is_fatal() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("last_backup.txt");
        fs::write(&path, "yesterday")?;
        let err = LastRunStore::new(&path).get(d(2026, 10, 19)).unwrap_err();
        assert!(matches!(err, AppError::LastRunCorrupt { .. }));
        assert!(parse_marker("2026-02-30").is_none());
        assert!(parse_marker("2026-1-1-1").is_none());
        Ok(())
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let store = LastRunStore::new("/nonexistent-dir/for/dailybackup/last_backup.txt");
        assert!(matches!(store.get(d(2026, 10, 19)), Err(AppError::Fs { .. })));
    }
}
