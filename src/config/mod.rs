// dailybackup/src/config/mod.rs
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{AppError, Result};
use crate::schedule::BackupWindow;

pub const DEFAULT_DB_LOCATION: &str = "archive";
pub const DEFAULT_BACKUP_FILE: &str = "last_backup.txt";
pub const DEFAULT_LOG_FILE: &str = "backup.txt";
pub const DEFAULT_ERR_FILE: &str = "backup_err.txt";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3600;

// Struct for deserializing the config file. Everything is optional here,
// required fields are enforced by `load_backup_config_from_json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub enable: Option<bool>,
    pub working_dir: Option<PathBuf>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub db_names: Option<serde_json::Value>,
    pub db_location: Option<String>,
    pub verbose: Option<String>,
    pub backup_file: Option<String>,
    pub force_backup: Option<bool>,
    pub source_root: Option<PathBuf>,
    pub log_file: Option<String>,
    pub err_file: Option<String>,
    pub tool_timeout_secs: Option<u64>,
    pub extra_excludes: Option<Vec<String>>,
    pub rsync_path: Option<PathBuf>,
    pub sqlite3_path: Option<PathBuf>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content =
            fs::read_to_string(config_path).map_err(|e| AppError::fs(config_path, e))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content)?;
        debug!(config = ?raw, "Loaded raw configuration from {}", config_path.display());
        Ok(raw)
    }

    /// Backups are on unless the file says otherwise.
    pub fn is_enabled(&self) -> bool {
        self.enable.unwrap_or(true)
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub working_dir: PathBuf,
    pub window: BackupWindow,
    pub db_names: Vec<String>,
    /// Relative to both the source root and each generation directory.
    pub db_location: PathBuf,
    pub source_root: PathBuf,
    pub verbose: String,
    pub backup_file: String,
    pub log_file: String,
    pub err_file: String,
    pub force_backup: bool,
    pub tool_timeout: Duration,
    pub extra_excludes: Vec<String>,
    pub rsync_path: Option<PathBuf>,
    pub sqlite3_path: Option<PathBuf>,
}

impl BackupConfig {
    pub fn last_run_path(&self) -> PathBuf {
        self.working_dir.join(&self.backup_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.working_dir.join(&self.log_file)
    }

    pub fn err_path(&self) -> PathBuf {
        self.working_dir.join(&self.err_file)
    }

    pub fn source_db_path(&self, db_name: &str) -> PathBuf {
        self.source_root.join(&self.db_location).join(db_name)
    }
}

/// Validates the raw config into a `BackupConfig`.
///
/// Relative `working_dir` and `source_root` values are resolved against
/// `config_dir`, the directory holding the config file. `source_root`
/// defaults to `config_dir` itself.
pub fn load_backup_config_from_json(
    raw_config: &RawJsonConfig,
    config_dir: &Path,
) -> Result<BackupConfig> {
    let working_dir = raw_config
        .working_dir
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| AppError::Config("A value for 'working_dir' is required.".into()))?;
    let working_dir = resolve_against(config_dir, working_dir);
    info!("Working dir is {}.", working_dir.display());

    let start = raw_config
        .start
        .as_deref()
        .ok_or_else(|| AppError::Config("A value for 'start' is required.".into()))?;
    let end = raw_config
        .end
        .as_deref()
        .ok_or_else(|| AppError::Config("A value for 'end' is required.".into()))?;
    let window = BackupWindow::parse(start, end)?;
    info!("Backup window is {}.", window);

    let db_names = parse_db_names(&raw_config.db_names)?;
    info!("Backing up databases: {:?}.", db_names);

    let db_location = PathBuf::from(
        raw_config
            .db_location
            .as_deref()
            .unwrap_or(DEFAULT_DB_LOCATION),
    );
    if db_location.as_os_str().is_empty()
        || !db_location
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(AppError::Config(format!(
            "'db_location' must be a relative path without '..': {}",
            db_location.display()
        )));
    }
    info!("Database location: {}.", db_location.display());

    let source_root = raw_config
        .source_root
        .as_ref()
        .map(|p| resolve_against(config_dir, p))
        .unwrap_or_else(|| config_dir.to_path_buf());
    info!("Source root: {}.", source_root.display());

    let backup_file = file_name_or_default(&raw_config.backup_file, DEFAULT_BACKUP_FILE, "backup_file")?;
    let log_file = file_name_or_default(&raw_config.log_file, DEFAULT_LOG_FILE, "log_file")?;
    let err_file = file_name_or_default(&raw_config.err_file, DEFAULT_ERR_FILE, "err_file")?;
    if log_file == err_file {
        return Err(AppError::Config(
            "'log_file' and 'err_file' must be different files.".into(),
        ));
    }

    let timeout_secs = raw_config
        .tool_timeout_secs
        .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(AppError::Config("'tool_timeout_secs' must be positive.".into()));
    }

    Ok(BackupConfig {
        working_dir,
        window,
        db_names,
        db_location,
        source_root,
        verbose: raw_config.verbose.clone().unwrap_or_default(),
        backup_file,
        log_file,
        err_file,
        force_backup: raw_config.force_backup.unwrap_or(false),
        tool_timeout: Duration::from_secs(timeout_secs),
        extra_excludes: raw_config.extra_excludes.clone().unwrap_or_default(),
        rsync_path: raw_config.rsync_path.clone(),
        sqlite3_path: raw_config.sqlite3_path.clone(),
    })
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn file_name_or_default(value: &Option<String>, default: &str, key: &str) -> Result<String> {
    let name = value.as_deref().unwrap_or(default);
    if !is_single_component(name) {
        return Err(AppError::Config(format!(
            "'{}' must be a plain file name: {:?}",
            key, name
        )));
    }
    Ok(name.to_string())
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Parses `db_names`, accepting either a JSON array of names or a single
/// comma-separated string. Order is preserved.
fn parse_db_names(db_names: &Option<serde_json::Value>) -> Result<Vec<String>> {
    let names: Vec<String> = match db_names {
        None | Some(serde_json::Value::Null) => {
            return Err(AppError::Config("A value for 'db_names' is required.".into()));
        }
        Some(serde_json::Value::String(list)) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(value @ serde_json::Value::Array(_)) => serde_json::from_value::<Vec<String>>(value.clone())
            .map_err(|e| AppError::Config(format!("'db_names' must be a list of strings: {}", e)))?
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect(),
        Some(_) => {
            return Err(AppError::Config(
                "'db_names' must be either an array of names or a comma-separated string".into(),
            ));
        }
    };

    if names.is_empty() {
        return Err(AppError::Config("'db_names' must not be empty.".into()));
    }
    if let Some(bad) = names.iter().find(|n| !is_single_component(n)) {
        return Err(AppError::Config(format!(
            "Invalid database name in 'db_names': {:?}",
            bad
        )));
    }
    Ok(names)
}
