use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid source pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Last-run marker {path} is malformed: {content:?}")]
    LastRunCorrupt { path: PathBuf, content: String },

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Command timed out after {secs}s: {command}")]
    ToolTimeout { command: String, secs: u64 },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    /// Wraps an I/O error with the path it happened on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Fs {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
