// dailybackup/src/utils/mod.rs
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable that redirects diagnostics to a file.
pub const LOG_FILE_ENV: &str = "DAILYBACKUP_LOG_FILE";

/// Installs the global tracing subscriber for the binary.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
/// Output goes to stderr unless `DAILYBACKUP_LOG_FILE` names a file, in
/// which case records are appended there with targets and line numbers.
pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Ok(log_file) = std::env::var(LOG_FILE_ENV) {
        match OpenOptions::new().create(true).append(true).open(&log_file) {
            Ok(file) => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .init();
                return;
            }
            Err(e) => eprintln!("⚠️ Cannot open log file {}: {}, logging to stderr", log_file, e),
        }
    }

    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
