//! Daily backup orchestrator.
//!
//! Once per day, inside a configured time window, rotates the weekday's
//! backup generation, mirrors the source tree into it with `rsync` and takes
//! integrity-checked online snapshots of SQLite databases with `sqlite3`.
//! Runs are triggered by external "new record" events, never by a timer.

pub mod backup;
pub mod config;
pub mod errors;
pub mod schedule;
pub mod state;
pub mod tools;
pub mod utils;
