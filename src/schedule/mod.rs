//! Daily backup window evaluation.
//!
//! Everything here is pure: callers pass the clock in, so the decision can be
//! exercised with synthetic times.

use chrono::{NaiveDate, NaiveTime};
use std::fmt;

use crate::errors::{AppError, Result};

/// Time-of-day range during which a backup may fire. Inclusive at both ends;
/// `start > end` means the window wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl BackupWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        BackupWindow { start, end }
    }

    /// Parses two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(BackupWindow::new(parse_hhmm("start", start)?, parse_hhmm("end", end)?))
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

impl fmt::Display for BackupWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_hhmm(key: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        AppError::Config(format!(
            "'{}' must be a time of day as HH:MM, got {:?}: {}",
            key, value, e
        ))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutsideWindow,
    AlreadyRanToday,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OutsideWindow => f.write_str("outside the backup window"),
            SkipReason::AlreadyRanToday => f.write_str("backup already ran today"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run { forced: bool },
    Skip(SkipReason),
}

impl Decision {
    pub fn should_run(&self) -> bool {
        matches!(self, Decision::Run { .. })
    }
}

/// Decides whether a backup fires for this trigger.
pub fn decide(
    window: &BackupWindow,
    now: NaiveTime,
    last_run: NaiveDate,
    today: NaiveDate,
    force: bool,
) -> Decision {
    if force {
        return Decision::Run { forced: true };
    }
    if !window.contains(now) {
        return Decision::Skip(SkipReason::OutsideWindow);
    }
    if last_run == today {
        return Decision::Skip(SkipReason::AlreadyRanToday);
    }
    Decision::Run { forced: false }
}

pub fn should_run(
    window: &BackupWindow,
    now: NaiveTime,
    last_run: NaiveDate,
    today: NaiveDate,
    force: bool,
) -> bool {
    decide(window, now, last_run, today, force).should_run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_plain_window_is_inclusive() {
        let window = BackupWindow::new(t(2, 0), t(4, 0));
        assert!(!window.wraps_midnight());
        assert!(window.contains(t(2, 0)));
        assert!(window.contains(t(3, 15)));
        assert!(window.contains(t(4, 0)));
        assert!(!window.contains(t(1, 59)));
        assert!(!window.contains(NaiveTime::from_hms_opt(4, 0, 1).unwrap()));
        assert!(!window.contains(t(23, 0)));
    }

    #[test]
    fn test_wrapping_window() {
        let window = BackupWindow::parse("22:00", "06:00").unwrap();
        assert!(window.wraps_midnight());
        assert!(window.contains(t(22, 0)));
        assert!(window.contains(t(23, 30)));
        assert!(window.contains(t(0, 0)));
        assert!(window.contains(t(6, 0)));
        assert!(!window.contains(t(12, 0)));
        assert!(!window.contains(t(21, 59)));
    }

    #[test]
    fn test_should_run_law_for_every_quarter_hour() {
        let today = d(2026, 10, 19);
        let yesterday = d(2026, 10, 18);
        for window in [
            BackupWindow::parse("01:00", "03:30").unwrap(),
            BackupWindow::parse("22:00", "06:00").unwrap(),
            BackupWindow::parse("12:00", "12:00").unwrap(),
        ] {
            for minutes in (0..24 * 60).step_by(15) {
                let now = t(minutes / 60, minutes % 60);
                let in_window = if window.start() <= window.end() {
                    window.start() <= now && now <= window.end()
                } else {
                    now >= window.start() || now <= window.end()
                };
                assert_eq!(should_run(&window, now, yesterday, today, false), in_window);
                assert!(!should_run(&window, now, today, today, false));
                assert!(should_run(&window, now, today, today, true));
            }
        }
    }

    #[test]
    fn test_overnight_window_scenarios() {
        let window = BackupWindow::parse("22:00", "06:00").unwrap();
        let today = d(2026, 10, 19);
        let yesterday = d(2026, 10, 18);

        assert_eq!(
            decide(&window, t(23, 30), yesterday, today, false),
            Decision::Run { forced: false }
        );
        assert_eq!(
            decide(&window, t(12, 0), yesterday, today, false),
            Decision::Skip(SkipReason::OutsideWindow)
        );
        assert_eq!(
            decide(&window, t(23, 30), today, today, false),
            Decision::Skip(SkipReason::AlreadyRanToday)
        );
        assert_eq!(
            decide(&window, t(12, 0), today, today, true),
            Decision::Run { forced: true }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(BackupWindow::parse("24:00", "06:00").is_err());
        assert!(BackupWindow::parse("22:00", "noon").is_err());
        assert_eq!(BackupWindow::parse(" 7:05", "08:00").unwrap().start(), t(7, 5));
    }

    #[test]
    fn test_display() {
        assert_eq!(BackupWindow::parse("22:00", "06:00").unwrap().to_string(), "22:00-06:00");
    }
}
