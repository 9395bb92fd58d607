//! Wall-clock source for the session state
//!
//! Streaks and heatmap entries depend on the local calendar date, and
//! session records on the current instant. Tests pin both with
//! [`FixedClock`].

use chrono::{DateTime, Duration, Local, TimeZone};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system clock in the local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Noon local time on the given date
    pub fn at_noon(year: i32, month: u32, day: u32) -> Option<Self> {
        let now = Local.with_ymd_and_hms(year, month, day, 12, 0, 0).single()?;
        Some(Self::new(now))
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::at_noon(2026, 3, 1).unwrap();
        let start = clock.now();
        clock.advance(Duration::days(1));
        assert_eq!(clock.now() - start, Duration::days(1));
        assert_eq!(clock.now().date_naive().to_string(), "2026-03-02");
    }
}
