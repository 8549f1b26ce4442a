//! Time sources for metadata timestamps.

use chrono::{NaiveDateTime, TimeDelta, Timelike, Utc};
use parking_lot::Mutex;
use std::fmt;

/// Source of the current time.
///
/// Timestamps are truncated to whole seconds, the precision of the wire
/// format.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// A clock that only moves when told to. Used by tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    /// Creates a clock stopped at `start`.
    #[must_use]
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock();
        *now += TimeDelta::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

/// The watermark a fresh replica starts from: the Unix epoch.
#[must_use]
pub fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_has_whole_seconds() {
        assert_eq!(SystemClock.now().nanosecond(), 0);
    }

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new(epoch());
        assert_eq!(clock.now(), epoch());
        clock.advance(61);
        assert_eq!(clock.now().minute(), 1);
        assert_eq!(clock.now().second(), 1);
    }

    #[test]
    fn epoch_is_1970() {
        assert_eq!(epoch().to_string(), "1970-01-01 00:00:00");
    }
}
