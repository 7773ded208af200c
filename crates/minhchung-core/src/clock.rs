//! # Clocks
//!
//! The registry reads time through [`mockable::Clock`]. Production uses
//! [`mockable::DefaultClock`]; [`ManualClock`] is a settable clock for
//! tests and replay tooling.

use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use std::sync::{Mutex, PoisonError};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_only_when_set() {
        let start = Utc
            .with_ymd_and_hms(2026, 10, 31, 16, 59, 59)
            .single()
            .expect("timestamp");
        let clock = ManualClock::new(start);
        assert_eq!(clock.utc(), start);
        assert_eq!(clock.utc(), start);

        let later = Utc
            .with_ymd_and_hms(2026, 11, 1, 0, 0, 0)
            .single()
            .expect("timestamp");
        clock.set(later);
        assert_eq!(clock.utc(), later);
    }
}
