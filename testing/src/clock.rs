//! Deterministic clocks for tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use courtbook_core::clock::Clock;
use std::sync::Mutex;

/// A clock pinned to a settable instant.
///
/// Tests advance it explicitly to simulate the passage of time (timeout
/// sweeps, promotion windows) without sleeping.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock pinned to `now`
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// A clock pinned to an arbitrary but stable default instant
    #[must_use]
    pub fn default_instant() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).single().unwrap_or_default())
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now = *now + by;
    }

    /// Re-pins the clock
    pub fn set(&self, to: DateTime<Utc>) {
        *self.lock() = to;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}
