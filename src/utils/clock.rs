//! Time source
//!
//! Sliding windows, session expiry and activity analysis all read time
//! through a `Clock` so tests can move time deterministically.

use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::Duration;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as fractional unix seconds
    fn unix_seconds(&self) -> f64 {
        self.now().timestamp_millis() as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    /// Start at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let Ok(mut current) = self.current.write() else { return };
        if let Ok(delta) = chrono::Duration::from_std(by) {
            *current += delta;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let Ok(mut current) = self.current.write() else { return };
        *current = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.current.read().map(|c| *c).unwrap_or_else(|_| Utc::now())
    }
}

/// Elapsed time between two instants, zero if `later` is before `earlier`
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}
