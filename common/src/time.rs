//! Time utilities and constants for ParlayPool.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Protocol timing constants.
pub mod constants {
    use super::Duration;

    /// Default round length (one week).
    pub fn default_round_length() -> Duration {
        Duration::days(7)
    }

    /// Shortest round length accepted by configuration (one hour).
    pub fn min_round_length() -> Duration {
        Duration::hours(1)
    }
}

/// A timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Source of the current time for round boundaries.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now()
    }
}

/// A clock that only moves when told to. Used by tests and the simulator.
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.current.write() += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Timestamp) {
        *self.current.write() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read()
    }
}

/// Half-open interval `[start, end)`.
pub fn in_window(at: Timestamp, start: Timestamp, end: Timestamp) -> bool {
    at >= start && at < end
}
