//! # Clock Injection
//!
//! Every component that stores or compares wall-clock timestamps (the gossip
//! store, the SIR engine, the stabilizer's republish window) receives a
//! [`Clock`] instead of calling `Utc::now()` directly. Production code uses
//! [`SystemClock`]; tests drive a [`ManualClock`] so retention sweeps and
//! republish deadlines can be exercised without sleeping.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of wall-clock timestamps.
///
/// The protocol only requires that the clock be monotone-consistent across
/// compare-and-store operations on a single node; it never assumes clocks
/// agree between nodes.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a manual clock starting at `start`.
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(start),
        })
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        *self.current.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Utc::now());
        let before = clock.now();
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now() - before, Duration::seconds(30));
    }
}
