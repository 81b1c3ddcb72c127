//! Time source contract and nanosecond conversions
//!
//! The reactor measures everything in monotonic nanoseconds. The platform
//! clock lives in `ddserver-runtime`; [`ManualClock`] is a hand-driven
//! source for deterministic loops.

use std::cell::Cell;
use std::rc::Rc;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Monotonic, non-decreasing nanosecond timestamps
pub trait ClockSource {
    fn now_nanos(&self) -> u64;
}

/// Seconds to nanoseconds, truncating
///
/// Callers must not pass negative seconds.
#[inline]
pub fn seconds_to_nanos(seconds: f64) -> u64 {
    debug_assert!(seconds >= 0.0, "negative seconds: {}", seconds);
    (seconds.max(0.0) * NANOS_PER_SEC) as u64
}

/// Nanoseconds to seconds at microsecond resolution
#[inline]
pub fn nanos_to_seconds(nanos: u64) -> f64 {
    (nanos / 1_000) as f64 / 1_000_000.0
}

#[inline]
pub fn nanos_to_millis(nanos: u64) -> u64 {
    nanos / 1_000_000
}

/// Clock that only moves when told to
///
/// Clones share the same timestamp, so a test can keep one handle and
/// give the other to a reactor.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, nanos: u64) {
        self.now.set(self.now.get().saturating_add(nanos));
    }

    /// Moves forward only; earlier values are ignored
    pub fn set(&self, nanos: u64) {
        if nanos > self.now.get() {
            self.now.set(nanos);
        }
    }
}

impl ClockSource for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.now.get()
    }
}
