//! # Cycle Pacing
//!
//! Software frame-rate cap. After a cycle's work, the thread sleeps in short
//! polls, re-checking elapsed time, until the minimum cycle time has passed.
//! Never one long sleep: the wake-up must not depend on OS timer granularity.

use std::thread;
use std::time::{Duration, Instant};

/// Default interval between elapsed-time polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Poll-sleep pacer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacer {
    poll_interval: Duration,
}

impl Pacer {
    /// Creates a pacer. A zero interval spins instead of sleeping.
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Interval between polls.
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits until `minimum` has elapsed since `cycle_start`.
    ///
    /// Returns the time spent waiting. A zero minimum (uncapped) returns
    /// immediately.
    pub fn wait(&self, cycle_start: Instant, minimum: Duration) -> Duration {
        if minimum.is_zero() {
            return Duration::ZERO;
        }

        let wait_start = Instant::now();
        loop {
            let elapsed = cycle_start.elapsed();
            if elapsed >= minimum {
                break;
            }
            if self.poll_interval.is_zero() {
                std::hint::spin_loop();
            } else {
                thread::sleep(self.poll_interval.min(minimum - elapsed));
            }
        }
        wait_start.elapsed()
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
