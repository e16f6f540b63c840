//! # Runtime Rate Caps
//!
//! The cap flag and minimum cycle time a loop reads every iteration. Shared
//! through an `Arc`, so any thread can retune a running loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::LoopConfig;

/// Reconfigurable minimum cycle time.
#[derive(Debug)]
pub struct RateCap {
    locked: AtomicBool,
    min_cycle_nanos: AtomicU64,
}

impl RateCap {
    /// Creates a cap for `rate_hz` cycles per second.
    ///
    /// The minimum is only honored while `locked` is set.
    #[must_use]
    pub fn new(rate_hz: f64, locked: bool) -> Self {
        Self {
            locked: AtomicBool::new(locked),
            min_cycle_nanos: AtomicU64::new(nanos(period(rate_hz))),
        }
    }

    /// Creates a cap from a loop's configuration.
    #[must_use]
    pub fn from_config(config: &LoopConfig) -> Self {
        Self::new(config.rate_hz, config.locked)
    }

    /// Whether the cap is currently enforced.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Enables or disables the cap.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }

    /// Sets the target rate. Non-positive or non-finite rates mean uncapped.
    pub fn set_rate_hz(&self, rate_hz: f64) {
        self.set_minimum_cycle_time(period(rate_hz));
    }

    /// Sets the minimum cycle time directly.
    pub fn set_minimum_cycle_time(&self, minimum: Duration) {
        self.min_cycle_nanos.store(nanos(minimum), Ordering::Relaxed);
    }

    /// Configured minimum cycle time, enforced or not.
    #[must_use]
    pub fn minimum_cycle_time(&self) -> Duration {
        Duration::from_nanos(self.min_cycle_nanos.load(Ordering::Relaxed))
    }

    /// The minimum to honor this iteration: the configured one if locked,
    /// zero otherwise.
    #[must_use]
    pub fn effective_minimum(&self) -> Duration {
        if self.is_locked() {
            self.minimum_cycle_time()
        } else {
            Duration::ZERO
        }
    }
}

fn period(rate_hz: f64) -> Duration {
    if rate_hz.is_finite() && rate_hz > 0.0 {
        Duration::try_from_secs_f64(rate_hz.recip()).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
