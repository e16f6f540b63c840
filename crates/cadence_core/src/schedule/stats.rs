//! Cycle timing statistics.

use std::time::Duration;

/// Per-thread cycle statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Cycles run (including failed ones).
    pub cycles: u64,
    /// Cycles whose update failed.
    pub failures: u64,
    /// Shortest update observed (microseconds).
    pub min_update_us: u64,
    /// Longest update observed (microseconds).
    pub max_update_us: u64,
    /// Rolling average update time (microseconds).
    pub avg_update_us: u64,
    /// Updates that overran a non-zero minimum cycle time.
    pub late_cycles: u64,
}

impl CycleStats {
    /// Records one cycle's update time against its minimum.
    pub(crate) fn record(&mut self, update: Duration, minimum: Duration) {
        let us = u64::try_from(update.as_micros()).unwrap_or(u64::MAX);

        if self.cycles == 0 {
            self.min_update_us = us;
            self.avg_update_us = us;
        } else {
            self.min_update_us = self.min_update_us.min(us);
            // Rolling average
            self.avg_update_us = (self.avg_update_us.saturating_mul(15).saturating_add(us)) / 16;
        }
        self.max_update_us = self.max_update_us.max(us);
        self.cycles += 1;

        if !minimum.is_zero() && update > minimum {
            self.late_cycles += 1;
        }
    }
}
