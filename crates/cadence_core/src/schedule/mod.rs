//! # Cycle Scheduling
//!
//! Drives the update and render loops, each on its own OS thread, each
//! capped or uncapped independently.
//!
//! ```text
//! loop until stop requested:
//!   seconds = now - last cycle start
//!   update(seconds)            // failure -> ErrorPolicy
//!   pace to minimum_cycle_time // poll-sleep, skipped when zero
//! cleanup()
//! ```

mod cycle;
mod pacing;
mod rate;
mod stats;

pub use cycle::{Cycle, CycleHandle, CycleState, CycleThread, ErrorPolicy};
pub use pacing::{Pacer, DEFAULT_POLL_INTERVAL};
pub use rate::RateCap;
pub use stats::CycleStats;
