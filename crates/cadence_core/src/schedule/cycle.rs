//! # Cycle Thread
//!
//! One OS thread that repeatedly measures elapsed time, runs a cycle, then
//! paces itself to the cycle's minimum duration.
//!
//! ```text
//! Created ──spawn──> Running ──request_stop──> StopRequested ──cleanup──> CleanedUp
//! ```
//!
//! Cancellation is cooperative: the stop flag is observed between cycles only.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{error, info, warn};

use super::pacing::Pacer;
use super::stats::CycleStats;
use crate::error::{panic_message, SchedulerError, SchedulerResult};

/// Work driven by a [`CycleThread`].
pub trait Cycle: Send + 'static {
    /// Failure type of a single cycle.
    type Error: fmt::Display + Send + 'static;

    /// Runs one cycle. `seconds` is the time since the previous cycle started.
    ///
    /// # Errors
    ///
    /// A failed cycle is handled according to the thread's [`ErrorPolicy`].
    fn update(&mut self, seconds: f64) -> Result<(), Self::Error>;

    /// Minimum duration of one cycle. Read after every update, so it can
    /// change at runtime. Zero means uncapped.
    fn minimum_cycle_time(&self) -> Duration {
        Duration::ZERO
    }

    /// Runs once on the cycle thread after the loop exits.
    fn cleanup(&mut self) {}
}

/// What a cycle thread does when an update fails or panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the failure and keep cycling.
    #[default]
    Continue,
    /// Stop the loop, run cleanup, and report the failure from `join`.
    Terminate,
}

/// Lifecycle of a cycle thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CycleState {
    /// Spawned, loop not entered yet.
    Created = 0,
    /// Cycling.
    Running = 1,
    /// Stop observed or requested; finishing the current cycle.
    StopRequested = 2,
    /// Cleanup has run. Terminal.
    CleanedUp = 3,
}

impl CycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::StopRequested,
            _ => Self::CleanedUp,
        }
    }
}

/// State shared between a cycle thread and its handle.
#[derive(Debug)]
struct Control {
    stop: AtomicBool,
    state: AtomicU8,
}

impl Control {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            state: AtomicU8::new(CycleState::Created as u8),
        }
    }

    fn state(&self) -> CycleState {
        CycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Moves `from -> to`; a no-op if the state already moved on.
    fn transition(&self, from: CycleState, to: CycleState) {
        let _ = self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.transition(CycleState::Created, CycleState::StopRequested);
        self.transition(CycleState::Running, CycleState::StopRequested);
    }
}

/// Builder and runner for a paced cycle loop.
///
/// ## Usage
///
/// ```rust,ignore
/// let handle = CycleThread::new("update")
///     .error_policy(ErrorPolicy::Continue)
///     .spawn(simulation)?;
///
/// // ... later
/// let stats = handle.shutdown()?;
/// ```
#[derive(Clone, Debug)]
pub struct CycleThread {
    name: String,
    pacer: Pacer,
    policy: ErrorPolicy,
}

impl CycleThread {
    /// Creates a runner for a thread called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pacer: Pacer::default(),
            policy: ErrorPolicy::default(),
        }
    }

    /// Sets the pacing poll interval.
    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.pacer = Pacer::new(poll_interval);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Starts the loop on a new named OS thread.
    ///
    /// The returned handle is background: dropping it requests a stop but
    /// does not wait for the thread.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Spawn`] if the OS refuses the thread.
    pub fn spawn<C: Cycle>(self, cycle: C) -> SchedulerResult<CycleHandle> {
        let control = Arc::new(Control::new());
        let thread_control = Arc::clone(&control);
        let name = self.name.clone();

        let join = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run(cycle, &thread_control))?;

        Ok(CycleHandle {
            name,
            control,
            join: Some(join),
        })
    }

    fn run<C: Cycle>(self, mut cycle: C, control: &Control) -> SchedulerResult<CycleStats> {
        control.transition(CycleState::Created, CycleState::Running);
        info!(thread = %self.name, policy = ?self.policy, "cycle thread started");

        let mut stats = CycleStats::default();
        let mut failure = None;
        let mut last_start = Instant::now();

        while !control.stop_requested() {
            let start = Instant::now();
            let seconds = start.duration_since(last_start).as_secs_f64();
            last_start = start;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| cycle.update(seconds)));
            let minimum = cycle.minimum_cycle_time();
            stats.record(start.elapsed(), minimum);

            let reason = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            };

            if let Some(reason) = reason {
                stats.failures += 1;
                match self.policy {
                    ErrorPolicy::Continue => {
                        warn!(thread = %self.name, %reason, "cycle failed, continuing");
                    }
                    ErrorPolicy::Terminate => {
                        error!(thread = %self.name, %reason, "cycle failed, terminating");
                        failure = Some(reason);
                        break;
                    }
                }
            }

            self.pacer.wait(start, minimum);
        }

        control.transition(CycleState::Running, CycleState::StopRequested);
        cycle.cleanup();
        control.state.store(CycleState::CleanedUp as u8, Ordering::Release);

        info!(
            thread = %self.name,
            cycles = stats.cycles,
            failures = stats.failures,
            "cycle thread stopped"
        );

        match failure {
            Some(reason) => Err(SchedulerError::CycleFailed {
                name: self.name,
                reason,
            }),
            None => Ok(stats),
        }
    }
}

/// Control surface of a running cycle thread.
pub struct CycleHandle {
    name: String,
    control: Arc<Control>,
    join: Option<JoinHandle<SchedulerResult<CycleStats>>>,
}

impl CycleHandle {
    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CycleState {
        self.control.state()
    }

    /// Asks the loop to exit after the current cycle.
    pub fn request_stop(&self) {
        self.control.request_stop();
    }

    /// Returns true once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the thread to exit on its own.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::CycleFailed`] if the loop terminated on a failure,
    /// [`SchedulerError::Panicked`] if the thread died outside a cycle.
    pub fn join(mut self) -> SchedulerResult<CycleStats> {
        let Some(join) = self.join.take() else {
            return Ok(CycleStats::default());
        };
        join.join().unwrap_or_else(|_| {
            Err(SchedulerError::Panicked {
                name: self.name.clone(),
            })
        })
    }

    /// Requests a stop and waits for the thread to exit.
    ///
    /// # Errors
    ///
    /// See [`join`](Self::join).
    pub fn shutdown(self) -> SchedulerResult<CycleStats> {
        self.request_stop();
        self.join()
    }
}

impl Drop for CycleHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.control.request_stop();
        }
    }
}

impl fmt::Debug for CycleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
