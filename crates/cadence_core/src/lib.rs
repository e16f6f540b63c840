//! # CADENCE Core
//!
//! The concurrency substrate that lets a simulation loop and a render loop
//! run at independent rates over a graphics context that only one thread may
//! touch:
//! - Triple-buffered state handoff: the writer never waits for a frame, the
//!   reader never sees a half-written snapshot
//! - Cross-thread command queue with futures: marshal work onto the owning
//!   thread, every future completes
//! - Cycle scheduler: one OS thread per loop, software rate caps
//!
//! ## Architecture Rules
//!
//! 1. **Roles partition instances** - write, staging and read never alias
//! 2. **Short critical sections** - locks guard index swaps, not frames of work
//! 3. **Thread affinity is checked** - queues know their owning thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_core::{TripleBuffer, CycleThread};
//!
//! let buffer = Arc::new(TripleBuffer::from_fn(Scene::default, Vec::new()));
//! buffer.add_command(|scene: &mut Scene| scene.lights.reserve(64));
//! let update = CycleThread::new("update").spawn(Simulation::new(Arc::clone(&buffer)))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod command;
pub mod config;
pub mod error;
pub mod schedule;
pub mod sync;

pub use command::{CommandFuture, CommandQueue, QueueStats, ThreadToken};
pub use config::{EngineConfig, LoopConfig, PacingConfig};
pub use error::{BufferError, CommandError, ConfigError, SchedulerError};
pub use schedule::{
    Cycle, CycleHandle, CycleState, CycleStats, CycleThread, ErrorPolicy, Pacer, RateCap,
};
pub use sync::{
    CustomState, ReadFrame, RenderState, Roles, SingletonAction, StateCore, StateRef,
    TripleBuffer, WriteHandle,
};
