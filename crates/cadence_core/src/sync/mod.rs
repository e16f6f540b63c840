//! # State Handoff Between the Update and Render Threads
//!
//! ## The Problem
//!
//! ```text
//! Update thread (60 Hz):   WRITE a new snapshot every cycle
//! Render thread (144 Hz):  READ the newest complete snapshot every frame
//!
//! Shared snapshot:   TORN FRAMES
//! One big lock:      EACH SIDE STALLS ON THE OTHER
//! ```
//!
//! ## The Solution: Triple Buffering
//!
//! ```text
//! write ──update()──> staging ──stop_read()──> read
//!   ▲                                            │
//!   └──────────── (recycled via staging) ◄───────┘
//! ```
//!
//! The writer always has an instance nobody else touches; the reader holds its
//! instance for a whole frame; the staged instance is the only thing the two
//! sides ever trade, and each trade is a short index swap under a lock.

mod state;
mod triple_buffer;

pub use state::{CustomState, RenderState, StateCore, StateRef};
pub use triple_buffer::{ReadFrame, Roles, SingletonAction, TripleBuffer, WriteHandle};
