//! # CADENCE
//!
//! Runs a simulation loop and a render loop at independent rates over a
//! graphics context that only one thread may touch.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                               Engine                               │
//! │                                                                    │
//! │  cadence-update                                  cadence-render    │
//! │  ┌──────────────┐   ┌──────────────────────┐   ┌────────────────┐  │
//! │  │ UpdateLoop   │──>│  TripleBuffer<S>     │──>│ RenderLoop     │  │
//! │  │  Simulation  │   │  write|staging|read  │   │  Renderer      │  │
//! │  └──────────────┘   └──────────────────────┘   │  ContextOwner  │  │
//! │                                                └───────▲────────┘  │
//! │  any thread ── GraphicsContext::calculate ─────────────┘           │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `context`: marshaling onto the graphics context thread
//! - `loops`: the update and render cycles
//! - `engine`: lifecycle and wiring

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod context;
pub mod engine;
pub mod error;
pub mod loops;

pub use cadence_core as core;

pub use context::{ContextOwner, GraphicsContext};
pub use engine::{Engine, EngineStats, RENDER_THREAD, UPDATE_THREAD};
pub use error::{EngineError, EngineResult};
pub use loops::{RenderLoop, Renderer, Simulation, UpdateLoop};
