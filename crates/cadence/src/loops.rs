//! # Update and Render Loops
//!
//! The two concrete cycles the engine drives:
//!
//! ```text
//! UpdateLoop (writer)                    RenderLoop (reader, context thread)
//! ───────────────────                    ───────────────────────────────────
//! simulation.step(&mut write, dt)        pump graphics commands
//! buffer.update()                        frame = buffer.start_read()
//!   drain commands, singletons,          renderer.render(&frame, &mut G, dt)
//!   on_update, write <-> staging         frame.stop_read()  read <-> staging
//! pace to update cap                     pace to render cap
//! ```
//!
//! Each loop reads its [`RateCap`] every iteration, so toggling the lock or
//! changing the rate takes effect on the next cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Cycle, RateCap, RenderState, TripleBuffer};
use tracing::debug;

use crate::context::ContextOwner;

/// Simulation callback run by the update loop.
pub trait Simulation<S: RenderState>: Send + 'static {
    /// Failure type of one step.
    type Error: fmt::Display + Send + 'static;

    /// Advances the simulation by `seconds` and writes the result to `state`.
    ///
    /// `state` is whichever instance currently holds the write role. It may
    /// carry a snapshot from an older cycle, so write everything the renderer
    /// reads.
    ///
    /// # Errors
    ///
    /// A failed step is not published; the loop's error policy decides what
    /// happens next.
    fn step(&mut self, state: &mut S, seconds: f64) -> Result<(), Self::Error>;

    /// Runs once on the update thread after the loop exits.
    fn cleanup(&mut self) {}
}

/// Render callback run by the render loop on the context thread.
pub trait Renderer<S: RenderState, G>: Send + 'static {
    /// Failure type of one frame.
    type Error: fmt::Display + Send + 'static;

    /// Draws `frame` using the native graphics handle.
    ///
    /// # Errors
    ///
    /// Handled by the loop's error policy.
    fn render(&mut self, frame: &S, native: &mut G, seconds: f64) -> Result<(), Self::Error>;

    /// Runs once on the context thread after the loop exits.
    fn cleanup(&mut self, native: &mut G) {
        let _ = native;
    }
}

/// Writer side: steps the simulation and publishes one snapshot per cycle.
pub struct UpdateLoop<S: RenderState, Sim> {
    buffer: Arc<TripleBuffer<S>>,
    simulation: Sim,
    cap: Arc<RateCap>,
}

impl<S: RenderState, Sim: Simulation<S>> UpdateLoop<S, Sim> {
    /// Creates an update loop over `buffer`, paced by `cap`.
    #[must_use]
    pub fn new(buffer: Arc<TripleBuffer<S>>, simulation: Sim, cap: Arc<RateCap>) -> Self {
        Self {
            buffer,
            simulation,
            cap,
        }
    }
}

impl<S: RenderState, Sim: Simulation<S>> Cycle for UpdateLoop<S, Sim> {
    type Error = Sim::Error;

    fn update(&mut self, seconds: f64) -> Result<(), Self::Error> {
        {
            let mut state = self.buffer.current_write_state();
            self.simulation.step(&mut state, seconds)?;
        }
        self.buffer.update();
        Ok(())
    }

    fn minimum_cycle_time(&self) -> Duration {
        self.cap.effective_minimum()
    }

    fn cleanup(&mut self) {
        self.simulation.cleanup();
        debug!(cycle = self.buffer.cycle(), "update loop cleaned up");
    }
}

/// Reader side: owns the graphics context and renders the newest snapshot.
pub struct RenderLoop<S: RenderState, G, R> {
    buffer: Arc<TripleBuffer<S>>,
    context: ContextOwner<G>,
    renderer: R,
    cap: Arc<RateCap>,
    frames: u64,
    fresh_frames: u64,
}

impl<S, G, R> RenderLoop<S, G, R>
where
    S: RenderState,
    G: Send + 'static,
    R: Renderer<S, G>,
{
    /// Creates a render loop reading `buffer`, paced by `cap`.
    ///
    /// The thread that runs this loop becomes the context thread.
    #[must_use]
    pub fn new(
        buffer: Arc<TripleBuffer<S>>,
        context: ContextOwner<G>,
        renderer: R,
        cap: Arc<RateCap>,
    ) -> Self {
        Self {
            buffer,
            context,
            renderer,
            cap,
            frames: 0,
            fresh_frames: 0,
        }
    }
}

impl<S, G, R> Cycle for RenderLoop<S, G, R>
where
    S: RenderState,
    G: Send + 'static,
    R: Renderer<S, G>,
{
    type Error = R::Error;

    fn update(&mut self, seconds: f64) -> Result<(), Self::Error> {
        self.context.pump();

        let frame = self.buffer.start_read();
        let renderer = &mut self.renderer;
        let result = self
            .context
            .with_native(|native| renderer.render(&frame, native, seconds));

        self.frames += 1;
        if frame.stop_read() {
            self.fresh_frames += 1;
        }
        result
    }

    fn minimum_cycle_time(&self) -> Duration {
        self.cap.effective_minimum()
    }

    fn cleanup(&mut self) {
        self.context.pump();
        let renderer = &mut self.renderer;
        self.context.with_native(|native| renderer.cleanup(native));
        let discarded = self.context.close();

        debug!(
            frames = self.frames,
            fresh_frames = self.fresh_frames,
            discarded,
            "render loop cleaned up"
        );
    }
}
