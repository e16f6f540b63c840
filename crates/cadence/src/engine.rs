//! # Engine Context
//!
//! Owns everything the two loops share and nothing global:
//!
//! ```text
//! Engine::new(config, buffer)
//!   ├─ Arc<TripleBuffer<S>>      shared by both loops
//!   ├─ GraphicsContext<G>        handed to any thread that needs the GPU
//!   └─ Arc<RateCap> x2           retunable while running
//! Engine::start(simulation, renderer, native)
//!   ├─ "cadence-update"  UpdateLoop
//!   └─ "cadence-render"  RenderLoop (owns `native`)
//! Engine::shutdown() -> EngineStats
//! ```

use std::sync::Arc;

use cadence_core::{
    CycleHandle, CycleStats, CycleThread, EngineConfig, LoopConfig, RateCap, RenderState,
    TripleBuffer,
};
use tracing::{info, warn};

use crate::context::{ContextOwner, GraphicsContext};
use crate::error::{EngineError, EngineResult};
use crate::loops::{RenderLoop, Renderer, Simulation, UpdateLoop};

/// Update thread name.
pub const UPDATE_THREAD: &str = "cadence-update";

/// Render thread name.
pub const RENDER_THREAD: &str = "cadence-render";

/// Statistics from both loops, returned by [`Engine::shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Update loop.
    pub update: CycleStats,
    /// Render loop.
    pub render: CycleStats,
}

struct Running {
    update: CycleHandle,
    render: CycleHandle,
}

/// Explicit engine context with a start/shutdown lifecycle.
pub struct Engine<S: RenderState, G> {
    config: EngineConfig,
    buffer: Arc<TripleBuffer<S>>,
    graphics: GraphicsContext<G>,
    update_cap: Arc<RateCap>,
    render_cap: Arc<RateCap>,
    running: Option<Running>,
    started: bool,
}

impl<S: RenderState, G: Send + 'static> Engine<S, G> {
    /// Creates a stopped engine around `buffer`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if `config` does not validate.
    pub fn new(config: EngineConfig, buffer: TripleBuffer<S>) -> EngineResult<Self> {
        config.validate()?;

        Ok(Self {
            update_cap: Arc::new(RateCap::from_config(&config.update)),
            render_cap: Arc::new(RateCap::from_config(&config.render)),
            buffer: Arc::new(buffer),
            graphics: GraphicsContext::new(),
            running: None,
            started: false,
            config,
        })
    }

    /// Spawns the update and render threads. `native` moves to the render
    /// thread, which becomes the context thread.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyStarted`] on a second call,
    /// [`EngineError::Scheduler`] if a thread cannot be spawned (the other
    /// one is stopped again).
    pub fn start<Sim, R>(&mut self, simulation: Sim, renderer: R, native: G) -> EngineResult<()>
    where
        Sim: Simulation<S>,
        R: Renderer<S, G>,
    {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.started = true;

        let update = loop_thread(UPDATE_THREAD, &self.config.update, &self.config)
            .spawn(UpdateLoop::new(
                Arc::clone(&self.buffer),
                simulation,
                Arc::clone(&self.update_cap),
            ))?;

        let render_loop = RenderLoop::new(
            Arc::clone(&self.buffer),
            ContextOwner::new(native, &self.graphics),
            renderer,
            Arc::clone(&self.render_cap),
        );
        let render = match loop_thread(RENDER_THREAD, &self.config.render, &self.config)
            .spawn(render_loop)
        {
            Ok(handle) => handle,
            Err(err) => {
                if let Err(update_err) = update.shutdown() {
                    warn!(error = %update_err, "update loop failed while aborting start");
                }
                return Err(err.into());
            }
        };

        info!(
            update_hz = self.config.update.rate_hz,
            update_locked = self.update_cap.is_locked(),
            render_hz = self.config.render.rate_hz,
            render_locked = self.render_cap.is_locked(),
            "engine started"
        );
        self.running = Some(Running { update, render });
        Ok(())
    }

    /// Stops both loops and waits for them.
    ///
    /// Both threads are asked to stop before either is joined, so a slow
    /// loop does not keep the other one cycling.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotRunning`] if the engine is not running, otherwise
    /// the first loop failure (update loop first).
    pub fn shutdown(&mut self) -> EngineResult<EngineStats> {
        let Running { update, render } = self.running.take().ok_or(EngineError::NotRunning)?;

        update.request_stop();
        render.request_stop();
        let update = update.join();
        let render = render.join();

        let stats = EngineStats {
            update: update?,
            render: render?,
        };
        info!(
            updates = stats.update.cycles,
            frames = stats.render.cycles,
            "engine stopped"
        );
        Ok(stats)
    }

    /// The shared triple buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<TripleBuffer<S>> {
        &self.buffer
    }

    /// Handle for marshaling work onto the render thread.
    #[must_use]
    pub fn graphics(&self) -> &GraphicsContext<G> {
        &self.graphics
    }

    /// Update-rate cap, read by the update loop every cycle.
    #[must_use]
    pub fn update_cap(&self) -> &Arc<RateCap> {
        &self.update_cap
    }

    /// Fps cap, read by the render loop every cycle.
    #[must_use]
    pub fn render_cap(&self) -> &Arc<RateCap> {
        &self.render_cap
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns true between `start` and `shutdown`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl<S: RenderState, G> Drop for Engine<S, G> {
    fn drop(&mut self) {
        if let Some(Running { update, render }) = self.running.take() {
            update.request_stop();
            render.request_stop();
            for (name, result) in [(UPDATE_THREAD, update.join()), (RENDER_THREAD, render.join())] {
                if let Err(err) = result {
                    warn!(thread = name, error = %err, "loop failed during engine drop");
                }
            }
        }
    }
}

fn loop_thread(name: &str, section: &LoopConfig, config: &EngineConfig) -> CycleThread {
    CycleThread::new(name)
        .poll_interval(config.pacing.poll_interval())
        .error_policy(section.error_policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::StateCore;
    use std::convert::Infallible;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Tick {
        core: StateCore,
        n: u64,
    }

    impl RenderState for Tick {
        fn core(&self) -> &StateCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut StateCore {
            &mut self.core
        }
    }

    struct Ticker(u64);

    impl Simulation<Tick> for Ticker {
        type Error = Infallible;

        fn step(&mut self, state: &mut Tick, _seconds: f64) -> Result<(), Infallible> {
            self.0 += 1;
            state.n = self.0;
            Ok(())
        }
    }

    struct Idle;

    impl Renderer<Tick, ()> for Idle {
        type Error = Infallible;

        fn render(&mut self, _frame: &Tick, _native: &mut (), _seconds: f64) -> Result<(), Infallible> {
            Ok(())
        }
    }

    fn engine() -> Engine<Tick, ()> {
        Engine::new(EngineConfig::default(), TripleBuffer::from_fn(Tick::default, Vec::new())).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.update.rate_hz = -1.0;
        let result = Engine::<Tick, ()>::new(config, TripleBuffer::from_fn(Tick::default, Vec::new()));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_lifecycle() {
        let mut engine = engine();
        assert!(!engine.is_running());
        assert!(matches!(engine.shutdown(), Err(EngineError::NotRunning)));

        engine.start(Ticker(0), Idle, ()).unwrap();
        assert!(engine.is_running());
        assert!(matches!(
            engine.start(Ticker(0), Idle, ()),
            Err(EngineError::AlreadyStarted)
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.buffer().cycle() < 3 {
            assert!(Instant::now() < deadline, "update loop stalled");
            thread::sleep(Duration::from_millis(5));
        }

        let stats = engine.shutdown().unwrap();
        assert!(!engine.is_running());
        assert!(stats.update.cycles >= 3);
        assert!(stats.render.cycles >= 1);
        assert!(engine.graphics().is_closed());

        let frame = engine.buffer().start_read();
        assert!(frame.cycle() >= 1);
        assert_eq!(frame.n, frame.cycle());
    }

    #[test]
    fn test_drop_stops_running_loops() {
        let mut engine = engine();
        engine.start(Ticker(0), Idle, ()).unwrap();
        let graphics = engine.graphics().clone();
        drop(engine);
        assert!(graphics.is_closed());
    }
}
