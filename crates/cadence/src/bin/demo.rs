//! # CADENCE Demo
//!
//! Runs an orbiting-point simulation against a mock graphics device, then
//! prints loop statistics.
//!
//! ```bash
//! # 3 seconds with default rates
//! RUST_LOG=cadence=debug cadence_demo 3
//!
//! # With a config file
//! cadence_demo 5 cadence.toml
//! ```

use std::convert::Infallible;
use std::env;
use std::error::Error;
use std::process;
use std::thread;
use std::time::Duration;

use cadence::core::{
    EngineConfig, RenderState, SingletonAction, StateCore, StateRef, TripleBuffer,
};
use cadence::{Engine, Renderer, Simulation};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_RUN_SECONDS: f64 = 2.0;

/// Singleton action slot: clears the trail.
const RESET_TRAIL: usize = 0;

/// One simulation snapshot.
#[derive(Default)]
struct Orbit {
    core: StateCore,
    angle: f64,
    step: u64,
    trail: Vec<f64>,
}

impl RenderState for Orbit {
    fn core(&self) -> &StateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StateCore {
        &mut self.core
    }

    fn on_update(&mut self) {
        self.trail.push(self.angle);
        if self.trail.len() > 64 {
            self.trail.remove(0);
        }
    }
}

/// Label attached to every instance through the custom state registry.
#[derive(Default)]
struct Caption(String);

struct Spinner {
    angle: f64,
    step: u64,
    radians_per_second: f64,
}

impl Simulation<Orbit> for Spinner {
    type Error = Infallible;

    fn step(&mut self, state: &mut Orbit, seconds: f64) -> Result<(), Infallible> {
        self.angle = (self.angle + self.radians_per_second * seconds) % std::f64::consts::TAU;
        self.step += 1;
        state.angle = self.angle;
        state.step = self.step;
        Ok(())
    }
}

/// Stand-in for a GPU device.
#[derive(Debug, Default)]
struct MockDevice {
    presented: u64,
    uploads: u64,
    last_step: u64,
}

struct Presenter {
    caption: StateRef<Caption>,
}

impl Renderer<Orbit, MockDevice> for Presenter {
    type Error = Infallible;

    fn render(
        &mut self,
        frame: &Orbit,
        device: &mut MockDevice,
        _seconds: f64,
    ) -> Result<(), Infallible> {
        device.presented += 1;
        if frame.step != device.last_step {
            device.uploads += 1;
            device.last_step = frame.step;
        }
        if device.presented % 500 == 0 {
            let caption = frame
                .custom_state()
                .get(self.caption)
                .map_or("", |caption| caption.0.as_str());
            debug!(
                caption,
                step = frame.step,
                cycle = frame.cycle(),
                angle = frame.angle,
                trail = frame.trail.len(),
                "frame"
            );
        }
        Ok(())
    }

    fn cleanup(&mut self, device: &mut MockDevice) {
        info!(presented = device.presented, uploads = device.uploads, "device released");
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if let Err(err) = run() {
        error!("{err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let seconds = match args.next() {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|err| format!("bad duration `{raw}`: {err}"))?,
        None => DEFAULT_RUN_SECONDS,
    };
    let config = match args.next() {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let run_for =
        Duration::try_from_secs_f64(seconds).map_err(|err| format!("bad duration: {err}"))?;

    let reset_trail: SingletonAction<Orbit> = Box::new(|orbit: &mut Orbit| orbit.trail.clear());
    let buffer = TripleBuffer::from_fn(Orbit::default, vec![reset_trail]);
    let caption = buffer.register_state(Caption::default)?;
    buffer.add_command(move |orbit: &mut Orbit| {
        if let Some(label) = orbit.custom_state_mut().get_mut(caption) {
            label.0 = "cadence demo".to_owned();
        }
    });

    let mut engine = Engine::new(config, buffer)?;
    engine.start(
        Spinner {
            angle: 0.0,
            step: 0,
            radians_per_second: 1.5,
        },
        Presenter { caption },
        MockDevice::default(),
    )?;

    thread::sleep(run_for / 2);

    let presented = engine.graphics().calculate(|device: &mut MockDevice| device.presented)?;
    info!(presented, "halfway: locking fps and resetting trail");
    engine.render_cap().set_locked(true);
    engine.buffer().request_singleton_action(RESET_TRAIL)?;

    thread::sleep(run_for / 2);

    let swaps = engine.buffer().swap_count();
    let stats = engine.shutdown()?;

    for (name, loop_stats) in [("update", stats.update), ("render", stats.render)] {
        println!(
            "{name}: {:>8} cycles  avg {:>5} us  max {:>6} us  late {:>4}  failed {}",
            loop_stats.cycles,
            loop_stats.avg_update_us,
            loop_stats.max_update_us,
            loop_stats.late_cycles,
            loop_stats.failures,
        );
    }
    println!("swaps:  {swaps:>8}");
    Ok(())
}
