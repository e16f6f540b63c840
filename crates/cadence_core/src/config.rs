//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration. A key missing from `[update]` or `[render]`
//! takes that loop's own default.
//!
//! ```toml
//! [update]
//! rate_hz = 60.0
//! locked = true
//! error_policy = "continue"
//!
//! [render]
//! rate_hz = 144.0
//! locked = false
//!
//! [pacing]
//! poll_interval_us = 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::schedule::{ErrorPolicy, DEFAULT_POLL_INTERVAL};

/// Default simulation rate.
pub const DEFAULT_UPDATE_RATE_HZ: f64 = 60.0;

/// Default render rate when the fps lock is on.
pub const DEFAULT_RENDER_RATE_HZ: f64 = 144.0;

/// Rate settings for one loop.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopConfig {
    /// Target cycles per second.
    pub rate_hz: f64,
    /// Whether the rate is enforced. Unlocked loops run uncapped.
    pub locked: bool,
    /// What to do when a cycle fails.
    pub error_policy: ErrorPolicy,
}

impl LoopConfig {
    /// Simulation defaults: 60 Hz, locked.
    #[must_use]
    pub fn update_defaults() -> Self {
        Self {
            rate_hz: DEFAULT_UPDATE_RATE_HZ,
            locked: true,
            error_policy: ErrorPolicy::Continue,
        }
    }

    /// Render defaults: 144 Hz, unlocked.
    #[must_use]
    pub fn render_defaults() -> Self {
        Self {
            rate_hz: DEFAULT_RENDER_RATE_HZ,
            locked: false,
            error_policy: ErrorPolicy::Continue,
        }
    }

    fn validate(&self, section: &str) -> ConfigResult<()> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "[{section}] rate_hz must be a positive number, got {}",
                self.rate_hz
            )));
        }
        Ok(())
    }
}

/// A loop table as written. Keys left out keep that loop's own defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoopSection {
    rate_hz: Option<f64>,
    locked: Option<bool>,
    error_policy: Option<ErrorPolicy>,
}

impl LoopSection {
    fn over(self, defaults: LoopConfig) -> LoopConfig {
        LoopConfig {
            rate_hz: self.rate_hz.unwrap_or(defaults.rate_hz),
            locked: self.locked.unwrap_or(defaults.locked),
            error_policy: self.error_policy.unwrap_or(defaults.error_policy),
        }
    }
}

/// Pacing settings shared by both loops.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingConfig {
    /// Interval between elapsed-time polls while pacing (microseconds).
    pub poll_interval_us: u64,
}

impl PacingConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: u64::try_from(DEFAULT_POLL_INTERVAL.as_micros()).unwrap_or(100),
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "EngineFile")]
pub struct EngineConfig {
    /// Simulation loop.
    pub update: LoopConfig,
    /// Render loop.
    pub render: LoopConfig,
    /// Pacing.
    pub pacing: PacingConfig,
}

/// The configuration file as written.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EngineFile {
    update: LoopSection,
    render: LoopSection,
    pacing: PacingConfig,
}

impl From<EngineFile> for EngineConfig {
    fn from(file: EngineFile) -> Self {
        Self {
            update: file.update.over(LoopConfig::update_defaults()),
            render: file.render.over(LoopConfig::render_defaults()),
            pacing: file.pacing,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys,
    /// [`ConfigError::Invalid`] for values the engine cannot run with.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> ConfigResult<()> {
        self.update.validate("update")?;
        self.render.validate("render")?;
        if self.pacing.poll_interval_us == 0 {
            return Err(ConfigError::Invalid(
                "[pacing] poll_interval_us must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update: LoopConfig::update_defaults(),
            render: LoopConfig::render_defaults(),
            pacing: PacingConfig::default(),
        }
    }
}
