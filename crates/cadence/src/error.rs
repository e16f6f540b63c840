//! Engine lifecycle errors.

use cadence_core::{ConfigError, SchedulerError};
use thiserror::Error;

/// Errors raised while starting or stopping an [`Engine`](crate::Engine).
#[derive(Error, Debug)]
pub enum EngineError {
    /// `start` was called on an engine that has already been started once.
    #[error("engine already started")]
    AlreadyStarted,

    /// `shutdown` was called on an engine with no running loops.
    #[error("engine is not running")]
    NotRunning,

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A loop thread failed to spawn or terminated on a failure.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
