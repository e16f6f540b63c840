//! # Core Error Types
//!
//! All errors that can surface from the substrate.

use std::io;

use thiserror::Error;

/// Errors raised by the triple buffer on protocol misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A custom state was registered after the first swap.
    #[error("custom state registry is frozen once buffers have started swapping")]
    RegistryFrozen,

    /// A singleton action index outside the configured set was requested.
    #[error("unknown singleton action {index} (buffer has {len})")]
    UnknownSingletonAction {
        /// The requested index.
        index: usize,
        /// Number of singleton actions the buffer was built with.
        len: usize,
    },
}

/// Failure delivered through a [`CommandFuture`](crate::command::CommandFuture).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command panicked while executing on the owning thread.
    #[error("command panicked: {0}")]
    Panicked(String),

    /// The command was dropped before it ever ran (its queue went away).
    #[error("command dropped before execution")]
    Dropped,

    /// The owning thread tried to block on its own queue.
    #[error("blocking wait from the queue's owning thread would deadlock")]
    Reentrant,
}

/// Errors raised by the cycle scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The OS refused to spawn the scheduler thread.
    #[error("failed to spawn cycle thread: {0}")]
    Spawn(#[from] io::Error),

    /// A cycle failed under [`ErrorPolicy::Terminate`](crate::schedule::ErrorPolicy::Terminate).
    #[error("cycle thread `{name}` terminated: {reason}")]
    CycleFailed {
        /// Thread name.
        name: String,
        /// Rendered failure.
        reason: String,
    },

    /// The thread died outside the guarded update (e.g. in `cleanup`).
    #[error("cycle thread `{name}` panicked")]
    Panicked {
        /// Thread name.
        name: String,
    },
}

/// Errors raised while loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    /// The config file is not valid TOML for [`EngineConfig`](crate::config::EngineConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but holds values the engine cannot run with.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for triple buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Result type for command completion.
pub type CommandResult<T> = Result<T, CommandError>;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Renders a caught panic payload for logs and error values.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
