//! # Cross-Thread Command Marshaling
//!
//! The graphics context is thread-affine. Every other thread reaches it the
//! same way: wrap the work in a command, enqueue it, optionally wait.
//!
//! ```text
//! Update thread ──add_command──┐
//! Loader thread ──add_command──┼──> CommandQueue<G> ──> Context thread
//! Any thread    ──calculate────┘          │              execute_commands(&mut G)
//!                     ▲                   │
//!                     └── CommandFuture ◄─┘ (value, Panicked, or Dropped)
//! ```

mod future;
mod queue;
mod token;

pub use future::CommandFuture;
pub use queue::{CommandQueue, QueueStats};
pub use token::ThreadToken;
