//! # Graphics Context Marshaling
//!
//! The native graphics handle lives on exactly one thread. Every other thread
//! reaches it by sending a command.
//!
//! ```text
//!   any thread                           context thread
//!   ──────────                           ──────────────
//!   GraphicsContext::calculate(f) ──┐
//!   GraphicsContext::submit(f) ─────┼──> queue ──> ContextOwner::pump()
//!   GraphicsContext::execute(f) ────┘                  f(&mut G)
//! ```
//!
//! The first thread to call [`ContextOwner::pump`] becomes the context
//! thread. Blocking calls from that thread fail with
//! [`CommandError::Reentrant`](cadence_core::CommandError::Reentrant) instead
//! of deadlocking.

use std::fmt;
use std::sync::Arc;

use cadence_core::error::CommandResult;
use cadence_core::{CommandFuture, CommandQueue, QueueStats, ThreadToken};
use tracing::{debug, warn};

/// Handle to the graphics context for threads that do not own it.
///
/// Cheap to clone, `Send + Sync`. The native handle is only ever reachable as
/// the `&mut G` argument of a command.
pub struct GraphicsContext<G> {
    queue: Arc<CommandQueue<G>>,
}

impl<G: Send + 'static> GraphicsContext<G> {
    /// Creates a context with no owner yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Arc::new(CommandQueue::new()),
        }
    }

    /// Runs `command` on the context thread, optionally waiting for it.
    ///
    /// # Errors
    ///
    /// With `block` set: the command's failure, or `Reentrant` when called
    /// from the context thread.
    pub fn execute<F>(&self, command: F, block: bool) -> CommandResult<()>
    where
        F: FnOnce(&mut G) + Send + 'static,
    {
        self.queue.execute(command, block)
    }

    /// Runs `command` on the context thread and waits for its result.
    ///
    /// # Errors
    ///
    /// The command's failure, or `Reentrant` when called from the context
    /// thread.
    pub fn calculate<R, F>(&self, command: F) -> CommandResult<R>
    where
        F: FnOnce(&mut G) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.queue.calculate(command)
    }

    /// Queues `command` and returns its future without waiting.
    pub fn submit<R, F>(&self, command: F) -> CommandFuture<R>
    where
        F: FnOnce(&mut G) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.queue.add_command(command)
    }

    /// Returns true on the thread that drains this context.
    #[must_use]
    pub fn is_context_thread(&self) -> bool {
        self.queue.owner().is_some_and(ThreadToken::is_current)
    }

    /// Commands waiting for the context thread.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns true once the owning side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Queue counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl<G: Send + 'static> Default for GraphicsContext<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> Clone for GraphicsContext<G> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<G> fmt::Debug for GraphicsContext<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("queue", &self.queue)
            .finish()
    }
}

/// The context-thread side: owns the native handle and drains commands.
///
/// Dropping the owner closes the context. Outstanding and later commands
/// complete with `Dropped`.
pub struct ContextOwner<G> {
    native: G,
    queue: Arc<CommandQueue<G>>,
    bound: bool,
}

impl<G: Send + 'static> ContextOwner<G> {
    /// Takes ownership of `native` and attaches it to `context`.
    #[must_use]
    pub fn new(native: G, context: &GraphicsContext<G>) -> Self {
        Self {
            native,
            queue: Arc::clone(&context.queue),
            bound: false,
        }
    }

    /// Runs every queued command against the native handle.
    ///
    /// The first call binds the context to the calling thread. Returns the
    /// number of commands run.
    pub fn pump(&mut self) -> usize {
        if !self.bound {
            self.bound = true;
            if self.queue.bind_to_current_thread() {
                debug!("graphics context bound to current thread");
            } else {
                warn!("graphics context already bound to another thread");
            }
        }
        self.queue.execute_commands(&mut self.native)
    }

    /// Runs `f` directly against the native handle.
    pub fn with_native<R>(&mut self, f: impl FnOnce(&mut G) -> R) -> R {
        f(&mut self.native)
    }

    /// Shared access to the native handle.
    #[must_use]
    pub fn native(&self) -> &G {
        &self.native
    }

    /// A new handle for other threads.
    #[must_use]
    pub fn context(&self) -> GraphicsContext<G> {
        GraphicsContext {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Closes the context. Returns the number of commands discarded.
    pub fn close(&mut self) -> usize {
        self.queue.close()
    }
}

impl<G> Drop for ContextOwner<G> {
    fn drop(&mut self) {
        let discarded = self.queue.close();
        if discarded > 0 {
            debug!(discarded, "graphics context closed with commands pending");
        }
    }
}

impl<G: fmt::Debug> fmt::Debug for ContextOwner<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOwner")
            .field("native", &self.native)
            .field("bound", &self.bound)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::CommandError;
    use std::thread;

    #[derive(Debug, Default)]
    struct MockDevice {
        buffers: Vec<u32>,
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_context_handle_is_send_sync() {
        assert_send_sync::<GraphicsContext<MockDevice>>();
    }

    #[test]
    fn test_calculate_from_another_thread() {
        let context = GraphicsContext::new();
        let mut owner = ContextOwner::new(MockDevice::default(), &context);

        let worker = {
            let context = context.clone();
            thread::spawn(move || {
                assert!(!context.is_context_thread());
                context.calculate(|device: &mut MockDevice| {
                    device.buffers.push(7);
                    device.buffers.len()
                })
            })
        };

        while !worker.is_finished() {
            owner.pump();
            thread::yield_now();
        }

        assert_eq!(worker.join().unwrap(), Ok(1));
        assert_eq!(owner.native().buffers, vec![7]);
        assert!(context.is_context_thread());
    }

    #[test]
    fn test_blocking_on_context_thread_is_rejected() {
        let context = GraphicsContext::new();
        let mut owner = ContextOwner::new(MockDevice::default(), &context);
        owner.pump();

        assert!(context.is_context_thread());
        assert_eq!(
            context.calculate(|device: &mut MockDevice| device.buffers.len()),
            Err(CommandError::Reentrant)
        );

        // Non-blocking submission from the context thread runs on the next pump.
        let future = context.submit(|device: &mut MockDevice| device.buffers.push(1));
        assert_eq!(owner.pump(), 1);
        assert_eq!(future.wait(), Ok(()));
        assert_eq!(owner.with_native(|device| device.buffers.len()), 1);
    }

    #[test]
    fn test_dropping_owner_fails_outstanding_commands() {
        let context = GraphicsContext::new();
        let owner = ContextOwner::new(MockDevice::default(), &context);

        let pending = context.submit(|device: &mut MockDevice| device.buffers.len());
        drop(owner);

        assert!(context.is_closed());
        assert_eq!(pending.wait(), Err(CommandError::Dropped));
        assert_eq!(
            context.calculate(|device: &mut MockDevice| device.buffers.len()),
            Err(CommandError::Dropped)
        );
    }
}
