//! # Command Futures
//!
//! A blocking, thread-based promise pair. The owning thread completes the
//! [`Promise`] when it runs the command; any other thread waits on the
//! [`CommandFuture`].
//!
//! Every promise completes exactly once: with the command's value, with
//! [`CommandError::Panicked`] if the command panicked, or with
//! [`CommandError::Dropped`] if the promise is dropped unexecuted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::token::OwnerSlot;
use crate::error::{CommandError, CommandResult};

/// Shared completion cell.
struct Completion<R> {
    done: AtomicBool,
    value: Mutex<Option<CommandResult<R>>>,
    condvar: Condvar,
}

impl<R> Completion<R> {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            value: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }

    fn fulfil(&self, result: CommandResult<R>) {
        let mut value = self.value.lock();
        *value = Some(result);
        self.done.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}

/// Creates a connected promise/future pair.
pub(crate) fn pair<R>(owner: Arc<OwnerSlot>) -> (Promise<R>, CommandFuture<R>) {
    let completion = Arc::new(Completion::new());
    (
        Promise {
            completion: Some(Arc::clone(&completion)),
        },
        CommandFuture { completion, owner },
    )
}

/// Write side of a command's result. Completes with `Dropped` if never used.
pub(crate) struct Promise<R> {
    completion: Option<Arc<Completion<R>>>,
}

impl<R> Promise<R> {
    pub(crate) fn complete(mut self, result: CommandResult<R>) {
        if let Some(completion) = self.completion.take() {
            completion.fulfil(result);
        }
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.fulfil(Err(CommandError::Dropped));
        }
    }
}

/// Handle returned to the submitter for tracking a command's result.
///
/// ## Usage
///
/// ```rust,ignore
/// let future = queue.add_command(|_: &mut ()| 6 * 7);
/// // ... owning thread calls queue.execute_commands(&mut ()) ...
/// assert_eq!(future.wait(), Ok(42));
/// ```
pub struct CommandFuture<R> {
    completion: Arc<Completion<R>>,
    owner: Arc<OwnerSlot>,
}

impl<R> CommandFuture<R> {
    /// Returns true once the command has run (or failed, or been dropped).
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completion.done.load(Ordering::Acquire)
    }

    /// Blocks until the command completes and returns its result.
    ///
    /// # Errors
    ///
    /// - [`CommandError::Panicked`] if the command panicked.
    /// - [`CommandError::Dropped`] if the command was discarded unexecuted.
    /// - [`CommandError::Reentrant`] if called on the queue's owning thread
    ///   while the command is still pending; waiting there could never finish.
    pub fn wait(self) -> CommandResult<R> {
        let mut value = self.completion.value.lock();
        if value.is_none() && self.owner.is_current() {
            return Err(CommandError::Reentrant);
        }
        while value.is_none() {
            self.completion.condvar.wait(&mut value);
        }
        value.take().unwrap_or(Err(CommandError::Dropped))
    }

    /// Waits up to `timeout`. Returns true if the command completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut value = self.completion.value.lock();
        while value.is_none() {
            if self.completion.condvar.wait_until(&mut value, deadline).timed_out() {
                return value.is_some();
            }
        }
        true
    }

    /// Takes the result without blocking, or hands the future back if pending.
    ///
    /// # Errors
    ///
    /// Returns `Err(self)` while the command has not completed yet.
    pub fn try_take(self) -> Result<CommandResult<R>, Self> {
        let taken = self.completion.value.lock().take();
        match taken {
            Some(result) => Ok(result),
            None => Err(self),
        }
    }
}

impl<R> std::fmt::Debug for CommandFuture<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFuture")
            .field("done", &self.is_done())
            .finish()
    }
}
