//! # Command Queue
//!
//! Thread-safe FIFO of deferred work. Any thread may enqueue; only the
//! owning thread drains and executes.
//!
//! ## Architecture
//!
//! ```text
//!   Thread 1 ──┐
//!   Thread 2 ──┼──> [Unbounded FIFO] ──> [Owning thread] ──> run(&mut C)
//!   Thread N ──┘     (any thread)         (drains, completes futures)
//! ```
//!
//! Capacity policy: unbounded. A submitted command is never silently dropped;
//! it either runs or its future completes with [`CommandError::Dropped`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::error;

use super::future::{self, CommandFuture};
use super::token::{OwnerSlot, ThreadToken};
use crate::error::{panic_message, CommandError, CommandResult};

/// A type-erased command. Returns false if the command panicked.
type Job<C> = Box<dyn FnOnce(&mut C) -> bool + Send>;

/// Queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Commands submitted.
    pub enqueued: u64,
    /// Commands that ran to completion.
    pub executed: u64,
    /// Commands that panicked.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

/// Cross-thread command queue.
///
/// `C` is the context the owning thread lends to each command while draining:
/// `()` for plain runnables, a render state for triple-buffer mutations, the
/// native handle for the graphics context.
pub struct CommandQueue<C = ()> {
    sender: Sender<Job<C>>,
    receiver: Receiver<Job<C>>,
    owner: Arc<OwnerSlot>,
    counters: Counters,
    closed: AtomicBool,
}

impl<C> CommandQueue<C> {
    /// Creates an empty, unowned queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            owner: Arc::new(OwnerSlot::default()),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Binds the queue to its draining thread.
    ///
    /// Returns false if another thread already owns it. Once bound, draining
    /// from any other thread trips a debug assertion and blocking waits from
    /// the owner fail with [`CommandError::Reentrant`].
    pub fn bind_owner(&self, token: ThreadToken) -> bool {
        self.owner.bind(token)
    }

    /// Binds the queue to the calling thread.
    pub fn bind_to_current_thread(&self) -> bool {
        self.bind_owner(ThreadToken::current())
    }

    /// The owning thread, if bound.
    #[must_use]
    pub fn owner(&self) -> Option<ThreadToken> {
        self.owner.get()
    }

    /// Enqueues a command and returns its future immediately.
    ///
    /// Commands run in admission order. The future completes when the owning
    /// thread executes the command.
    pub fn add_command<R, F>(&self, command: F) -> CommandFuture<R>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = future::pair(Arc::clone(&self.owner));

        let job: Job<C> = Box::new(move |ctx: &mut C| {
            match panic::catch_unwind(AssertUnwindSafe(|| command(ctx))) {
                Ok(value) => {
                    promise.complete(Ok(value));
                    true
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("command failed: {message}");
                    promise.complete(Err(CommandError::Panicked(message)));
                    false
                }
            }
        });

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        // The receiver lives as long as `self`, so this cannot fail. If it
        // ever did, the returned job drops here and its future reports Dropped.
        let _ = self.sender.send(job);

        // Lost the race with close(): nobody will drain this queue again.
        if self.closed.load(Ordering::SeqCst) {
            self.purge();
        }

        future
    }

    /// Stops the queue for good.
    ///
    /// Pending commands are discarded and their futures complete with
    /// [`CommandError::Dropped`], as do the futures of commands submitted
    /// afterwards. Returns the number of commands discarded by this call.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.purge()
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn purge(&self) -> usize {
        let mut discarded = 0;
        while let Ok(job) = self.receiver.try_recv() {
            drop(job);
            discarded += 1;
        }
        discarded
    }

    /// Pops and runs one command on the calling thread.
    ///
    /// Returns false if the queue was empty.
    pub fn execute_command(&self, ctx: &mut C) -> bool {
        debug_assert!(
            self.owner.permits_current(),
            "command queue drained off its owning thread"
        );

        let Ok(job) = self.receiver.try_recv() else {
            return false;
        };

        if job(ctx) {
            self.counters.executed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Drains the queue. Returns the number of commands run.
    pub fn execute_commands(&self, ctx: &mut C) -> usize {
        let mut count = 0;
        while self.execute_command(ctx) {
            count += 1;
        }
        count
    }

    /// Enqueues a command and optionally blocks until it has run.
    ///
    /// # Errors
    ///
    /// With `block` set, returns the command's failure, or
    /// [`CommandError::Reentrant`] (without enqueuing) when called from the
    /// owning thread.
    pub fn execute<F>(&self, command: F, block: bool) -> CommandResult<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if !block {
            drop(self.add_command(command));
            return Ok(());
        }
        self.calculate(command)
    }

    /// Enqueues a command and blocks until its result is available.
    ///
    /// # Errors
    ///
    /// Returns the command's failure, or [`CommandError::Reentrant`] (without
    /// enqueuing) when called from the owning thread.
    pub fn calculate<R, F>(&self, command: F) -> CommandResult<R>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.owner.is_current() {
            return Err(CommandError::Reentrant);
        }
        self.add_command(command).wait()
    }

    /// Number of commands waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is waiting to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Snapshot of the queue counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl<C> Default for CommandQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for CommandQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.len())
            .field("owner", &self.owner())
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}
