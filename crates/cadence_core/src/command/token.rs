//! # Owning-Thread Token
//!
//! A queue (and the graphics context behind it) is drained by exactly one
//! thread. The token records which one, so the boundary can be checked
//! instead of trusted.

use std::sync::OnceLock;
use std::thread::{self, ThreadId};

/// Identity of a thread that owns a command queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadToken(ThreadId);

impl ThreadToken {
    /// Token for the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self(thread::current().id())
    }

    /// Returns true when called from the thread this token names.
    #[inline]
    #[must_use]
    pub fn is_current(self) -> bool {
        thread::current().id() == self.0
    }

    /// The underlying thread id.
    #[inline]
    #[must_use]
    pub const fn thread_id(self) -> ThreadId {
        self.0
    }
}

/// Set-once owner record shared by a queue and every future it hands out.
#[derive(Debug, Default)]
pub(crate) struct OwnerSlot(OnceLock<ThreadToken>);

impl OwnerSlot {
    /// Binds the owner. Returns false if a different thread already owns it.
    pub(crate) fn bind(&self, token: ThreadToken) -> bool {
        *self.0.get_or_init(|| token) == token
    }

    pub(crate) fn get(&self) -> Option<ThreadToken> {
        self.0.get().copied()
    }

    /// True when unbound, or bound to the calling thread.
    pub(crate) fn permits_current(&self) -> bool {
        self.get().map_or(true, ThreadToken::is_current)
    }

    /// True only when bound to the calling thread.
    pub(crate) fn is_current(&self) -> bool {
        self.get().is_some_and(ThreadToken::is_current)
    }
}
