//! # Render State
//!
//! The snapshot produced every simulation cycle and consumed every render
//! cycle. Engine code defines its own state type and embeds a [`StateCore`];
//! the triple buffer only ever talks to it through [`RenderState`].

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

/// Opaque handle to a custom state slot.
///
/// Returned by [`TripleBuffer::register_state`](super::TripleBuffer::register_state).
/// The same handle addresses the same slot in all three physical instances.
pub struct StateRef<S> {
    index: usize,
    _marker: PhantomData<fn() -> S>,
}

impl<S> StateRef<S> {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Slot index (for debugging).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl<S> Clone for StateRef<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StateRef<S> {}

impl<S> PartialEq for StateRef<S> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<S> Eq for StateRef<S> {}

impl<S> fmt::Debug for StateRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateRef").field(&self.index).finish()
    }
}

/// Index-addressed extension slots attached to one physical state instance.
///
/// Slots are only appended through the triple buffer, so every instance holds
/// the same concrete type at the same index.
#[derive(Default)]
pub struct CustomState {
    slots: Vec<Box<dyn Any + Send>>,
}

impl CustomState {
    /// Creates an empty slot set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push<S: Any + Send>(&mut self, slot: S) -> usize {
        self.slots.push(Box::new(slot));
        self.slots.len() - 1
    }

    /// Borrows the slot behind `handle`.
    ///
    /// Returns `None` only for a handle issued by a different buffer.
    #[must_use]
    pub fn get<S: Any>(&self, handle: StateRef<S>) -> Option<&S> {
        self.slots.get(handle.index)?.downcast_ref()
    }

    /// Mutably borrows the slot behind `handle`.
    #[must_use]
    pub fn get_mut<S: Any>(&mut self, handle: StateRef<S>) -> Option<&mut S> {
        self.slots.get_mut(handle.index)?.downcast_mut()
    }

    /// Number of registered slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for CustomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomState")
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Bookkeeping every render state carries.
#[derive(Debug, Default)]
pub struct StateCore {
    cycle: u64,
    custom: CustomState,
}

impl StateCore {
    /// Fresh core at cycle 0 with no custom slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write cycle that last produced this instance.
    #[inline]
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Custom state slots.
    #[inline]
    #[must_use]
    pub fn custom(&self) -> &CustomState {
        &self.custom
    }

    /// Mutable custom state slots.
    #[inline]
    pub fn custom_mut(&mut self) -> &mut CustomState {
        &mut self.custom
    }

    pub(crate) fn stamp(&mut self, cycle: u64) {
        self.cycle = cycle;
    }
}

/// A snapshot type that can live in a [`TripleBuffer`](super::TripleBuffer).
///
/// ## Example
///
/// ```rust,ignore
/// struct Scene {
///     core: StateCore,
///     camera: [f32; 3],
/// }
///
/// impl RenderState for Scene {
///     fn core(&self) -> &StateCore { &self.core }
///     fn core_mut(&mut self) -> &mut StateCore { &mut self.core }
/// }
/// ```
pub trait RenderState: Send + 'static {
    /// Shared bookkeeping.
    fn core(&self) -> &StateCore;

    /// Mutable shared bookkeeping.
    fn core_mut(&mut self) -> &mut StateCore;

    /// The instance's own update hook, run once per write after queued
    /// commands and singleton actions, with the new cycle already stamped.
    fn on_update(&mut self) {}

    /// Frame-consistency policy, evaluated on the current read state.
    ///
    /// Return true to keep showing `self` instead of advancing to `candidate`.
    /// Runs under both buffer locks: keep it cheap.
    fn prevent_swap(&self, candidate: &Self) -> bool {
        let _ = candidate;
        false
    }

    /// Write cycle that produced this instance.
    fn cycle(&self) -> u64 {
        self.core().cycle()
    }

    /// Custom state slots.
    fn custom_state(&self) -> &CustomState {
        self.core().custom()
    }

    /// Mutable custom state slots.
    fn custom_state_mut(&mut self) -> &mut CustomState {
        self.core_mut().custom_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_state_typed_access() {
        let mut custom = CustomState::new();
        let lights = StateRef::<Vec<u32>>::new(custom.push(vec![1_u32, 2]));
        let fog = StateRef::<f32>::new(custom.push(0.5_f32));

        assert_eq!(custom.len(), 2);
        assert_eq!(custom.get(lights), Some(&vec![1, 2]));

        *custom.get_mut(fog).unwrap() = 0.75;
        assert_eq!(custom.get(fog), Some(&0.75));
    }

    #[test]
    fn test_foreign_handle_does_not_resolve() {
        let mut custom = CustomState::new();
        let _ = custom.push(3_u8);

        assert_eq!(custom.get(StateRef::<u8>::new(4)), None);
        assert_eq!(custom.get(StateRef::<u16>::new(0)), None);
    }

    #[test]
    fn test_core_stamp() {
        let mut core = StateCore::new();
        assert_eq!(core.cycle(), 0);
        core.stamp(9);
        assert_eq!(core.cycle(), 9);
        assert!(core.custom().is_empty());
    }
}
