//! # Triple-Buffered Render State
//!
//! Decouples the update rate from the render rate.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────────────────┐
//!                │               TripleBuffer               │
//!                │                                          │
//!                │  ┌─────────┐   ┌─────────┐   ┌─────────┐ │
//!                │  │ State 0 │   │ State 1 │   │ State 2 │ │
//!                │  │ +queue  │   │ +queue  │   │ +queue  │ │
//!                │  │ +flags  │   │ +flags  │   │ +flags  │ │
//!                │  └─────────┘   └─────────┘   └─────────┘ │
//!                │        Roles { write, staging, read }    │
//!                └──────────────────────────────────────────┘
//!                      │                          │
//!          update() ───┘                          └─── start_read()
//!   drain queue, run singletons,                   hold swap lock, read,
//!   on_update, write <-> staging                   stop_read: read <-> staging
//! ```
//!
//! ## Locks
//!
//! - **swap lock** (outer): held by the reader for a whole frame.
//! - **staging lock**: guards the role indices; held only for index swaps.
//! - **writer lock**: serializes writers so the write index is stable while a
//!   writer works on it.
//! - one mutex per instance: uncontended by construction, since roles
//!   partition the instances. It is what lets safe code hand out `&mut T`.
//!
//! Writer order: writer → staging, then writer → write instance.
//! Reader order: swap → staging → read instance for `start_read`; at
//! `stop_read` the read instance is still held while staging and then the
//! staged instance are taken (swap → read instance → staging → staged
//! instance). `register_state` takes swap → writer → each instance.
//! No cycle is possible: the writer never takes the swap lock, never touches
//! the staging or read instance, and roles never share an instance. A frame of
//! rendering never blocks an update.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use super::state::{RenderState, StateRef};
use crate::command::CommandQueue;
use crate::error::{BufferError, BufferResult};

/// One-shot action run against an instance on its next turn as writer.
pub type SingletonAction<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Current role assignment of the three physical instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roles {
    /// Instance being written by the update thread.
    pub write: usize,
    /// Most recently completed write, not yet shown.
    pub staging: usize,
    /// Instance exposed to the render thread.
    pub read: usize,
}

impl Roles {
    const INITIAL: Self = Self {
        write: 0,
        staging: 1,
        read: 2,
    };

    /// Returns true if every instance holds exactly one role.
    #[must_use]
    pub fn is_partition(self) -> bool {
        let mut seen = [false; 3];
        for index in [self.write, self.staging, self.read] {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

/// One physical instance with its own command queue and singleton flags.
struct QueueStatePair<T> {
    state: Mutex<T>,
    commands: CommandQueue<T>,
    pending: Box<[AtomicBool]>,
}

impl<T> QueueStatePair<T> {
    fn new(state: T, singleton_count: usize) -> Self {
        Self {
            state: Mutex::new(state),
            commands: CommandQueue::new(),
            pending: (0..singleton_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }
}

/// Triple-buffered render state.
///
/// ## Usage
///
/// ```rust,ignore
/// let buffer = Arc::new(TripleBuffer::new([a, b, c], Vec::new()));
///
/// // Update thread
/// buffer.current_write_state().camera = next_camera;
/// buffer.update();
///
/// // Render thread
/// let frame = buffer.start_read();
/// draw(&*frame);
/// frame.stop_read(); // next frame may show newer data
/// ```
pub struct TripleBuffer<T: RenderState> {
    pairs: [QueueStatePair<T>; 3],
    singleton_actions: Box<[SingletonAction<T>]>,
    /// Outer lock, held by the reader for a whole frame.
    swap_lock: Mutex<()>,
    /// Serializes writers.
    writer: Mutex<()>,
    /// The staging lock.
    roles: Mutex<Roles>,
    /// Last stamped write cycle.
    cycle: AtomicU64,
    /// Successful read-side swaps.
    swaps: AtomicU64,
    registry_frozen: AtomicBool,
}

impl<T: RenderState> TripleBuffer<T> {
    /// Creates a buffer over three independent instances.
    ///
    /// Initial roles: instance 0 writes, 1 is staged, 2 is read.
    #[must_use]
    pub fn new(states: [T; 3], singleton_actions: Vec<SingletonAction<T>>) -> Self {
        let count = singleton_actions.len();
        let [a, b, c] = states;

        Self {
            pairs: [
                QueueStatePair::new(a, count),
                QueueStatePair::new(b, count),
                QueueStatePair::new(c, count),
            ],
            singleton_actions: singleton_actions.into_boxed_slice(),
            swap_lock: Mutex::new(()),
            writer: Mutex::new(()),
            roles: Mutex::new(Roles::INITIAL),
            cycle: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
            registry_frozen: AtomicBool::new(false),
        }
    }

    /// Creates a buffer from a factory called once per instance.
    #[must_use]
    pub fn from_fn(
        mut factory: impl FnMut() -> T,
        singleton_actions: Vec<SingletonAction<T>>,
    ) -> Self {
        Self::new([factory(), factory(), factory()], singleton_actions)
    }

    /// Completes one write cycle.
    ///
    /// Drains the write instance's commands (FIFO), runs its pending singleton
    /// actions, stamps the next cycle, calls [`RenderState::on_update`], then
    /// hands the instance over to staging. Always returns true.
    ///
    /// Concurrent callers are serialized. Must not be called while the same
    /// thread holds a [`WriteHandle`].
    pub fn update(&self) -> bool {
        let _writer = self.writer.lock();
        let write = self.roles.lock().write;

        {
            let pair = &self.pairs[write];
            let mut state = pair.state.lock();

            let commands = pair.commands.execute_commands(&mut *state);

            for (action, flag) in self.singleton_actions.iter().zip(pair.pending.iter()) {
                if flag.swap(false, Ordering::AcqRel) {
                    action(&mut *state);
                }
            }

            let cycle = self.cycle.fetch_add(1, Ordering::AcqRel) + 1;
            state.core_mut().stamp(cycle);
            state.on_update();

            trace!(cycle, instance = write, commands, "write cycle complete");
        }

        self.swap_staging();
        true
    }

    /// Exchanges write and staging under the staging lock only.
    ///
    /// The writer receives the previously staged instance, which is never the
    /// read instance: read and staging only trade places under both locks.
    fn swap_staging(&self) {
        let mut roles = self.roles.lock();
        let Roles { write, staging, .. } = *roles;
        roles.write = staging;
        roles.staging = write;
        self.registry_frozen.store(true, Ordering::Release);
    }

    /// Starts a render frame.
    ///
    /// Holds the swap lock until the returned frame is stopped or dropped, so
    /// the instance it exposes cannot change roles mid-frame.
    #[must_use]
    pub fn start_read(&self) -> ReadFrame<'_, T> {
        let swap = self.swap_lock.lock();
        let read = self.roles.lock().read;
        let state = self.pairs[read].state.lock();

        ReadFrame {
            buffer: self,
            index: read,
            state,
            _swap: swap,
        }
    }

    /// Reader-side exchange of read and staging. Caller holds the swap lock.
    fn swap(&self, read_state: &T, read_index: usize) -> bool {
        let mut roles = self.roles.lock();
        debug_assert_eq!(roles.read, read_index, "read instance moved mid-frame");

        let staged = self.pairs[roles.staging].state.lock();
        if staged.cycle() <= read_state.cycle() {
            trace!(cycle = read_state.cycle(), "no newer frame staged");
            return false;
        }
        if read_state.prevent_swap(&*staged) {
            trace!(
                read = read_state.cycle(),
                staged = staged.cycle(),
                "swap prevented"
            );
            return false;
        }

        let Roles { staging, read, .. } = *roles;
        roles.read = staging;
        roles.staging = read;
        self.registry_frozen.store(true, Ordering::Release);
        self.swaps.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Exclusive access to the current write instance.
    ///
    /// Blocks concurrent [`update`](Self::update) calls until dropped.
    #[must_use]
    pub fn current_write_state(&self) -> WriteHandle<'_, T> {
        let writer = self.writer.lock();
        let write = self.roles.lock().write;
        let state = self.pairs[write].state.lock();

        WriteHandle {
            index: write,
            state,
            _writer: writer,
        }
    }

    /// Registers a custom state slot on all three instances.
    ///
    /// `factory` runs three times, once per instance.
    ///
    /// # Errors
    ///
    /// [`BufferError::RegistryFrozen`] once any swap has happened.
    ///
    /// Must not be called while the same thread holds a frame or write handle.
    pub fn register_state<S, F>(&self, mut factory: F) -> BufferResult<StateRef<S>>
    where
        S: Any + Send,
        F: FnMut() -> S,
    {
        let _swap = self.swap_lock.lock();
        let _writer = self.writer.lock();

        if self.registry_frozen.load(Ordering::Acquire) {
            return Err(BufferError::RegistryFrozen);
        }

        let index = self.pairs[0].state.lock().custom_state().len();
        for pair in &self.pairs {
            let slot = pair.state.lock().custom_state_mut().push(factory());
            debug_assert_eq!(slot, index, "custom state registries diverged");
        }

        Ok(StateRef::new(index))
    }

    /// Offers a mutation to every physical instance.
    ///
    /// Runs exactly once against each instance, on that instance's next turn
    /// as writer. Structural setup (e.g. allocating per-instance GPU buffers)
    /// relies on this.
    pub fn add_command<F>(&self, mutator: F)
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let mutator = Arc::new(mutator);
        for pair in &self.pairs {
            let mutator = Arc::clone(&mutator);
            drop(pair.commands.add_command(move |state: &mut T| mutator(state)));
        }
    }

    /// Marks singleton action `index` pending on all three instances.
    ///
    /// # Errors
    ///
    /// [`BufferError::UnknownSingletonAction`] for an index the buffer was not
    /// built with.
    pub fn request_singleton_action(&self, index: usize) -> BufferResult<()> {
        let len = self.singleton_actions.len();
        if index >= len {
            return Err(BufferError::UnknownSingletonAction { index, len });
        }
        for pair in &self.pairs {
            pair.pending[index].store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Snapshot of the role assignment.
    #[must_use]
    pub fn roles(&self) -> Roles {
        *self.roles.lock()
    }

    /// Last stamped write cycle (0 before the first update).
    #[inline]
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::Acquire)
    }

    /// Number of successful read-side swaps.
    #[inline]
    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    /// Commands still queued, per physical instance.
    #[must_use]
    pub fn pending_commands(&self) -> [usize; 3] {
        [
            self.pairs[0].commands.len(),
            self.pairs[1].commands.len(),
            self.pairs[2].commands.len(),
        ]
    }

    /// Number of singleton actions the buffer was built with.
    #[must_use]
    pub fn singleton_action_count(&self) -> usize {
        self.singleton_actions.len()
    }
}

impl<T: RenderState> fmt::Debug for TripleBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleBuffer")
            .field("roles", &self.roles())
            .field("cycle", &self.cycle())
            .field("swaps", &self.swap_count())
            .field("pending_commands", &self.pending_commands())
            .finish_non_exhaustive()
    }
}

/// A render frame: shared access to the read instance while the swap lock is
/// held.
///
/// Fields drop in declaration order, releasing the instance before the swap
/// lock.
pub struct ReadFrame<'a, T: RenderState> {
    buffer: &'a TripleBuffer<T>,
    index: usize,
    state: MutexGuard<'a, T>,
    _swap: MutexGuard<'a, ()>,
}

impl<T: RenderState> ReadFrame<'_, T> {
    /// Physical instance being read (for debugging).
    #[inline]
    #[must_use]
    pub fn buffer_index(&self) -> usize {
        self.index
    }

    /// Ends the frame and tries to advance to the staged instance.
    ///
    /// Returns true if the next frame will read newer data. Returns false if
    /// nothing newer was staged or [`RenderState::prevent_swap`] refused.
    pub fn stop_read(self) -> bool {
        self.buffer.swap(&*self.state, self.index)
    }
}

impl<T: RenderState> Deref for ReadFrame<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.state
    }
}

/// Exclusive access to the write instance for direct mutation.
pub struct WriteHandle<'a, T: RenderState> {
    index: usize,
    state: MutexGuard<'a, T>,
    _writer: MutexGuard<'a, ()>,
}

impl<T: RenderState> WriteHandle<'_, T> {
    /// Physical instance being written (for debugging).
    #[inline]
    #[must_use]
    pub fn buffer_index(&self) -> usize {
        self.index
    }
}

impl<T: RenderState> Deref for WriteHandle<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T: RenderState> DerefMut for WriteHandle<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::StateCore;
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;

    #[derive(Default)]
    struct Flags {
        veto: AtomicBool,
        explode: AtomicBool,
    }

    struct Counter {
        core: StateCore,
        value: i64,
        applied: u32,
        fired: u32,
        updates: u32,
        flags: Arc<Flags>,
    }

    impl Counter {
        fn new(flags: &Arc<Flags>) -> Self {
            Self {
                core: StateCore::new(),
                value: 0,
                applied: 0,
                fired: 0,
                updates: 0,
                flags: Arc::clone(flags),
            }
        }
    }

    impl RenderState for Counter {
        fn core(&self) -> &StateCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut StateCore {
            &mut self.core
        }

        fn on_update(&mut self) {
            self.updates += 1;
        }

        fn prevent_swap(&self, _candidate: &Self) -> bool {
            assert!(!self.flags.explode.load(Ordering::SeqCst), "prevent_swap exploded");
            self.flags.veto.load(Ordering::SeqCst)
        }
    }

    fn buffer_with(actions: Vec<SingletonAction<Counter>>) -> (TripleBuffer<Counter>, Arc<Flags>) {
        let flags = Arc::new(Flags::default());
        let buffer = TripleBuffer::from_fn(|| Counter::new(&flags), actions);
        (buffer, flags)
    }

    fn buffer() -> (TripleBuffer<Counter>, Arc<Flags>) {
        buffer_with(Vec::new())
    }

    fn instance<R>(buffer: &TripleBuffer<Counter>, index: usize, f: impl FnOnce(&Counter) -> R) -> R {
        f(&*buffer.pairs[index].state.lock())
    }

    /// One update followed by one render frame.
    fn tick(buffer: &TripleBuffer<Counter>) -> bool {
        buffer.update();
        buffer.start_read().stop_read()
    }

    #[test]
    fn test_initial_roles() {
        let (buffer, _) = buffer();
        assert_eq!(buffer.roles(), Roles::INITIAL);
        assert!(buffer.roles().is_partition());
        assert_eq!(buffer.cycle(), 0);
        assert_eq!(buffer.start_read().buffer_index(), 2);
    }

    #[test]
    fn test_roles_partition_check() {
        assert!(!Roles { write: 0, staging: 0, read: 1 }.is_partition());
        assert!(!Roles { write: 0, staging: 1, read: 3 }.is_partition());
        assert!(Roles { write: 2, staging: 0, read: 1 }.is_partition());
    }

    #[test]
    fn test_counter_increment_visible_after_one_swap() {
        let (buffer, _) = buffer();
        buffer.add_command(|c: &mut Counter| c.value += 1);

        assert!(buffer.update());
        assert!(buffer.start_read().stop_read());

        let frame = buffer.start_read();
        assert_eq!(frame.value, 1);
        assert_eq!(frame.cycle(), 1);
        assert_eq!(frame.updates, 1);
    }

    #[test]
    fn test_update_swaps_write_and_staging_only() {
        let (buffer, _) = buffer();
        buffer.update();
        assert_eq!(
            buffer.roles(),
            Roles {
                write: 1,
                staging: 0,
                read: 2,
            }
        );
    }

    #[test]
    fn test_roles_stay_partitioned_across_interleavings() {
        let (buffer, _) = buffer();
        // Update/read patterns of uneven rates in both directions.
        let pattern = [3, 0, 1, 2, 0, 0, 1, 5, 1, 0, 2, 1];
        for (step, updates) in pattern.iter().enumerate() {
            for _ in 0..*updates {
                buffer.update();
                assert!(buffer.roles().is_partition());
            }
            let frame = buffer.start_read();
            assert_ne!(frame.buffer_index(), buffer.roles().write, "step {step}");
            frame.stop_read();
            assert!(buffer.roles().is_partition());
        }
    }

    #[test]
    fn test_cycles_strictly_increase_when_swaps_allowed() {
        let (buffer, _) = buffer();
        let mut last = buffer.start_read().cycle();

        for _ in 0..20 {
            assert!(tick(&buffer));
            let seen = buffer.start_read().cycle();
            assert!(seen > last, "{seen} should be newer than {last}");
            last = seen;
        }
        assert_eq!(buffer.swap_count(), 20);
    }

    #[test]
    fn test_prevent_swap_freezes_reader() {
        let (buffer, flags) = buffer();
        flags.veto.store(true, Ordering::SeqCst);

        for _ in 0..10 {
            assert!(!tick(&buffer));
            assert_eq!(buffer.start_read().cycle(), 0);
        }
        assert_eq!(buffer.swap_count(), 0);

        flags.veto.store(false, Ordering::SeqCst);
        assert!(buffer.start_read().stop_read());
        assert_eq!(buffer.start_read().cycle(), 10);
    }

    #[test]
    fn test_no_swap_without_newer_write() {
        let (buffer, _) = buffer();
        assert!(!buffer.start_read().stop_read());

        assert!(tick(&buffer));
        // Staging now holds the old read instance; never step backwards.
        assert!(!buffer.start_read().stop_read());
        assert_eq!(buffer.start_read().cycle(), 1);
    }

    #[test]
    fn test_command_runs_once_per_instance() {
        let (buffer, _) = buffer();
        buffer.update();
        buffer.add_command(|c: &mut Counter| c.applied += 1);

        for _ in 0..9 {
            tick(&buffer);
        }

        for index in 0..3 {
            assert_eq!(instance(&buffer, index, |c| c.applied), 1, "instance {index}");
        }
        assert_eq!(buffer.pending_commands(), [0, 0, 0]);
    }

    #[test]
    fn test_command_waits_for_instance_turn_as_writer() {
        let (buffer, _) = buffer();
        buffer.add_command(|c: &mut Counter| c.applied += 1);
        buffer.update();

        assert_eq!(buffer.pending_commands(), [0, 1, 1]);
        assert_eq!(instance(&buffer, 0, |c| c.applied), 1);
        assert_eq!(instance(&buffer, 1, |c| c.applied), 0);
    }

    #[test]
    fn test_singleton_action_fires_once_per_instance_per_request() {
        let fire: SingletonAction<Counter> = Box::new(|c: &mut Counter| c.fired += 1);
        let (buffer, _) = buffer_with(vec![fire]);

        buffer.request_singleton_action(0).unwrap();
        for _ in 0..12 {
            tick(&buffer);
        }
        for index in 0..3 {
            assert_eq!(instance(&buffer, index, |c| c.fired), 1);
        }

        // Requesting twice before the next turn still fires once.
        buffer.request_singleton_action(0).unwrap();
        buffer.request_singleton_action(0).unwrap();
        for _ in 0..12 {
            tick(&buffer);
        }
        for index in 0..3 {
            assert_eq!(instance(&buffer, index, |c| c.fired), 2);
        }
    }

    #[test]
    fn test_unknown_singleton_action() {
        let (buffer, _) = buffer();
        assert_eq!(
            buffer.request_singleton_action(0),
            Err(BufferError::UnknownSingletonAction { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_register_state_on_all_instances() {
        let (buffer, _) = buffer();
        let mut made = 0;
        let lights = buffer
            .register_state(|| {
                made += 1;
                vec![0_u32; made]
            })
            .unwrap();
        let exposure = buffer.register_state(|| 1.0_f32).unwrap();

        assert_eq!(lights.index(), 0);
        assert_eq!(exposure.index(), 1);
        for index in 0..3 {
            instance(&buffer, index, |c| {
                assert_eq!(c.custom_state().len(), 2);
                assert_eq!(c.custom_state().get(lights).map(Vec::len), Some(index + 1));
            });
        }

        buffer.add_command(move |c: &mut Counter| {
            if let Some(e) = c.custom_state_mut().get_mut(exposure) {
                *e = 2.0;
            }
        });
        tick(&buffer);
        let frame = buffer.start_read();
        assert_eq!(frame.custom_state().get(exposure), Some(&2.0));
    }

    #[test]
    fn test_registry_frozen_after_swap() {
        let (buffer, _) = buffer();
        buffer.update();
        assert_eq!(
            buffer.register_state(|| 0_u8),
            Err(BufferError::RegistryFrozen)
        );
    }

    #[test]
    fn test_write_handle_mutations_reach_reader() {
        let (buffer, _) = buffer();
        {
            let mut write = buffer.current_write_state();
            assert_eq!(write.buffer_index(), 0);
            write.value = 42;
        }
        tick(&buffer);
        assert_eq!(buffer.start_read().value, 42);
        assert_eq!(instance(&buffer, 0, |c| c.updates), 1);
    }

    #[test]
    fn test_panicking_prevent_swap_releases_locks() {
        let (buffer, flags) = buffer();
        buffer.update();
        flags.explode.store(true, Ordering::SeqCst);

        let result = panic::catch_unwind(AssertUnwindSafe(|| buffer.start_read().stop_read()));
        assert!(result.is_err());

        flags.explode.store(false, Ordering::SeqCst);
        assert!(buffer.start_read().stop_read());
        buffer.update();
        assert!(buffer.roles().is_partition());
    }

    #[test]
    fn test_six_concurrent_writers_keep_a_rotation() {
        let (buffer, _) = buffer();
        let buffer = Arc::new(buffer);

        let writers: Vec<_> = (0..6)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(buffer.update());
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let roles = buffer.roles();
        assert!(roles.is_partition());
        assert_eq!(roles.read, 2);
        assert_eq!(buffer.cycle(), 600);
    }

    #[test]
    fn test_reader_and_writer_threads() {
        let (buffer, _) = buffer();
        let buffer = Arc::new(buffer);

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 1..=2_000 {
                    buffer.current_write_state().value = i;
                    buffer.update();
                }
            })
        };

        let mut last_cycle = 0;
        let mut last_value = 0;
        while !writer.is_finished() || buffer.start_read().cycle() < 2_000 {
            let frame = buffer.start_read();
            assert!(frame.cycle() >= last_cycle);
            assert!(frame.value >= last_value);
            assert_ne!(frame.buffer_index(), buffer.roles().write);
            last_cycle = frame.cycle();
            last_value = frame.value;
            frame.stop_read();
        }
        writer.join().unwrap();

        assert_eq!(buffer.start_read().value, 2_000);
    }
}
