// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The engine contract and the context an engine sees while it cycles.

use super::Scheduler;
use super::handle::SchedulerHandle;
use super::id::{EngineId, SignalId};
use crate::time::HostTime;

/// Scheduling priority of an engine.
///
/// Within a time slice, all awake engines of a higher priority run before any
/// engine of a lower priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Lowest priority.
    VeryLow = 0,
    /// Below default.
    Low = 1,
    /// The usual priority.
    #[default]
    Default = 2,
    /// Above default.
    High = 3,
    /// Highest priority.
    VeryHigh = 4,
}

impl Priority {
    /// Number of priority classes.
    pub const COUNT: usize = 5;

    #[inline]
    pub(crate) const fn rank(self) -> usize {
        self as usize
    }
}

/// What an engine wants after a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cycle {
    /// Sleep until woken by a signal or an explicit wake-up.
    Idle,
    /// Run again in the next time slice.
    Busy,
}

/// A cooperatively scheduled task.
///
/// `cycle` must return quickly; long work is split across cycles by returning
/// [`Cycle::Busy`] and checking [`EngineCtx::is_time_slice_at_end`].
pub trait Engine {
    /// Runs one step of the engine.
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle;
}

impl<F> Engine for F
where
    F: FnMut(&mut EngineCtx<'_>) -> Cycle,
{
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle {
        self(ctx)
    }
}

/// Access to the scheduler from inside [`Engine::cycle`].
///
/// Shortcuts that name "this engine" refer to the engine being cycled.
#[derive(Debug)]
pub struct EngineCtx<'a> {
    pub(crate) sched: &'a mut Scheduler,
    pub(crate) engine: EngineId,
}

impl EngineCtx<'_> {
    /// The engine being cycled.
    #[inline]
    #[must_use]
    pub fn engine_id(&self) -> EngineId {
        self.engine
    }

    /// Full access to the scheduler.
    #[inline]
    pub fn scheduler(&mut self) -> &mut Scheduler {
        &mut *self.sched
    }

    /// Whether `signal` was processed after this engine's previous cycle
    /// began.
    #[must_use]
    pub fn is_signaled(&self, signal: SignalId) -> bool {
        self.sched.is_signaled(self.engine, signal)
    }

    /// Fires a signal.
    pub fn signal(&mut self, signal: SignalId) {
        self.sched.signal(signal);
    }

    /// Wakes this engine again within the current time slice.
    pub fn wake_up(&mut self) {
        self.sched.wake_up(self.engine);
    }

    /// Subscribes this engine to `signal` (reference counted).
    pub fn add_wake_up_signal(&mut self, signal: SignalId) {
        self.sched.add_wake_up_signal(self.engine, signal);
    }

    /// Drops one subscription reference of this engine to `signal`.
    pub fn remove_wake_up_signal(&mut self, signal: SignalId) {
        self.sched.remove_wake_up_signal(self.engine, signal);
    }

    /// How often this engine is subscribed to `signal`.
    #[must_use]
    pub fn wake_up_signal_refs(&self, signal: SignalId) -> u32 {
        self.sched.wake_up_signal_refs(self.engine, signal)
    }

    /// Creates a new signal.
    pub fn create_signal(&mut self) -> SignalId {
        self.sched.create_signal()
    }

    /// Destroys a signal.
    pub fn destroy_signal(&mut self, signal: SignalId) {
        self.sched.destroy_signal(signal);
    }

    /// Wakes up another engine.
    pub fn wake_up_engine(&mut self, engine: EngineId) {
        self.sched.wake_up(engine);
    }

    /// Creates another engine.
    pub fn create_engine<E: Engine + 'static>(&mut self, engine: E, priority: Priority) -> EngineId {
        self.sched.create_engine(engine, priority)
    }

    /// Destroys another engine, or this one.
    pub fn destroy_engine(&mut self, engine: EngineId) {
        self.sched.destroy_engine(engine);
    }

    /// Changes this engine's priority.
    pub fn set_priority(&mut self, priority: Priority) {
        self.sched.set_engine_priority(self.engine, priority);
    }

    /// Destroys this engine once the current cycle returns.
    pub fn destroy_self(&mut self) {
        self.sched.destroy_engine(self.engine);
    }

    /// Whether the time slice has used up its budget.
    #[must_use]
    pub fn is_time_slice_at_end(&self) -> bool {
        self.sched.is_time_slice_at_end()
    }

    /// Number of time slices started so far.
    #[must_use]
    pub fn time_slice_counter(&self) -> u64 {
        self.sched.time_slice_counter()
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.sched.now()
    }

    /// A remote handle to the scheduler.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        self.sched.handle()
    }
}
