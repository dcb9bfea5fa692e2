// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative engine/signal scheduling.
//!
//! A [`Scheduler`] owns a set of *engines* (cooperative tasks implementing
//! [`Engine`]) and *signals* (payload-free events). Engines subscribe to
//! signals; firing a signal wakes every subscriber. Work happens in *time
//! slices*:
//!
//! ```text
//!   do_time_slice()
//!     loop:
//!       clock += 1
//!       apply remote commands
//!       process pending signals (FIFO) ──► wake subscribers
//!       pick first engine of highest non-empty awake ring
//!       engine.cycle() ──► Busy: re-arm for next slice
//!     until all current-parity rings are empty
//! ```
//!
//! There are ten awake rings: five priorities times two slice parities. A
//! wake-up always targets the ring of the *current* parity, so an engine
//! woken during a slice runs again in that slice; an engine that returns
//! [`Cycle::Busy`] without being woken is parked in the ring of the *next*
//! parity. When every current-parity ring is empty the slice ends and the
//! parities swap.
//!
//! Engines and signals are addressed by generational handles, stored in
//! struct-of-arrays slots and recycled through free lists. Subscriptions are
//! link records in an arena (see [`link`]) indexed by an `(engine, signal)`
//! map.

mod engine;
mod handle;
mod id;
mod link;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

pub use engine::{Cycle, Engine, EngineCtx, Priority};
pub use handle::SchedulerHandle;
pub use id::{EngineId, SignalId};

pub(crate) use id::INVALID;

use crate::time::{Duration, HostTime, SystemClock, TimeSource};
use crate::timer::TimerCentral;
use crate::trace::{TimeSliceEvent, Tracer};
use handle::{Command, Remote};
use link::LinkArena;

const RING_COUNT: usize = Priority::COUNT * 2;
const NO_RING: u8 = u8::MAX;

/// Timing parameters of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Target period between the starts of consecutive time slices in
    /// [`Scheduler::run`].
    pub slice_period: Duration,
    /// Budget after which [`Scheduler::is_time_slice_at_end`] reports true.
    pub slice_deadline: Duration,
}

impl SchedulerConfig {
    /// Default configuration for interactive use.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            slice_period: Duration(10),
            slice_deadline: Duration(50),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Single-threaded cooperative scheduler of engines and signals.
///
/// # Panics
///
/// Using a stale [`EngineId`] or [`SignalId`] directly on the scheduler
/// panics. Dropping a scheduler that still owns engines or signals panics as
/// well (unless the thread is already panicking), after applying any release
/// commands still queued on its [`SchedulerHandle`]s.
pub struct Scheduler {
    // -- Engines --
    engine_behavior: Vec<Option<Box<dyn Engine>>>,
    engine_priority: Vec<Priority>,
    engine_clock: Vec<u64>,
    engine_ring: Vec<u8>,
    engine_ring_prev: Vec<u32>,
    engine_ring_next: Vec<u32>,
    engine_generation: Vec<u32>,
    engine_alive: Vec<bool>,
    engine_free: Vec<u32>,
    engine_count: usize,

    // -- Signals --
    signal_clock: Vec<u64>,
    signal_pending: Vec<bool>,
    signal_generation: Vec<u32>,
    signal_alive: Vec<bool>,
    signal_free: Vec<u32>,
    signal_count: usize,
    pending: VecDeque<u32>,

    // -- Subscriptions --
    links: LinkArena,
    scratch: Vec<u32>,

    // -- Dispatch --
    ring_head: [u32; RING_COUNT],
    ring_tail: [u32; RING_COUNT],
    parity: u8,
    cursor: usize,
    in_slice: bool,
    current_engine: u32,
    clock: u64,
    time_slice_counter: u64,
    slice_start: HostTime,

    // -- Environment --
    config: SchedulerConfig,
    time: Arc<dyn TimeSource>,
    remote: Arc<Remote>,
    termination: Option<i32>,
    pub(crate) timer_central: Weak<TimerCentral>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("engine_count", &self.engine_count)
            .field("signal_count", &self.signal_count)
            .field("clock", &self.clock)
            .field("time_slice_counter", &self.time_slice_counter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler with the standard configuration and the system
    /// clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_source(SchedulerConfig::standard(), Arc::new(SystemClock::new()))
    }

    /// Creates a scheduler with the given configuration and time source.
    #[must_use]
    pub fn with_time_source(config: SchedulerConfig, time: Arc<dyn TimeSource>) -> Self {
        let slice_start = time.now();
        Self {
            engine_behavior: Vec::new(),
            engine_priority: Vec::new(),
            engine_clock: Vec::new(),
            engine_ring: Vec::new(),
            engine_ring_prev: Vec::new(),
            engine_ring_next: Vec::new(),
            engine_generation: Vec::new(),
            engine_alive: Vec::new(),
            engine_free: Vec::new(),
            engine_count: 0,
            signal_clock: Vec::new(),
            signal_pending: Vec::new(),
            signal_generation: Vec::new(),
            signal_alive: Vec::new(),
            signal_free: Vec::new(),
            signal_count: 0,
            pending: VecDeque::new(),
            links: LinkArena::default(),
            scratch: Vec::new(),
            ring_head: [INVALID; RING_COUNT],
            ring_tail: [INVALID; RING_COUNT],
            parity: 0,
            cursor: 0,
            in_slice: false,
            current_engine: INVALID,
            clock: 1,
            time_slice_counter: 0,
            slice_start,
            config,
            time,
            remote: Arc::new(Remote::default()),
            termination: None,
            timer_central: Weak::new(),
        }
    }

    /// Returns a remote handle for other threads and `Drop` impls.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            remote: Arc::clone(&self.remote),
            time: Arc::clone(&self.time),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Reads the time source.
    #[inline]
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.time.now()
    }

    /// Returns the time source.
    #[must_use]
    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    // -- Engine API --

    /// Creates an engine. It starts asleep.
    pub fn create_engine<E: Engine + 'static>(&mut self, engine: E, priority: Priority) -> EngineId {
        self.create_engine_boxed(Box::new(engine), priority)
    }

    /// Creates an engine from a boxed behavior. It starts asleep.
    pub fn create_engine_boxed(&mut self, engine: Box<dyn Engine>, priority: Priority) -> EngineId {
        let idx = if let Some(idx) = self.engine_free.pop() {
            let i = idx as usize;
            self.engine_behavior[i] = Some(engine);
            self.engine_priority[i] = priority;
            self.engine_clock[i] = self.clock;
            self.engine_ring[i] = NO_RING;
            self.engine_ring_prev[i] = INVALID;
            self.engine_ring_next[i] = INVALID;
            self.engine_alive[i] = true;
            idx
        } else {
            let idx = u32::try_from(self.engine_behavior.len()).unwrap_or(INVALID);
            assert!(idx != INVALID, "engine slots exhausted");
            self.engine_behavior.push(Some(engine));
            self.engine_priority.push(priority);
            self.engine_clock.push(self.clock);
            self.engine_ring.push(NO_RING);
            self.engine_ring_prev.push(INVALID);
            self.engine_ring_next.push(INVALID);
            self.engine_generation.push(0);
            self.engine_alive.push(true);
            idx
        };
        self.links.reset_engine(idx);
        self.engine_count += 1;
        EngineId {
            idx,
            generation: self.engine_generation[idx as usize],
        }
    }

    /// Destroys an engine: removes all its subscriptions, takes it out of its
    /// awake ring and drops its behavior. An engine may destroy itself while
    /// cycling; its behavior is then dropped when the cycle returns.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_engine(&mut self, id: EngineId) {
        self.validate_engine(id);
        let idx = id.idx;
        let i = idx as usize;
        self.links.remove_engine(idx);
        if self.engine_ring[i] != NO_RING {
            self.ring_remove(idx);
        }
        if self.current_engine == idx {
            self.current_engine = INVALID;
        }
        self.engine_alive[i] = false;
        self.engine_generation[i] = self.engine_generation[i].wrapping_add(1);
        self.engine_free.push(idx);
        self.engine_count -= 1;
        // May run arbitrary Drop code; the slot is already consistent.
        drop(self.engine_behavior[i].take());
    }

    /// Returns whether the handle refers to a live engine.
    #[must_use]
    pub fn is_engine_alive(&self, id: EngineId) -> bool {
        let i = id.idx as usize;
        i < self.engine_alive.len()
            && self.engine_alive[i]
            && self.engine_generation[i] == id.generation
    }

    /// Number of live engines.
    #[inline]
    #[must_use]
    pub fn engine_count(&self) -> usize {
        self.engine_count
    }

    /// Returns the priority of an engine.
    #[must_use]
    pub fn engine_priority(&self, id: EngineId) -> Priority {
        self.validate_engine(id);
        self.engine_priority[id.idx as usize]
    }

    /// Changes the priority of an engine. An awake engine moves to the ring of
    /// its new priority, keeping its slice parity.
    pub fn set_engine_priority(&mut self, id: EngineId, priority: Priority) {
        self.validate_engine(id);
        let idx = id.idx;
        let i = idx as usize;
        if self.engine_priority[i] == priority {
            return;
        }
        self.engine_priority[i] = priority;
        let ring = self.engine_ring[i];
        if ring == NO_RING {
            return;
        }
        let parity = ring & 1;
        self.ring_remove(idx);
        let ring = priority.rank() * 2 + parity as usize;
        self.ring_push_back(ring, idx);
        if self.in_slice && parity == self.parity && self.cursor < ring {
            self.cursor = ring;
        }
    }

    /// Wakes up an engine so it cycles in the current (or next) time slice.
    ///
    /// Waking an engine that is already awake for the current slice does
    /// nothing; an engine parked for the next slice moves to the current one.
    pub fn wake_up(&mut self, id: EngineId) {
        self.validate_engine(id);
        self.wake_slot(id.idx);
    }

    /// Whether the engine is in an awake ring.
    #[must_use]
    pub fn is_awake(&self, id: EngineId) -> bool {
        self.validate_engine(id);
        self.engine_ring[id.idx as usize] != NO_RING
    }

    // -- Signal API --

    /// Creates a signal.
    pub fn create_signal(&mut self) -> SignalId {
        let idx = if let Some(idx) = self.signal_free.pop() {
            let i = idx as usize;
            self.signal_clock[i] = 0;
            self.signal_pending[i] = false;
            self.signal_alive[i] = true;
            idx
        } else {
            let idx = u32::try_from(self.signal_clock.len()).unwrap_or(INVALID);
            assert!(idx != INVALID, "signal slots exhausted");
            self.signal_clock.push(0);
            self.signal_pending.push(false);
            self.signal_generation.push(0);
            self.signal_alive.push(true);
            idx
        };
        self.links.reset_signal(idx);
        self.signal_count += 1;
        SignalId {
            idx,
            generation: self.signal_generation[idx as usize],
        }
    }

    /// Destroys a signal, dropping all subscriptions to it and any pending
    /// firing.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_signal(&mut self, id: SignalId) {
        self.validate_signal(id);
        let idx = id.idx;
        let i = idx as usize;
        self.links.remove_signal(idx);
        if self.signal_pending[i] {
            self.signal_pending[i] = false;
            self.pending.retain(|&s| s != idx);
        }
        self.signal_alive[i] = false;
        self.signal_generation[i] = self.signal_generation[i].wrapping_add(1);
        self.signal_free.push(idx);
        self.signal_count -= 1;
    }

    /// Returns whether the handle refers to a live signal.
    #[must_use]
    pub fn is_signal_alive(&self, id: SignalId) -> bool {
        let i = id.idx as usize;
        i < self.signal_alive.len()
            && self.signal_alive[i]
            && self.signal_generation[i] == id.generation
    }

    /// Number of live signals.
    #[inline]
    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.signal_count
    }

    /// Fires a signal. Firing an already pending signal has no further effect.
    pub fn signal(&mut self, id: SignalId) {
        self.validate_signal(id);
        let i = id.idx as usize;
        if !self.signal_pending[i] {
            self.signal_pending[i] = true;
            self.pending.push_back(id.idx);
        }
    }

    /// Cancels a pending firing of the signal.
    pub fn abort_signal(&mut self, id: SignalId) {
        self.validate_signal(id);
        let i = id.idx as usize;
        if self.signal_pending[i] {
            self.signal_pending[i] = false;
            self.pending.retain(|&s| s != id.idx);
        }
    }

    /// Whether the signal has been fired but not yet processed.
    #[must_use]
    pub fn is_pending(&self, id: SignalId) -> bool {
        self.validate_signal(id);
        self.signal_pending[id.idx as usize]
    }

    /// Whether `signal` was processed after `engine`'s previous cycle began.
    #[must_use]
    pub fn is_signaled(&self, engine: EngineId, signal: SignalId) -> bool {
        self.validate_engine(engine);
        self.validate_signal(signal);
        self.signal_clock[signal.idx as usize] > self.engine_clock[engine.idx as usize]
    }

    // -- Subscription API --

    /// Subscribes `engine` to `signal`. Subscriptions are reference counted:
    /// each call must be balanced by one [`remove_wake_up_signal`].
    ///
    /// [`remove_wake_up_signal`]: Self::remove_wake_up_signal
    pub fn add_wake_up_signal(&mut self, engine: EngineId, signal: SignalId) {
        self.validate_engine(engine);
        self.validate_signal(signal);
        self.links.subscribe(engine.idx, signal.idx);
    }

    /// Drops one subscription reference; the link disappears at zero.
    /// Removing a subscription that does not exist does nothing.
    pub fn remove_wake_up_signal(&mut self, engine: EngineId, signal: SignalId) {
        self.validate_engine(engine);
        self.validate_signal(signal);
        _ = self.links.unsubscribe(engine.idx, signal.idx);
    }

    /// Subscription reference count of `engine` to `signal`.
    #[must_use]
    pub fn wake_up_signal_refs(&self, engine: EngineId, signal: SignalId) -> u32 {
        self.validate_engine(engine);
        self.validate_signal(signal);
        self.links.ref_count(engine.idx, signal.idx)
    }

    /// Number of engines subscribed to `signal`.
    #[must_use]
    pub fn subscriber_count(&self, signal: SignalId) -> usize {
        self.validate_signal(signal);
        self.links.subscriber_count(signal.idx)
    }

    /// Number of signals `engine` is subscribed to.
    #[must_use]
    pub fn subscription_count(&self, engine: EngineId) -> usize {
        self.validate_engine(engine);
        self.links.subscription_count(engine.idx)
    }

    /// Total number of subscription link records.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    // -- Time slices --

    /// Number of time slices started so far.
    #[inline]
    #[must_use]
    pub fn time_slice_counter(&self) -> u64 {
        self.time_slice_counter
    }

    /// Whether the current time slice has used up its budget.
    #[must_use]
    pub fn is_time_slice_at_end(&self) -> bool {
        self.now().saturating_duration_since(self.slice_start) >= self.config.slice_deadline
    }

    /// Runs one time slice.
    pub fn do_time_slice(&mut self) {
        self.do_time_slice_traced(&mut Tracer::none());
    }

    /// Runs one time slice, reporting it to `tracer`.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an engine cycle.
    pub fn do_time_slice_traced(&mut self, tracer: &mut Tracer<'_>) {
        assert!(!self.in_slice, "do_time_slice called from inside a time slice");
        self.time_slice_counter += 1;
        self.remote
            .slice
            .store(self.time_slice_counter, Ordering::Relaxed);
        self.slice_start = self.now();
        self.in_slice = true;
        let next_parity = self.parity ^ 1;
        self.cursor = Priority::VeryHigh.rank() * 2 + self.parity as usize;
        let mut engines_cycled = 0_u32;

        loop {
            self.clock += 1;
            self.apply_remote_commands();
            self.process_pending_signals();

            let idx = loop {
                let head = self.ring_head[self.cursor];
                if head != INVALID {
                    break head;
                }
                if self.cursor < 2 {
                    break INVALID;
                }
                self.cursor -= 2;
            };
            if idx == INVALID {
                break;
            }

            self.ring_remove(idx);
            let i = idx as usize;
            let Some(mut behavior) = self.engine_behavior[i].take() else {
                continue;
            };
            let id = EngineId {
                idx,
                generation: self.engine_generation[i],
            };
            self.current_engine = idx;
            let result = behavior.cycle(&mut EngineCtx {
                sched: self,
                engine: id,
            });
            engines_cycled += 1;

            if self.current_engine != idx {
                // Destroyed during its own cycle.
                drop(behavior);
                continue;
            }
            self.current_engine = INVALID;
            self.engine_behavior[i] = Some(behavior);
            self.engine_clock[i] = self.clock;
            if result == Cycle::Busy && self.engine_ring[i] == NO_RING {
                let ring = self.engine_priority[i].rank() * 2 + next_parity as usize;
                self.ring_push_back(ring, idx);
            }
        }

        self.parity = next_parity;
        self.in_slice = false;
        tracer.time_slice(&TimeSliceEvent {
            slice: self.time_slice_counter,
            engines_cycled,
            start: self.slice_start,
            end: self.now(),
        });
    }

    /// Runs time slices until termination is initiated, pacing them by
    /// [`SchedulerConfig::slice_period`]. Returns the termination code.
    pub fn run(&mut self) -> i32 {
        loop {
            self.apply_remote_commands();
            if let Some(code) = self.termination {
                tracing::debug!(code, "scheduler terminating");
                return code;
            }
            let start = self.now();
            self.do_time_slice();
            let spent = self.now().saturating_duration_since(start);
            let rest = self.config.slice_period.saturating_sub(spent);
            if rest > Duration::ZERO {
                std::thread::sleep(rest.to_std());
            }
        }
    }

    /// Makes [`run`](Self::run) return `code` after the current time slice.
    pub fn initiate_termination(&mut self, code: i32) {
        self.termination = Some(code);
    }

    /// The termination code, once termination has been initiated.
    #[must_use]
    pub fn termination_code(&self) -> Option<i32> {
        self.termination
    }

    // -- Internal helpers --

    fn apply_remote_commands(&mut self) {
        while let Some(cmds) = self.remote.take() {
            for cmd in cmds {
                match cmd {
                    Command::Signal(s) if self.is_signal_alive(s) => self.signal(s),
                    Command::AbortSignal(s) if self.is_signal_alive(s) => self.abort_signal(s),
                    Command::WakeUp(e) if self.is_engine_alive(e) => self.wake_slot(e.idx),
                    Command::ReleaseSignal(s) if self.is_signal_alive(s) => self.destroy_signal(s),
                    Command::ReleaseEngine(e) if self.is_engine_alive(e) => self.destroy_engine(e),
                    Command::Terminate(code) => self.termination = Some(code),
                    stale => tracing::trace!(?stale, "ignoring command for a destroyed handle"),
                }
            }
        }
    }

    fn process_pending_signals(&mut self) {
        while let Some(s) = self.pending.pop_front() {
            let i = s as usize;
            self.signal_pending[i] = false;
            self.signal_clock[i] = self.clock;
            let mut subscribers = core::mem::take(&mut self.scratch);
            self.links.collect_subscribers(s, &mut subscribers);
            for &e in &subscribers {
                self.wake_slot(e);
            }
            subscribers.clear();
            self.scratch = subscribers;
        }
    }

    fn wake_slot(&mut self, idx: u32) {
        let i = idx as usize;
        let ring = self.engine_ring[i];
        if ring != NO_RING {
            if ring & 1 == self.parity {
                return;
            }
            self.ring_remove(idx);
        }
        let ring = self.engine_priority[i].rank() * 2 + self.parity as usize;
        self.ring_push_back(ring, idx);
        if self.cursor < ring {
            self.cursor = ring;
        }
    }

    fn ring_push_back(&mut self, ring: usize, idx: u32) {
        let i = idx as usize;
        let tail = self.ring_tail[ring];
        self.engine_ring_prev[i] = tail;
        self.engine_ring_next[i] = INVALID;
        if tail != INVALID {
            self.engine_ring_next[tail as usize] = idx;
        } else {
            self.ring_head[ring] = idx;
        }
        self.ring_tail[ring] = idx;
        self.engine_ring[i] = u8::try_from(ring).unwrap_or(NO_RING);
    }

    fn ring_remove(&mut self, idx: u32) {
        let i = idx as usize;
        let ring = self.engine_ring[i] as usize;
        let prev = self.engine_ring_prev[i];
        let next = self.engine_ring_next[i];
        if prev != INVALID {
            self.engine_ring_next[prev as usize] = next;
        } else {
            self.ring_head[ring] = next;
        }
        if next != INVALID {
            self.engine_ring_prev[next as usize] = prev;
        } else {
            self.ring_tail[ring] = prev;
        }
        self.engine_ring[i] = NO_RING;
        self.engine_ring_prev[i] = INVALID;
        self.engine_ring_next[i] = INVALID;
    }

    /// Panics if the handle is stale.
    fn validate_engine(&self, id: EngineId) {
        assert!(
            self.is_engine_alive(id),
            "stale EngineId: {id:?} (current gen: {})",
            self.engine_generation
                .get(id.idx as usize)
                .copied()
                .unwrap_or(u32::MAX)
        );
    }

    /// Panics if the handle is stale.
    fn validate_signal(&self, id: SignalId) {
        assert!(
            self.is_signal_alive(id),
            "stale SignalId: {id:?} (current gen: {})",
            self.signal_generation
                .get(id.idx as usize)
                .copied()
                .unwrap_or(u32::MAX)
        );
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.apply_remote_commands();
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.engine_count == 0,
            "scheduler dropped with {} remaining engine(s)",
            self.engine_count
        );
        assert!(
            self.signal_count == 0,
            "scheduler dropped with {} remaining signal(s)",
            self.signal_count
        );
    }
}
