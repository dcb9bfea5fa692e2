// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thread-safe remote control of a scheduler.
//!
//! The scheduler itself is single-threaded: engines run on the thread that
//! calls [`Scheduler::do_time_slice`](super::Scheduler::do_time_slice).
//! [`SchedulerHandle`] lets other threads, and `Drop` impls that have no
//! `&mut Scheduler` at hand, queue work for that thread. Commands are applied
//! at the top of the next dispatch step.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::id::{EngineId, SignalId};
use crate::time::{HostTime, TimeSource};

#[derive(Clone, Copy, Debug)]
pub(crate) enum Command {
    Signal(SignalId),
    AbortSignal(SignalId),
    WakeUp(EngineId),
    ReleaseSignal(SignalId),
    ReleaseEngine(EngineId),
    Terminate(i32),
}

#[derive(Debug, Default)]
pub(crate) struct Remote {
    queue: Mutex<Vec<Command>>,
    dirty: AtomicBool,
    pub(crate) slice: AtomicU64,
}

impl Remote {
    fn push(&self, cmd: Command) {
        self.queue.lock().push(cmd);
        self.dirty.store(true, Ordering::Release);
    }

    /// Takes every queued command, or returns `None` when nothing is queued.
    pub(crate) fn take(&self) -> Option<Vec<Command>> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        let cmds = core::mem::take(&mut *self.queue.lock());
        (!cmds.is_empty()).then_some(cmds)
    }
}

/// A cloneable, `Send + Sync` reference to a scheduler's command queue.
///
/// Commands that name an engine or signal destroyed in the meantime are
/// ignored, since the handle cannot know about the destruction.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) remote: Arc<Remote>,
    pub(crate) time: Arc<dyn TimeSource>,
}

impl SchedulerHandle {
    /// Fires a signal.
    pub fn signal(&self, signal: SignalId) {
        self.remote.push(Command::Signal(signal));
    }

    /// Cancels a pending firing of a signal.
    pub fn abort_signal(&self, signal: SignalId) {
        self.remote.push(Command::AbortSignal(signal));
    }

    /// Wakes up an engine.
    pub fn wake_up(&self, engine: EngineId) {
        self.remote.push(Command::WakeUp(engine));
    }

    /// Destroys a signal on the scheduler thread.
    pub fn release_signal(&self, signal: SignalId) {
        self.remote.push(Command::ReleaseSignal(signal));
    }

    /// Destroys an engine on the scheduler thread.
    pub fn release_engine(&self, engine: EngineId) {
        self.remote.push(Command::ReleaseEngine(engine));
    }

    /// Asks [`Scheduler::run`](super::Scheduler::run) to return `code`.
    pub fn initiate_termination(&self, code: i32) {
        self.remote.push(Command::Terminate(code));
    }

    /// Number of time slices the scheduler has started.
    #[must_use]
    pub fn time_slice_counter(&self) -> u64 {
        self.remote.slice.load(Ordering::Relaxed)
    }

    /// Reads the scheduler's time source.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.time.now()
    }

    /// Returns the scheduler's time source.
    #[must_use]
    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    /// Whether two handles address the same scheduler.
    #[must_use]
    pub fn same_scheduler(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.remote, &other.remote)
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle").finish_non_exhaustive()
    }
}
