// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-shot and periodic timers that fire signals.
//!
//! All timers of a scheduler share one *timer central*: an engine at
//! [`Priority::VeryHigh`] that keeps a deadline-ordered queue and fires the
//! signals of due timers. The central is created with the first timer and
//! destroyed with the last one. While any timer is queued, the central stays
//! busy and checks the queue once per time slice.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::scheduler::{
    Cycle, Engine, EngineCtx, EngineId, Priority, Scheduler, SchedulerHandle, SignalId,
};
use crate::time::{Duration, HostTime};

#[derive(Clone, Copy, Debug)]
struct Entry {
    timer: u64,
    signal: SignalId,
    period: u64,
}

#[derive(Debug, Default)]
struct Queue {
    by_deadline: BTreeMap<(HostTime, u64), Entry>,
    position: HashMap<u64, (HostTime, u64)>,
    next_seq: u64,
    next_timer: u64,
    busy: bool,
}

impl Queue {
    fn insert(&mut self, at: HostTime, entry: Entry) {
        let key = (at, self.next_seq);
        self.next_seq += 1;
        self.by_deadline.insert(key, entry);
        self.position.insert(entry.timer, key);
    }

    fn remove(&mut self, timer: u64) -> bool {
        match self.position.remove(&timer) {
            Some(key) => self.by_deadline.remove(&key).is_some(),
            None => false,
        }
    }
}

/// Shared per-scheduler timer state.
#[derive(Debug)]
pub(crate) struct TimerCentral {
    engine: EngineId,
    handle: SchedulerHandle,
    queue: Mutex<Queue>,
}

impl Drop for TimerCentral {
    fn drop(&mut self) {
        self.handle.release_engine(self.engine);
    }
}

struct CentralEngine {
    central: Weak<TimerCentral>,
}

impl Engine for CentralEngine {
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle {
        let Some(central) = self.central.upgrade() else {
            return Cycle::Idle;
        };
        let mut queue = central.queue.lock();
        let Some(first) = queue.by_deadline.keys().next().map(|k| k.0) else {
            queue.busy = false;
            return Cycle::Idle;
        };
        let now = ctx.now();
        if first > now {
            return Cycle::Busy;
        }

        let mut rearm = Vec::new();
        while let Some(due) = queue.by_deadline.first_entry() {
            if due.key().0 > now {
                break;
            }
            let ((at, _), entry) = due.remove_entry();
            queue.position.remove(&entry.timer);
            ctx.signal(entry.signal);
            if entry.period > 0 {
                rearm.push((at.saturating_add(Duration(entry.period)).max(now), entry));
            }
        }
        // Re-armed timers fire at most once per cycle.
        for (at, entry) in rearm {
            queue.insert(at, entry);
        }
        Cycle::Busy
    }
}

/// A timer whose [`signal`](Self::signal) fires when it elapses.
///
/// Dropping the timer stops it and releases its signal.
#[derive(Debug)]
pub struct Timer {
    central: Arc<TimerCentral>,
    id: u64,
    signal: SignalId,
}

impl Timer {
    /// Creates a stopped timer.
    pub fn new(sched: &mut Scheduler) -> Self {
        let central = match sched.timer_central.upgrade() {
            Some(central) => central,
            None => {
                let handle = sched.handle();
                let central = Arc::new_cyclic(|weak| {
                    let engine = sched.create_engine(
                        CentralEngine {
                            central: weak.clone(),
                        },
                        Priority::VeryHigh,
                    );
                    TimerCentral {
                        engine,
                        handle,
                        queue: Mutex::new(Queue::default()),
                    }
                });
                tracing::debug!(engine = ?central.engine, "timer central created");
                sched.timer_central = Arc::downgrade(&central);
                central
            }
        };
        let id = {
            let mut queue = central.queue.lock();
            queue.next_timer += 1;
            queue.next_timer
        };
        let signal = sched.create_signal();
        Self {
            central,
            id,
            signal,
        }
    }

    /// The signal fired each time the timer elapses.
    #[inline]
    #[must_use]
    pub fn signal(&self) -> SignalId {
        self.signal
    }

    /// Starts (or restarts) the timer.
    ///
    /// The signal fires `millis` milliseconds from now. A periodic timer then
    /// keeps firing every `millis` milliseconds (at least every millisecond);
    /// when it falls behind, it skips ahead instead of firing in a burst.
    pub fn start(&mut self, millis: u64, periodic: bool) {
        let period = match (periodic, millis) {
            (false, _) => 0,
            (true, 0) => 1,
            (true, m) => m,
        };
        let at = self.central.handle.now().saturating_add(Duration(millis));
        let mut queue = self.central.queue.lock();
        queue.remove(self.id);
        queue.insert(
            at,
            Entry {
                timer: self.id,
                signal: self.signal,
                period,
            },
        );
        if !queue.busy {
            queue.busy = true;
            self.central.handle.wake_up(self.central.engine);
        }
    }

    /// Stops the timer. With `abort_signal`, a firing that is still pending
    /// is cancelled too.
    pub fn stop(&mut self, abort_signal: bool) {
        self.central.queue.lock().remove(self.id);
        if abort_signal {
            self.central.handle.abort_signal(self.signal);
        }
    }

    /// Whether the timer is waiting to fire.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.central.queue.lock().position.contains_key(&self.id)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.central.queue.lock().remove(self.id);
        self.central.handle.release_signal(self.signal);
    }
}
