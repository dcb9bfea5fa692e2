// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A fixed set of worker threads that run one parallel call at a time.
//!
//! The calling thread always takes part in a call, so a pool with `n` child
//! threads paints with `n + 1` threads. A pool without child threads runs
//! every call sequentially on the caller.

use std::any::Any;
use std::fmt;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use eagle_core::config::CoreConfig;
use eagle_core::context::Context;
use eagle_core::model::{CommonLifetime, ModelRef};
use eagle_core::scheduler::{Cycle, Engine, EngineCtx, EngineId, Priority, Scheduler, SchedulerHandle};
use parking_lot::Mutex;

use crate::error::PoolError;

/// A task run by [`RenderThreadPool::call_parallel`], called once per index.
pub type ParallelTask = Arc<dyn Fn(usize) + Send + Sync>;

// -- Shared call state --

struct Call {
    task: ParallelTask,
    next: usize,
    count: usize,
    panic: Option<Box<dyn Any + Send>>,
}

#[derive(Default)]
struct Shared {
    call: Mutex<Option<Call>>,
}

impl Shared {
    /// Claims and runs indices of the published call until none are left.
    fn drain(&self) {
        loop {
            let (task, index) = {
                let mut guard = self.call.lock();
                let Some(call) = guard.as_mut() else {
                    return;
                };
                if call.next >= call.count {
                    return;
                }
                let index = call.next;
                call.next += 1;
                (Arc::clone(&call.task), index)
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(index))) {
                let mut guard = self.call.lock();
                if let Some(call) = guard.as_mut() {
                    call.next = call.count;
                    call.panic.get_or_insert(payload);
                }
            }
        }
    }
}

// -- Worker threads --

struct Workers {
    threads: Vec<JoinHandle<()>>,
    activate: Option<Sender<()>>,
    done: Receiver<()>,
}

impl Workers {
    fn idle() -> Self {
        let (_, done) = channel::unbounded();
        Self {
            threads: Vec::new(),
            activate: None,
            done,
        }
    }

    /// Starts up to `n` threads. On failure the threads started so far stay.
    fn spawn(shared: &Arc<Shared>, n: usize) -> (Self, Result<(), PoolError>) {
        let (activate, activate_rx) = channel::unbounded::<()>();
        let (done_tx, done) = channel::unbounded::<()>();
        let mut threads = Vec::with_capacity(n);
        let mut result = Ok(());
        for i in 0..n {
            let shared = Arc::clone(shared);
            let activate_rx = activate_rx.clone();
            let done_tx = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("eagle-render-{i}"))
                .spawn(move || {
                    while activate_rx.recv().is_ok() {
                        shared.drain();
                        if done_tx.send(()).is_err() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    result = Err(PoolError::Spawn(e));
                    break;
                }
            }
        }
        let workers = Self {
            threads,
            activate: Some(activate),
            done,
        };
        (workers, result)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        // Disconnecting the activation channel ends every worker loop.
        self.activate = None;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("render thread ended by a panic");
            }
        }
    }
}

// -- Pool --

struct PoolInner {
    workers: Mutex<Workers>,
    shared: Arc<Shared>,
    watcher: Mutex<Option<(EngineId, SchedulerHandle)>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if let Some((engine, handle)) = self.watcher.get_mut().take() {
            handle.release_engine(engine);
        }
    }
}

/// Worker threads for parallel painting.
///
/// Cloning is cheap and yields a handle to the same threads. The threads are
/// joined when the last handle goes away.
#[derive(Clone)]
pub struct RenderThreadPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for RenderThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderThreadPool")
            .field("child_threads", &self.child_threads())
            .finish_non_exhaustive()
    }
}

impl RenderThreadPool {
    /// Name the common pool is registered under.
    pub const NAME: &'static str = "";

    /// Seconds an unused common pool is kept alive.
    pub const GRACE_SECS: u32 = 3;

    /// Creates a pool with `child_threads` worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread cannot be started.
    pub fn new(child_threads: usize) -> Result<Self, PoolError> {
        let pool = Self::degraded();
        pool.set_child_threads(child_threads)?;
        Ok(pool)
    }

    fn degraded() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                workers: Mutex::new(Workers::idle()),
                shared: Arc::new(Shared::default()),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Returns the common pool of `root`, creating it on first use.
    ///
    /// The pool sizes itself from the core configuration and follows its
    /// changes. A pool that cannot start its threads paints on the calling
    /// thread alone.
    pub fn acquire(root: &Context, sched: &mut Scheduler) -> ModelRef<Self> {
        let config = CoreConfig::acquire(root, sched);
        let pool = root.acquire(Self::NAME, true, |_, _| {
            let pool = Self::degraded();
            if let Err(e) = pool.update_thread_count(config.max_render_threads()) {
                tracing::warn!(%e, "render pool degraded");
            }
            let change = config.change_signal();
            let engine = sched.create_engine(
                ConfigWatcher {
                    pool: Arc::downgrade(&pool.inner),
                    config: config.clone(),
                },
                Priority::Default,
            );
            sched.add_wake_up_signal(engine, change);
            *pool.inner.watcher.lock() = Some((engine, sched.handle()));
            pool
        });
        pool.set_min_common_lifetime(CommonLifetime::Grace(Self::GRACE_SECS));
        pool
    }

    /// Number of worker threads, not counting the caller.
    #[must_use]
    pub fn child_threads(&self) -> usize {
        self.inner.workers.lock().threads.len()
    }

    /// Number of threads taking part in a call, including the caller.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.child_threads() + 1
    }

    /// Resizes the pool for a configured maximum of render threads.
    ///
    /// The pool keeps `min(hardware threads, max_render_threads) - 1` child
    /// threads.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread cannot be started. The pool
    /// keeps the threads that did start.
    pub fn update_thread_count(&self, max_render_threads: u32) -> Result<(), PoolError> {
        let hardware = thread::available_parallelism().map_or(1, NonZero::get);
        let max = usize::try_from(max_render_threads).unwrap_or(usize::MAX);
        self.set_child_threads(hardware.min(max).saturating_sub(1))
    }

    /// Tears the threads down and starts `n` new ones, unless the pool
    /// already has `n`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread cannot be started.
    pub fn set_child_threads(&self, n: usize) -> Result<(), PoolError> {
        let mut workers = self.inner.workers.lock();
        if workers.threads.len() == n {
            return Ok(());
        }
        *workers = Workers::idle();
        let (fresh, result) = Workers::spawn(&self.inner.shared, n);
        tracing::debug!(child_threads = fresh.threads.len(), "render pool resized");
        *workers = fresh;
        result
    }

    /// Calls `task` once for every index in `0..count`, spread over the
    /// child threads and the calling thread, and returns when all calls are
    /// done.
    ///
    /// Calls are serialized: a second caller waits for the first call to
    /// finish. `task` must not call back into the same pool.
    ///
    /// # Panics
    ///
    /// If an invocation panics, no further indices are started and the first
    /// panic is resumed on the caller once every thread has stopped.
    pub fn call_parallel(&self, count: usize, task: ParallelTask) {
        if count == 0 {
            return;
        }
        let workers = self.inner.workers.lock();
        let n = workers.threads.len().min(count - 1);
        let Some(activate) = workers.activate.as_ref().filter(|_| n > 0) else {
            drop(workers);
            for i in 0..count {
                task(i);
            }
            return;
        };

        let shared = &self.inner.shared;
        *shared.call.lock() = Some(Call {
            task,
            next: 0,
            count,
            panic: None,
        });
        let activated = (0..n).take_while(|_| activate.send(()).is_ok()).count();
        shared.drain();
        for _ in 0..activated {
            if workers.done.recv().is_err() {
                break;
            }
        }
        let call = shared.call.lock().take();
        drop(workers);
        if let Some(payload) = call.and_then(|c| c.panic) {
            panic::resume_unwind(payload);
        }
    }
}

/// Resizes the pool whenever the core configuration changes.
struct ConfigWatcher {
    pool: Weak<PoolInner>,
    config: ModelRef<CoreConfig>,
}

impl Engine for ConfigWatcher {
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle {
        if ctx.is_signaled(self.config.change_signal())
            && let Some(inner) = self.pool.upgrade()
        {
            let pool = RenderThreadPool { inner };
            if let Err(e) = pool.update_thread_count(self.config.max_render_threads()) {
                tracing::warn!(%e, "render pool degraded");
            }
        }
        Cycle::Idle
    }
}
