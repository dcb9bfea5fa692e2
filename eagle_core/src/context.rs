// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contexts: a tree of registries for common models.
//!
//! The root context owns a shared timing engine that counts seconds with a
//! periodic [`Timer`] and garbage-collects the whole tree every
//! [`GC_PERIOD_SECS`] seconds. A model whose last outside reference was
//! dropped with a [`CommonLifetime::Grace`] stays registered until its time of
//! death has strictly passed, so it can be acquired again cheaply.

use core::any::{Any, TypeId};
use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::model::{CommonLifetime, ModelRef};
use crate::scheduler::{Cycle, Engine, EngineCtx, EngineId, Priority, Scheduler, SchedulerHandle};
use crate::timer::Timer;

/// Seconds between two garbage collections.
pub const GC_PERIOD_SECS: u64 = 10;

type Key = (TypeId, Arc<str>);

pub(crate) struct Entry {
    pub(crate) model: Arc<dyn Any + Send + Sync>,
    pub(crate) type_name: &'static str,
    pub(crate) lifetime: CommonLifetime,
    pub(crate) time_of_death: u64,
    /// Live [`ModelRef`]s to this entry. Only changed under the registry
    /// lock.
    pub(crate) outside: usize,
}

#[derive(Debug)]
pub(crate) struct SharedTiming {
    pub(crate) secs: AtomicU64,
    handle: SchedulerHandle,
}

pub(crate) struct ContextInner {
    parent: Option<Context>,
    pub(crate) shared: Arc<SharedTiming>,
    pub(crate) registry: Mutex<HashMap<Key, Entry>>,
    children: Mutex<Vec<Weak<ContextInner>>>,
    pub(crate) do_gc: AtomicBool,
    timing_engine: Option<EngineId>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(engine) = self.timing_engine {
            self.shared.handle.release_engine(engine);
        }
        let remaining = self.registry.get_mut().len();
        if remaining > 0 {
            tracing::debug!(remaining, "context dropped with registered models");
        }
    }
}

/// One registered model, as reported by [`Context::listing`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Rust type name of the model.
    pub type_name: &'static str,
    /// Name the model is registered under.
    pub name: String,
    /// Strong references, including the registry's.
    pub ref_count: usize,
    /// Lifetime applied after the last outside reference.
    pub lifetime: CommonLifetime,
}

struct SharedTimingEngine {
    root: Weak<ContextInner>,
    timer: Timer,
    time_of_gc: u64,
}

impl Engine for SharedTimingEngine {
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle {
        if !ctx.is_signaled(self.timer.signal()) {
            return Cycle::Idle;
        }
        let Some(root) = self.root.upgrade() else {
            return Cycle::Idle;
        };
        let secs = root.shared.secs.fetch_add(1, Ordering::Relaxed) + 1;
        if secs >= self.time_of_gc {
            collect_tree(&root);
            self.time_of_gc = secs + GC_PERIOD_SECS;
        }
        Cycle::Idle
    }
}

/// A node in the context tree. Cloning yields another handle to the same
/// node.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Creates a root context and its shared timing engine.
    pub fn new_root(sched: &mut Scheduler) -> Self {
        let shared = Arc::new(SharedTiming {
            secs: AtomicU64::new(0),
            handle: sched.handle(),
        });
        let mut timer = Timer::new(sched);
        timer.start(1000, true);
        let signal = timer.signal();
        let inner = Arc::new_cyclic(|weak| {
            let engine = sched.create_engine(
                SharedTimingEngine {
                    root: weak.clone(),
                    timer,
                    time_of_gc: GC_PERIOD_SECS,
                },
                Priority::Default,
            );
            sched.add_wake_up_signal(engine, signal);
            ContextInner {
                parent: None,
                shared,
                registry: Mutex::new(HashMap::new()),
                children: Mutex::new(Vec::new()),
                do_gc: AtomicBool::new(false),
                timing_engine: Some(engine),
            }
        });
        tracing::debug!("root context created");
        Self { inner }
    }

    /// Creates a child context below `parent`.
    #[must_use]
    pub fn new_child(parent: &Self) -> Self {
        let inner = Arc::new(ContextInner {
            parent: Some(parent.clone()),
            shared: Arc::clone(&parent.inner.shared),
            registry: Mutex::new(HashMap::new()),
            children: Mutex::new(Vec::new()),
            do_gc: AtomicBool::new(false),
            timing_engine: None,
        });
        let mut children = parent.inner.children.lock();
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&inner));
        Self { inner }
    }

    /// The parent context, if this is not a root.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.inner.parent.as_ref()
    }

    /// The root of this context's tree.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut c = self;
        while let Some(p) = c.parent() {
            c = p;
        }
        c
    }

    /// Whether two handles refer to the same context.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Handle of the scheduler this context tree belongs to.
    #[must_use]
    pub fn handle(&self) -> &SchedulerHandle {
        &self.inner.shared.handle
    }

    /// Seconds counted by the shared timing engine.
    #[must_use]
    pub fn secs_counter(&self) -> u64 {
        self.inner.shared.secs.load(Ordering::Relaxed)
    }

    /// Number of models registered directly in this context.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Returns the model registered under `M` and `name`, or builds one with
    /// `create`. With `common == false` a fresh, unregistered model is always
    /// built.
    ///
    /// `create` runs without any lock held and may acquire other models.
    pub fn acquire<M, F>(&self, name: &str, common: bool, create: F) -> ModelRef<M>
    where
        M: Send + Sync + 'static,
        F: FnOnce(&Self, &str) -> M,
    {
        if !common {
            return ModelRef::private(Arc::new(create(self, name)), name);
        }
        if let Some(found) = self.lookup::<M>(name) {
            return found;
        }
        let model = Arc::new(create(self, name));
        let key: Key = (TypeId::of::<M>(), Arc::from(name));
        let mut registry = self.inner.registry.lock();
        // The constructor may have registered the same identity meanwhile.
        if let Some(entry) = registry.get_mut(&key) {
            if let Ok(existing) = Arc::clone(&entry.model).downcast::<M>() {
                entry.outside += 1;
                return ModelRef::common(existing, Arc::downgrade(&self.inner), key.1);
            }
        }
        registry.insert(key.clone(), entry_for(&model));
        drop(registry);
        tracing::trace!(model = core::any::type_name::<M>(), name, "common model registered");
        ModelRef::common(model, Arc::downgrade(&self.inner), key.1)
    }

    /// Registers an already constructed model.
    ///
    /// # Panics
    ///
    /// Panics if a model of the same type and name is already registered.
    pub fn register<M: Send + Sync + 'static>(&self, name: &str, model: M) -> ModelRef<M> {
        let model = Arc::new(model);
        let key: Key = (TypeId::of::<M>(), Arc::from(name));
        let mut registry = self.inner.registry.lock();
        assert!(
            !registry.contains_key(&key),
            "two common models with same identity: type={} name={name:?}",
            core::any::type_name::<M>()
        );
        registry.insert(key.clone(), entry_for(&model));
        drop(registry);
        ModelRef::common(model, Arc::downgrade(&self.inner), key.1)
    }

    /// Finds a model registered directly in this context.
    #[must_use]
    pub fn lookup<M: Send + Sync + 'static>(&self, name: &str) -> Option<ModelRef<M>> {
        let key: Key = (TypeId::of::<M>(), Arc::from(name));
        let mut registry = self.inner.registry.lock();
        let entry = registry.get_mut(&key)?;
        let model = Arc::clone(&entry.model).downcast::<M>().ok()?;
        entry.outside += 1;
        drop(registry);
        Some(ModelRef::common(model, Arc::downgrade(&self.inner), key.1))
    }

    /// Finds a model in this context or the nearest ancestor that has one.
    #[must_use]
    pub fn lookup_inherited<M: Send + Sync + 'static>(&self, name: &str) -> Option<ModelRef<M>> {
        let mut c = Some(self);
        while let Some(ctx) = c {
            if let Some(found) = ctx.lookup(name) {
                return Some(found);
            }
            c = ctx.parent();
        }
        None
    }

    /// Drops unreferenced models whose time of death has passed, in this
    /// context and all descendants.
    pub fn collect_garbage(&self) {
        collect_tree(&self.inner);
    }

    /// Lists the models registered directly in this context.
    #[must_use]
    pub fn listing(&self) -> Vec<ModelInfo> {
        let registry = self.inner.registry.lock();
        let mut out: Vec<ModelInfo> = registry
            .iter()
            .map(|((_, name), e)| ModelInfo {
                type_name: e.type_name,
                name: name.to_string(),
                ref_count: Arc::strong_count(&e.model),
                lifetime: e.lifetime,
            })
            .collect();
        out.sort_by(|a, b| (a.type_name, &a.name).cmp(&(b.type_name, &b.name)));
        out
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.inner.parent.is_none())
            .field("models", &self.model_count())
            .finish_non_exhaustive()
    }
}

fn entry_for<M: Send + Sync + 'static>(model: &Arc<M>) -> Entry {
    let model: Arc<dyn Any + Send + Sync> = Arc::clone(model) as _;
    Entry {
        model,
        type_name: core::any::type_name::<M>(),
        lifetime: CommonLifetime::Immediate,
        time_of_death: 0,
        outside: 1,
    }
}

fn collect_tree(ctx: &Arc<ContextInner>) {
    if ctx.do_gc.swap(false, Ordering::Relaxed) {
        let now = ctx.shared.secs.load(Ordering::Relaxed);
        let garbage: Vec<(&'static str, Arc<dyn Any + Send + Sync>)> = {
            let mut registry = ctx.registry.lock();
            let mut due = Vec::new();
            registry.retain(|_, e| {
                if e.outside > 0 || e.lifetime == CommonLifetime::Forever {
                    return true;
                }
                if e.time_of_death < now {
                    due.push((e.type_name, Arc::clone(&e.model)));
                    return false;
                }
                ctx.do_gc.store(true, Ordering::Relaxed);
                true
            });
            due
        };
        for (type_name, _) in &garbage {
            tracing::debug!(model = type_name, secs = now, "removing model by garbage collection");
        }
        drop(garbage);
    }
    let children: Vec<Arc<ContextInner>> = ctx
        .children
        .lock()
        .iter()
        .filter_map(Weak::upgrade)
        .collect();
    for child in &children {
        collect_tree(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use crate::time::{Duration, ManualClock};

    #[derive(Debug)]
    struct Counter(u32);

    fn manual_scheduler() -> (Scheduler, ManualClock) {
        let clock = ManualClock::new();
        let sched = Scheduler::with_time_source(SchedulerConfig::standard(), Arc::new(clock.clone()));
        (sched, clock)
    }

    fn tick_secs(sched: &mut Scheduler, clock: &ManualClock, secs: u32) {
        for _ in 0..secs {
            clock.advance(Duration::from_secs(1));
            sched.do_time_slice();
            sched.do_time_slice();
        }
    }

    #[test]
    fn acquire_returns_same_instance() {
        let (mut sched, _clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let a = root.acquire("a", true, |_, _| Counter(1));
        let b = root.acquire("a", true, |_, _| Counter(2));
        assert!(ModelRef::ptr_eq(&a, &b));
        assert_eq!(b.0, 1, "second constructor not run");
        assert_eq!(ModelRef::ref_count(&a), 3);

        let p = root.acquire("a", false, |_, _| Counter(3));
        assert!(!p.is_common());
        assert_eq!(p.0, 3);
        assert_eq!(root.model_count(), 1);
    }

    #[test]
    fn immediate_lifetime_unregisters_on_last_drop() {
        let (mut sched, _clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let a = root.acquire("x", true, |_, _| Counter(0));
        let b = a.clone();
        drop(a);
        assert_eq!(root.model_count(), 1);
        drop(b);
        assert_eq!(root.model_count(), 0);
    }

    #[test]
    fn concurrent_last_drops_unregister_once() {
        let (mut sched, _clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let barrier = std::sync::Barrier::new(2);
        for i in 0..2_000 {
            let a = root.acquire("racy", true, |_, _| Counter(i));
            let b = a.clone();
            std::thread::scope(|s| {
                s.spawn(|| {
                    barrier.wait();
                    drop(b);
                });
                barrier.wait();
                drop(a);
            });
            assert!(
                root.lookup::<Counter>("racy").is_none(),
                "model left registered after both references dropped (round {i})"
            );
        }
        assert_eq!(root.model_count(), 0);
    }

    #[test]
    fn outside_references_survive_clone_and_lookup() {
        let (mut sched, _clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let a = root.acquire("x", true, |_, _| Counter(0));
        let found = root.lookup::<Counter>("x");
        let b = a.clone();
        drop(a);
        drop(found);
        assert_eq!(root.model_count(), 1, "b still holds it");
        drop(b);
        assert_eq!(root.model_count(), 0);
    }

    #[test]
    fn grace_lifetime_survives_until_collected() {
        let (mut sched, clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let m = root.acquire("cache", true, |_, _| Counter(7));
        m.set_min_common_lifetime(CommonLifetime::Grace(3));
        drop(m);
        assert_eq!(root.model_count(), 1, "kept during grace");

        let again = root.acquire("cache", true, |_, _| Counter(8));
        assert_eq!(again.0, 7, "re-acquired during grace");
        drop(again);

        tick_secs(&mut sched, &clock, 9);
        assert_eq!(root.model_count(), 1, "no collection before the first period");
        tick_secs(&mut sched, &clock, 1);
        assert_eq!(root.secs_counter(), 10);
        assert_eq!(root.model_count(), 0, "collected at the first period");
    }

    #[test]
    fn grace_not_yet_due_waits_for_next_collection() {
        let (mut sched, clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        tick_secs(&mut sched, &clock, 8);
        let m = root.acquire("late", true, |_, _| Counter(0));
        m.set_min_common_lifetime(CommonLifetime::Grace(5));
        drop(m);

        tick_secs(&mut sched, &clock, 2);
        assert_eq!(root.model_count(), 1, "death at 13 is not before 10");
        tick_secs(&mut sched, &clock, 10);
        assert_eq!(root.model_count(), 0);
    }

    #[test]
    fn forever_lifetime_keeps_model() {
        let (mut sched, clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let m = root.acquire("cfg", true, |_, _| Counter(0));
        m.set_min_common_lifetime(CommonLifetime::Forever);
        drop(m);
        tick_secs(&mut sched, &clock, 21);
        assert_eq!(root.model_count(), 1);
        assert_eq!(root.listing()[0].lifetime, CommonLifetime::Forever);
    }

    #[test]
    fn child_lookup_inherits_from_parent() {
        let (mut sched, clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let child = Context::new_child(&root);
        let m = root.acquire("shared", true, |_, _| Counter(5));
        assert!(child.lookup::<Counter>("shared").is_none());
        let found = child.lookup_inherited::<Counter>("shared");
        assert!(found.is_some_and(|f| ModelRef::ptr_eq(&f, &m)));
        assert!(Context::ptr_eq(child.root(), &root));

        let c = child.acquire("own", true, |_, _| Counter(1));
        c.set_min_common_lifetime(CommonLifetime::Grace(0));
        drop(c);
        tick_secs(&mut sched, &clock, 10);
        assert_eq!(child.model_count(), 0, "children are collected too");
    }

    #[test]
    #[should_panic(expected = "same identity")]
    fn duplicate_registration_panics() {
        let (mut sched, _clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let _a = root.register("dup", Counter(0));
        let _b = root.register("dup", Counter(1));
    }

    #[test]
    fn listing_reports_models() {
        let (mut sched, _clock) = manual_scheduler();
        let root = Context::new_root(&mut sched);
        let _b = root.acquire("b", true, |_, _| Counter(0));
        let _a = root.acquire("a", true, |_, _| 1_u8);
        let list = root.listing();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|m| m.ref_count == 2));
        assert!(list.iter().any(|m| m.name == "a" && m.type_name == "u8"));
    }
}
