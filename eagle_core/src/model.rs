// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared, reference-counted models.
//!
//! A *model* is any `Send + Sync` value handed out through [`ModelRef`]. A
//! model is *common* when it is registered in a
//! [`Context`](crate::context::Context) under its type and a name; every
//! [`Context::acquire`](crate::context::Context::acquire) of the same type and
//! name then yields the same instance.
//!
//! The registry holds one reference of its own and counts the outside ones
//! under its lock. When the last outside reference goes away, the model's
//! [`CommonLifetime`] decides what happens.

use core::any::{Any, TypeId};
use core::fmt;
use core::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use crate::context::ContextInner;

/// How long a common model survives after its last outside reference is
/// dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommonLifetime {
    /// Unregister and drop at once.
    #[default]
    Immediate,
    /// Keep it registered for at least this many seconds, then let the
    /// garbage collector drop it unless it was acquired again.
    Grace(u32),
    /// Keep it until its context is dropped.
    Forever,
}

/// A strong reference to a model.
///
/// Dereferences to the model. Cloning adds a reference.
pub struct ModelRef<M: Send + Sync + 'static> {
    model: Arc<M>,
    home: Option<Weak<ContextInner>>,
    name: Arc<str>,
}

impl<M: Send + Sync + 'static> ModelRef<M> {
    pub(crate) fn private(model: Arc<M>, name: &str) -> Self {
        Self {
            model,
            home: None,
            name: Arc::from(name),
        }
    }

    pub(crate) fn common(model: Arc<M>, home: Weak<ContextInner>, name: Arc<str>) -> Self {
        Self {
            model,
            home: Some(home),
            name,
        }
    }

    /// The name the model was acquired under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the model is registered in a context.
    #[must_use]
    pub fn is_common(&self) -> bool {
        self.home.is_some()
    }

    /// Whether two references point to the same model.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.model, &b.model)
    }

    /// Number of strong references, including the registry's.
    #[must_use]
    pub fn ref_count(this: &Self) -> usize {
        Arc::strong_count(&this.model)
    }

    /// Sets the lifetime applied when the last outside reference is dropped.
    pub fn set_min_common_lifetime(&self, lifetime: CommonLifetime) {
        let Some(home) = self.home.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let key = (TypeId::of::<M>(), Arc::clone(&self.name));
        let mut registry = home.registry.lock();
        if let Some(entry) = registry.get_mut(&key) {
            if same_allocation(&entry.model, &self.model) {
                entry.lifetime = lifetime;
            }
        }
    }
}

fn same_allocation<M>(entry: &Arc<dyn Any + Send + Sync>, model: &Arc<M>) -> bool {
    core::ptr::eq(Arc::as_ptr(entry).cast::<()>(), Arc::as_ptr(model).cast::<()>())
}

impl<M: Send + Sync + 'static> Deref for ModelRef<M> {
    type Target = M;

    #[inline]
    fn deref(&self) -> &M {
        &self.model
    }
}

impl<M: Send + Sync + 'static> Clone for ModelRef<M> {
    fn clone(&self) -> Self {
        if let Some(home) = self.home.as_ref().and_then(Weak::upgrade) {
            let key = (TypeId::of::<M>(), Arc::clone(&self.name));
            if let Some(entry) = home
                .registry
                .lock()
                .get_mut(&key)
                .filter(|e| same_allocation(&e.model, &self.model))
            {
                entry.outside += 1;
            }
        }
        Self {
            model: Arc::clone(&self.model),
            home: self.home.clone(),
            name: Arc::clone(&self.name),
        }
    }
}

impl<M: Send + Sync + 'static> fmt::Debug for ModelRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRef")
            .field("type", &core::any::type_name::<M>())
            .field("name", &self.name)
            .field("common", &self.is_common())
            .finish_non_exhaustive()
    }
}

impl<M: Send + Sync + 'static> Drop for ModelRef<M> {
    fn drop(&mut self) {
        let Some(home) = self.home.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let key = (TypeId::of::<M>(), Arc::clone(&self.name));
        let removed = {
            let mut registry = home.registry.lock();
            let Some(entry) = registry
                .get_mut(&key)
                .filter(|e| same_allocation(&e.model, &self.model))
            else {
                return;
            };
            entry.outside = entry.outside.saturating_sub(1);
            if entry.outside > 0 {
                return;
            }
            match entry.lifetime {
                CommonLifetime::Immediate => registry.remove(&key),
                CommonLifetime::Grace(secs) => {
                    entry.time_of_death = home.shared.secs.load(Ordering::Relaxed) + u64::from(secs);
                    home.do_gc.store(true, Ordering::Relaxed);
                    None
                }
                CommonLifetime::Forever => None,
            }
        };
        // The registry's reference is dropped here, outside the lock.
        if let Some(entry) = removed {
            tracing::trace!(model = entry.type_name, name = %self.name, "common model unregistered");
        }
    }
}
