// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The context a panel behavior sees during a callback.

use core::ops::{Deref, DerefMut};

use super::{PanelBehavior, PanelId, PanelRect, ViewConditionType};
use crate::paint::Color;
use crate::scheduler::Scheduler;
use crate::view::{SharedView, SubViewPanel, View, ViewFlags};

/// Access to the view from inside a panel callback.
///
/// Shortcuts that name "this panel" refer to the panel being called. The
/// whole view is reachable through `Deref`, so any view operation can be
/// applied to any panel.
///
/// Callbacks run by the view's update engine (notices, auto-expansion and
/// child layout) also see the scheduler.
#[derive(Debug)]
pub struct PanelCtx<'a> {
    pub(crate) view: &'a mut View,
    pub(crate) id: PanelId,
    pub(crate) sched: Option<&'a mut Scheduler>,
}

impl PanelCtx<'_> {
    /// The panel being called.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PanelId {
        self.id
    }

    /// The parent of this panel.
    #[must_use]
    pub fn parent(&self) -> Option<PanelId> {
        self.view.parent(self.id)
    }

    /// Name of this panel.
    #[must_use]
    pub fn name(&self) -> &str {
        self.view.name(self.id)
    }

    /// Whether this panel is on screen.
    #[must_use]
    pub fn is_viewed(&self) -> bool {
        self.view.is_viewed(self.id)
    }

    /// This panel's view condition.
    #[must_use]
    pub fn view_condition(&self, kind: ViewConditionType) -> f64 {
        self.view.view_condition(self.id, kind)
    }

    /// Tallness of this panel in its own coordinates.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.view.height(self.id)
    }

    /// Name of the child the view is seeking inside this panel.
    #[must_use]
    pub fn sought_name(&self) -> Option<&str> {
        self.view.sought_name(self.id)
    }

    /// Creates a child of this panel.
    ///
    /// # Panics
    ///
    /// Panics if a child named `name` exists already.
    pub fn create_child(&mut self, name: &str, behavior: impl PanelBehavior + 'static) -> PanelId {
        self.view.create_panel(self.id, name, Box::new(behavior))
    }

    /// Finds a child of this panel by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<PanelId> {
        self.view.child(self.id, name)
    }

    /// Children of this panel, in order.
    #[must_use]
    pub fn child_ids(&self) -> Vec<PanelId> {
        self.view.children(self.id).collect()
    }

    /// Lays out a child of this panel in this panel's coordinates.
    pub fn layout_child(&mut self, child: PanelId, rect: PanelRect, canvas_color: Color) {
        debug_assert_eq!(
            self.view.parent(child),
            Some(self.id),
            "layout_child on a panel that is not a child"
        );
        self.view.layout(child, rect, canvas_color);
    }

    /// Repaints the whole panel.
    pub fn invalidate_painting(&mut self) {
        self.view.invalidate_panel_painting(self.id);
    }

    /// The scheduler, when the callback runs inside the view's update engine.
    /// `None` during input and when the view is updated by hand.
    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.sched.as_deref_mut()
    }

    /// Creates a child of this panel that hosts a nested view, in a context
    /// below this view's context. Returns the child and the nested view.
    ///
    /// Returns `None` when no scheduler is at hand; see
    /// [`scheduler`](Self::scheduler).
    pub fn create_sub_view_child(
        &mut self,
        name: &str,
        flags: ViewFlags,
    ) -> Option<(PanelId, SharedView)> {
        let sched = self.sched.as_deref_mut()?;
        let panel = SubViewPanel::new(sched, &self.view.context, flags);
        let sub = panel.sub_view().clone();
        Some((self.create_child(name, panel), sub))
    }

    /// Deletes this panel. The behavior is dropped once the callback returns.
    pub fn delete_self(&mut self) {
        self.view.delete_panel(self.id);
    }
}

impl Deref for PanelCtx<'_> {
    type Target = View;

    fn deref(&self) -> &View {
        self.view
    }
}

impl DerefMut for PanelCtx<'_> {
    fn deref_mut(&mut self) -> &mut View {
        self.view
    }
}
