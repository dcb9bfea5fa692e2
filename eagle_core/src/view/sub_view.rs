// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nested views.
//!
//! A [`SubViewPanel`] owns a child [`View`] and shows it inside its own
//! viewed rectangle. Both views use the same pixel space: the child's
//! geometry is the hosting panel's viewed rectangle, so damage rectangles
//! and mouse positions pass between them unchanged.
//!
//! Lock order is always host view, then child view. The port engine that
//! carries damage and title changes upwards takes the two locks one after
//! the other, never nested.

use std::fmt;
use std::sync::{Arc, Weak};

use kurbo::{Point, Vec2};
use parking_lot::Mutex;

use super::{SharedView, View, ViewFlags, ViewGeometry};
use crate::context::Context;
use crate::input::{InputEvent, InputState};
use crate::paint::{Color, Painter};
use crate::panel::{Cursor, Inputable, NoticeFlags, Paintable, PanelBehavior, PanelCtx, PanelId};
use crate::scheduler::{Cycle, Engine, EngineCtx, EngineId, Priority, Scheduler, SchedulerHandle, SignalId};

/// Where the hosting panel lives. Known from the panel's first notice on.
#[derive(Clone)]
struct Host {
    view: Weak<Mutex<View>>,
    panel: PanelId,
}

type HostSlot = Arc<Mutex<Option<Host>>>;

/// Carries the child view's damage and title changes to the host view.
struct SubViewPort {
    sub: Weak<Mutex<View>>,
    host: HostSlot,
    title: SignalId,
}

impl Engine for SubViewPort {
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle {
        let Some(sub) = self.sub.upgrade() else {
            return Cycle::Idle;
        };
        let region = sub.lock().take_invalid_region();
        drop(sub);
        let title_changed = ctx.is_signaled(self.title);

        let Some(host) = self.host.lock().clone() else {
            return Cycle::Idle;
        };
        let Some(parent) = host.view.upgrade() else {
            return Cycle::Idle;
        };
        let mut parent = parent.lock();
        if !parent.contains(host.panel) {
            return Cycle::Idle;
        }
        if parent.is_viewed(host.panel) {
            let clip = parent.clip_rect(host.panel);
            for r in region.rects() {
                let r = r.to_rect().intersect(clip);
                if r.x0 < r.x1 && r.y0 < r.y1 {
                    parent.invalidate_painting_rect(r);
                }
            }
        }
        if title_changed {
            parent.invalidate_title(host.panel);
        }
        Cycle::Idle
    }
}

/// A panel that hosts a nested [`View`].
///
/// The panel forwards its viewed rectangle into the child view's geometry,
/// paints the child view, and passes input and keyboard focus down. The
/// child view's title becomes the panel's title, and the child's damage is
/// repainted in the host view.
///
/// Create it with [`SubViewPanel::new`] where a scheduler is at hand, or
/// with [`PanelCtx::create_sub_view_child`] from a panel callback.
pub struct SubViewPanel {
    sub: SharedView,
    host: HostSlot,
    port: EngineId,
    handle: SchedulerHandle,
}

impl SubViewPanel {
    /// Creates the panel and its child view. The child view lives in a
    /// context below `context`, normally the hosting view's context.
    pub fn new(sched: &mut Scheduler, context: &Context, flags: ViewFlags) -> Self {
        let sub = View::new(sched, context, flags);
        let signals = sub.lock().signals();
        let host = HostSlot::default();
        let port = sched.create_engine(
            SubViewPort {
                sub: Arc::downgrade(&sub),
                host: Arc::clone(&host),
                title: signals.title,
            },
            Priority::Default,
        );
        sched.add_wake_up_signal(port, signals.repaint);
        sched.add_wake_up_signal(port, signals.title);
        Self {
            sub,
            host,
            port,
            handle: sched.handle(),
        }
    }

    /// The child view.
    #[must_use]
    pub fn sub_view(&self) -> &SharedView {
        &self.sub
    }

    fn attach(&self, ctx: &PanelCtx<'_>) {
        let mut host = self.host.lock();
        if host.is_none() {
            *host = Some(Host {
                view: ctx.view.this.clone(),
                panel: ctx.id(),
            });
        }
    }
}

impl PanelBehavior for SubViewPanel {
    fn notice(&mut self, ctx: &mut PanelCtx<'_>, flags: NoticeFlags) {
        self.attach(ctx);
        let id = ctx.id();
        if flags.contains(NoticeFlags::FOCUS_CHANGED) {
            let focused = ctx.is_panel_focused(id);
            self.sub.lock().set_focused(focused);
        }
        if flags.contains(NoticeFlags::VIEWING_CHANGED) {
            let geometry = if ctx.is_viewed() {
                let v = ctx.viewed_rect(id);
                ViewGeometry {
                    x: v.x,
                    y: v.y,
                    width: v.width,
                    height: v.height,
                    pixel_tallness: ctx.geometry().pixel_tallness,
                }
            } else {
                ViewGeometry::new(0.0, 0.0, 1.0, ctx.height())
            };
            self.sub.lock().set_geometry(geometry);
        }
    }

    fn title(&self) -> Option<String> {
        Some(self.sub.lock().title().to_owned())
    }

    fn cursor(&self) -> Option<Cursor> {
        Some(self.sub.lock().cursor())
    }

    fn as_paintable(&self) -> Option<&dyn Paintable> {
        Some(self)
    }

    fn as_inputable(&mut self) -> Option<&mut dyn Inputable> {
        Some(self)
    }
}

impl Paintable for SubViewPanel {
    fn paint(&self, painter: &mut Painter<'_>, canvas_color: Color) {
        let sub = self.sub.lock();
        let g = sub.geometry();
        let origin = painter.origin();
        let clip = painter.clip_rect();
        let mut unscaled = painter.with_clip_and_transform(
            clip,
            Point::new(origin.x - g.x, origin.y - g.y),
            Vec2::new(1.0, 1.0),
        );
        sub.paint(&mut unscaled, canvas_color);
    }

    fn is_opaque(&self) -> bool {
        true
    }
}

impl Inputable for SubViewPanel {
    fn input(
        &mut self,
        ctx: &mut PanelCtx<'_>,
        event: &mut InputEvent,
        state: &InputState,
        _mouse: Point,
    ) {
        let id = ctx.id();
        if ctx.is_focusable(id) && (event.is_mouse_event() || event.is_touch_event()) {
            ctx.focus_panel(id);
            let focused = ctx.is_panel_focused(id);
            self.sub.lock().set_focused(focused);
        }
        self.sub.lock().input(event, state);
    }
}

impl Drop for SubViewPanel {
    fn drop(&mut self) {
        self.handle.release_engine(self.port);
    }
}

impl fmt::Debug for SubViewPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubViewPanel")
            .field("port", &self.port)
            .field("attached", &self.host.lock().is_some())
            .finish_non_exhaustive()
    }
}
