// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Connects a view to a renderer: damage in, painted tiles out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use eagle_core::scheduler::{Cycle, Engine, EngineCtx, EngineId, Priority, Scheduler, SchedulerHandle};
use eagle_core::view::{SharedView, View};
use parking_lot::Mutex;

use crate::renderer::ViewRenderer;

#[derive(Debug, Default)]
struct PortStats {
    rendered: AtomicU64,
    failed: AtomicU64,
}

/// Repaints a view whenever it reports damage.
///
/// The port owns an engine at [`Priority::VeryLow`], so a repaint happens
/// after the time slice's layout work. The engine is released when the port
/// is dropped.
pub struct ViewPort {
    engine: EngineId,
    handle: SchedulerHandle,
    stats: Arc<PortStats>,
}

impl fmt::Debug for ViewPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewPort")
            .field("engine", &self.engine)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ViewPort {
    /// Starts repainting `view` with `renderer`. Damage already pending is
    /// painted in the next time slice.
    pub fn new(sched: &mut Scheduler, view: &SharedView, renderer: ViewRenderer) -> Self {
        let repaint = view.lock().signals().repaint;
        let stats = Arc::new(PortStats::default());
        let engine = sched.create_engine(
            PortEngine {
                view: Arc::downgrade(view),
                renderer,
                stats: Arc::clone(&stats),
            },
            Priority::VeryLow,
        );
        sched.add_wake_up_signal(engine, repaint);
        sched.wake_up(engine);
        Self {
            engine,
            handle: sched.handle(),
            stats,
        }
    }

    /// The repaint engine.
    #[must_use]
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    /// Number of passes painted without error.
    #[must_use]
    pub fn rendered_passes(&self) -> u64 {
        self.stats.rendered.load(Ordering::Relaxed)
    }

    /// Number of passes that ended in an error.
    #[must_use]
    pub fn failed_passes(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }
}

impl Drop for ViewPort {
    fn drop(&mut self) {
        self.handle.release_engine(self.engine);
    }
}

struct PortEngine {
    view: Weak<Mutex<View>>,
    renderer: ViewRenderer,
    stats: Arc<PortStats>,
}

impl Engine for PortEngine {
    fn cycle(&mut self, _ctx: &mut EngineCtx<'_>) -> Cycle {
        let Some(view) = self.view.upgrade() else {
            return Cycle::Idle;
        };
        let region = view.lock().take_invalid_region();
        if region.is_empty() {
            return Cycle::Idle;
        }
        match self.renderer.render_view(&view, &region) {
            Ok(()) => {
                self.stats.rendered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%e, area = region.area(), "view repaint failed");
            }
        }
        Cycle::Idle
    }
}

#[cfg(test)]
mod tests {
    use eagle_core::context::Context;
    use eagle_core::paint::{Color, Painter};
    use eagle_core::panel::{Paintable, PanelBehavior};
    use eagle_core::view::{ViewFlags, ViewGeometry};
    use kurbo::Rect;

    use super::*;
    use crate::image::HeadlessBackend;
    use crate::pool::RenderThreadPool;

    const GREEN: Color = Color::rgba(0, 200, 0, 255);

    /// Paints whatever color the test currently asks for.
    struct Tinted(Arc<Mutex<Color>>);

    impl PanelBehavior for Tinted {
        fn as_paintable(&self) -> Option<&dyn Paintable> {
            Some(self)
        }
    }

    impl Paintable for Tinted {
        fn is_opaque(&self) -> bool {
            true
        }

        fn paint(&self, painter: &mut Painter<'_>, _canvas_color: Color) {
            painter.clear(*self.0.lock());
        }
    }

    fn settle(sched: &mut Scheduler) {
        for _ in 0..16 {
            sched.do_time_slice();
        }
    }

    #[test]
    fn damage_is_repainted_in_later_slices() {
        let tint = Arc::new(Mutex::new(GREEN));
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let view = View::new(&mut sched, &root, ViewFlags::empty());
        {
            let mut v = view.lock();
            v.set_geometry(ViewGeometry::new(0.0, 0.0, 8.0, 8.0));
            let _ = v.create_root("root", Tinted(Arc::clone(&tint)));
        }
        let backend = Arc::new(HeadlessBackend::new(8, 8));
        let renderer = ViewRenderer::new(RenderThreadPool::new(0).unwrap(), backend.clone());
        let port = ViewPort::new(&mut sched, &view, renderer);

        view.lock().invalidate_painting();
        settle(&mut sched);
        assert!(port.rendered_passes() >= 1, "the port painted");
        assert!(!view.lock().has_invalid_region(), "the damage was taken");
        let frame = backend.frame();
        assert!(frame.pixels().iter().all(|&p| p == GREEN), "the whole view is green");

        let passes = port.rendered_passes();
        *tint.lock() = Color::WHITE;
        view.lock().invalidate_painting_rect(Rect::new(0.0, 0.0, 2.0, 2.0));
        settle(&mut sched);
        assert_eq!(port.rendered_passes(), passes + 1);
        let frame = backend.frame();
        assert_eq!(frame.pixel(1, 1), Color::WHITE, "damaged pixels were repainted");
        assert_eq!(frame.pixel(2, 2), GREEN, "undamaged pixels were kept");
        assert_eq!(port.failed_passes(), 0);

        drop(port);
        drop(view);
        drop(root);
        settle(&mut sched);
    }
}
