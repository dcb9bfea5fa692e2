// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tiled, parallel painting of a view's invalid region.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use eagle_core::damage::{DamageRegion, PixelRect};
use eagle_core::paint::Color;
use eagle_core::scheduler::SchedulerHandle;
use eagle_core::time::HostTime;
#[cfg(feature = "trace-rich")]
use eagle_core::trace::TileEvent;
use eagle_core::trace::{PhaseBeginEvent, PhaseEndEvent, PhaseKind, RenderPassEvent, RenderSummaryBuilder, Tracer};
use eagle_core::view::SharedView;
use parking_lot::Mutex;

use crate::backend::RenderBackend;
use crate::error::RenderError;
use crate::pool::RenderThreadPool;
use crate::tile::{TileConfig, tile_rects};

/// Paints views into the buffers of a [`RenderBackend`], one tile at a time,
/// on every thread of a [`RenderThreadPool`].
///
/// Each worker holds the view's mutex while it paints a tile, so panel
/// painting is serialized: at most one tile of a view paints at any moment.
/// The pool overlaps that painting with the other workers' buffer setup and
/// [`RenderBackend::async_flush_buffer`] calls, which run outside the lock.
pub struct ViewRenderer {
    pool: RenderThreadPool,
    backend: Arc<dyn RenderBackend>,
    tiles: TileConfig,
    buffer_count: usize,
    pass: u64,
}

impl fmt::Debug for ViewRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRenderer")
            .field("pool", &self.pool)
            .field("tiles", &self.tiles)
            .field("buffer_count", &self.buffer_count)
            .field("pass", &self.pass)
            .finish_non_exhaustive()
    }
}

impl ViewRenderer {
    /// A renderer with [`TileConfig::DEFAULT`] buffers.
    #[must_use]
    pub fn new(pool: RenderThreadPool, backend: Arc<dyn RenderBackend>) -> Self {
        Self::with_tile_config(pool, backend, TileConfig::DEFAULT)
    }

    /// A renderer with buffers of the given size.
    #[must_use]
    pub fn with_tile_config(pool: RenderThreadPool, backend: Arc<dyn RenderBackend>, tiles: TileConfig) -> Self {
        Self {
            pool,
            backend,
            tiles,
            buffer_count: 0,
            pass: 0,
        }
    }

    /// Size of one render buffer.
    #[must_use]
    pub fn tile_config(&self) -> TileConfig {
        self.tiles
    }

    /// The thread pool painting the tiles.
    #[must_use]
    pub fn pool(&self) -> &RenderThreadPool {
        &self.pool
    }

    /// Number of passes that painted something.
    #[must_use]
    pub fn pass_count(&self) -> u64 {
        self.pass
    }

    /// Paints `region` of `view` and flushes every tile.
    ///
    /// # Errors
    ///
    /// Returns the first error of any tile. Tiles not yet started when the
    /// error occurred are skipped.
    pub fn render_view(&mut self, view: &SharedView, region: &DamageRegion) -> Result<(), RenderError> {
        self.render_view_traced(view, region, &mut Tracer::none())
    }

    /// Like [`render_view`](Self::render_view), reporting the pass to `tracer`.
    ///
    /// # Errors
    ///
    /// Returns the first error of any tile.
    pub fn render_view_traced(
        &mut self,
        view: &SharedView,
        region: &DamageRegion,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), RenderError> {
        if region.is_empty() {
            return Ok(());
        }
        let tiles: Vec<PixelRect> = region
            .rects()
            .iter()
            .flat_map(|r| tile_rects(*r, self.tiles))
            .collect();
        let buffer_count = self.pool.thread_count();
        self.pass += 1;
        let pass = self.pass;

        let clock = tracer
            .is_active()
            .then(|| view.lock().context().handle().clone());
        let now = || clock.as_ref().map_or(HostTime(0), SchedulerHandle::now);
        let event = RenderPassEvent {
            pass,
            tile_count: u32::try_from(tiles.len()).unwrap_or(u32::MAX),
            buffer_count: u32::try_from(buffer_count).unwrap_or(u32::MAX),
            thread_count: u32::try_from(buffer_count).unwrap_or(u32::MAX),
            timestamp: now(),
        };
        tracer.render_pass(&event);
        let mut summary = RenderSummaryBuilder::new(&event);

        if buffer_count != self.buffer_count {
            let t = now();
            tracer.phase_begin(&PhaseBeginEvent {
                pass,
                phase: PhaseKind::Prepare,
                timestamp: t,
            });
            summary.phase_begin(PhaseKind::Prepare, t);
            self.buffer_count = 0;
            self.backend
                .prepare_buffers(buffer_count, self.tiles.width, self.tiles.height)?;
            self.buffer_count = buffer_count;
            let t = now();
            tracer.phase_end(&PhaseEndEvent {
                pass,
                phase: PhaseKind::Prepare,
                timestamp: t,
            });
            summary.phase_end(PhaseKind::Prepare, t);
        }

        let t = now();
        tracer.phase_begin(&PhaseBeginEvent {
            pass,
            phase: PhaseKind::Paint,
            timestamp: t,
        });
        summary.phase_begin(PhaseKind::Paint, t);

        let run = Arc::new(TileRun {
            backend: Arc::clone(&self.backend),
            view: Arc::clone(view),
            tiles,
            next: AtomicUsize::new(0),
            error: Mutex::new(None),
            #[cfg(feature = "trace-rich")]
            painted: Mutex::new(Vec::new()),
        });
        if buffer_count > 1 {
            let task = Arc::clone(&run);
            self.pool
                .call_parallel(buffer_count, Arc::new(move |buffer| task.run(buffer)));
        } else {
            run.run(0);
        }

        let t = now();
        tracer.phase_end(&PhaseEndEvent {
            pass,
            phase: PhaseKind::Paint,
            timestamp: t,
        });
        summary.phase_end(PhaseKind::Paint, t);
        #[cfg(feature = "trace-rich")]
        tracer.tiles(pass, &run.painted.lock());
        tracer.render_summary(&summary.finish());

        tracing::trace!(pass, tiles = run.tiles.len(), buffer_count, "view rendered");
        match run.error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Tiles of one pass, claimed one at a time by every painting thread.
struct TileRun {
    backend: Arc<dyn RenderBackend>,
    view: SharedView,
    tiles: Vec<PixelRect>,
    next: AtomicUsize,
    error: Mutex<Option<RenderError>>,
    #[cfg(feature = "trace-rich")]
    painted: Mutex<Vec<TileEvent>>,
}

impl TileRun {
    fn run(&self, buffer: usize) {
        loop {
            let i = self.next.fetch_add(1, Ordering::Relaxed);
            let Some(&tile) = self.tiles.get(i) else {
                return;
            };
            if let Err(e) = self.render_tile(buffer, tile) {
                self.next.store(self.tiles.len(), Ordering::Relaxed);
                self.error.lock().get_or_insert(e);
                return;
            }
            #[cfg(feature = "trace-rich")]
            self.painted.lock().push(TileEvent {
                buffer: u32::try_from(buffer).unwrap_or(u32::MAX),
                x: tile.x,
                y: tile.y,
                width: tile.width,
                height: tile.height,
            });
        }
    }

    fn render_tile(&self, buffer: usize, tile: PixelRect) -> Result<(), RenderError> {
        // The view lock is held for one tile's painting only, never while
        // flushing.
        self.backend.with_buffer_painter(buffer, tile, &mut |painter| {
            self.view.lock().paint(painter, Color::TRANSPARENT);
        })?;
        self.backend.async_flush_buffer(buffer, tile)
    }
}

#[cfg(test)]
mod tests {
    use eagle_core::context::Context;
    use eagle_core::paint::Painter;
    use eagle_core::panel::{PanelBehavior, Paintable};
    use eagle_core::scheduler::Scheduler;
    use eagle_core::view::{View, ViewFlags, ViewGeometry};

    use super::*;
    use crate::image::HeadlessBackend;

    const BLUE: Color = Color::rgba(0, 0, 255, 255);

    struct Filled(Color);

    impl PanelBehavior for Filled {
        fn as_paintable(&self) -> Option<&dyn Paintable> {
            Some(self)
        }
    }

    impl Paintable for Filled {
        fn is_opaque(&self) -> bool {
            true
        }

        fn paint(&self, painter: &mut Painter<'_>, _canvas_color: Color) {
            painter.clear(self.0);
        }
    }

    fn setup(width: f64, height: f64) -> (Scheduler, Context, SharedView) {
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let view = View::new(&mut sched, &root, ViewFlags::empty());
        {
            let mut v = view.lock();
            v.set_geometry(ViewGeometry::new(0.0, 0.0, width, height));
            let _ = v.create_root("root", Filled(BLUE));
        }
        for _ in 0..16 {
            sched.do_time_slice();
        }
        (sched, root, view)
    }

    struct FailingBackend;

    impl RenderBackend for FailingBackend {
        fn prepare_buffers(&self, _: usize, _: u32, _: u32) -> Result<(), RenderError> {
            Ok(())
        }

        fn with_buffer_painter(
            &self,
            _: usize,
            _: PixelRect,
            _: &mut dyn FnMut(&mut Painter<'_>),
        ) -> Result<(), RenderError> {
            Ok(())
        }

        fn async_flush_buffer(&self, _: usize, tile: PixelRect) -> Result<(), RenderError> {
            if tile.y >= 4 {
                return Err(RenderError::Flush(format!("row {} rejected", tile.y)));
            }
            Ok(())
        }
    }

    #[test]
    fn empty_region_paints_nothing() {
        let (sched, root, view) = setup(16.0, 16.0);
        let backend = Arc::new(HeadlessBackend::new(16, 16));
        let mut renderer = ViewRenderer::new(RenderThreadPool::new(0).unwrap(), backend.clone());
        renderer.render_view(&view, &DamageRegion::new()).unwrap();
        assert_eq!(renderer.pass_count(), 0);
        assert_eq!(backend.buffer_count(), 0, "buffers are prepared lazily");
        drop((view, root, sched));
    }

    #[test]
    fn region_is_painted_into_the_frame() {
        let (sched, root, view) = setup(16.0, 16.0);
        let backend = Arc::new(HeadlessBackend::new(16, 16));
        let mut renderer = ViewRenderer::with_tile_config(
            RenderThreadPool::new(2).unwrap(),
            backend.clone(),
            TileConfig::new(8, 3),
        );
        let region: DamageRegion = [PixelRect::new(2, 2, 10, 10)].into_iter().collect();
        renderer.render_view(&view, &region).unwrap();

        let frame = backend.frame();
        assert_eq!(frame.pixel(2, 2), BLUE);
        assert_eq!(frame.pixel(11, 11), BLUE);
        assert_eq!(frame.pixel(1, 2), Color::TRANSPARENT, "outside the region");
        assert_eq!(frame.pixel(12, 12), Color::TRANSPARENT, "outside the region");
        assert_eq!(backend.flushed_tiles(), 8, "2 columns times 4 rows of tiles");
        assert_eq!(backend.buffer_count(), 3);
        drop((view, root, sched));
    }

    #[test]
    fn first_tile_error_is_returned() {
        let (sched, root, view) = setup(16.0, 16.0);
        for threads in [0, 3] {
            let mut renderer = ViewRenderer::with_tile_config(
                RenderThreadPool::new(threads).unwrap(),
                Arc::new(FailingBackend),
                TileConfig::new(16, 2),
            );
            let region: DamageRegion = [PixelRect::new(0, 0, 16, 16)].into_iter().collect();
            let err = renderer.render_view(&view, &region).unwrap_err();
            assert!(matches!(err, RenderError::Flush(_)), "got {err}");
        }
        drop((view, root, sched));
    }

    /// Counts how many threads paint at once.
    struct Crowded {
        inside: Arc<AtomicUsize>,
        most: Arc<AtomicUsize>,
    }

    impl PanelBehavior for Crowded {
        fn as_paintable(&self) -> Option<&dyn Paintable> {
            Some(self)
        }
    }

    impl Paintable for Crowded {
        fn paint(&self, painter: &mut Painter<'_>, _canvas_color: Color) {
            let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
            self.most.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(1));
            painter.clear(BLUE);
            self.inside.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn tiles_of_one_view_paint_one_at_a_time() {
        let mut sched = Scheduler::new();
        let root = Context::new_root(&mut sched);
        let view = View::new(&mut sched, &root, ViewFlags::empty());
        let most = Arc::new(AtomicUsize::new(0));
        {
            let mut v = view.lock();
            v.set_geometry(ViewGeometry::new(0.0, 0.0, 16.0, 16.0));
            let _ = v.create_root(
                "crowded",
                Crowded {
                    inside: Arc::new(AtomicUsize::new(0)),
                    most: Arc::clone(&most),
                },
            );
        }
        for _ in 0..16 {
            sched.do_time_slice();
        }
        let backend = Arc::new(HeadlessBackend::new(16, 16));
        let mut renderer = ViewRenderer::with_tile_config(
            RenderThreadPool::new(3).unwrap(),
            backend.clone(),
            TileConfig::new(16, 1),
        );
        let region: DamageRegion = [PixelRect::new(0, 0, 16, 16)].into_iter().collect();
        renderer.render_view(&view, &region).unwrap();

        assert_eq!(backend.flushed_tiles(), 16);
        assert_eq!(most.load(Ordering::SeqCst), 1);
        drop((view, root, sched));
    }

    #[test]
    fn buffers_follow_the_thread_count() {
        let (sched, root, view) = setup(8.0, 8.0);
        let backend = Arc::new(HeadlessBackend::new(8, 8));
        let pool = RenderThreadPool::new(1).unwrap();
        let mut renderer = ViewRenderer::new(pool.clone(), backend.clone());
        let region: DamageRegion = [PixelRect::new(0, 0, 8, 8)].into_iter().collect();

        renderer.render_view(&view, &region).unwrap();
        assert_eq!(backend.buffer_count(), 2);
        pool.set_child_threads(0).unwrap();
        renderer.render_view(&view, &region).unwrap();
        assert_eq!(backend.buffer_count(), 1);
        assert_eq!(renderer.pass_count(), 2);
        drop((view, root, sched));
    }
}
