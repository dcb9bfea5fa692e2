// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use kurbo::Point;
use parking_lot::Mutex;

use super::*;
use crate::input::{InputEvent, InputKey, InputState};
use crate::paint::tests::TestCanvas;
use crate::paint::Painter;
use crate::panel::{
    Paintable,
    AutoExpansionThreshold, Expandable, Inputable, Layoutable, NoticeFlags, PanelBehavior, PanelCtx,
    PanelRect, ViewConditionType,
};

pub(crate) fn setup(width: f64, height: f64) -> (Scheduler, Context, SharedView) {
    let mut sched = Scheduler::new();
    let root = Context::new_root(&mut sched);
    let view = View::new(&mut sched, &root, ViewFlags::empty());
    view.lock().set_geometry(ViewGeometry::new(0.0, 0.0, width, height));
    (sched, root, view)
}

/// Runs time slices until the view's deferred work has settled.
pub(crate) fn settle(sched: &mut Scheduler) {
    for _ in 0..16 {
        sched.do_time_slice();
    }
}

type Log = Arc<Mutex<Vec<String>>>;

/// Records notices and input.
struct Recorder {
    name: &'static str,
    log: Log,
}

impl PanelBehavior for Recorder {
    fn notice(&mut self, _ctx: &mut PanelCtx<'_>, flags: NoticeFlags) {
        self.log.lock().push(format!("{}:notice:{:?}", self.name, flags));
    }

    fn as_inputable(&mut self) -> Option<&mut dyn Inputable> {
        Some(self)
    }
}

impl Inputable for Recorder {
    fn input(
        &mut self,
        _ctx: &mut PanelCtx<'_>,
        event: &mut InputEvent,
        _state: &InputState,
        _mouse: Point,
    ) {
        self.log
            .lock()
            .push(format!("{}:input:{:?}", self.name, event.get_key()));
    }
}

fn inputs(log: &Log) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|l| l.contains(":input:"))
        .cloned()
        .collect()
}

/// Creates three children when expanded, in a row.
#[derive(Default)]
struct Expander {
    expands: Arc<AtomicU32>,
    shrinks: Arc<AtomicU32>,
}

impl PanelBehavior for Expander {
    fn as_expandable(&mut self) -> Option<&mut dyn Expandable> {
        Some(self)
    }

    fn as_layoutable(&mut self) -> Option<&mut dyn Layoutable> {
        Some(self)
    }
}

impl Expandable for Expander {
    fn auto_expand(&mut self, ctx: &mut PanelCtx<'_>) {
        self.expands.fetch_add(1, Ordering::Relaxed);
        for name in ["a", "b", "c"] {
            ctx.create_child(name, Solid(Color::WHITE));
        }
    }

    fn auto_shrink(&mut self, _ctx: &mut PanelCtx<'_>) {
        self.shrinks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Layoutable for Expander {
    fn layout_children(&mut self, ctx: &mut PanelCtx<'_>) {
        let h = ctx.height();
        for (i, child) in ctx.child_ids().into_iter().enumerate() {
            let x = i as f64 / 3.0;
            ctx.layout_child(child, PanelRect::new(x, 0.0, 1.0 / 3.0, h), Color::TRANSPARENT);
        }
    }
}

/// Paints itself in one opaque color.
struct Solid(Color);

impl PanelBehavior for Solid {
    fn as_paintable(&self) -> Option<&dyn Paintable> {
        Some(self)
    }
}

impl Paintable for Solid {
    fn paint(&self, painter: &mut Painter<'_>, _canvas_color: Color) {
        painter.clear(self.0);
    }

    fn is_opaque(&self) -> bool {
        self.0.is_opaque()
    }
}

fn names(view: &View, panel: PanelId) -> Vec<String> {
    view.children(panel).map(|c| view.name(c).to_owned()).collect()
}

#[test]
fn root_fills_the_view() {
    let (mut sched, _ctx, view) = setup(400.0, 300.0);
    let root = view.lock().create_root("root", Solid(Color::BLACK));
    settle(&mut sched);

    let v = view.lock();
    assert_eq!(v.root_panel(), Some(root));
    assert_eq!(v.supreme_viewed_panel(), Some(root));
    assert_eq!(v.active_panel(), Some(root));
    assert!(v.is_viewed(root));
    assert!(v.is_zoomed_out());
    let r = v.viewed_rect(root);
    assert!(r.x >= 0.0 && r.y >= 0.0, "root at {r:?}");
    assert!(r.x + r.width <= 400.0 + 1e-9 && r.y + r.height <= 300.0 + 1e-9, "root at {r:?}");
}

#[test]
fn expands_once_when_large_enough() {
    let (mut sched, _ctx, view) = setup(50.0, 50.0);
    let expander = Expander::default();
    let expands = Arc::clone(&expander.expands);
    let root = {
        let mut v = view.lock();
        let root = v.create_root("root", expander);
        v.set_auto_expansion_threshold(root, AutoExpansionThreshold::new(100.0, ViewConditionType::Width));
        v.enable_auto_expansion(root);
        root
    };
    settle(&mut sched);
    assert_eq!(expands.load(Ordering::Relaxed), 0, "expanded below the threshold");
    assert!(!view.lock().is_auto_expanded(root));

    view.lock().set_geometry(ViewGeometry::new(0.0, 0.0, 200.0, 200.0));
    settle(&mut sched);
    assert_eq!(expands.load(Ordering::Relaxed), 1);

    settle(&mut sched);
    assert_eq!(expands.load(Ordering::Relaxed), 1, "expanded twice");
    let v = view.lock();
    assert!(v.is_auto_expanded(root));
    assert_eq!(names(&v, root), ["a", "b", "c"]);
    let a = v.child(root, "a").unwrap();
    assert!(v.is_created_by_auto_expansion(a));
    assert!(v.is_viewed(a));
}

#[test]
fn shrink_then_expand_recreates_the_same_children() {
    let (mut sched, _ctx, view) = setup(200.0, 200.0);
    let expander = Expander::default();
    let shrinks = Arc::clone(&expander.shrinks);
    let root = {
        let mut v = view.lock();
        let root = v.create_root("root", expander);
        v.set_auto_expansion_threshold(root, AutoExpansionThreshold::new(100.0, ViewConditionType::Width));
        v.enable_auto_expansion(root);
        root
    };
    settle(&mut sched);
    let first = names(&view.lock(), root);

    view.lock().set_geometry(ViewGeometry::new(0.0, 0.0, 50.0, 50.0));
    settle(&mut sched);
    assert_eq!(shrinks.load(Ordering::Relaxed), 1);
    assert!(view.lock().first_child(root).is_none(), "children survived the shrink");

    view.lock().set_geometry(ViewGeometry::new(0.0, 0.0, 200.0, 200.0));
    settle(&mut sched);
    assert_eq!(names(&view.lock(), root), first);
}

#[test]
fn children_kept_by_hand_survive_a_shrink() {
    let (mut sched, _ctx, view) = setup(200.0, 200.0);
    let root = {
        let mut v = view.lock();
        let root = v.create_root("root", Expander::default());
        v.create_panel(root, "manual", Box::new(Solid(Color::BLACK)));
        v.set_auto_expansion_threshold(root, AutoExpansionThreshold::new(100.0, ViewConditionType::Width));
        v.enable_auto_expansion(root);
        root
    };
    settle(&mut sched);
    assert_eq!(names(&view.lock(), root), ["manual", "a", "b", "c"]);

    view.lock().set_geometry(ViewGeometry::new(0.0, 0.0, 50.0, 50.0));
    settle(&mut sched);
    assert_eq!(names(&view.lock(), root), ["manual"]);
}

#[test]
fn notices_are_delivered_to_new_panels() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let log = Log::default();
    view.lock().create_root(
        "root",
        Recorder {
            name: "root",
            log: Arc::clone(&log),
        },
    );
    settle(&mut sched);
    let log = log.lock();
    assert!(
        log.iter().any(|l| l.starts_with("root:notice:") && l.contains("LAYOUT_CHANGED")),
        "{log:?}"
    );
}

fn two_children(view: &mut View, log: &Log) -> (PanelId, PanelId, PanelId) {
    let root = view.create_root(
        "root",
        Recorder {
            name: "root",
            log: Arc::clone(log),
        },
    );
    let a = view.create_panel(
        root,
        "a",
        Box::new(Recorder {
            name: "a",
            log: Arc::clone(log),
        }),
    );
    let b = view.create_panel(
        root,
        "b",
        Box::new(Recorder {
            name: "b",
            log: Arc::clone(log),
        }),
    );
    view.layout(a, PanelRect::new(0.0, 0.0, 0.5, 1.0), Color::TRANSPARENT);
    view.layout(b, PanelRect::new(0.5, 0.0, 0.5, 1.0), Color::TRANSPARENT);
    (root, a, b)
}

#[test]
fn input_reaches_children_before_parents() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let log = Log::default();
    let (_root, a, b) = two_children(&mut view.lock(), &log);
    settle(&mut sched);
    {
        let v = view.lock();
        assert!(v.is_viewed(a) && v.is_viewed(b), "children not on screen");
    }

    let mut event = InputEvent::key(InputKey::MouseLeft);
    view.lock().input(&mut event, &InputState::at(75.0, 50.0));
    assert!(event.is_empty(), "click not eaten");
    assert_eq!(inputs(&log), ["b:input:MouseLeft", "a:input:None", "root:input:None"]);
    let v = view.lock();
    assert_eq!(v.active_panel(), Some(b));
    assert!(v.is_focused());
}

#[test]
fn keyboard_goes_to_the_active_path_only() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let log = Log::default();
    let (_root, a, _b) = two_children(&mut view.lock(), &log);
    settle(&mut sched);
    view.lock().visit_immobile(a, false);

    let mut event = InputEvent::chars("x");
    view.lock().input(&mut event, &InputState::at(0.0, 0.0));
    assert_eq!(inputs(&log), ["b:input:None", "a:input:Char", "root:input:Char"]);
}

#[test]
fn tab_walks_the_siblings() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let log = Log::default();
    let (_root, a, b) = two_children(&mut view.lock(), &log);
    settle(&mut sched);

    let mut v = view.lock();
    v.visit_in();
    assert_eq!(v.active_panel(), Some(a));
    v.input(&mut InputEvent::key(InputKey::Tab), &InputState::default());
    assert_eq!(v.active_panel(), Some(b));
    v.visit_next();
    assert_eq!(v.active_panel(), Some(a), "did not wrap to the first sibling");
    v.visit_out();
    assert_eq!(v.active_panel(), v.root_panel());
}

#[test]
fn deleting_the_visited_panel_visits_the_parent() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let log = Log::default();
    let (root, a, _b) = two_children(&mut view.lock(), &log);
    settle(&mut sched);

    let mut v = view.lock();
    v.visit(a, true);
    assert!(v.is_visited(a));
    v.delete_panel(a);
    assert!(!v.contains(a));
    assert_eq!(v.active_panel(), Some(root));
    assert!(v.in_visited_path(root));
    assert_eq!(names(&v, root), ["b"]);
}

#[test]
fn panel_at_prefers_the_top_most_child() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let log = Log::default();
    let (root, a, b) = two_children(&mut view.lock(), &log);
    settle(&mut sched);

    let mut v = view.lock();
    assert_eq!(v.panel_at(10.0, 50.0), Some(a));
    assert_eq!(v.panel_at(90.0, 50.0), Some(b));
    assert_eq!(v.panel_at(500.0, 50.0), None);
    assert_eq!(v.focusable_panel_at(90.0, 50.0), Some(b));
    v.set_focusable(b, false);
    assert_eq!(v.focusable_panel_at(90.0, 50.0), Some(root));
}

#[test]
fn paints_viewed_panels_over_their_parents() {
    let red = Color::rgba(255, 0, 0, 255);
    let blue = Color::rgba(0, 0, 255, 255);
    let (mut sched, _ctx, view) = setup(8.0, 8.0);
    {
        let mut v = view.lock();
        let root = v.create_root("root", Solid(red));
        let left = v.create_panel(root, "left", Box::new(Solid(blue)));
        v.layout(left, PanelRect::new(0.0, 0.0, 0.5, 1.0), Color::TRANSPARENT);
    }
    settle(&mut sched);

    let mut canvas = TestCanvas::new(8, 8);
    {
        let mut painter = Painter::new(&mut canvas);
        view.lock().paint(&mut painter, Color::TRANSPARENT);
    }
    assert_eq!(canvas.at(1, 1), blue);
    assert_eq!(canvas.at(3, 7), blue);
    assert_eq!(canvas.at(6, 6), red);
}

#[test]
fn empty_view_paints_the_background() {
    let (_sched, _ctx, view) = setup(4.0, 4.0);
    let mut canvas = TestCanvas::new(4, 4);
    {
        let mut painter = Painter::new(&mut canvas);
        let mut v = view.lock();
        v.set_background_color(Color::WHITE);
        v.paint(&mut painter, Color::TRANSPARENT);
    }
    assert_eq!(canvas.at(2, 2), Color::WHITE);
}

#[test]
fn zoom_in_and_back_out() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let root = view.lock().create_root("root", Solid(Color::BLACK));
    settle(&mut sched);

    let mut v = view.lock();
    v.zoom(50.0, 50.0, 4.0);
    assert!(!v.is_zoomed_out());
    let r = v.viewed_rect(root);
    assert!((r.width - 400.0).abs() < 1e-6, "zoomed to {r:?}");
    assert!((r.x + r.width * 0.5 - 50.0).abs() < 1e-6, "fix point moved: {r:?}");

    v.scroll(10.0, 0.0);
    assert!((v.viewed_rect(root).x - (r.x - 10.0)).abs() < 1e-6);

    v.zoom_out();
    assert!(v.is_zoomed_out());
}

#[test]
fn zoomed_out_view_follows_geometry() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    let root = view.lock().create_root("root", Solid(Color::BLACK));
    settle(&mut sched);

    let mut v = view.lock();
    v.set_geometry(ViewGeometry::new(0.0, 0.0, 300.0, 300.0));
    assert!(v.is_zoomed_out());
    assert!((v.viewed_rect(root).width - 300.0).abs() < 1e-6);
}

#[test]
fn invalidation_accumulates_until_taken() {
    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    view.lock().create_root("root", Solid(Color::BLACK));
    settle(&mut sched);

    let mut v = view.lock();
    let _ = v.take_invalid_region();
    assert!(!v.has_invalid_region());
    v.invalidate_painting_rect(kurbo::Rect::new(10.0, 10.0, 20.0, 20.0));
    v.invalidate_painting_rect(kurbo::Rect::new(500.0, 500.0, 600.0, 600.0));
    let region = v.take_invalid_region();
    assert!(!region.is_empty());
    assert!(!v.has_invalid_region());
}

#[test]
fn title_comes_from_the_active_path() {
    struct Titled;
    impl PanelBehavior for Titled {
        fn title(&self) -> Option<String> {
            Some("Home".to_owned())
        }
    }

    let (mut sched, _ctx, view) = setup(100.0, 100.0);
    {
        let mut v = view.lock();
        let root = v.create_root("root", Titled);
        let child = v.create_panel(root, "child", Box::new(Solid(Color::BLACK)));
        v.layout(child, PanelRect::new(0.25, 0.25, 0.5, 0.5), Color::TRANSPARENT);
    }
    settle(&mut sched);
    assert_eq!(view.lock().title(), "Home");

    let child = {
        let v = view.lock();
        v.child(v.root_panel().unwrap(), "child").unwrap()
    };
    view.lock().visit(child, false);
    settle(&mut sched);
    assert_eq!(view.lock().title(), "Home", "child inherits the title");
}

#[test]
fn disabling_propagates_to_descendants() {
    let (_sched, _ctx, view) = setup(100.0, 100.0);
    let mut v = view.lock();
    let root = v.create_root("root", Solid(Color::BLACK));
    let a = v.create_panel(root, "a", Box::new(Solid(Color::BLACK)));
    let aa = v.create_panel(a, "aa", Box::new(Solid(Color::BLACK)));
    v.set_enable_switch(a, false);
    assert!(v.is_enabled(root));
    assert!(!v.is_enabled(a));
    assert!(!v.is_enabled(aa));
    assert!(v.enable_switch(aa));
    v.set_enable_switch(a, true);
    assert!(v.is_enabled(aa));
}

#[test]
fn identities_resolve_back_to_panels() {
    let (_sched, _ctx, view) = setup(100.0, 100.0);
    let mut v = view.lock();
    let root = v.create_root("root", Solid(Color::BLACK));
    let a = v.create_panel(root, "a:b", Box::new(Solid(Color::BLACK)));
    let id = v.identity(a);
    assert_eq!(v.panel_by_identity(&id), Some(a));
    assert_eq!(v.panel_by_identity("nope"), None);
}

/// Expands into one child hosting a nested view, laid out in the top-right
/// quarter.
#[derive(Default)]
struct Portal {
    sub: Arc<Mutex<Option<SharedView>>>,
}

impl PanelBehavior for Portal {
    fn as_paintable(&self) -> Option<&dyn Paintable> {
        Some(self)
    }

    fn as_expandable(&mut self) -> Option<&mut dyn Expandable> {
        Some(self)
    }

    fn as_layoutable(&mut self) -> Option<&mut dyn Layoutable> {
        Some(self)
    }
}

impl Paintable for Portal {
    fn paint(&self, painter: &mut Painter<'_>, _canvas_color: Color) {
        painter.clear(Color::BLACK);
    }

    fn is_opaque(&self) -> bool {
        true
    }
}

impl Expandable for Portal {
    fn auto_expand(&mut self, ctx: &mut PanelCtx<'_>) {
        let (_, sub) = ctx
            .create_sub_view_child("sub", ViewFlags::ROOT_SAME_TALLNESS)
            .expect("auto-expansion runs in the update engine");
        sub.lock().create_root("inner", Solid(Color::WHITE));
        *self.sub.lock() = Some(sub);
    }
}

impl Layoutable for Portal {
    fn layout_children(&mut self, ctx: &mut PanelCtx<'_>) {
        if let Some(child) = ctx.child("sub") {
            ctx.layout_child(child, PanelRect::new(0.5, 0.0, 0.5, 0.5), Color::BLACK);
        }
    }
}

fn nested_setup() -> (Scheduler, Context, SharedView, PanelId, SharedView) {
    let (mut sched, ctx, view) = setup(100.0, 100.0);
    let portal = Portal::default();
    let slot = Arc::clone(&portal.sub);
    {
        let mut v = view.lock();
        let root = v.create_root("root", portal);
        v.set_auto_expansion_threshold(root, AutoExpansionThreshold::new(10.0, ViewConditionType::Width));
        v.enable_auto_expansion(root);
    }
    settle(&mut sched);
    let sub = slot.lock().take().expect("portal expanded");
    let child = {
        let v = view.lock();
        v.child(v.root_panel().unwrap(), "sub").unwrap()
    };
    (sched, ctx, view, child, sub)
}

fn paint_view(view: &SharedView, size: u32) -> TestCanvas {
    let mut canvas = TestCanvas::new(size, size);
    {
        let mut painter = Painter::new(&mut canvas);
        view.lock().paint(&mut painter, Color::TRANSPARENT);
    }
    canvas
}

fn assert_same_rect(g: ViewGeometry, r: PanelRect) {
    assert!(
        (g.x - r.x).abs() < 1e-6
            && (g.y - r.y).abs() < 1e-6
            && (g.width - r.width).abs() < 1e-6
            && (g.height - r.height).abs() < 1e-6,
        "nested view at {g:?}, hosting panel at {r:?}"
    );
}

#[test]
fn nested_view_follows_the_hosting_panel() {
    let (mut sched, _ctx, view, child, sub) = nested_setup();
    {
        let v = view.lock();
        assert!(v.is_viewed(child));
        assert_same_rect(sub.lock().geometry(), v.viewed_rect(child));
    }
    assert!((sub.lock().geometry().width - 50.0).abs() < 1e-6);
    let canvas = paint_view(&view, 100);
    assert_eq!(canvas.at(75, 25), Color::WHITE, "nested root not painted");
    assert_eq!(canvas.at(25, 25), Color::BLACK);
    assert_eq!(canvas.at(75, 75), Color::BLACK);

    view.lock().zoom(75.0, 25.0, 2.0);
    settle(&mut sched);
    {
        let v = view.lock();
        let r = v.viewed_rect(child);
        assert!((r.width - 100.0).abs() < 1e-6, "host zoomed to {r:?}");
        assert_same_rect(sub.lock().geometry(), r);
    }
    let canvas = paint_view(&view, 100);
    assert_eq!(canvas.at(50, 50), Color::WHITE);
    assert_eq!(canvas.at(10, 10), Color::BLACK);
    assert_eq!(canvas.at(50, 90), Color::BLACK);
}

#[test]
fn nested_damage_is_repainted_in_the_host() {
    let (mut sched, _ctx, view, child, sub) = nested_setup();
    let _ = view.lock().take_invalid_region();

    sub.lock().invalidate_painting();
    settle(&mut sched);

    let v = view.lock();
    let clip = v.clip_rect(child);
    assert!(v.has_invalid_region(), "nested damage did not reach the host");
    let region = v.invalid.clone();
    for r in region.rects() {
        let r = r.to_rect();
        assert!(
            r.x0 >= clip.x0 - 1.0 && r.y0 >= clip.y0 - 1.0 && r.x1 <= clip.x1 + 1.0 && r.y1 <= clip.y1 + 1.0,
            "damage {r:?} outside the hosting panel {clip:?}"
        );
    }
}

#[test]
fn clicking_a_nested_view_focuses_it() {
    let (mut sched, _ctx, view, child, sub) = nested_setup();
    assert!(!sub.lock().is_focused());

    let mut event = InputEvent::key(InputKey::MouseLeft);
    view.lock().input(&mut event, &InputState::at(75.0, 25.0));
    settle(&mut sched);

    let v = view.lock();
    assert_eq!(v.active_panel(), Some(child));
    assert!(v.is_panel_focused(child));
    assert!(sub.lock().is_focused(), "focus not passed to the nested view");
    assert_eq!(v.title(), sub.lock().title(), "title not taken from the nested view");
}
