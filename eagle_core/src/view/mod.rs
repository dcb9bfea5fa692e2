// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The view: pan and zoom state over a panel tree.
//!
//! A [`View`] owns a panel tree and shows it in a rectangle of pixels. Its
//! state is expressed through a few distinguished panels:
//!
//! - the *supreme viewed panel* (SVP), the top-most panel that is still
//!   computed with: everything on screen is inside it, and its on-screen
//!   size stays below `1e12` pixels so the arithmetic stays exact;
//! - the *visited* panel, which the view keeps stable when geometry or
//!   layout changes;
//! - the *active* panel, the focusable panel receiving keyboard input.
//!
//! Every pan/zoom operation ends in [`View::visit_abs`], which picks the SVP,
//! recomputes the viewed and clip rectangles of every panel on screen, and
//! queues notices. An update engine at [`Priority::High`] delivers the
//! notices and resolves deferred work:
//!
//! ```text
//!   update():
//!     loop:
//!       notice list non-empty    ─► handle_notice(front) for each panel
//!       SVP choice by opacity?   ─► recheck between min and max SVP
//!       SVP choice invalid?      ─► visit_abs(visited panel, same place)
//!       title invalid?           ─► title of the active path, fire signal
//!       cursor invalid?          ─► cursor of the panel under the mouse
//!     until none of the above
//! ```
//!
//! A view is shared as a [`SharedView`]. The mutex is the lock render threads
//! take per tile while painting; engines take it on the scheduler thread.

mod input;
mod paint;
mod panels;
mod sub_view;
mod visit;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use kurbo::{Point, Rect};
use parking_lot::Mutex;

use crate::config::CoreConfig;
use crate::context::Context;
use crate::damage::{DamageRegion, PixelRect};
use crate::model::ModelRef;
use crate::paint::Color;
use crate::panel::tree::PanelTree;
use crate::panel::{Cursor, PanelFlags, PanelId};
use crate::scheduler::{
    Cycle, Engine, EngineCtx, EngineId, INVALID, Priority, Scheduler, SchedulerHandle, SignalId,
};

pub use sub_view::SubViewPanel;

/// A view behind the lock that render threads share.
pub type SharedView = Arc<Mutex<View>>;

/// On-screen size beyond which a panel is not used as the SVP.
pub const MAX_SVP_SIZE: f64 = 1e12;
/// On-screen size up to which the SVP search climbs the tree.
pub const MAX_SVP_SEARCH_SIZE: f64 = 1e14;

bitflags! {
    /// Behavior switches of a [`View`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ViewFlags: u8 {
        /// Always show the whole root panel. Implies no user navigation.
        const NO_ZOOM            = 1 << 0;
        /// Keep the root panel's tallness equal to the view's.
        const ROOT_SAME_TALLNESS = 1 << 1;
        /// First-person navigation: the view center is the hot spot and the
        /// normal cursor is replaced by a crosshair.
        const EGO_MODE           = 1 << 2;
    }
}

/// Position and size of a view in pixels.
///
/// `pixel_tallness` is the height of a pixel divided by its width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewGeometry {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Pixel height divided by pixel width.
    pub pixel_tallness: f64,
}

impl ViewGeometry {
    /// A unit square with square pixels.
    pub const DEFAULT: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
        pixel_tallness: 1.0,
    };

    /// Creates a geometry with square pixels.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            pixel_tallness: 1.0,
        }
    }

    /// The view rectangle.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Tallness of the view in panel units: height over width, in square
    /// units.
    #[must_use]
    pub fn tallness(&self) -> f64 {
        self.height / self.width * self.pixel_tallness
    }
}

impl Default for ViewGeometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Signals fired by a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewSignals {
    /// The title changed.
    pub title: SignalId,
    /// The view gained or lost keyboard focus.
    pub focus: SignalId,
    /// The view geometry changed.
    pub geometry: SignalId,
    /// The active panel changed, so a control panel may need replacing.
    pub control_panel: SignalId,
    /// The view flags changed.
    pub view_flags: SignalId,
    /// The damage region went from empty to non-empty.
    pub repaint: SignalId,
}

impl ViewSignals {
    fn create(sched: &mut Scheduler) -> Self {
        Self {
            title: sched.create_signal(),
            focus: sched.create_signal(),
            geometry: sched.create_signal(),
            control_panel: sched.create_signal(),
            view_flags: sched.create_signal(),
            repaint: sched.create_signal(),
        }
    }

    fn release(&self, handle: &SchedulerHandle) {
        for s in [
            self.title,
            self.focus,
            self.geometry,
            self.control_panel,
            self.view_flags,
            self.repaint,
        ] {
            handle.release_signal(s);
        }
    }
}

/// Pan and zoom state over a panel tree. See the [module docs](self).
pub struct View {
    // -- Panels --
    pub(crate) tree: PanelTree,
    pub(crate) root: u32,
    pub(crate) svp: u32,
    pub(crate) min_svp: u32,
    pub(crate) max_svp: u32,
    pub(crate) visited: u32,
    pub(crate) active: u32,
    pub(crate) activation_candidate: u32,
    pub(crate) seek_pos: u32,
    pub(crate) seek_child_name: String,
    pub(crate) notice_list: VecDeque<PanelId>,
    pub(crate) creation_counter: u64,

    // -- Geometry --
    pub(crate) geometry: ViewGeometry,
    pub(crate) last_mouse: Point,

    // -- State --
    pub(crate) flags: ViewFlags,
    pub(crate) background: Color,
    pub(crate) title: String,
    pub(crate) cursor: Cursor,
    pub(crate) focused: bool,
    pub(crate) visit_adherent: bool,
    pub(crate) title_invalid: bool,
    pub(crate) cursor_invalid: bool,
    pub(crate) svp_choice_invalid: bool,
    pub(crate) svp_choice_by_opacity_invalid: bool,
    pub(crate) restart_input_recursion: bool,
    pub(crate) zoomed_out_before_sg: bool,
    pub(crate) setting_geometry: u32,
    pub(crate) svp_update_count: u32,
    pub(crate) svp_update_slice: u64,
    pub(crate) invalid: DamageRegion,

    // -- Scheduling --
    pub(crate) context: Context,
    pub(crate) core_config: ModelRef<CoreConfig>,
    pub(crate) handle: SchedulerHandle,
    pub(crate) update_engine: EngineId,
    pub(crate) activation_engine: EngineId,
    pub(crate) signals: ViewSignals,
    pub(crate) this: Weak<Mutex<View>>,
}

struct UpdateEngine {
    view: Weak<Mutex<View>>,
}

impl Engine for UpdateEngine {
    fn cycle(&mut self, ctx: &mut EngineCtx<'_>) -> Cycle {
        if let Some(view) = self.view.upgrade() {
            view.lock().update_with(Some(ctx.scheduler()));
        }
        Cycle::Idle
    }
}

struct ActivationEngine {
    view: Weak<Mutex<View>>,
}

impl Engine for ActivationEngine {
    fn cycle(&mut self, _ctx: &mut EngineCtx<'_>) -> Cycle {
        if let Some(view) = self.view.upgrade() {
            let mut view = view.lock();
            if let Some(candidate) = view.activation_candidate() {
                view.visit_lazy(candidate, true);
            }
        }
        Cycle::Idle
    }
}

impl View {
    /// Creates an empty view in a child context of `parent_context`.
    ///
    /// The view starts with the default geometry, a grey background and no
    /// panels.
    pub fn new(sched: &mut Scheduler, parent_context: &Context, flags: ViewFlags) -> SharedView {
        let context = Context::new_child(parent_context);
        let core_config = CoreConfig::acquire(context.root(), sched);
        let signals = ViewSignals::create(sched);
        let view = Arc::new_cyclic(|weak: &Weak<Mutex<Self>>| {
            let update_engine = sched.create_engine(UpdateEngine { view: weak.clone() }, Priority::High);
            let activation_engine = sched.create_engine(
                ActivationEngine { view: weak.clone() },
                Priority::VeryLow,
            );
            Mutex::new(Self {
                tree: PanelTree::default(),
                root: INVALID,
                svp: INVALID,
                min_svp: INVALID,
                max_svp: INVALID,
                visited: INVALID,
                active: INVALID,
                activation_candidate: INVALID,
                seek_pos: INVALID,
                seek_child_name: String::new(),
                notice_list: VecDeque::new(),
                creation_counter: 0,
                geometry: ViewGeometry::DEFAULT,
                last_mouse: Point::ZERO,
                flags: ViewFlags::empty(),
                background: Color::GREY,
                title: String::new(),
                cursor: Cursor::Normal,
                focused: false,
                visit_adherent: false,
                title_invalid: false,
                cursor_invalid: false,
                svp_choice_invalid: false,
                svp_choice_by_opacity_invalid: false,
                restart_input_recursion: false,
                zoomed_out_before_sg: true,
                setting_geometry: 0,
                svp_update_count: 0,
                svp_update_slice: 0,
                invalid: DamageRegion::new(),
                context,
                core_config,
                handle: sched.handle(),
                update_engine,
                activation_engine,
                signals,
                this: weak.clone(),
            })
        });
        {
            let mut v = view.lock();
            v.wake_update();
            v.set_view_flags(flags);
        }
        view
    }

    // -- Accessors --

    /// The view's own context, a child of the context it was created in.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The core configuration the view reads its memory budget from.
    #[must_use]
    pub fn core_config(&self) -> &ModelRef<CoreConfig> {
        &self.core_config
    }

    /// The signals this view fires.
    #[must_use]
    pub fn signals(&self) -> ViewSignals {
        self.signals
    }

    /// The update engine.
    #[must_use]
    pub fn update_engine(&self) -> EngineId {
        self.update_engine
    }

    /// The view flags.
    #[must_use]
    pub fn view_flags(&self) -> ViewFlags {
        self.flags
    }

    /// Changes the view flags.
    ///
    /// [`ViewFlags::NO_ZOOM`] excludes [`ViewFlags::EGO_MODE`].
    pub fn set_view_flags(&mut self, mut flags: ViewFlags) {
        if flags.contains(ViewFlags::NO_ZOOM) {
            flags.remove(ViewFlags::EGO_MODE);
        }
        if self.flags == flags {
            return;
        }
        let old = self.flags;
        self.flags = flags;
        if flags.contains(ViewFlags::ROOT_SAME_TALLNESS)
            && !old.contains(ViewFlags::ROOT_SAME_TALLNESS)
            && let Some(root) = self.root_panel()
        {
            let tallness = self.geometry.tallness();
            self.layout(
                root,
                crate::panel::PanelRect::new(0.0, 0.0, 1.0, tallness),
                self.tree.canvas_color[self.root as usize],
            );
        }
        if flags.contains(ViewFlags::NO_ZOOM) && !old.contains(ViewFlags::NO_ZOOM) {
            self.zoom_out();
        }
        if flags.contains(ViewFlags::EGO_MODE) != old.contains(ViewFlags::EGO_MODE) {
            self.cursor_invalid = true;
        }
        self.svp_choice_invalid = true;
        self.handle.signal(self.signals.view_flags);
        self.wake_update();
    }

    /// The view geometry.
    #[must_use]
    pub fn geometry(&self) -> ViewGeometry {
        self.geometry
    }

    /// Tallness of the view rectangle.
    #[must_use]
    pub fn home_tallness(&self) -> f64 {
        self.geometry.tallness()
    }

    /// Background color, shown where no panel paints.
    #[must_use]
    pub fn background_color(&self) -> Color {
        self.background
    }

    /// Sets the background color.
    pub fn set_background_color(&mut self, color: Color) {
        if self.background != color {
            self.background = color;
            self.invalidate_painting();
        }
    }

    /// Title of the active panel, as of the last update.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Cursor over the panel under the mouse, as of the last update.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Whether the view has keyboard focus.
    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Whether the current visit was set deliberately by the user.
    #[must_use]
    pub fn is_visit_adherent(&self) -> bool {
        self.visit_adherent
    }

    /// The root panel.
    #[must_use]
    pub fn root_panel(&self) -> Option<PanelId> {
        self.tree.opt_id(self.root)
    }

    /// The supreme viewed panel.
    #[must_use]
    pub fn supreme_viewed_panel(&self) -> Option<PanelId> {
        self.tree.opt_id(self.svp)
    }

    /// The active panel.
    #[must_use]
    pub fn active_panel(&self) -> Option<PanelId> {
        self.tree.opt_id(self.active)
    }

    /// The panel waiting to be activated by the activation engine.
    #[must_use]
    pub fn activation_candidate(&self) -> Option<PanelId> {
        self.tree.opt_id(self.activation_candidate)
    }

    /// Asks the view to activate `panel` at low priority, or cancels the
    /// request.
    pub fn set_activation_candidate(&mut self, panel: Option<PanelId>) {
        let idx = panel.map_or(INVALID, |p| self.tree.slot(p));
        if self.activation_candidate == idx {
            return;
        }
        self.activation_candidate = idx;
        self.handle.wake_up(self.activation_engine);
    }

    /// The visited panel and the view position relative to it: the offset of
    /// the view center from the panel center in panel sizes, the view area
    /// over the panel area, and visit adherence.
    #[must_use]
    pub fn visited_panel(&self) -> Option<VisitedPanel> {
        if self.visited == INVALID {
            return None;
        }
        let v = self.tree.viewed[self.visited as usize];
        let g = &self.geometry;
        Some(VisitedPanel {
            panel: self.tree.id(self.visited),
            rel_x: (g.x + g.width * 0.5 - v.x) / v.width - 0.5,
            rel_y: (g.y + g.height * 0.5 - v.y) / v.height - 0.5,
            rel_a: (g.width * g.height) / (v.width * v.height),
            adherent: self.visit_adherent,
        })
    }

    // -- Geometry and focus --

    /// Moves or resizes the view. The visited panel keeps its relative
    /// position; a zoomed-out view stays zoomed out.
    ///
    /// Sizes and pixel tallness are clamped to at least 0.0001.
    pub fn set_geometry(&mut self, geometry: ViewGeometry) {
        let g = ViewGeometry {
            width: geometry.width.max(0.0001),
            height: geometry.height.max(0.0001),
            pixel_tallness: geometry.pixel_tallness.max(0.0001),
            ..geometry
        };
        if self.geometry == g {
            return;
        }
        self.zoomed_out_before_sg = self.is_zoomed_out();
        self.setting_geometry += 1;
        let visited = self.visited_panel();
        self.geometry = g;
        self.handle.signal(self.signals.geometry);
        if self.flags.contains(ViewFlags::ROOT_SAME_TALLNESS)
            && let Some(root) = self.root_panel()
        {
            let color = self.tree.canvas_color[self.root as usize];
            self.layout(root, crate::panel::PanelRect::new(0.0, 0.0, 1.0, g.tallness()), color);
        }
        if self.zoomed_out_before_sg {
            if self.root != INVALID {
                let ra = self.zoomed_out_rel_a();
                self.visit_rel_by_slot(self.root, 0.0, 0.0, ra, true);
            }
        } else if let Some(v) = visited {
            self.visit_rel_slot(v.panel.idx, v.rel_x, v.rel_y, v.rel_a, v.adherent, true);
        }
        self.setting_geometry -= 1;
        tracing::trace!(?g, "view geometry set");
    }

    /// Sets whether the view has keyboard focus. Every panel gets
    /// [`VIEW_FOCUS_CHANGED`](crate::panel::NoticeFlags::VIEW_FOCUS_CHANGED);
    /// the active path also gets
    /// [`FOCUS_CHANGED`](crate::panel::NoticeFlags::FOCUS_CHANGED).
    pub fn set_focused(&mut self, focused: bool) {
        use crate::panel::NoticeFlags as NF;
        if self.focused == focused {
            return;
        }
        self.focused = focused;
        self.handle.signal(self.signals.focus);
        let mut p = self.root;
        while p != INVALID {
            let mut flags = NF::VIEW_FOCUS_CHANGED | NF::UPDATE_PRIORITY_CHANGED;
            if self.tree.has(p, PanelFlags::IN_ACTIVE_PATH) {
                flags |= NF::FOCUS_CHANGED;
            }
            self.add_pending_notice(p, flags);
            p = self.tree.next_in_subtree(p, self.root);
        }
    }

    // -- Seeking --

    /// Marks `panel` as the place the view is heading to, looking for its
    /// child `child_name`. Auto-expansion expands such a panel regardless of
    /// its size. `None` clears the mark.
    pub fn set_seek_pos(&mut self, panel: Option<PanelId>, child_name: &str) {
        use crate::panel::NoticeFlags as NF;
        let idx = panel.map_or(INVALID, |p| self.tree.slot(p));
        let child_name = if idx == INVALID { "" } else { child_name };
        if self.seek_pos != idx {
            if self.seek_pos != INVALID {
                self.add_pending_notice(
                    self.seek_pos,
                    NF::SOUGHT_NAME_CHANGED | NF::MEMORY_LIMIT_CHANGED,
                );
            }
            self.seek_pos = idx;
            child_name.clone_into(&mut self.seek_child_name);
            if idx != INVALID {
                self.add_pending_notice(idx, NF::SOUGHT_NAME_CHANGED | NF::MEMORY_LIMIT_CHANGED);
            }
        } else if idx != INVALID && self.seek_child_name != child_name {
            child_name.clone_into(&mut self.seek_child_name);
            self.add_pending_notice(idx, NF::SOUGHT_NAME_CHANGED);
        }
    }

    /// The child name sought inside `panel`, if the view is seeking there.
    #[must_use]
    pub fn sought_name(&self, panel: PanelId) -> Option<&str> {
        let idx = self.tree.slot(panel);
        (self.seek_pos == idx).then_some(self.seek_child_name.as_str())
    }

    // -- Painting invalidation --

    /// Marks the whole view for repainting.
    pub fn invalidate_painting(&mut self) {
        let r = self.geometry.rect();
        self.invalidate_painting_rect(r);
    }

    /// Marks a rectangle of view pixels for repainting.
    pub fn invalidate_painting_rect(&mut self, rect: Rect) {
        let bounds = PixelRect::covering(self.geometry.rect());
        let r = PixelRect::covering(rect).intersect(&bounds);
        if r.is_empty() {
            return;
        }
        let was_empty = self.invalid.is_empty();
        self.invalid.add(r);
        if was_empty {
            self.handle.signal(self.signals.repaint);
        }
    }

    /// Whether anything needs repainting.
    #[must_use]
    pub fn has_invalid_region(&self) -> bool {
        !self.invalid.is_empty()
    }

    /// Takes the region that needs repainting.
    pub fn take_invalid_region(&mut self) -> DamageRegion {
        self.invalid.take()
    }

    // -- Update engine --

    pub(crate) fn wake_update(&self) {
        self.handle.wake_up(self.update_engine);
    }

    /// Runs everything the update engine does, until nothing is left.
    ///
    /// Normally driven by the scheduler; exposed for hosts that step a view
    /// by hand. Panel callbacks see no scheduler then.
    pub fn update(&mut self) {
        self.update_with(None);
    }

    pub(crate) fn update_with(&mut self, mut sched: Option<&mut Scheduler>) {
        loop {
            if let Some(id) = self.notice_list.pop_front() {
                if self.tree.is_alive(id) && self.tree.has(id.idx, PanelFlags::IN_NOTICE_LIST) {
                    self.tree.set(id.idx, PanelFlags::IN_NOTICE_LIST, false);
                    self.handle_notice(id, sched.as_deref_mut());
                }
            } else if self.svp_choice_by_opacity_invalid {
                self.svp_choice_by_opacity_invalid = false;
                if !self.svp_choice_invalid && self.min_svp != self.max_svp {
                    let mut p = self.min_svp;
                    while p != self.max_svp && !self.is_slot_opaque(p) {
                        p = self.tree.parent[p as usize];
                    }
                    if self.svp != p {
                        tracing::debug!("SVP choice invalid by opacity");
                        self.svp_choice_invalid = true;
                    }
                }
            } else if self.svp_choice_invalid {
                self.svp_choice_invalid = false;
                if self.visited != INVALID {
                    let v = self.tree.viewed[self.visited as usize];
                    self.visit_abs_slot(self.visited, v.x, v.y, v.width, self.visit_adherent, false);
                }
            } else if self.title_invalid {
                self.title_invalid = false;
                let title = if self.active == INVALID {
                    String::new()
                } else {
                    self.slot_title(self.active)
                };
                if self.title != title {
                    self.title = title;
                    self.handle.signal(self.signals.title);
                }
            } else if self.cursor_invalid {
                self.cursor_invalid = false;
                let mut cursor = self
                    .panel_at(self.last_mouse.x, self.last_mouse.y)
                    .map_or(Cursor::Normal, |p| self.slot_cursor(p.idx));
                if self.flags.contains(ViewFlags::EGO_MODE) && cursor == Cursor::Normal {
                    cursor = Cursor::Crosshair;
                }
                self.cursor = cursor;
            } else {
                break;
            }
        }
    }

    /// The canvas color is opaque or the panel paints opaquely.
    pub(crate) fn is_slot_opaque(&self, idx: u32) -> bool {
        self.tree.canvas_color[idx as usize].is_opaque()
            || self.tree.behavior[idx as usize]
                .as_deref()
                .and_then(|b| b.as_paintable())
                .is_some_and(|p| p.is_opaque())
    }

    fn slot_title(&self, mut idx: u32) -> String {
        while idx != INVALID {
            if let Some(title) = self.tree.behavior[idx as usize]
                .as_deref()
                .and_then(|b| b.title())
            {
                return title;
            }
            idx = self.tree.parent[idx as usize];
        }
        "untitled".to_owned()
    }

    fn slot_cursor(&self, mut idx: u32) -> Cursor {
        while idx != INVALID {
            if let Some(cursor) = self.tree.behavior[idx as usize]
                .as_deref()
                .and_then(|b| b.cursor())
            {
                return cursor;
            }
            idx = self.tree.parent[idx as usize];
        }
        Cursor::Normal
    }
}

/// The visited panel with the view position relative to it.
///
/// Returned by [`View::visited_panel`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisitedPanel {
    /// The visited panel.
    pub panel: PanelId,
    /// Horizontal offset of the view center from the panel center, in panel
    /// widths.
    pub rel_x: f64,
    /// Vertical offset of the view center from the panel center, in panel
    /// heights.
    pub rel_y: f64,
    /// View area divided by panel area.
    pub rel_a: f64,
    /// Whether the visit is adherent.
    pub adherent: bool,
}

impl Drop for View {
    fn drop(&mut self) {
        if self.root != INVALID {
            self.delete_slot(self.root);
        }
        self.handle.release_engine(self.update_engine);
        self.handle.release_engine(self.activation_engine);
        self.signals.release(&self.handle);
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("panels", &self.tree.count)
            .field("geometry", &self.geometry)
            .field("svp", &self.supreme_viewed_panel())
            .field("visited", &self.tree.opt_id(self.visited))
            .field("active", &self.active_panel())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests;
