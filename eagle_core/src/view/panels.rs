// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Panel operations that go through the view: creation, deletion, layout,
//! ordering, notices and auto-expansion.

use core::cmp::Ordering;

use kurbo::Rect;

use super::{View, ViewFlags};
use crate::paint::Color;
use crate::panel::tree::UNPLACED_LAYOUT;
use crate::panel::{
    AutoExpansionThreshold, Children, NoticeFlags as NF, PanelBehavior, PanelCtx, PanelFlags as PF,
    PanelId, PanelRect, ViewConditionType, decode_identity,
};
use crate::scheduler::{INVALID, Scheduler};

/// Notices a panel gets when its viewing state is recomputed.
pub(crate) const VIEWING_NOTICES: NF = NF::VIEWING_CHANGED
    .union(NF::UPDATE_PRIORITY_CHANGED)
    .union(NF::MEMORY_LIMIT_CHANGED);

impl View {
    // -- Construction and deletion --

    /// Creates the root panel, filling the view.
    ///
    /// # Panics
    ///
    /// Panics if the view has a root panel already.
    pub fn create_root(&mut self, name: &str, behavior: impl PanelBehavior + 'static) -> PanelId {
        assert!(
            self.root == INVALID,
            "root panel created for a view which has a root panel already"
        );
        self.creation_counter += 1;
        let idx = self.tree.alloc(name, Box::new(behavior), self.creation_counter);
        let i = idx as usize;
        let g = self.geometry;
        self.tree.layout[i] = PanelRect::new(0.0, 0.0, 1.0, g.tallness());
        self.tree.viewed[i] = PanelRect::new(g.x, g.y, g.width, g.height);
        self.tree.clip[i] = g.rect();
        self.tree.flags[i] = PF::VIEWED
            | PF::IN_VIEWED_PATH
            | PF::ENABLE_SWITCH
            | PF::ENABLED
            | PF::FOCUSABLE
            | PF::VISITED
            | PF::IN_VISITED_PATH
            | PF::ACTIVE
            | PF::IN_ACTIVE_PATH;
        self.root = idx;
        self.svp = idx;
        self.min_svp = idx;
        self.max_svp = idx;
        self.visited = idx;
        self.active = idx;
        self.invalidate_slot_painting(idx);
        self.add_pending_notice(idx, NF::all());
        self.title_invalid = true;
        self.cursor_invalid = true;
        self.wake_update();
        tracing::debug!(name, "root panel created");
        self.tree.id(idx)
    }

    /// Creates a panel as the last child of `parent`.
    ///
    /// The child starts far outside its parent, so it is not viewed until it
    /// is laid out. It inherits the enabled state, and it is marked as
    /// created by auto-expansion when the parent is expanding.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale or has a child named `name` already.
    pub fn create_panel(
        &mut self,
        parent: PanelId,
        name: &str,
        behavior: Box<dyn PanelBehavior>,
    ) -> PanelId {
        let p = self.tree.slot(parent);
        self.creation_counter += 1;
        let idx = self.tree.alloc(name, behavior, self.creation_counter);
        self.tree.link_last(p, idx);
        let mut flags = PF::ENABLE_SWITCH | PF::FOCUSABLE;
        flags.set(PF::ENABLED, self.tree.has(p, PF::ENABLED));
        flags.set(PF::CREATED_BY_AE, self.tree.has(p, PF::AE_CALLING));
        self.tree.flags[idx as usize] = flags;
        self.add_pending_notice(p, NF::CHILD_LIST_CHANGED);
        self.add_pending_notice(idx, NF::all());
        self.tree.id(idx)
    }

    /// Deletes a panel and its subtree.
    ///
    /// If the panel was in the visited path, the visit moves to the parent.
    pub fn delete_panel(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        self.delete_slot(idx);
    }

    /// Deletes every child of `panel`, last to first.
    pub fn delete_all_children(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        self.delete_children_of(idx);
    }

    fn delete_children_of(&mut self, idx: u32) {
        loop {
            let c = self.tree.last_child[idx as usize];
            if c == INVALID {
                break;
            }
            self.delete_slot(c);
        }
    }

    pub(crate) fn delete_slot(&mut self, idx: u32) {
        self.invalidate_slot_painting(idx);
        if self.seek_pos == idx {
            self.set_seek_pos(None, "");
        }
        self.delete_children_of(idx);
        let parent = self.tree.parent[idx as usize];
        if parent == INVALID {
            self.root = INVALID;
            self.svp = INVALID;
            self.min_svp = INVALID;
            self.max_svp = INVALID;
            self.visited = INVALID;
            self.active = INVALID;
            self.visit_adherent = false;
            self.title_invalid = true;
            self.cursor_invalid = true;
            self.wake_update();
        } else {
            if self.tree.has(idx, PF::IN_VISITED_PATH) {
                self.tree.set(idx, PF::FOCUSABLE, true);
                if self.tree.has(parent, PF::VIEWED) {
                    self.visit_immobile_slot(parent, false);
                } else {
                    let i = idx as usize;
                    self.tree.layout[i] = UNPLACED_LAYOUT;
                    self.tree.canvas_color[i] = Color::TRANSPARENT;
                    let adherent = !self.tree.has(idx, PF::IN_ACTIVE_PATH) && self.visit_adherent;
                    self.visit_rel_slot(parent, 0.0, 0.0, 0.0, adherent, false);
                }
                assert!(
                    !self.tree.has(idx, PF::IN_VISITED_PATH),
                    "could not get rid of the visit of a deleted panel"
                );
            }
            self.restart_input_recursion = true;
            if self.tree.has(idx, PF::IN_VIEWED_PATH) {
                self.svp_choice_invalid = true;
                self.title_invalid = true;
                self.cursor_invalid = true;
                self.wake_update();
            }
            self.tree.unlink(idx);
            self.add_pending_notice(parent, NF::CHILD_LIST_CHANGED);
        }
        if self.activation_candidate == idx {
            self.activation_candidate = INVALID;
        }
        drop(self.tree.free(idx));
    }

    // -- Behavior callbacks --

    /// Lends the behavior of a panel to `f` together with a context for the
    /// panel. Returns `None` if the behavior is already lent out.
    ///
    /// The behavior is put back only if the panel survived the call.
    pub(crate) fn with_behavior<R>(
        &mut self,
        idx: u32,
        sched: Option<&mut Scheduler>,
        f: impl FnOnce(&mut dyn PanelBehavior, &mut PanelCtx<'_>) -> R,
    ) -> Option<R> {
        let mut behavior = self.tree.behavior[idx as usize].take()?;
        let id = self.tree.id(idx);
        let result = {
            let mut ctx = PanelCtx {
                view: self,
                id,
                sched,
            };
            f(behavior.as_mut(), &mut ctx)
        };
        if self.tree.is_alive(id) {
            self.tree.behavior[idx as usize] = Some(behavior);
        }
        Some(result)
    }

    // -- Notices --

    pub(crate) fn add_to_notice_list(&mut self, idx: u32) {
        if self.tree.has(idx, PF::IN_NOTICE_LIST) {
            return;
        }
        self.tree.set(idx, PF::IN_NOTICE_LIST, true);
        self.notice_list.push_back(self.tree.id(idx));
        self.wake_update();
    }

    pub(crate) fn add_pending_notice(&mut self, idx: u32, flags: NF) {
        self.tree.pending_notice[idx as usize] |= flags;
        self.add_to_notice_list(idx);
    }

    /// Runs one notice round for a panel.
    ///
    /// Pending flags go out first and end the round, since the callback may
    /// delete the panel. Later rounds settle the auto-expansion decision and
    /// then the children layout.
    pub(crate) fn handle_notice(&mut self, id: PanelId, mut sched: Option<&mut Scheduler>) {
        let idx = id.idx;
        let flags = self.tree.pending_notice[idx as usize];
        if !flags.is_empty() {
            if self.tree.has(idx, PF::AE_ENABLED) {
                if flags.intersects(NF::SOUGHT_NAME_CHANGED | NF::VIEWING_CHANGED) {
                    self.tree.set(idx, PF::AE_DECISION_INVALID, true);
                }
                if self.tree.has(idx, PF::AE_DECISION_INVALID) {
                    self.add_to_notice_list(idx);
                }
            }
            if flags.intersects(NF::LAYOUT_CHANGED | NF::CHILD_LIST_CHANGED)
                && self.tree.first_child[idx as usize] != INVALID
            {
                self.tree.set(idx, PF::CHILDREN_LAYOUT_INVALID, true);
            }
            if self.tree.has(idx, PF::CHILDREN_LAYOUT_INVALID) {
                self.add_to_notice_list(idx);
            }
            self.tree.pending_notice[idx as usize] = NF::empty();
            self.with_behavior(idx, sched, |b, ctx| b.notice(ctx, flags));
            return;
        }

        if self.tree.has(idx, PF::AE_DECISION_INVALID) {
            self.tree.set(idx, PF::AE_DECISION_INVALID, false);
            if self.tree.has(idx, PF::AE_ENABLED) {
                let threshold = self.tree.ae_threshold[idx as usize];
                let wanted = self.seek_pos == idx
                    || self.slot_view_condition(idx, threshold.kind) >= threshold.value;
                if wanted {
                    if !self.tree.has(idx, PF::AE_EXPANDED) {
                        self.tree.set(idx, PF::AE_EXPANDED, true);
                        self.tree.set(idx, PF::AE_CALLING, true);
                        self.with_behavior(idx, sched.as_deref_mut(), |b, ctx| {
                            if let Some(e) = b.as_expandable() {
                                e.auto_expand(ctx);
                            }
                        });
                        if !self.tree.is_alive(id) {
                            return;
                        }
                        self.tree.set(idx, PF::AE_CALLING, false);
                        tracing::trace!(panel = %self.tree.identity(idx), "auto-expanded");
                        if !self.tree.pending_notice[idx as usize].is_empty() {
                            return;
                        }
                    }
                } else if self.tree.has(idx, PF::AE_EXPANDED) {
                    self.tree.set(idx, PF::AE_EXPANDED, false);
                    self.auto_shrink_slot(idx, sched.as_deref_mut());
                    if !self.tree.is_alive(id) {
                        return;
                    }
                    tracing::trace!(panel = %self.tree.identity(idx), "auto-shrunk");
                    if !self.tree.pending_notice[idx as usize].is_empty() {
                        return;
                    }
                }
            }
        }

        if self.tree.has(idx, PF::CHILDREN_LAYOUT_INVALID) {
            if self.tree.first_child[idx as usize] != INVALID {
                self.with_behavior(idx, sched, |b, ctx| {
                    if let Some(l) = b.as_layoutable() {
                        l.layout_children(ctx);
                    }
                });
                if !self.tree.is_alive(id) {
                    return;
                }
            }
            self.tree.set(idx, PF::CHILDREN_LAYOUT_INVALID, false);
        }
    }

    /// Calls the shrink hook, then deletes every child created while
    /// expanding, last to first.
    fn auto_shrink_slot(&mut self, idx: u32, sched: Option<&mut Scheduler>) {
        let id = self.tree.id(idx);
        self.with_behavior(idx, sched, |b, ctx| {
            if let Some(e) = b.as_expandable() {
                e.auto_shrink(ctx);
            }
        });
        if !self.tree.is_alive(id) {
            return;
        }
        let mut c = self.tree.last_child[idx as usize];
        while c != INVALID {
            let prev = self.tree.prev[c as usize];
            if self.tree.has(c, PF::CREATED_BY_AE) {
                self.delete_slot(c);
            }
            c = prev;
        }
    }

    // -- Viewing --

    /// Recomputes the viewed and clip rectangles of the children of a panel,
    /// recursing into every child whose viewing changed.
    pub(crate) fn update_children_viewing(&mut self, idx: u32) {
        let i = idx as usize;
        if !self.tree.has(idx, PF::VIEWED) {
            assert!(
                !self.tree.has(idx, PF::IN_VIEWED_PATH),
                "children viewing updated below a panel in the viewed path"
            );
            let mut c = self.tree.first_child[i];
            while c != INVALID {
                if self.tree.has(c, PF::IN_VIEWED_PATH) {
                    self.tree.set(c, PF::VIEWED | PF::IN_VIEWED_PATH, false);
                    self.add_pending_notice(c, VIEWING_NOTICES);
                    if self.tree.first_child[c as usize] != INVALID {
                        self.update_children_viewing(c);
                    }
                }
                c = self.tree.next[c as usize];
            }
            return;
        }
        let v = self.tree.viewed[i];
        let clip = self.tree.clip[i];
        let pt = self.geometry.pixel_tallness;
        let mut c = self.tree.first_child[i];
        while c != INVALID {
            let was = self.tree.has(c, PF::IN_VIEWED_PATH);
            let shown = self.place_viewed(c, v, clip, pt);
            if shown || was {
                self.tree.set(c, PF::VIEWED | PF::IN_VIEWED_PATH, shown);
                self.add_pending_notice(c, VIEWING_NOTICES);
                if self.tree.first_child[c as usize] != INVALID {
                    self.update_children_viewing(c);
                }
            }
            c = self.tree.next[c as usize];
        }
    }

    /// Derives the viewed and clip rectangles of a panel from its parent's.
    /// Returns whether the clip rectangle is non-empty.
    fn place_viewed(&mut self, idx: u32, parent_viewed: PanelRect, parent_clip: Rect, pt: f64) -> bool {
        let i = idx as usize;
        let l = self.tree.layout[i];
        let x1 = parent_viewed.x + l.x * parent_viewed.width;
        let w = l.width * parent_viewed.width;
        let y1 = parent_viewed.y + l.y * (parent_viewed.width / pt);
        let h = l.height * (parent_viewed.width / pt);
        self.tree.viewed[i] = PanelRect::new(x1, y1, w, h);
        let clip = Rect::new(
            x1.max(parent_clip.x0),
            y1.max(parent_clip.y0),
            (x1 + w).min(parent_clip.x1),
            (y1 + h).min(parent_clip.y1),
        );
        self.tree.clip[i] = clip;
        clip.x0 < clip.x1 && clip.y0 < clip.y1
    }

    // -- Layout --

    /// Sets the layout rectangle of a panel, in its parent's coordinates,
    /// and the color its parent paints behind it.
    ///
    /// The root is normalized to width 1; with
    /// [`ViewFlags::ROOT_SAME_TALLNESS`] its height follows the view.
    /// Width and height are clamped to at least `1e-100`.
    pub fn layout(&mut self, panel: PanelId, rect: PanelRect, canvas_color: Color) {
        let idx = self.tree.slot(panel);
        let i = idx as usize;
        let mut r = PanelRect::new(rect.x, rect.y, rect.width.max(1e-100), rect.height.max(1e-100));
        let parent = self.tree.parent[i];
        if parent == INVALID {
            let h = if self.flags.contains(ViewFlags::ROOT_SAME_TALLNESS) {
                self.geometry.tallness()
            } else {
                r.height / r.width
            };
            r = PanelRect::new(0.0, 0.0, 1.0, h);
        }

        if self.tree.layout[i] == r {
            if self.tree.canvas_color[i] != canvas_color {
                self.tree.canvas_color[i] = canvas_color;
                self.add_pending_notice(idx, NF::LAYOUT_CHANGED);
                self.invalidate_slot_painting(idx);
            }
            return;
        }

        self.add_pending_notice(idx, NF::LAYOUT_CHANGED);
        self.restart_input_recursion = true;
        if parent == INVALID || self.tree.has(parent, PF::IN_VIEWED_PATH) {
            self.invalidate_slot_painting(idx);
            self.svp_choice_invalid = true;
            self.cursor_invalid = true;
            self.wake_update();
        }

        if parent == INVALID {
            let zoomed_out = self.is_zoomed_out();
            let visited = self.visited_panel();
            self.tree.layout[i] = r;
            self.tree.canvas_color[i] = canvas_color;
            if self.setting_geometry == 0 {
                if zoomed_out {
                    let ra = self.zoomed_out_rel_a();
                    self.visit_rel_by_slot(idx, 0.0, 0.0, ra, true);
                } else if let Some(v) = visited {
                    self.visit_rel_slot(v.panel.idx, v.rel_x, v.rel_y, v.rel_a, v.adherent, true);
                }
            }
        } else if self.tree.has(idx, PF::IN_VISITED_PATH)
            && self.setting_geometry == 0
            && !self.is_zoomed_out()
        {
            let visited = self.visited_panel();
            self.tree.layout[i] = r;
            self.tree.canvas_color[i] = canvas_color;
            if let Some(v) = visited {
                self.visit_rel_slot(v.panel.idx, v.rel_x, v.rel_y, v.rel_a, v.adherent, true);
            }
        } else if self.tree.has(parent, PF::VIEWED) {
            self.tree.layout[i] = r;
            self.tree.canvas_color[i] = canvas_color;
            let pv = self.tree.viewed[parent as usize];
            let pc = self.tree.clip[parent as usize];
            let shown = self.place_viewed(idx, pv, pc, self.geometry.pixel_tallness);
            if shown {
                self.tree.set(idx, PF::VIEWED | PF::IN_VIEWED_PATH, true);
                self.add_pending_notice(idx, VIEWING_NOTICES);
                self.invalidate_slot_painting(idx);
                self.update_children_viewing(idx);
            } else if self.tree.has(idx, PF::IN_VIEWED_PATH) {
                self.tree.set(idx, PF::VIEWED | PF::IN_VIEWED_PATH, false);
                self.add_pending_notice(idx, VIEWING_NOTICES);
                self.update_children_viewing(idx);
            }
        } else {
            self.tree.layout[i] = r;
            self.tree.canvas_color[i] = canvas_color;
        }
    }

    /// Asks for [`Layoutable::layout_children`](crate::panel::Layoutable)
    /// to run again.
    pub fn invalidate_children_layout(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        self.tree.set(idx, PF::CHILDREN_LAYOUT_INVALID, true);
        self.add_to_notice_list(idx);
    }

    // -- Ordering --

    /// Moves a panel to the front of its siblings, painted first.
    pub fn be_first(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        let parent = self.tree.parent[idx as usize];
        if parent != INVALID && self.tree.move_before(idx, self.tree.first_child[parent as usize]) {
            self.children_reordered(parent, idx);
        }
    }

    /// Moves a panel to the end of its siblings, painted last.
    pub fn be_last(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        let parent = self.tree.parent[idx as usize];
        if parent != INVALID && self.tree.move_before(idx, INVALID) {
            self.children_reordered(parent, idx);
        }
    }

    /// Moves a panel right before `sister`, or last for `None`.
    pub fn be_prev_of(&mut self, panel: PanelId, sister: Option<PanelId>) {
        let Some(sister) = sister else {
            self.be_last(panel);
            return;
        };
        let idx = self.tree.slot(panel);
        let s = self.tree.slot(sister);
        let parent = self.tree.parent[idx as usize];
        if parent == INVALID || self.tree.parent[s as usize] != parent {
            return;
        }
        if self.tree.move_before(idx, s) {
            self.children_reordered(parent, idx);
        }
    }

    /// Moves a panel right after `sister`, or first for `None`.
    pub fn be_next_of(&mut self, panel: PanelId, sister: Option<PanelId>) {
        let Some(sister) = sister else {
            self.be_first(panel);
            return;
        };
        let idx = self.tree.slot(panel);
        let s = self.tree.slot(sister);
        let parent = self.tree.parent[idx as usize];
        if parent == INVALID || s == idx || self.tree.parent[s as usize] != parent {
            return;
        }
        if self.tree.move_before(idx, self.tree.next[s as usize]) {
            self.children_reordered(parent, idx);
        }
    }

    /// Sorts the children of a panel. The sort is stable.
    pub fn sort_children(
        &mut self,
        panel: PanelId,
        mut compare: impl FnMut(&Self, PanelId, PanelId) -> Ordering,
    ) {
        let idx = self.tree.slot(panel);
        let mut order = self.tree.child_slots(idx);
        order.sort_by(|&a, &b| compare(self, self.tree.id(a), self.tree.id(b)));
        if self.tree.reorder_children(idx, &order) {
            self.add_pending_notice(idx, NF::CHILD_LIST_CHANGED);
            self.restart_input_recursion = true;
            if self.tree.has(idx, PF::IN_VIEWED_PATH) {
                self.invalidate_slot_painting(idx);
                self.svp_choice_invalid = true;
                self.cursor_invalid = true;
                self.wake_update();
            }
        }
    }

    fn children_reordered(&mut self, parent: u32, moved: u32) {
        self.add_pending_notice(parent, NF::CHILD_LIST_CHANGED);
        self.restart_input_recursion = true;
        if self.tree.has(parent, PF::IN_VIEWED_PATH) {
            self.invalidate_slot_painting(moved);
            self.svp_choice_invalid = true;
            self.cursor_invalid = true;
            self.wake_update();
        }
    }

    // -- Enable, focusable and auto-expansion switches --

    /// Switches a panel on or off. A panel is enabled when its switch and
    /// every ancestor's switch are on.
    pub fn set_enable_switch(&mut self, panel: PanelId, on: bool) {
        let top = self.tree.slot(panel);
        if self.tree.has(top, PF::ENABLE_SWITCH) == on {
            return;
        }
        self.tree.set(top, PF::ENABLE_SWITCH, on);
        if on {
            let parent = self.tree.parent[top as usize];
            if parent != INVALID && !self.tree.has(parent, PF::ENABLED) {
                return;
            }
        }
        let mut p = top;
        loop {
            let descend = if on {
                self.tree.has(p, PF::ENABLE_SWITCH)
            } else {
                self.tree.has(p, PF::ENABLED)
            };
            if descend {
                self.tree.set(p, PF::ENABLED, on);
                self.add_pending_notice(p, NF::ENABLE_CHANGED);
                let first = self.tree.first_child[p as usize];
                if first != INVALID {
                    p = first;
                    continue;
                }
            }
            p = self.tree.next_skipping_children(p, top);
            if p == INVALID {
                break;
            }
        }
    }

    /// Whether the panel's own switch is on.
    #[must_use]
    pub fn enable_switch(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::ENABLE_SWITCH)
    }

    /// Whether the panel and all its ancestors are switched on.
    #[must_use]
    pub fn is_enabled(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::ENABLED)
    }

    /// Makes a panel focusable or not. The root is always focusable.
    pub fn set_focusable(&mut self, panel: PanelId, focusable: bool) {
        let idx = self.tree.slot(panel);
        let parent = self.tree.parent[idx as usize];
        if parent == INVALID || self.tree.has(idx, PF::FOCUSABLE) == focusable {
            return;
        }
        self.tree.set(idx, PF::FOCUSABLE, focusable);
        if focusable {
            if self.tree.has(idx, PF::IN_VISITED_PATH) && !self.tree.has(idx, PF::IN_ACTIVE_PATH) {
                self.visit_immobile_slot(self.active, self.visit_adherent);
            }
        } else if self.tree.has(idx, PF::ACTIVE) {
            self.visit_immobile_slot(parent, false);
        }
    }

    /// Whether a panel can be focused.
    #[must_use]
    pub fn is_focusable(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::FOCUSABLE)
    }

    /// Sets the view condition at which a panel auto-expands.
    pub fn set_auto_expansion_threshold(&mut self, panel: PanelId, threshold: AutoExpansionThreshold) {
        let idx = self.tree.slot(panel);
        if self.tree.ae_threshold[idx as usize] == threshold {
            return;
        }
        self.tree.ae_threshold[idx as usize] = threshold;
        self.tree.set(idx, PF::AE_DECISION_INVALID, true);
        self.add_to_notice_list(idx);
    }

    /// The view condition at which a panel auto-expands.
    #[must_use]
    pub fn auto_expansion_threshold(&self, panel: PanelId) -> AutoExpansionThreshold {
        self.tree.ae_threshold[self.tree.slot(panel) as usize]
    }

    /// Turns auto-expansion on for a panel. It cannot be turned off.
    pub fn enable_auto_expansion(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        if self.tree.has(idx, PF::AE_ENABLED) {
            return;
        }
        self.tree.set(idx, PF::AE_ENABLED | PF::AE_DECISION_INVALID, true);
        self.add_to_notice_list(idx);
    }

    /// Shrinks an expanded panel now and lets the view decide again.
    pub fn invalidate_auto_expansion(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        if !self.tree.has(idx, PF::AE_EXPANDED) {
            return;
        }
        self.tree.set(idx, PF::AE_EXPANDED, false);
        self.tree.set(idx, PF::AE_DECISION_INVALID, true);
        self.add_to_notice_list(idx);
        self.auto_shrink_slot(idx, None);
    }

    /// Whether a panel is currently auto-expanded.
    #[must_use]
    pub fn is_auto_expanded(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::AE_EXPANDED)
    }

    /// Whether a panel was created by its parent's auto-expansion.
    #[must_use]
    pub fn is_created_by_auto_expansion(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::CREATED_BY_AE)
    }

    // -- Conditions and budgets --

    /// How large a panel is on screen, measured as `kind`.
    ///
    /// A panel in the viewed path that is not viewed itself (an ancestor of
    /// the supreme viewed panel) is treated as huge.
    #[must_use]
    pub fn view_condition(&self, panel: PanelId, kind: ViewConditionType) -> f64 {
        self.slot_view_condition(self.tree.slot(panel), kind)
    }

    pub(crate) fn slot_view_condition(&self, idx: u32, kind: ViewConditionType) -> f64 {
        if self.tree.has(idx, PF::VIEWED) {
            let v = self.tree.viewed[idx as usize];
            match kind {
                ViewConditionType::Area => v.width * v.height,
                ViewConditionType::Width => v.width,
                ViewConditionType::Height => v.height,
                ViewConditionType::MinExt => v.width.min(v.height),
                ViewConditionType::MaxExt => v.width.max(v.height),
            }
        } else if self.tree.has(idx, PF::IN_VIEWED_PATH) {
            1e100
        } else {
            0.0
        }
    }

    /// How urgently a panel should be updated, from 0.0 to 1.0.
    ///
    /// Visible panels rank by how central their clip rectangle is, below
    /// 0.49; a focused view adds 0.5.
    #[must_use]
    pub fn update_priority(&self, panel: PanelId) -> f64 {
        let idx = self.tree.slot(panel);
        if self.tree.has(idx, PF::VIEWED) {
            let g = &self.geometry;
            let c = self.tree.clip[idx as usize];
            let x1 = (c.x0 - g.x) / g.width - 0.5;
            let x2 = (c.x1 - g.x) / g.width - 0.5;
            let y1 = (c.y0 - g.y) / g.height - 0.5;
            let y2 = (c.y1 - g.y) / g.height - 0.5;
            if x1 < x2 && y1 < y2 {
                const K: f64 = 0.5;
                let fx = ((x1 * x1 * x1 - x2 * x2 * x2) + (x2 - x1) * (K + 0.25)) / K;
                let fy = ((y1 * y1 * y1 - y2 * y2 * y2) + (y2 - y1) * (K + 0.25)) / K;
                let mut pri = fx * fy * 0.49;
                if self.focused {
                    pri += 0.5;
                }
                pri
            } else {
                0.0
            }
        } else if self.tree.has(idx, PF::IN_VIEWED_PATH) {
            if self.focused { 1.0 } else { 0.5 }
        } else {
            0.0
        }
    }

    /// Bytes a panel's subtree may hold, derived from the configured
    /// megabytes per view.
    ///
    /// The share grows with the part of the panel inside the view extended by
    /// half its size. A panel not viewed but in the viewed path, or the
    /// panel being sought, gets the per-panel maximum.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the limit is clamped to a non-negative range before conversion"
    )]
    pub fn memory_limit(&self, panel: PanelId) -> u64 {
        const VIEW_EXTENSION: f64 = 0.5;
        const VIEW_EXTENSION_VALENCE: f64 = 0.5;
        let idx = self.tree.slot(panel);
        if !self.tree.has(idx, PF::IN_VIEWED_PATH) {
            return 0;
        }
        let by_user = f64::from(self.core_config.max_megabytes_per_view()) * 1_000_000.0;
        let max_per_view = by_user * 2.0;
        let max_per_panel = by_user * 0.33;
        if !self.tree.has(idx, PF::VIEWED) || self.seek_pos == idx {
            return max_per_panel as u64;
        }
        let g = &self.geometry;
        let ev = Rect::new(
            g.x - g.width * (VIEW_EXTENSION * 0.5),
            g.y - g.height * (VIEW_EXTENSION * 0.5),
            g.x - g.width * (VIEW_EXTENSION * 0.5) + g.width * (1.0 + VIEW_EXTENSION),
            g.y - g.height * (VIEW_EXTENSION * 0.5) + g.height * (1.0 + VIEW_EXTENSION),
        );
        let v = self.tree.viewed[idx as usize];
        let ec = Rect::new(
            v.x.max(ev.x0),
            v.y.max(ev.y0),
            (v.x + v.width).min(ev.x1),
            (v.y + v.height).min(ev.y1),
        );
        let c = self.tree.clip[idx as usize];
        let fe = (ec.x1 - ec.x0) * (ec.y1 - ec.y0) / (ev.width() * ev.height());
        let fn_ = (c.x1 - c.x0) * (c.y1 - c.y0) / (g.width * g.height);
        let f = (fe * VIEW_EXTENSION_VALENCE + fn_ * (1.0 - VIEW_EXTENSION_VALENCE)) * max_per_view;
        f.clamp(0.0, max_per_panel) as u64
    }

    // -- Invalidation --

    pub(crate) fn invalidate_slot_painting(&mut self, idx: u32) {
        if !self.tree.has(idx, PF::VIEWED) {
            return;
        }
        if !self.svp_choice_by_opacity_invalid {
            self.svp_choice_by_opacity_invalid = true;
            self.wake_update();
        }
        let clip = self.tree.clip[idx as usize];
        self.invalidate_painting_rect(clip);
    }

    /// Repaints the whole of a panel.
    pub fn invalidate_panel_painting(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        self.invalidate_slot_painting(idx);
    }

    /// Repaints a rectangle of a panel, given in the panel's coordinates.
    pub fn invalidate_panel_painting_rect(&mut self, panel: PanelId, rect: Rect) {
        let idx = self.tree.slot(panel);
        if !self.tree.has(idx, PF::VIEWED) {
            return;
        }
        if !self.svp_choice_by_opacity_invalid {
            self.svp_choice_by_opacity_invalid = true;
            self.wake_update();
        }
        let v = self.tree.viewed[idx as usize];
        let sy = v.width / self.geometry.pixel_tallness;
        let r = Rect::new(
            rect.x0 * v.width + v.x,
            rect.y0 * sy + v.y,
            rect.x1 * v.width + v.x,
            rect.y1 * sy + v.y,
        )
        .intersect(self.tree.clip[idx as usize]);
        if r.x0 < r.x1 && r.y0 < r.y1 {
            self.invalidate_painting_rect(r);
        }
    }

    /// Asks the view to fetch the title again, if the panel is in the active
    /// path.
    pub fn invalidate_title(&mut self, panel: PanelId) {
        if self.tree.has(self.tree.slot(panel), PF::IN_ACTIVE_PATH) {
            self.title_invalid = true;
            self.wake_update();
        }
    }

    /// Asks the view to fetch the cursor again, if the panel is in the
    /// viewed path.
    pub fn invalidate_cursor(&mut self, panel: PanelId) {
        if self.tree.has(self.tree.slot(panel), PF::IN_VIEWED_PATH) {
            self.cursor_invalid = true;
            self.wake_update();
        }
    }

    /// Fires the control panel signal, if the panel is in the active path.
    pub fn invalidate_control_panel(&mut self, panel: PanelId) {
        if self.tree.has(self.tree.slot(panel), PF::IN_ACTIVE_PATH) {
            self.handle.signal(self.signals.control_panel);
        }
    }

    // -- Activation --

    /// Makes a panel active without moving the view, if it is on screen;
    /// otherwise visits it.
    pub fn activate(&mut self, panel: PanelId) {
        self.visit_lazy(panel, true);
    }

    /// Gives the view keyboard focus and activates the panel.
    pub fn focus_panel(&mut self, panel: PanelId) {
        self.set_focused(true);
        self.visit_lazy(panel, true);
    }

    // -- Queries --

    /// Whether the handle refers to a live panel of this view.
    #[must_use]
    pub fn contains(&self, panel: PanelId) -> bool {
        self.tree.is_alive(panel)
    }

    /// Number of live panels.
    #[must_use]
    pub fn panel_count(&self) -> usize {
        self.tree.count
    }

    /// The parent of a panel.
    #[must_use]
    pub fn parent(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.parent[self.tree.slot(panel) as usize])
    }

    /// Name of a panel.
    #[must_use]
    pub fn name(&self, panel: PanelId) -> &str {
        &self.tree.name[self.tree.slot(panel) as usize]
    }

    /// Children of a panel, first to last.
    pub fn children(&self, panel: PanelId) -> Children<'_> {
        self.tree.children(self.tree.slot(panel))
    }

    /// The child of a panel with the given name.
    #[must_use]
    pub fn child(&self, panel: PanelId, name: &str) -> Option<PanelId> {
        self.tree.opt_id(self.tree.get_child(self.tree.slot(panel), name))
    }

    /// First child.
    #[must_use]
    pub fn first_child(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.first_child[self.tree.slot(panel) as usize])
    }

    /// Last child.
    #[must_use]
    pub fn last_child(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.last_child[self.tree.slot(panel) as usize])
    }

    /// Previous sibling.
    #[must_use]
    pub fn prev_sibling(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.prev[self.tree.slot(panel) as usize])
    }

    /// Next sibling.
    #[must_use]
    pub fn next_sibling(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.next[self.tree.slot(panel) as usize])
    }

    /// The names from the root down to a panel, encoded as one string.
    #[must_use]
    pub fn identity(&self, panel: PanelId) -> String {
        self.tree.identity(self.tree.slot(panel))
    }

    /// Finds a panel by its identity.
    #[must_use]
    pub fn panel_by_identity(&self, identity: &str) -> Option<PanelId> {
        if self.root == INVALID {
            return None;
        }
        let names = decode_identity(identity);
        let mut names = names.iter();
        if names.next().map(String::as_str) != Some(self.tree.name[self.root as usize].as_str()) {
            return None;
        }
        let mut p = self.root;
        for name in names {
            p = self.tree.get_child(p, name);
            if p == INVALID {
                return None;
            }
        }
        Some(self.tree.id(p))
    }

    /// Focusable ancestor.
    #[must_use]
    pub fn focusable_parent(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.focusable_parent(self.tree.slot(panel)))
    }

    /// First focusable descendant, not looking inside focusable ones.
    #[must_use]
    pub fn focusable_first_child(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.focusable_first_child(self.tree.slot(panel)))
    }

    /// Last focusable descendant, not looking inside focusable ones.
    #[must_use]
    pub fn focusable_last_child(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.focusable_last_child(self.tree.slot(panel)))
    }

    /// Previous focusable panel with the same focusable parent.
    #[must_use]
    pub fn focusable_prev(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.focusable_prev(self.tree.slot(panel)))
    }

    /// Next focusable panel with the same focusable parent.
    #[must_use]
    pub fn focusable_next(&self, panel: PanelId) -> Option<PanelId> {
        self.tree.opt_id(self.tree.focusable_next(self.tree.slot(panel)))
    }

    /// Whether a panel is on screen.
    #[must_use]
    pub fn is_viewed(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::VIEWED)
    }

    /// Whether a panel is viewed or an ancestor of the supreme viewed panel.
    #[must_use]
    pub fn in_viewed_path(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::IN_VIEWED_PATH)
    }

    /// Whether a panel is the visited one.
    #[must_use]
    pub fn is_visited(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::VISITED)
    }

    /// Whether a panel is the visited one or one of its ancestors.
    #[must_use]
    pub fn in_visited_path(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::IN_VISITED_PATH)
    }

    /// Whether a panel is the active one.
    #[must_use]
    pub fn is_active(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::ACTIVE)
    }

    /// Whether a panel is the active one or one of its ancestors.
    #[must_use]
    pub fn in_active_path(&self, panel: PanelId) -> bool {
        self.tree.has(self.tree.slot(panel), PF::IN_ACTIVE_PATH)
    }

    /// Whether a panel is active in a focused view.
    #[must_use]
    pub fn is_panel_focused(&self, panel: PanelId) -> bool {
        self.focused && self.is_active(panel)
    }

    /// Layout rectangle in the parent's coordinates.
    #[must_use]
    pub fn layout_rect(&self, panel: PanelId) -> PanelRect {
        self.tree.layout[self.tree.slot(panel) as usize]
    }

    /// Rectangle on screen, in view pixels. Meaningful only while viewed.
    #[must_use]
    pub fn viewed_rect(&self, panel: PanelId) -> PanelRect {
        self.tree.viewed[self.tree.slot(panel) as usize]
    }

    /// Visible part of the panel, in view pixels. Meaningful only while
    /// viewed.
    #[must_use]
    pub fn clip_rect(&self, panel: PanelId) -> Rect {
        self.tree.clip[self.tree.slot(panel) as usize]
    }

    /// Color the parent paints behind the panel.
    #[must_use]
    pub fn canvas_color(&self, panel: PanelId) -> Color {
        self.tree.canvas_color[self.tree.slot(panel) as usize]
    }

    /// Tallness of a panel in its own coordinates.
    #[must_use]
    pub fn height(&self, panel: PanelId) -> f64 {
        self.tree.height(self.tree.slot(panel))
    }

    /// Creation order number. Later panels have larger numbers.
    #[must_use]
    pub fn creation_number(&self, panel: PanelId) -> u64 {
        self.tree.creation_number[self.tree.slot(panel) as usize]
    }

    /// Whether the panel paints every pixel opaquely or has an opaque canvas
    /// color.
    #[must_use]
    pub fn is_opaque(&self, panel: PanelId) -> bool {
        self.is_slot_opaque(self.tree.slot(panel))
    }
}
