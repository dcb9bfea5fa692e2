// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visiting: every pan and zoom ends in `visit_abs`, which picks the supreme
//! viewed panel and recomputes viewing, then `visit_immobile`, which moves
//! the visited and active panels.

use kurbo::Point;

use super::panels::VIEWING_NOTICES;
use super::{MAX_SVP_SEARCH_SIZE, MAX_SVP_SIZE, View, ViewFlags};
use crate::panel::{NoticeFlags as NF, PanelFlags as PF, PanelId, PanelRect};
use crate::scheduler::INVALID;

/// Margin kept around a visited panel, relative to the view size.
const MIN_REL_DISTANCE: f64 = 0.03;
/// Smallest size a visited panel is shown at, relative to the view
/// circumference.
const MIN_REL_CIRCUMFERENCE: f64 = 0.05;

/// A small perturbation derived from the update count, used to break SVP
/// oscillation: offsets within ±0.01 pixels and a scale within ±1e-10.
fn failsafe_jitter(count: u32) -> (f64, f64, f64) {
    let mut z = u64::from(count).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let unit = |shift: u32| ((z >> shift) & 0xFFFF) as f64 / 65535.0;
    (
        unit(0) * 0.02 - 0.01,
        unit(16) * 0.02 - 0.01,
        0.999_999_999_9 + unit(32) * 0.000_000_000_2,
    )
}

impl View {
    // -- Public visiting --

    /// Visits a panel at the smallest zoom change that shows it whole, with
    /// a small margin. A panel already shown well is only activated.
    pub fn visit(&mut self, panel: PanelId, adherent: bool) {
        let idx = self.tree.slot(panel);
        self.visit_slot(idx, adherent);
    }

    /// Visits a panel at a position relative to it: `rel_x` and `rel_y` are
    /// the view center's offset from the panel center in panel sizes,
    /// `rel_a` the view area over the panel area. A `rel_a` of zero or less
    /// shows the panel full-sized (below -0.9: filling the view).
    pub fn visit_rel(&mut self, panel: PanelId, rel_x: f64, rel_y: f64, rel_a: f64, adherent: bool) {
        let idx = self.tree.slot(panel);
        self.visit_rel_slot(idx, rel_x, rel_y, rel_a, adherent, false);
    }

    /// Like [`visit_rel`](Self::visit_rel), but activates the best focusable
    /// panel at the view center rather than `panel`.
    pub fn visit_by(&mut self, panel: PanelId, rel_x: f64, rel_y: f64, rel_a: f64) {
        let idx = self.tree.slot(panel);
        self.visit_rel_by_slot(idx, rel_x, rel_y, rel_a, false);
    }

    /// Activates a panel without moving the view if it is on screen, and
    /// visits it otherwise.
    pub fn visit_lazy(&mut self, panel: PanelId, adherent: bool) {
        let mut idx = self.tree.slot(panel);
        while !self.tree.has(idx, PF::FOCUSABLE) {
            idx = self.tree.parent[idx as usize];
        }
        let svp = self.svp;
        if self.tree.has(idx, PF::VIEWED)
            || (svp != INVALID
                && !self.tree.has(svp, PF::FOCUSABLE)
                && self.tree.focusable_parent(svp) == idx)
        {
            if !self.tree.has(idx, PF::ACTIVE) || (adherent && !self.visit_adherent) {
                self.visit_immobile_slot(idx, adherent);
            }
        } else {
            self.visit_slot(idx, adherent);
        }
    }

    /// Shows a panel centered and as large as fits. With `utilize_view` it
    /// fills the view instead, cropping.
    pub fn visit_fullsized(&mut self, panel: PanelId, adherent: bool, utilize_view: bool) {
        let idx = self.tree.slot(panel);
        let rel_a = if utilize_view { -1.0 } else { 0.0 };
        self.visit_rel_slot(idx, 0.0, 0.0, rel_a, adherent, false);
    }

    /// Shows a panel full-sized and activates the best panel at the center.
    pub fn visit_by_fullsized(&mut self, panel: PanelId) {
        let idx = self.tree.slot(panel);
        self.visit_rel_by_slot(idx, 0.0, 0.0, 0.0, false);
    }

    /// Makes a panel visited and active without moving the view. A panel not
    /// on screen is replaced by its nearest viewed focusable ancestor.
    pub fn visit_immobile(&mut self, panel: PanelId, adherent: bool) {
        let idx = self.tree.slot(panel);
        self.visit_immobile_slot(idx, adherent);
    }

    /// Places a panel at `(x, y)` with width `width`, in view pixels.
    pub fn visit_abs(&mut self, panel: PanelId, x: f64, y: f64, width: f64, adherent: bool) {
        let idx = self.tree.slot(panel);
        self.visit_abs_slot(idx, x, y, width, adherent, false);
    }

    // -- Keyboard navigation --

    /// Visits the next focusable sibling, wrapping to the first.
    pub fn visit_next(&mut self) {
        let a = self.active;
        if a == INVALID {
            return;
        }
        let mut p = self.tree.focusable_next(a);
        if p == INVALID {
            p = self.tree.focusable_parent(a);
            if p == INVALID {
                p = self.root;
            }
            if p != a {
                p = self.tree.focusable_first_child(p);
            }
        }
        if p != INVALID {
            self.visit_slot(p, true);
        }
    }

    /// Visits the previous focusable sibling, wrapping to the last.
    pub fn visit_prev(&mut self) {
        let a = self.active;
        if a == INVALID {
            return;
        }
        let mut p = self.tree.focusable_prev(a);
        if p == INVALID {
            p = self.tree.focusable_parent(a);
            if p == INVALID {
                p = self.root;
            }
            if p != a {
                p = self.tree.focusable_last_child(p);
            }
        }
        if p != INVALID {
            self.visit_slot(p, true);
        }
    }

    /// Visits the first focusable sibling.
    pub fn visit_first(&mut self) {
        let a = self.active;
        if a == INVALID {
            return;
        }
        let mut p = self.tree.focusable_parent(a);
        if p != INVALID {
            p = self.tree.focusable_first_child(p);
        }
        if p == INVALID {
            p = a;
        }
        self.visit_slot(p, true);
    }

    /// Visits the last focusable sibling.
    pub fn visit_last(&mut self) {
        let a = self.active;
        if a == INVALID {
            return;
        }
        let mut p = self.tree.focusable_parent(a);
        if p != INVALID {
            p = self.tree.focusable_last_child(p);
        }
        if p == INVALID {
            p = a;
        }
        self.visit_slot(p, true);
    }

    /// Visits the nearest focusable sibling to the left.
    pub fn visit_left(&mut self) {
        self.visit_neighbour(2);
    }

    /// Visits the nearest focusable sibling to the right.
    pub fn visit_right(&mut self) {
        self.visit_neighbour(0);
    }

    /// Visits the nearest focusable sibling above.
    pub fn visit_up(&mut self) {
        self.visit_neighbour(3);
    }

    /// Visits the nearest focusable sibling below.
    pub fn visit_down(&mut self) {
        self.visit_neighbour(1);
    }

    /// Visits the first focusable child, or shows the active panel
    /// full-sized when it has none.
    pub fn visit_in(&mut self) {
        let a = self.active;
        if a == INVALID {
            return;
        }
        let p = self.tree.focusable_first_child(a);
        if p != INVALID {
            self.visit_slot(p, true);
        } else {
            self.visit_rel_slot(a, 0.0, 0.0, 0.0, true, false);
        }
    }

    /// Visits the focusable parent, or zooms out at the root.
    pub fn visit_out(&mut self) {
        let a = self.active;
        if a == INVALID {
            return;
        }
        let p = self.tree.focusable_parent(a);
        if p != INVALID {
            self.visit_slot(p, true);
        } else {
            self.zoom_out();
            if self.root != INVALID {
                self.visit_immobile_slot(self.root, true);
            }
        }
    }

    /// Direction 0 is right, 1 down, 2 left, 3 up.
    fn visit_neighbour(&mut self, direction: u8) {
        let direction = direction & 3;
        let mut current = self.active;
        if current == INVALID {
            return;
        }
        let mut parent = self.tree.focusable_parent(current);
        if parent == INVALID {
            parent = self.root;
        }
        if parent != current {
            let (cx1, cy1, cx2, cy2) = self.rect_in_ancestor(current, parent);
            let mut best = INVALID;
            let mut best_val = 0.0;
            let mut def_dx = -1.0;
            let mut n = self.tree.focusable_first_child(parent);
            while n != INVALID {
                if n == current {
                    def_dx = -def_dx;
                    n = self.tree.focusable_next(n);
                    continue;
                }
                let (nx1, ny1, nx2, ny2) = self.rect_in_ancestor(n, parent);
                let (mut dx, mut dy) = (0.0, 0.0);
                for (fx, fy) in [
                    (nx1 - cx1, ny1 - cy1),
                    (nx2 - cx2, ny1 - cy1),
                    (nx1 - cx1, ny2 - cy2),
                    (nx2 - cx2, ny2 - cy2),
                ] {
                    let f = f64::hypot(fx, fy);
                    if f > 1e-30 {
                        dx += fx / f;
                        dy += fy / f;
                    }
                }
                let f = f64::hypot(dx, dy);
                if f > 1e-30 {
                    dx /= f;
                    dy /= f;
                } else {
                    dx = def_dx;
                    dy = 0.0;
                }
                let d = f64::hypot((nx1 + nx2 - cx1 - cx2) * 0.5, (ny1 + ny2 - cy1 - cy2) * 0.5);
                let gx = if nx2 < cx1 {
                    nx2 - cx1
                } else if nx1 > cx2 {
                    nx1 - cx2
                } else {
                    0.0
                };
                let gy = if ny2 < cy1 {
                    ny2 - cy1
                } else if ny1 > cy2 {
                    ny1 - cy2
                } else {
                    0.0
                };
                let e = f64::hypot(gx, gy);
                if direction & 1 != 0 {
                    (dx, dy) = (dy, -dx);
                }
                if direction & 2 != 0 {
                    dx = -dx;
                    dy = -dy;
                }
                if dx > 1e-12 {
                    let mut val = (e * 10.0 + d) * (1.0 + 2.0 * dy * dy);
                    if dy.abs() > 0.707 {
                        val *= 1000.0 * dy * dy * dy * dy;
                    }
                    if best == INVALID || val < best_val {
                        best = n;
                        best_val = val;
                    }
                }
                n = self.tree.focusable_next(n);
            }
            if best != INVALID {
                current = best;
            }
        }
        self.visit_slot(current, true);
    }

    /// The panel's rectangle `(x1, y1, x2, y2)` in the coordinates of an
    /// ancestor.
    fn rect_in_ancestor(&self, idx: u32, ancestor: u32) -> (f64, f64, f64, f64) {
        let (mut x1, mut y1, mut x2, mut y2) = (0.0, 0.0, 1.0, self.tree.height(idx));
        let mut p = idx;
        while p != ancestor {
            let l = self.tree.layout[p as usize];
            x1 = x1 * l.width + l.x;
            y1 = y1 * l.width + l.y;
            x2 = x2 * l.width + l.x;
            y2 = y2 * l.width + l.y;
            p = self.tree.parent[p as usize];
        }
        (x1, y1, x2, y2)
    }

    // -- Zooming and scrolling --

    /// Zooms by `factor` around the fix point `(fix_x, fix_y)` in view
    /// pixels.
    pub fn zoom(&mut self, fix_x: f64, fix_y: f64, factor: f64) {
        if factor == 1.0 || factor <= 0.0 {
            return;
        }
        let Some(v) = self.visited_panel() else {
            return;
        };
        let g = self.geometry;
        let vr = self.tree.viewed[v.panel.idx as usize];
        let re = 1.0 / factor;
        let rx = v.rel_x + (fix_x - (g.x + g.width * 0.5)) * (1.0 - re) / vr.width;
        let ry = v.rel_y + (fix_y - (g.y + g.height * 0.5)) * (1.0 - re) / vr.height;
        let ra = v.rel_a * re * re;
        self.visit_rel_by_slot(v.panel.idx, rx, ry, ra, true);
    }

    /// Scrolls the content by `(dx, dy)` view pixels.
    pub fn scroll(&mut self, dx: f64, dy: f64) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        let Some(v) = self.visited_panel() else {
            return;
        };
        let vr = self.tree.viewed[v.panel.idx as usize];
        let rx = v.rel_x + dx / vr.width;
        let ry = v.rel_y + dy / vr.height;
        self.visit_rel_by_slot(v.panel.idx, rx, ry, v.rel_a, true);
    }

    /// Shows the whole root panel.
    pub fn zoom_out(&mut self) {
        if self.root != INVALID {
            let ra = self.zoomed_out_rel_a();
            self.visit_rel_by_slot(self.root, 0.0, 0.0, ra, true);
        }
    }

    /// Whether the whole root panel is shown, within 0.001 panel units.
    #[must_use]
    pub fn is_zoomed_out(&self) -> bool {
        if self.setting_geometry > 0 {
            return self.zoomed_out_before_sg;
        }
        let mut p = self.svp;
        if p == INVALID {
            return true;
        }
        let g = &self.geometry;
        let v = self.tree.viewed[p as usize];
        let mut x = (g.x - v.x) / v.width;
        let mut y = (g.y - v.y) * g.pixel_tallness / v.width;
        let mut w = g.width / v.width;
        let mut h = g.height * g.pixel_tallness / v.width;
        loop {
            let parent = self.tree.parent[p as usize];
            if parent == INVALID {
                break;
            }
            let l = self.tree.layout[p as usize];
            x = l.x + x * l.width;
            y = l.y + y * l.width;
            w *= l.width;
            h *= l.width;
            p = parent;
        }
        x <= 0.001 && y <= 0.001 && x + w >= 1.0 - 0.001 && y + h >= self.tree.height(p) - 0.001
    }

    /// The relative area at which the root panel just fits the view.
    pub(crate) fn zoomed_out_rel_a(&self) -> f64 {
        let g = &self.geometry;
        let h = self.tree.height(self.root);
        let ra = g.width * h / g.pixel_tallness / g.height;
        let ra2 = g.height / h * g.pixel_tallness / g.width;
        ra.max(ra2)
    }

    // -- Panel queries by position --

    /// The top-most viewed panel at a point in view pixels.
    #[must_use]
    pub fn panel_at(&self, x: f64, y: f64) -> Option<PanelId> {
        let mut p = self.svp;
        if p == INVALID || !self.clip_contains(p, x, y) {
            return None;
        }
        let mut c = self.tree.last_child[p as usize];
        while c != INVALID {
            if self.tree.has(c, PF::VIEWED) && self.clip_contains(c, x, y) {
                p = c;
                c = self.tree.last_child[p as usize];
            } else {
                c = self.tree.prev[c as usize];
            }
        }
        Some(self.tree.id(p))
    }

    /// The top-most viewed focusable panel at a point in view pixels.
    #[must_use]
    pub fn focusable_panel_at(&self, x: f64, y: f64) -> Option<PanelId> {
        let mut p = self.svp;
        if p == INVALID || !self.clip_contains(p, x, y) {
            return None;
        }
        let mut c = self.tree.focusable_last_child(p);
        while c != INVALID {
            if self.tree.has(c, PF::VIEWED) && self.clip_contains(c, x, y) {
                p = c;
                c = self.tree.focusable_last_child(p);
            } else {
                c = self.tree.focusable_prev(c);
            }
        }
        if !self.tree.has(p, PF::FOCUSABLE) {
            p = self.tree.focusable_parent(p);
        }
        self.tree.opt_id(p)
    }

    /// The highest touch priority of the panels under a point.
    #[must_use]
    pub fn touch_event_priority(&self, pos: Point) -> f64 {
        let mut pri = -1e30_f64;
        let mut p = self.root;
        while p != INVALID {
            if self.tree.has(p, PF::IN_VIEWED_PATH)
                && (!self.tree.has(p, PF::VIEWED) || self.clip_contains(p, pos.x, pos.y))
                && let Some(b) = self.tree.behavior[p as usize].as_deref()
            {
                pri = pri.max(b.touch_event_priority(pos, self.tree.has(p, PF::FOCUSABLE)));
            }
            p = self.tree.next_in_subtree(p, self.root);
        }
        pri
    }

    fn clip_contains(&self, idx: u32, x: f64, y: f64) -> bool {
        let c = self.tree.clip[idx as usize];
        c.x0 <= x && c.x1 > x && c.y0 <= y && c.y1 > y
    }

    // -- Core --

    fn visit_slot(&mut self, idx: u32, adherent: bool) {
        let g = self.geometry;
        let pt = g.pixel_tallness;
        let ph = self.tree.height(idx);

        let dx = (g.width * MIN_REL_DISTANCE).min(g.height * MIN_REL_DISTANCE * pt);
        let dy = dx / pt;
        let sx = g.x + dx;
        let sy = g.y + dy;
        let sw = g.width - 2.0 * dx;
        let sh = g.height - 2.0 * dy;

        let max_vw = sw.min(sh / ph * pt);
        let min_vw = ((g.width + g.height) * MIN_REL_CIRCUMFERENCE / (1.0 + ph / pt)).min(max_vw * 0.999);

        let v = self.tree.viewed[idx as usize];
        if self.tree.has(idx, PF::VIEWED)
            && v.width >= min_vw
            && v.width <= max_vw
            && v.x >= sx
            && v.x + v.width <= sx + sw
            && v.y >= sy
            && v.y + v.height <= sy + sh
        {
            self.visit_immobile_slot(idx, adherent);
            return;
        }

        // The panel in the common ancestor's coordinates.
        let mut cp = idx;
        let (mut ctx, mut cty, mut ctw, mut cth) = (0.0, 0.0, 1.0, ph);
        while cp != self.svp
            && (self.tree.has(cp, PF::VIEWED) || !self.tree.has(cp, PF::IN_VIEWED_PATH))
        {
            let l = self.tree.layout[cp as usize];
            ctx = l.x + ctx * l.width;
            cty = l.y + cty * l.width;
            ctw *= l.width;
            cth *= l.width;
            cp = self.tree.parent[cp as usize];
        }

        // The visible area in the same coordinates.
        let mut p = self.svp;
        let sv = self.tree.viewed[p as usize];
        let mut csx = (sx - sv.x) / sv.width;
        let mut csy = (sy - sv.y) * pt / sv.width;
        let mut csw = sw / sv.width;
        let mut csh = sh * pt / sv.width;
        while p != cp {
            let l = self.tree.layout[p as usize];
            csx = l.x + csx * l.width;
            csy = l.y + csy * l.width;
            csw *= l.width;
            csh *= l.width;
            p = self.tree.parent[p as usize];
        }

        let vw = if ctw * sw >= max_vw * csw {
            max_vw
        } else if ctw * sw <= min_vw * csw {
            min_vw
        } else {
            ctw / csw * sw
        };
        let vh = vw * ph / pt;

        let vx = if ctw > csw {
            let vx = -(csx + csw * 0.5 - ctx) * vw;
            if vx <= (-sw * 0.5) * ctw {
                sx
            } else if vx >= (sw * 0.5 - vw) * ctw {
                sx + sw - vw
            } else {
                vx / ctw + sx + sw * 0.5
            }
        } else {
            let vx = (ctx + ctw * 0.5 - csx) * sw;
            if vx <= vw * 0.5 * csw {
                sx
            } else if vx >= (sw - vw * 0.5) * csw {
                sx + sw - vw
            } else {
                vx / csw + sx - vw * 0.5
            }
        };

        let vy = if cth > csh {
            let vy = -(csy + csh * 0.5 - cty) * vh;
            if vy <= (-sh * 0.5) * cth {
                sy
            } else if vy >= (sh * 0.5 - vh) * cth {
                sy + sh - vh
            } else {
                vy / cth + sy + sh * 0.5
            }
        } else {
            let vy = (cty + cth * 0.5 - csy) * sh;
            if vy <= vh * 0.5 * csh {
                sy
            } else if vy >= (sh - vh * 0.5) * csh {
                sy + sh - vh
            } else {
                vy / csh + sy - vh * 0.5
            }
        };

        self.visit_abs_slot(idx, vx, vy, vw, adherent, false);
    }

    /// The relative coordinates that show a panel centered and as large as
    /// fits (or filling the view with `utilize_view`).
    fn calc_visit_fullsized_coords(&self, idx: u32, utilize_view: bool) -> (f64, f64, f64) {
        let g = &self.geometry;
        let ph = self.tree.height(idx);
        // The essence rectangle is the whole panel.
        let (ex, ey, ew, eh) = (0.0, 0.0, 1.0, ph);
        let (vw, vh) = if (ew * g.height * g.pixel_tallness >= eh * g.width) != utilize_view {
            let vw = g.width / ew;
            (vw, vw * ph / g.pixel_tallness)
        } else {
            let vh = g.height / eh * ph;
            (vh / ph * g.pixel_tallness, vh)
        };
        let vx = g.x + g.width * 0.5 - (ex + ew * 0.5) * vw;
        let vy = g.y + g.height * 0.5 - (ey + eh * 0.5) / ph * vh;
        (
            (g.x + g.width * 0.5 - vx) / vw - 0.5,
            (g.y + g.height * 0.5 - vy) / vh - 0.5,
            (g.width * g.height) / (vw * vh),
        )
    }

    pub(crate) fn visit_rel_slot(
        &mut self,
        idx: u32,
        mut rel_x: f64,
        mut rel_y: f64,
        mut rel_a: f64,
        adherent: bool,
        force_viewing_update: bool,
    ) {
        if rel_a <= 0.0 {
            (rel_x, rel_y, rel_a) = self.calc_visit_fullsized_coords(idx, rel_a < -0.9);
        }
        let g = self.geometry;
        let ph = self.tree.height(idx);
        let vw = (g.width * g.height * g.pixel_tallness / (rel_a * ph)).sqrt();
        let vh = vw * ph / g.pixel_tallness;
        let vx = g.x + g.width * 0.5 - (rel_x + 0.5) * vw;
        let vy = g.y + g.height * 0.5 - (rel_y + 0.5) * vh;
        self.visit_abs_slot(idx, vx, vy, vw, adherent, force_viewing_update);
    }

    /// Visits relative to a panel, then activates the best focusable panel
    /// at the view center: the deepest one still covering most of the view.
    /// An adherent active panel survives if it is large enough and inside
    /// that choice.
    pub(crate) fn visit_rel_by_slot(
        &mut self,
        idx: u32,
        rel_x: f64,
        rel_y: f64,
        rel_a: f64,
        force_viewing_update: bool,
    ) {
        let old_active = self.active;
        let old_adherent = self.visit_adherent;
        self.visit_rel_slot(idx, rel_x, rel_y, rel_a, false, force_viewing_update);

        let g = self.geometry;
        let min_w = g.width * 0.99;
        let min_h = g.height * 0.99;
        let min_a = g.width * g.height * 0.33;
        let cx = g.x + g.width * 0.5;
        let cy = g.y + g.height * 0.5;
        let mut best = self.svp;
        loop {
            let mut p = self.tree.focusable_last_child(best);
            while p != INVALID && !(self.tree.has(p, PF::VIEWED) && self.clip_contains(p, cx, cy)) {
                p = self.tree.focusable_prev(p);
            }
            if p == INVALID {
                break;
            }
            let c = self.tree.clip[p as usize];
            if c.width() < min_w && c.height() < min_h && c.area() < min_a {
                break;
            }
            best = p;
        }
        while !self.tree.has(best, PF::FOCUSABLE) {
            best = self.tree.parent[best as usize];
        }
        let mut adherent = false;
        if old_adherent
            && old_active != INVALID
            && self.tree.has(old_active, PF::VIEWED)
            && self.tree.viewed[old_active as usize].width >= 4.0
            && self.tree.viewed[old_active as usize].height >= 4.0
            && self.tree.is_ancestor_or_self(best, old_active)
        {
            best = old_active;
            adherent = true;
        }
        self.visit_immobile_slot(best, adherent);
    }

    pub(crate) fn visit_abs_slot(
        &mut self,
        idx: u32,
        mut vx: f64,
        mut vy: f64,
        mut vw: f64,
        adherent: bool,
        force_viewing_update: bool,
    ) {
        self.svp_choice_by_opacity_invalid = false;
        self.svp_choice_invalid = false;
        let g = self.geometry;
        let pt = g.pixel_tallness;

        let mut vp = idx;
        if self.flags.contains(ViewFlags::NO_ZOOM) {
            vp = self.root;
            let h = self.tree.height(vp);
            if g.height * pt >= g.width * h {
                vw = g.width;
                vx = g.x;
                vy = g.y + (g.height - vw * h / pt) * 0.5;
            } else {
                vw = g.height * pt / h;
                vx = g.x + (g.width - vw) * 0.5;
                vy = g.y;
            }
        }

        // Climb while the ancestor stays small enough to compute with.
        loop {
            let p = self.tree.parent[vp as usize];
            if p == INVALID {
                break;
            }
            let l = self.tree.layout[vp as usize];
            let w = vw / l.width;
            if w > MAX_SVP_SIZE || w * self.tree.height(p) > MAX_SVP_SIZE {
                break;
            }
            vx -= l.x * w;
            vy -= l.y * w / pt;
            vw = w;
            vp = p;
        }

        if vp == self.root {
            let rh = self.tree.height(vp);
            let mut vh = rh * vw / pt;
            if vw < g.width && vh < g.height {
                let rx = (g.x + g.width * 0.5 - vx) / vw;
                let ry = (g.y + g.height * 0.5 - vy) / vh;
                if vh * g.width < vw * g.height {
                    vw = g.width;
                    vh = vw * rh / pt;
                } else {
                    vh = g.height;
                    vw = vh / rh * pt;
                }
                vx = g.x + g.width * 0.5 - rx * vw;
                vy = g.y + g.height * 0.5 - ry * vh;
            }
            let (x1, x2, y1, y2) = if self.flags.contains(ViewFlags::EGO_MODE) {
                let cx = g.x + g.width * 0.5;
                let cy = g.y + g.height * 0.5;
                (cx, cx, cy, cy)
            } else if vh * g.width < vw * g.height {
                let half = g.width * rh / pt * 0.5;
                let cy = g.y + g.height * 0.5;
                (g.x, g.x + g.width, cy - half, cy + half)
            } else {
                let half = g.height / rh * pt * 0.5;
                let cx = g.x + g.width * 0.5;
                (cx - half, cx + half, g.y, g.y + g.height)
            };
            if vx > x1 {
                vx = x1;
            }
            if vx < x2 - vw {
                vx = x2 - vw;
            }
            if vy > y1 {
                vy = y1;
            }
            if vy < y2 - vh {
                vy = y2 - vh;
            }
        }

        (vp, vx, vy, vw) = self.find_best_svp(vp, vx, vy, vw);

        // The largest panel that could still be the SVP.
        let mut sp = vp;
        let mut w = vw;
        loop {
            let p = self.tree.parent[sp as usize];
            if p == INVALID {
                break;
            }
            w /= self.tree.layout[sp as usize].width;
            if w > MAX_SVP_SIZE || w * self.tree.height(p) > MAX_SVP_SIZE {
                break;
            }
            sp = p;
        }
        self.max_svp = sp;

        // The smallest panel covering the view.
        let (mut sp, mut sx, mut sy, mut sw) = (vp, vx, vy, vw);
        loop {
            let mut p = self.tree.last_child[sp as usize];
            if p == INVALID {
                break;
            }
            let x1 = (g.x - sx) / sw;
            let x2 = x1 + g.width / sw;
            let y1 = (g.y - sy) * (pt / sw);
            let y2 = y1 + g.height * (pt / sw);
            while p != INVALID {
                let l = self.tree.layout[p as usize];
                if l.x < x2 && l.x + l.width > x1 && l.y < y2 && l.y + l.height > y1 {
                    break;
                }
                p = self.tree.prev[p as usize];
            }
            if p == INVALID {
                break;
            }
            let l = self.tree.layout[p as usize];
            if l.x > x1 || l.x + l.width < x2 || l.y > y1 || l.y + l.height < y2 {
                break;
            }
            sp = p;
            sx += l.x * sw;
            sy += l.y * sw / pt;
            sw *= l.width;
        }
        self.min_svp = sp;

        let cur = self.tree.viewed[vp as usize];
        if !force_viewing_update
            && self.svp == vp
            && (cur.x - vx).abs() < 0.001
            && (cur.y - vy).abs() < 0.001
            && (cur.width - vw).abs() < 0.001
        {
            self.visit_immobile_slot(idx, adherent);
            return;
        }

        let slice = self.handle.time_slice_counter();
        if self.svp_update_slice != slice {
            self.svp_update_slice = slice;
            self.svp_update_count = 0;
        }
        self.svp_update_count += 1;
        if self.svp_update_count > 1000
            && (self.svp_update_count % 1000 == 1 || self.svp_update_count > 10000)
        {
            // Endless SVP flipping through panels created and deleted by
            // notices; perturb the numbers to get out.
            let (jx, jy, jw) = failsafe_jitter(self.svp_update_count);
            vx += jx;
            vy += jy;
            vw *= jw;
            tracing::warn!(count = self.svp_update_count, "SVP update failsafe engaged");
        }
        tracing::debug!(svp = %self.tree.identity(vp), "SVP");

        let old = self.svp;
        if old != INVALID {
            self.tree.set(old, PF::VIEWED | PF::IN_VIEWED_PATH, false);
            self.add_pending_notice(old, VIEWING_NOTICES);
            self.update_children_viewing(old);
            let mut p = self.tree.parent[old as usize];
            while p != INVALID {
                self.tree.set(p, PF::IN_VIEWED_PATH, false);
                self.add_pending_notice(p, VIEWING_NOTICES);
                p = self.tree.parent[p as usize];
            }
        }

        self.svp = vp;
        let vh = vw * self.tree.height(vp) / pt;
        let i = vp as usize;
        self.tree.set(vp, PF::VIEWED | PF::IN_VIEWED_PATH, true);
        self.tree.viewed[i] = PanelRect::new(vx, vy, vw, vh);
        self.tree.clip[i] = kurbo::Rect::new(
            vx.max(g.x),
            vy.max(g.y),
            (vx + vw).min(g.x + g.width),
            (vy + vh).min(g.y + g.height),
        );
        self.add_pending_notice(vp, VIEWING_NOTICES);
        self.update_children_viewing(vp);
        let mut p = self.tree.parent[i];
        while p != INVALID {
            self.tree.set(p, PF::IN_VIEWED_PATH, true);
            self.add_pending_notice(p, VIEWING_NOTICES);
            p = self.tree.parent[p as usize];
        }
        self.restart_input_recursion = true;
        self.cursor_invalid = true;
        self.wake_update();
        self.invalidate_painting();

        self.visit_immobile_slot(idx, adherent);
    }

    pub(crate) fn visit_immobile_slot(&mut self, idx: u32, mut adherent: bool) {
        if idx == INVALID || self.svp == INVALID {
            return;
        }
        let mut panel = idx;
        while !self.tree.has(panel, PF::FOCUSABLE) {
            panel = self.tree.parent[panel as usize];
        }
        let (vp, ap);
        if self.tree.has(panel, PF::VIEWED) {
            vp = panel;
            ap = panel;
        } else if self.tree.has(panel, PF::IN_VIEWED_PATH) {
            vp = self.svp;
            ap = self.focusable_self_or_parent(vp);
            if panel != ap {
                adherent = false;
            }
        } else {
            loop {
                panel = self.tree.parent[panel as usize];
                if panel == INVALID {
                    vp = self.svp;
                    ap = self.focusable_self_or_parent(vp);
                    break;
                }
                if self.tree.has(panel, PF::VIEWED) && self.tree.has(panel, PF::FOCUSABLE) {
                    vp = panel;
                    ap = panel;
                    break;
                }
            }
            adherent = false;
        }

        let vp_changed = self.visited != vp;
        let ap_changed = self.active != ap;

        if vp_changed {
            if self.visited != INVALID {
                self.tree.set(self.visited, PF::VISITED, false);
                let mut p = self.visited;
                while p != INVALID {
                    self.tree.set(p, PF::IN_VISITED_PATH, false);
                    self.add_pending_notice(p, NF::VISIT_CHANGED);
                    p = self.tree.parent[p as usize];
                }
            }
            self.visited = vp;
            self.tree.set(vp, PF::VISITED, true);
            let mut p = vp;
            while p != INVALID {
                self.tree.set(p, PF::IN_VISITED_PATH, true);
                self.add_pending_notice(p, NF::VISIT_CHANGED);
                p = self.tree.parent[p as usize];
            }
        }

        if ap_changed {
            tracing::debug!(active = %self.tree.identity(ap), "active panel changed");
            let mut flags = NF::ACTIVE_CHANGED;
            if self.focused {
                flags |= NF::FOCUS_CHANGED;
            }
            if self.active != INVALID {
                self.tree.set(self.active, PF::ACTIVE, false);
                let mut p = self.active;
                while p != INVALID {
                    self.tree.set(p, PF::IN_ACTIVE_PATH, false);
                    self.add_pending_notice(p, flags);
                    p = self.tree.parent[p as usize];
                }
            }
            self.active = ap;
            self.tree.set(ap, PF::ACTIVE, true);
            let mut p = ap;
            while p != INVALID {
                self.tree.set(p, PF::IN_ACTIVE_PATH, true);
                self.add_pending_notice(p, flags);
                p = self.tree.parent[p as usize];
            }
        }

        self.visit_adherent = adherent;

        if ap_changed {
            self.title_invalid = true;
            self.wake_update();
            self.handle.signal(self.signals.control_panel);
        }
    }

    fn focusable_self_or_parent(&self, mut idx: u32) -> u32 {
        while !self.tree.has(idx, PF::FOCUSABLE) {
            idx = self.tree.parent[idx as usize];
        }
        idx
    }

    // -- SVP choice --

    /// Looks for a better SVP around `(vp, vx, vy, vw)`: first within the
    /// exact range, then, if the view is not covered opaquely, within the
    /// wider search range.
    fn find_best_svp(&self, vp0: u32, vx0: f64, vy0: f64, vw0: f64) -> (u32, f64, f64, f64) {
        let g = &self.geometry;
        let pt = g.pixel_tallness;
        let mut result = (vp0, vx0, vy0, vw0);
        let (mut vp, mut vx, mut vy, mut vw) = (vp0, vx0, vy0, vw0);
        for limit in [MAX_SVP_SIZE, MAX_SVP_SEARCH_SIZE] {
            let op = vp;
            loop {
                let p = self.tree.parent[vp as usize];
                if p == INVALID {
                    break;
                }
                let l = self.tree.layout[vp as usize];
                let w = vw / l.width;
                if w > limit || w * self.tree.height(p) > limit {
                    break;
                }
                vx -= l.x * w;
                vy -= l.y * w / pt;
                vw = w;
                vp = p;
            }
            if op == vp && limit == MAX_SVP_SEARCH_SIZE {
                break;
            }
            let covering = vx <= g.x
                && vx + vw >= g.x + g.width
                && vy <= g.y
                && vy + self.tree.height(vp) * vw / pt >= g.y + g.height;
            let mut cand = (vp, vx, vy, vw);
            let covered = self.find_best_svp_in_tree(&mut cand, covering);
            if result.0 != cand.0 {
                result = cand;
            }
            if covered {
                break;
            }
        }
        result
    }

    /// Descends into the children overlapping the view. Returns whether the
    /// chosen panel covers the view opaquely.
    fn find_best_svp_in_tree(&self, best: &mut (u32, f64, f64, f64), covering: bool) -> bool {
        let g = &self.geometry;
        let (p0, vx, vy, vw) = *best;
        let mut vs = vw;
        let f = self.tree.height(p0);
        if f > 1.0 {
            vs *= f;
        }
        let too_large = vs > MAX_SVP_SIZE;
        if !covering && !too_large {
            return false;
        }
        let mut vc = covering && self.is_slot_opaque(p0);

        let mut p = self.tree.last_child[p0 as usize];
        if p == INVALID {
            return vc;
        }
        let x1 = (g.x - vx) / vw;
        let x2 = x1 + g.width / vw;
        let vwc = vw / g.pixel_tallness;
        let y1 = (g.y - vy) / vwc;
        let y2 = y1 + g.height / vwc;
        let mut vd = 1e30;
        let mut overlapped = false;

        while p != INVALID {
            let l = self.tree.layout[p as usize];
            if l.x < x2 && l.x + l.width > x1 && l.y < y2 && l.y + l.height > y1 {
                let mut cc = true;
                if !covering || l.x > x1 || l.x + l.width < x2 || l.y > y1 || l.y + l.height < y2 {
                    if !too_large && vc {
                        break;
                    }
                    cc = false;
                }
                let mut cand = (p, vx + l.x * vw, vy + l.y * vwc, l.width * vw);
                cc = self.find_best_svp_in_tree(&mut cand, cc);
                if !cc && !too_large && vc {
                    break;
                }
                let mut cs = cand.3;
                let f = self.tree.height(cand.0);
                if f > 1.0 {
                    cs *= f;
                }
                if cc && cs <= MAX_SVP_SIZE {
                    if too_large || !overlapped {
                        *best = cand;
                    }
                    return true;
                }
                overlapped = true;
                if too_large {
                    let cx = (x2 + x1) * 0.5;
                    let cy = (y2 + y1) * 0.5;
                    let dx = if cx < l.x {
                        cx - l.x
                    } else if cx > l.x + l.width {
                        cx - (l.x + l.width)
                    } else {
                        0.0
                    };
                    let dy = if cy < l.y {
                        cy - l.y
                    } else if cy > l.y + l.height {
                        cy - (l.y + l.height)
                    } else {
                        0.0
                    };
                    let d = dx * dx + dy * dy;
                    if (cs <= MAX_SVP_SIZE && d - 0.1 <= vd) || (vs > MAX_SVP_SIZE && cs <= vs) {
                        *best = cand;
                        vd = d;
                        vs = cs;
                        vc = cc;
                    }
                }
            }
            p = self.tree.prev[p as usize];
        }
        vc
    }
}

#[cfg(test)]
mod tests {
    use super::failsafe_jitter;

    #[test]
    fn jitter_stays_small() {
        for count in [1001, 2001, 10_001, 123_456] {
            let (dx, dy, f) = failsafe_jitter(count);
            assert!(dx.abs() <= 0.01, "dx {dx}");
            assert!(dy.abs() <= 0.01, "dy {dy}");
            assert!((f - 1.0).abs() <= 1.1e-10, "f {f}");
        }
        assert_ne!(failsafe_jitter(1001), failsafe_jitter(2001));
    }
}
