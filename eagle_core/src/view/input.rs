// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Input dispatch: children before parents, top-most first, restarted when
//! a handler changes the viewing.

use kurbo::Point;

use super::View;
use crate::input::{InputEvent, InputKey, InputState};
use crate::panel::PanelFlags as PF;
use crate::scheduler::INVALID;

impl View {
    /// Delivers an input event to the panels.
    ///
    /// Every panel in the viewed path is called exactly once, children before
    /// their parent and later siblings before earlier ones. Panels the event
    /// does not concern get an empty event. If a handler changes the viewing,
    /// the dispatch restarts with the panels not yet called.
    pub fn input(&mut self, event: &mut InputEvent, state: &InputState) {
        if (state.mouse.x - self.last_mouse.x).abs() > 0.1
            || (state.mouse.y - self.last_mouse.y).abs() > 0.1
        {
            self.last_mouse = state.mouse;
            self.cursor_invalid = true;
            self.wake_update();
        }

        let mut p = self.root;
        while p != INVALID {
            let in_path = self.tree.has(p, PF::IN_VIEWED_PATH);
            self.tree.set(p, PF::PENDING_INPUT, in_path);
            p = self.tree.next_in_subtree(p, self.root);
        }

        loop {
            self.restart_input_recursion = false;
            self.recurse_input(event, state);
            if !self.restart_input_recursion {
                break;
            }
            tracing::debug!("restarting input recursion");
        }
    }

    fn recurse_input(&mut self, event: &mut InputEvent, state: &InputState) {
        let mut p = self.svp;
        if p == INVALID {
            return;
        }
        let pt = self.geometry.pixel_tallness;
        let mut none = InputEvent::default();

        let v = self.tree.viewed[p as usize];
        let c = self.tree.clip[p as usize];
        let outside = |pos: Point| pos.x < c.x0 || pos.x >= c.x1 || pos.y < c.y0 || pos.y >= c.y1;
        let touch = state.touch_or_mouse();
        let missed = (event.is_mouse_event() && outside(state.mouse))
            || (event.is_touch_event() && outside(touch));
        let e: &mut InputEvent = if missed { &mut none } else { &mut *event };

        let mut m = Point::new((state.mouse.x - v.x) / v.width, (state.mouse.y - v.y) / v.width * pt);
        let mut t = Point::new((touch.x - v.x) / v.width, (touch.y - v.y) / v.width * pt);

        if self.tree.has(p, PF::PENDING_INPUT) && self.tree.last_child[p as usize] != INVALID {
            self.recurse_children_input(p, m, t, e, state);
            if self.restart_input_recursion {
                return;
            }
        }

        loop {
            if self.tree.has(p, PF::PENDING_INPUT) {
                self.tree.set(p, PF::PENDING_INPUT, false);
                let h = self.tree.height(p);
                let hit = |q: Point| q.x >= 0.0 && q.x < 1.0 && q.y >= 0.0 && q.y < h;
                let concerned = (e.is_mouse_event() && hit(m))
                    || (e.is_touch_event() && hit(t))
                    || (self.tree.has(p, PF::IN_ACTIVE_PATH) && e.is_keyboard_event());
                if concerned {
                    self.panel_input(p, e, state, m);
                } else {
                    let mut empty = InputEvent::default();
                    self.panel_input(p, &mut empty, state, m);
                }
                if self.restart_input_recursion {
                    return;
                }
            }
            let parent = self.tree.parent[p as usize];
            if parent == INVALID {
                break;
            }
            let l = self.tree.layout[p as usize];
            m = Point::new(m.x * l.width + l.x, m.y * l.width + l.y);
            t = Point::new(t.x * l.width + l.x, t.y * l.width + l.y);
            p = parent;
        }
    }

    fn recurse_children_input(
        &mut self,
        parent: u32,
        m: Point,
        t: Point,
        event: &mut InputEvent,
        state: &InputState,
    ) {
        let mut p = self.tree.last_child[parent as usize];
        while p != INVALID {
            if !self.tree.has(p, PF::PENDING_INPUT) || !self.tree.has(p, PF::IN_VIEWED_PATH) {
                p = self.tree.prev[p as usize];
                continue;
            }
            let l = self.tree.layout[p as usize];
            let cm = Point::new((m.x - l.x) / l.width, (m.y - l.y) / l.width);
            let ct = Point::new((t.x - l.x) / l.width, (t.y - l.y) / l.width);
            let h = self.tree.height(p);
            let hit = |q: Point| q.x >= 0.0 && q.x < 1.0 && q.y >= 0.0 && q.y < h;
            let concerned = (event.is_mouse_event() && hit(cm))
                || (event.is_touch_event() && hit(ct))
                || (self.tree.has(p, PF::IN_ACTIVE_PATH) && event.is_keyboard_event());
            let mut none = InputEvent::default();
            let e: &mut InputEvent = if concerned { &mut *event } else { &mut none };

            if self.tree.last_child[p as usize] != INVALID {
                self.recurse_children_input(p, cm, ct, e, state);
                if self.restart_input_recursion {
                    return;
                }
            }
            self.tree.set(p, PF::PENDING_INPUT, false);
            self.panel_input(p, e, state, cm);
            if self.restart_input_recursion {
                return;
            }
            p = self.tree.prev[p as usize];
        }
    }

    /// Calls the panel's handler, then the default handling unless eaten.
    fn panel_input(&mut self, idx: u32, event: &mut InputEvent, state: &InputState, mouse: Point) {
        let id = self.tree.id(idx);
        self.with_behavior(idx, None, |behavior, ctx| {
            if let Some(inputable) = behavior.as_inputable() {
                inputable.input(ctx, event, state, mouse);
            }
        });
        if event.is_empty() || !self.tree.is_alive(id) {
            return;
        }
        self.default_panel_input(idx, event, state);
    }

    /// Focusing by mouse or touch, and keyboard navigation on the active
    /// panel.
    fn default_panel_input(&mut self, idx: u32, event: &mut InputEvent, state: &InputState) {
        let id = self.tree.id(idx);
        if self.tree.has(idx, PF::FOCUSABLE) && (event.is_mouse_event() || event.is_touch_event()) {
            self.focus_panel(id);
            event.eat();
            return;
        }
        if !self.tree.has(idx, PF::ACTIVE) || !event.is_keyboard_event() {
            return;
        }
        let no_mod = state.is_no_mod();
        let handled = match event.get_key() {
            InputKey::Tab if no_mod => {
                self.visit_next();
                true
            }
            InputKey::Tab if state.is_shift_mod() => {
                self.visit_prev();
                true
            }
            InputKey::Left if no_mod => {
                self.visit_left();
                true
            }
            InputKey::Right if no_mod => {
                self.visit_right();
                true
            }
            InputKey::Up if no_mod => {
                self.visit_up();
                true
            }
            InputKey::Down if no_mod => {
                self.visit_down();
                true
            }
            InputKey::PageUp if no_mod => {
                self.visit_in();
                true
            }
            InputKey::PageDown if no_mod => {
                self.visit_out();
                true
            }
            InputKey::Home if no_mod => {
                self.visit_first();
                true
            }
            InputKey::Home if state.is_alt_mod() => {
                let adherent = self.visit_adherent;
                self.visit_fullsized(id, adherent, false);
                true
            }
            InputKey::Home if state.is_shift_alt_mod() => {
                let adherent = self.visit_adherent;
                self.visit_fullsized(id, adherent, true);
                true
            }
            InputKey::End if no_mod => {
                self.visit_last();
                true
            }
            _ => false,
        };
        if handled {
            event.eat();
        }
    }
}
