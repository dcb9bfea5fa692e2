// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::{Point, Rect, Vec2};

use super::View;
use crate::paint::{Color, Painter};
use crate::panel::PanelFlags as PF;
use crate::scheduler::INVALID;

impl View {
    /// Paints the view through `painter`, whose origin is the view's
    /// top-left corner in canvas pixels and whose clip bounds the area to
    /// paint.
    ///
    /// Viewed panels are painted in pre-order, each clipped to its clip
    /// rectangle and transformed so that its own coordinates map to its
    /// viewed rectangle.
    ///
    /// # Panics
    ///
    /// Panics if the painter is scaled.
    pub fn paint(&self, painter: &mut Painter<'_>, canvas_color: Color) {
        assert!(!painter.is_scaled(), "a view cannot be painted with scaling");

        let mut p = self.svp;
        if p == INVALID {
            painter.clear(self.background);
            return;
        }
        let origin = painter.origin();
        let (ox, oy) = (origin.x, origin.y);
        let clip = painter.clip_rect();
        let r = Rect::new(clip.x0 - ox, clip.y0 - oy, clip.x1 - ox, clip.y1 - oy);
        let pt = self.geometry.pixel_tallness;

        let v = self.tree.viewed[p as usize];
        let mut canvas = canvas_color;
        if !self.is_slot_opaque(p)
            || v.x > r.x0
            || v.x + v.width < r.x1
            || v.y > r.y0
            || v.y + v.height < r.y1
        {
            canvas = self.tree.canvas_color[p as usize];
            if !canvas.is_opaque() {
                canvas = self.background;
            }
            painter.clear(canvas);
        }

        let top = p;
        let mut first = true;
        while p != INVALID {
            let mut descend = false;
            if first || self.tree.has(p, PF::VIEWED) {
                let c = self.tree.clip[p as usize].intersect(r);
                if c.x0 < c.x1 && c.y0 < c.y1 {
                    let v = self.tree.viewed[p as usize];
                    let color = if first {
                        canvas
                    } else {
                        self.tree.canvas_color[p as usize]
                    };
                    let mut pnt = painter.with_clip_and_transform(
                        c + Vec2::new(ox, oy),
                        Point::new(v.x + ox, v.y + oy),
                        Vec2::new(v.width, v.width / pt),
                    );
                    if let Some(paintable) = self.tree.behavior[p as usize]
                        .as_deref()
                        .and_then(|b| b.as_paintable())
                    {
                        paintable.paint(&mut pnt, color);
                    }
                    descend = true;
                }
            }
            first = false;
            p = if descend && self.tree.first_child[p as usize] != INVALID {
                self.tree.first_child[p as usize]
            } else {
                self.tree.next_skipping_children(p, top)
            };
        }
    }
}
