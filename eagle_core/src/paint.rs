// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painting primitives: colors, pixel targets and a clipping painter.
//!
//! A [`Painter`] maps user coordinates to canvas pixels with an origin and a
//! per-axis scale, and clips everything to a pixel rectangle. Panels paint in
//! their own coordinate system (width 1.0); the view sets up the transform.

use core::fmt;

use kurbo::{Point, Rect, Vec2};

/// An RGBA color packed as `0xRRGGBBAA`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self(0x0000_0000);
    /// Opaque black.
    pub const BLACK: Self = Self(0x0000_00FF);
    /// Opaque white.
    pub const WHITE: Self = Self(0xFFFF_FFFF);
    /// Opaque medium grey, the default view background.
    pub const GREY: Self = Self(0x8080_80FF);

    /// Packs four channels.
    #[inline]
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(u32::from_be_bytes([r, g, b, a]))
    }

    /// Red channel.
    #[inline]
    #[must_use]
    pub const fn red(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    /// Green channel.
    #[inline]
    #[must_use]
    pub const fn green(self) -> u8 {
        self.0.to_be_bytes()[1]
    }

    /// Blue channel.
    #[inline]
    #[must_use]
    pub const fn blue(self) -> u8 {
        self.0.to_be_bytes()[2]
    }

    /// Alpha channel.
    #[inline]
    #[must_use]
    pub const fn alpha(self) -> u8 {
        self.0.to_be_bytes()[3]
    }

    /// Whether alpha is 255.
    #[inline]
    #[must_use]
    pub const fn is_opaque(self) -> bool {
        self.alpha() == 255
    }

    /// Whether alpha is 0.
    #[inline]
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        self.alpha() == 0
    }

    /// Composes `self` over `dst` (non-premultiplied source-over).
    #[must_use]
    pub fn over(self, dst: Self) -> Self {
        let sa = u32::from(self.alpha());
        if sa == 255 {
            return self;
        }
        if sa == 0 {
            return dst;
        }
        let da = u32::from(dst.alpha());
        let out_a = sa * 255 + da * (255 - sa);
        if out_a == 0 {
            return Self::TRANSPARENT;
        }
        let ch = |s: u8, d: u8| -> u8 {
            let v = (u32::from(s) * sa * 255 + u32::from(d) * da * (255 - sa) + out_a / 2) / out_a;
            u8::try_from(v).unwrap_or(u8::MAX)
        };
        Self::rgba(
            ch(self.red(), dst.red()),
            ch(self.green(), dst.green()),
            ch(self.blue(), dst.blue()),
            u8::try_from((out_a + 127) / 255).unwrap_or(u8::MAX),
        )
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color(#{:08X})", self.0)
    }
}

/// A pixel target.
pub trait Canvas {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Composes `color` over the pixels of a rectangle. Implementations clip
    /// the rectangle to their bounds.
    fn fill_span_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Color);
}

/// Paints into a [`Canvas`] through a clip rectangle and a transform.
pub struct Painter<'a> {
    canvas: &'a mut dyn Canvas,
    clip: Rect,
    origin: Point,
    scale: Vec2,
}

impl<'a> Painter<'a> {
    /// A painter covering the whole canvas with the identity transform.
    pub fn new(canvas: &'a mut dyn Canvas) -> Self {
        let clip = Rect::new(0.0, 0.0, f64::from(canvas.width()), f64::from(canvas.height()));
        Self {
            canvas,
            clip,
            origin: Point::ZERO,
            scale: Vec2::new(1.0, 1.0),
        }
    }

    /// A painter whose user coordinates are offset: user point `offset`
    /// lands on canvas pixel `(0, 0)`. Used to paint a tile of a larger
    /// surface into a small buffer.
    pub fn with_offset(canvas: &'a mut dyn Canvas, offset: Vec2) -> Self {
        let mut p = Self::new(canvas);
        p.origin = Point::ZERO - offset;
        p
    }
}

impl Painter<'_> {
    /// Clip rectangle in canvas pixels.
    #[inline]
    #[must_use]
    pub fn clip_rect(&self) -> Rect {
        self.clip
    }

    /// Canvas position of user point `(0, 0)`.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Canvas pixels per user unit, per axis.
    #[inline]
    #[must_use]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Whether the transform scales.
    #[must_use]
    pub fn is_scaled(&self) -> bool {
        self.scale != Vec2::new(1.0, 1.0)
    }

    /// The clip rectangle in user coordinates.
    #[must_use]
    pub fn user_clip_rect(&self) -> Rect {
        Rect::new(
            (self.clip.x0 - self.origin.x) / self.scale.x,
            (self.clip.y0 - self.origin.y) / self.scale.y,
            (self.clip.x1 - self.origin.x) / self.scale.x,
            (self.clip.y1 - self.origin.y) / self.scale.y,
        )
    }

    /// Maps a user point to canvas pixels.
    #[must_use]
    pub fn to_canvas(&self, p: Point) -> Point {
        Point::new(
            self.origin.x + p.x * self.scale.x,
            self.origin.y + p.y * self.scale.y,
        )
    }

    /// Re-borrows the painter with a narrower clip and a new transform.
    ///
    /// `clip` is in canvas pixels and gets intersected with the current
    /// clip; `origin` and `scale` replace the current transform.
    pub fn with_clip_and_transform(&mut self, clip: Rect, origin: Point, scale: Vec2) -> Painter<'_> {
        Painter {
            canvas: &mut *self.canvas,
            clip: self.clip.intersect(clip),
            origin,
            scale,
        }
    }

    /// Fills the clip rectangle with `color`.
    pub fn clear(&mut self, color: Color) {
        self.fill_canvas_rect(self.clip, color);
    }

    /// Paints a rectangle given in user coordinates.
    pub fn paint_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        let a = self.to_canvas(Point::new(x, y));
        let b = self.to_canvas(Point::new(x + w, y + h));
        self.fill_canvas_rect(Rect::from_points(a, b), color);
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "clip rectangles lie within canvas bounds"
    )]
    fn fill_canvas_rect(&mut self, rect: Rect, color: Color) {
        if color.is_transparent() {
            return;
        }
        let r = rect.intersect(self.clip);
        let x0 = r.x0.round() as i32;
        let y0 = r.y0.round() as i32;
        let x1 = r.x1.round() as i32;
        let y1 = r.y1.round() as i32;
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        self.canvas
            .fill_span_rect(x0, y0, (x1 - x0).unsigned_abs(), (y1 - y0).unsigned_abs(), color);
    }
}

impl fmt::Debug for Painter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Painter")
            .field("clip", &self.clip)
            .field("origin", &self.origin)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A plain RGBA canvas for tests.
    pub(crate) struct TestCanvas {
        pub(crate) width: u32,
        pub(crate) height: u32,
        pub(crate) pixels: Vec<Color>,
    }

    impl TestCanvas {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![Color::TRANSPARENT; (width * height) as usize],
            }
        }

        pub(crate) fn at(&self, x: u32, y: u32) -> Color {
            self.pixels[(y * self.width + x) as usize]
        }
    }

    impl Canvas for TestCanvas {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn fill_span_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Color) {
            let x0 = x.max(0) as u32;
            let y0 = y.max(0) as u32;
            let x1 = (x + width as i32).clamp(0, self.width as i32) as u32;
            let y1 = (y + height as i32).clamp(0, self.height as i32) as u32;
            for py in y0..y1 {
                for px in x0..x1 {
                    let i = (py * self.width + px) as usize;
                    self.pixels[i] = color.over(self.pixels[i]);
                }
            }
        }
    }

    #[test]
    fn color_channels_and_blend() {
        let c = Color::rgba(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c.0, 0x1234_5678);
        assert_eq!((c.red(), c.green(), c.blue(), c.alpha()), (0x12, 0x34, 0x56, 0x78));
        assert_eq!(Color::WHITE.over(Color::BLACK), Color::WHITE);
        assert_eq!(Color::TRANSPARENT.over(Color::BLACK), Color::BLACK);
        let half = Color::rgba(255, 255, 255, 128).over(Color::BLACK);
        assert!(half.is_opaque());
        assert!((127..=129).contains(&half.red()), "got {half:?}");
    }

    #[test]
    fn painter_clips_and_transforms() {
        let mut canvas = TestCanvas::new(8, 8);
        let mut p = Painter::new(&mut canvas);
        assert!(!p.is_scaled());
        {
            let mut q = p.with_clip_and_transform(
                Rect::new(2.0, 2.0, 6.0, 6.0),
                Point::new(2.0, 2.0),
                Vec2::new(4.0, 4.0),
            );
            assert!(q.is_scaled());
            assert_eq!(q.user_clip_rect(), Rect::new(0.0, 0.0, 1.0, 1.0));
            q.paint_rect(0.5, 0.0, 10.0, 10.0, Color::WHITE);
        }
        drop(p);
        assert_eq!(canvas.at(3, 3), Color::TRANSPARENT);
        assert_eq!(canvas.at(4, 2), Color::WHITE);
        assert_eq!(canvas.at(5, 5), Color::WHITE);
        assert_eq!(canvas.at(6, 5), Color::TRANSPARENT, "clipped");
    }

    #[test]
    fn offset_painter_maps_tiles() {
        let mut canvas = TestCanvas::new(4, 2);
        let mut p = Painter::with_offset(&mut canvas, Vec2::new(10.0, 20.0));
        p.paint_rect(11.0, 20.0, 1.0, 1.0, Color::BLACK);
        assert_eq!(p.user_clip_rect(), Rect::new(10.0, 20.0, 14.0, 22.0));
        drop(p);
        assert_eq!(canvas.at(1, 0), Color::BLACK);
    }
}
