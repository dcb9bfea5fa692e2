// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel damage tracking for partial re-rendering.
//!
//! A [`DamageRegion`] is a set of disjoint [`PixelRect`]s in view pixels.
//! The view adds to it whenever painting is invalidated; the renderer takes
//! it and repaints exactly those pixels.

use kurbo::Rect;

/// Above this many rectangles a region collapses to its bounding box.
const MAX_RECTS: usize = 256;

/// An axis-aligned rectangle of whole pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Creates a rectangle.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle from edges. Inverted edges give an empty rectangle.
    #[must_use]
    pub fn from_edges(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1).max(0).unsigned_abs(),
            height: y2.saturating_sub(y1).max(0).unsigned_abs(),
        }
    }

    /// The smallest pixel rectangle covering `rect`.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "view coordinates are far inside the i32 range"
    )]
    pub fn covering(rect: Rect) -> Self {
        if !(rect.x0 < rect.x1 && rect.y0 < rect.y1) {
            return Self::default();
        }
        Self::from_edges(
            rect.x0.floor() as i32,
            rect.y0.floor() as i32,
            rect.x1.ceil() as i32,
            rect.y1.ceil() as i32,
        )
    }

    /// Right edge (exclusive).
    #[inline]
    #[must_use]
    pub fn right(&self) -> i32 {
        self.x.saturating_add_unsigned(self.width)
    }

    /// Bottom edge (exclusive).
    #[inline]
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add_unsigned(self.height)
    }

    /// Whether the rectangle covers no pixel.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// The overlap of two rectangles (possibly empty).
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self::from_edges(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    /// The smallest rectangle containing both. Empty inputs are ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Whether `other` lies completely inside.
    #[must_use]
    pub fn contains_rect(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Whether the pixel at `(x, y)` is covered.
    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// The rectangle as a float rectangle.
    #[must_use]
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.right()),
            f64::from(self.bottom()),
        )
    }

    /// Pushes the parts of `self` not covered by `hole` to `out`.
    fn subtract_into(&self, hole: &Self, out: &mut Vec<Self>) {
        let i = self.intersect(hole);
        if i.is_empty() {
            out.push(*self);
            return;
        }
        let pieces = [
            Self::from_edges(self.x, self.y, self.right(), i.y),
            Self::from_edges(self.x, i.bottom(), self.right(), self.bottom()),
            Self::from_edges(self.x, i.y, i.x, i.bottom()),
            Self::from_edges(i.right(), i.y, self.right(), i.bottom()),
        ];
        out.extend(pieces.into_iter().filter(|p| !p.is_empty()));
    }
}

/// A set of disjoint pixel rectangles that need repainting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DamageRegion {
    rects: Vec<PixelRect>,
}

impl DamageRegion {
    /// An empty region.
    #[must_use]
    pub const fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// Returns `true` if nothing needs repainting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The disjoint rectangles of the region.
    #[must_use]
    pub fn rects(&self) -> &[PixelRect] {
        &self.rects
    }

    /// Total number of pixels in the region.
    #[must_use]
    pub fn area(&self) -> u64 {
        self.rects.iter().map(PixelRect::area).sum()
    }

    /// Bounding box of the region.
    #[must_use]
    pub fn bounds(&self) -> PixelRect {
        self.rects
            .iter()
            .fold(PixelRect::default(), |acc, r| acc.union(r))
    }

    /// Adds a rectangle, keeping the rectangles disjoint.
    pub fn add(&mut self, rect: PixelRect) {
        if rect.is_empty() || self.rects.iter().any(|r| r.contains_rect(&rect)) {
            return;
        }
        let mut pieces = vec![rect];
        let mut next = Vec::new();
        for existing in &self.rects {
            for p in &pieces {
                p.subtract_into(existing, &mut next);
            }
            core::mem::swap(&mut pieces, &mut next);
            next.clear();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
        if self.rects.len() > MAX_RECTS {
            let b = self.bounds();
            self.rects.clear();
            self.rects.push(b);
        }
    }

    /// Merges another damage region into this one.
    pub fn merge(&mut self, other: &Self) {
        for r in &other.rects {
            self.add(*r);
        }
    }

    /// Restricts the region to `clip`.
    pub fn clip_to(&mut self, clip: &PixelRect) {
        self.rects = self
            .rects
            .iter()
            .map(|r| r.intersect(clip))
            .filter(|r| !r.is_empty())
            .collect();
    }

    /// Empties the region.
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Takes the region, leaving an empty one behind.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}

impl FromIterator<PixelRect> for DamageRegion {
    fn from_iter<I: IntoIterator<Item = PixelRect>>(iter: I) -> Self {
        let mut region = Self::new();
        for r in iter {
            region.add(r);
        }
        region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covering_rounds_outward() {
        let r = PixelRect::covering(Rect::new(0.5, 1.2, 10.1, 3.0));
        assert_eq!(r, PixelRect::new(0, 1, 11, 2));
        assert!(PixelRect::covering(Rect::new(5.0, 5.0, 5.0, 9.0)).is_empty());
    }

    #[test]
    fn overlapping_adds_stay_disjoint() {
        let mut d = DamageRegion::new();
        d.add(PixelRect::new(0, 0, 10, 10));
        d.add(PixelRect::new(5, 5, 10, 10));
        assert_eq!(d.area(), 100 + 100 - 25);
        for (i, a) in d.rects().iter().enumerate() {
            for b in &d.rects()[i + 1..] {
                assert!(a.intersect(b).is_empty(), "{a:?} overlaps {b:?}");
            }
        }
        assert_eq!(d.bounds(), PixelRect::new(0, 0, 15, 15));
    }

    #[test]
    fn contained_rect_is_ignored() {
        let mut d = DamageRegion::new();
        d.add(PixelRect::new(0, 0, 100, 100));
        d.add(PixelRect::new(10, 10, 5, 5));
        assert_eq!(d.rects().len(), 1);
        d.add(PixelRect::new(0, 0, 0, 7));
        assert_eq!(d.rects().len(), 1, "empty rect ignored");
    }

    #[test]
    fn clip_and_take() {
        let mut d: DamageRegion = [PixelRect::new(-5, -5, 20, 20)].into_iter().collect();
        d.clip_to(&PixelRect::new(0, 0, 8, 8));
        assert_eq!(d.rects(), &[PixelRect::new(0, 0, 8, 8)]);
        let taken = d.take();
        assert!(d.is_empty());
        assert_eq!(taken.area(), 64);
    }

    #[test]
    fn many_rects_collapse_to_bounds() {
        let mut d = DamageRegion::new();
        for i in 0..300 {
            d.add(PixelRect::new(i * 2, 0, 1, 1));
        }
        assert!(d.rects().len() <= MAX_RECTS);
        assert_eq!(d.bounds().x, 0);
    }
}
