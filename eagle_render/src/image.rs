// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software render buffers and an offscreen backend.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use eagle_core::damage::PixelRect;
use eagle_core::paint::{Canvas, Color, Painter};
use parking_lot::{Mutex, RwLock};

use crate::backend::{RenderBackend, paint_tile};
use crate::error::RenderError;

/// A rectangle of RGBA pixels in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl Image {
    /// A transparent image.
    ///
    /// # Panics
    ///
    /// Panics if the pixels cannot be allocated.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![Color::TRANSPARENT; len],
        }
    }

    /// A transparent image, or `None` if the pixels cannot be allocated.
    #[must_use]
    pub fn try_new(width: u32, height: u32) -> Option<Self> {
        let len = (width as usize).checked_mul(height as usize)?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).ok()?;
        pixels.resize(len, Color::TRANSPARENT);
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Color of a pixel, transparent outside the image.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Color {
        if !self.bounds().contains(x, y) {
            return Color::TRANSPARENT;
        }
        self.pixels[self.index(x.unsigned_abs(), y.unsigned_abs())]
    }

    /// All pixels, row by row.
    #[must_use]
    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    /// The image as a rectangle at the origin.
    #[must_use]
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    /// Sets every pixel to `color`.
    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    /// Copies the top-left `width` x `height` pixels of `src` to `(x, y)`,
    /// replacing what was there.
    pub fn copy_from(&mut self, src: &Self, width: u32, height: u32, x: i32, y: i32) {
        let width = width.min(src.width);
        let height = height.min(src.height);
        let dst = PixelRect::new(x, y, width, height).intersect(&self.bounds());
        if dst.is_empty() {
            return;
        }
        let sx = dst.x.abs_diff(x);
        let sy = dst.y.abs_diff(y);
        let (dx, dy) = (dst.x.unsigned_abs(), dst.y.unsigned_abs());
        let w = dst.width as usize;
        for row in 0..dst.height {
            let s = src.index(sx, sy + row);
            let d = self.index(dx, dy + row);
            self.pixels[d..d + w].copy_from_slice(&src.pixels[s..s + w]);
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl Canvas for Image {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fill_span_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Color) {
        let r = PixelRect::new(x, y, width, height).intersect(&self.bounds());
        if r.is_empty() || color.is_transparent() {
            return;
        }
        let (x0, y0) = (r.x.unsigned_abs(), r.y.unsigned_abs());
        let w = r.width as usize;
        for row in y0..y0 + r.height {
            let start = self.index(x0, row);
            let span = &mut self.pixels[start..start + w];
            if color.is_opaque() {
                span.fill(color);
            } else {
                for px in span {
                    *px = color.over(*px);
                }
            }
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

// -- Headless backend --

/// A [`RenderBackend`] that composes flushed tiles into an in-memory frame.
///
/// Useful offscreen and in tests: after a pass, [`frame`](Self::frame)
/// holds exactly what a window would show.
pub struct HeadlessBackend {
    buffers: RwLock<Vec<Mutex<Image>>>,
    frame: Mutex<Image>,
    flushed: AtomicU64,
}

impl HeadlessBackend {
    /// A backend with a transparent frame of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffers: RwLock::new(Vec::new()),
            frame: Mutex::new(Image::new(width, height)),
            flushed: AtomicU64::new(0),
        }
    }

    /// A copy of the frame.
    #[must_use]
    pub fn frame(&self) -> Image {
        self.frame.lock().clone()
    }

    /// Number of prepared buffers.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.read().len()
    }

    /// Number of tiles flushed so far.
    #[must_use]
    pub fn flushed_tiles(&self) -> u64 {
        self.flushed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for HeadlessBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessBackend")
            .field("buffers", &self.buffer_count())
            .field("flushed", &self.flushed_tiles())
            .finish_non_exhaustive()
    }
}

impl RenderBackend for HeadlessBackend {
    fn prepare_buffers(&self, count: usize, width: u32, height: u32) -> Result<(), RenderError> {
        let fresh = (0..count)
            .map(|_| Image::try_new(width, height).map(Mutex::new))
            .collect::<Option<Vec<_>>>()
            .ok_or(RenderError::Prepare {
                count,
                width,
                height,
            })?;
        *self.buffers.write() = fresh;
        tracing::debug!(count, width, height, "render buffers prepared");
        Ok(())
    }

    fn with_buffer_painter(
        &self,
        index: usize,
        tile: PixelRect,
        paint: &mut dyn FnMut(&mut Painter<'_>),
    ) -> Result<(), RenderError> {
        let buffers = self.buffers.read();
        let mut buffer = buffers.get(index).ok_or(RenderError::NoSuchBuffer(index))?.lock();
        paint_tile(&mut *buffer, tile, paint);
        Ok(())
    }

    fn async_flush_buffer(&self, index: usize, tile: PixelRect) -> Result<(), RenderError> {
        let buffers = self.buffers.read();
        let buffer = buffers.get(index).ok_or(RenderError::NoSuchBuffer(index))?.lock();
        self.frame
            .lock()
            .copy_from(&buffer, tile.width, tile.height, tile.x, tile.y);
        self.flushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgba(255, 0, 0, 255);

    #[test]
    fn fills_are_clipped_to_the_image() {
        let mut image = Image::new(4, 4);
        image.fill_span_rect(-2, 2, 4, 10, RED);
        assert_eq!(image.pixel(0, 2), RED);
        assert_eq!(image.pixel(1, 3), RED);
        assert_eq!(image.pixel(2, 2), Color::TRANSPARENT);
        assert_eq!(image.pixel(0, 1), Color::TRANSPARENT);
    }

    #[test]
    fn translucent_fills_blend() {
        let mut image = Image::new(1, 1);
        image.fill(Color::WHITE);
        image.fill_span_rect(0, 0, 1, 1, Color::rgba(0, 0, 0, 128));
        let px = image.pixel(0, 0);
        assert!(px.is_opaque(), "blending over opaque stays opaque");
        assert!(px.red() > 100 && px.red() < 150, "half grey, got {px:?}");
    }

    #[test]
    fn copies_land_at_the_destination() {
        let mut src = Image::new(2, 2);
        src.fill(RED);
        let mut dst = Image::new(4, 4);
        dst.copy_from(&src, 2, 2, 3, -1);
        assert_eq!(dst.pixel(3, 0), RED);
        assert_eq!(dst.pixel(2, 0), Color::TRANSPARENT);
        assert_eq!(dst.pixel(3, 1), Color::TRANSPARENT);
    }

    #[test]
    fn tiles_paint_in_view_pixels_and_flush_back() {
        let backend = HeadlessBackend::new(8, 8);
        backend.prepare_buffers(2, 4, 2).unwrap();
        let tile = PixelRect::new(4, 6, 4, 2);
        backend
            .with_buffer_painter(1, tile, &mut |p| {
                assert_eq!(p.user_clip_rect(), tile.to_rect());
                p.paint_rect(0.0, 0.0, 8.0, 8.0, RED);
            })
            .unwrap();
        backend.async_flush_buffer(1, tile).unwrap();

        let frame = backend.frame();
        assert_eq!(frame.pixel(4, 6), RED);
        assert_eq!(frame.pixel(7, 7), RED);
        assert_eq!(frame.pixel(3, 6), Color::TRANSPARENT, "paint is clipped to the tile");
        assert_eq!(frame.pixel(4, 5), Color::TRANSPARENT, "paint is clipped to the tile");
        assert_eq!(backend.flushed_tiles(), 1);
    }

    #[test]
    fn unknown_buffers_are_rejected() {
        let backend = HeadlessBackend::new(8, 8);
        let err = backend.async_flush_buffer(0, PixelRect::new(0, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, RenderError::NoSuchBuffer(0)), "got {err}");
    }
}
