// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The output contract of the view renderer.

use eagle_core::damage::PixelRect;
use eagle_core::paint::{Canvas, Painter};
use kurbo::{Rect, Vec2};

use crate::error::RenderError;

/// Render buffers and their output.
///
/// The renderer owns buffer `i` exclusively from invocation `i` of a
/// parallel call, so implementations only need to synchronize access to
/// state shared between buffers, such as the final frame.
///
/// Coordinates are view pixels throughout: a tile at `(x, y)` is painted
/// into the top-left corner of its buffer and flushed back to `(x, y)`.
pub trait RenderBackend: Send + Sync {
    /// (Re)allocates `count` buffers of `width` x `height` pixels.
    ///
    /// Called before the first pass and whenever the number of render
    /// threads changes.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Prepare`] if the buffers cannot be allocated.
    fn prepare_buffers(&self, count: usize, width: u32, height: u32) -> Result<(), RenderError>;

    /// Lends `paint` a painter on buffer `index` whose user coordinates are
    /// view pixels and whose clip is `tile`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NoSuchBuffer`] for an index outside the
    /// prepared range.
    fn with_buffer_painter(
        &self,
        index: usize,
        tile: PixelRect,
        paint: &mut dyn FnMut(&mut Painter<'_>),
    ) -> Result<(), RenderError>;

    /// Hands the painted `tile` of buffer `index` to the output.
    ///
    /// The call may return before the output is updated, but the buffer must
    /// be reusable once it returns.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Flush`] if the output rejects the tile.
    fn async_flush_buffer(&self, index: usize, tile: PixelRect) -> Result<(), RenderError>;
}

/// Runs `paint` with a painter mapping `tile` onto the top-left corner of
/// `buffer`.
///
/// Helper for [`RenderBackend::with_buffer_painter`] implementations backed
/// by a [`Canvas`].
pub fn paint_tile(buffer: &mut dyn Canvas, tile: PixelRect, paint: &mut dyn FnMut(&mut Painter<'_>)) {
    let mut painter = Painter::with_offset(buffer, Vec2::new(f64::from(tile.x), f64::from(tile.y)));
    let origin = painter.origin();
    let clip = Rect::new(0.0, 0.0, f64::from(tile.width), f64::from(tile.height));
    let mut painter = painter.with_clip_and_transform(clip, origin, Vec2::new(1.0, 1.0));
    paint(&mut painter);
}
