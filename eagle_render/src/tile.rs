// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use eagle_core::damage::PixelRect;

/// Size of one render buffer, which bounds the size of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileConfig {
    /// Buffer width in pixels.
    pub width: u32,
    /// Buffer height in pixels.
    pub height: u32,
}

impl TileConfig {
    /// Wide, flat buffers: whole screen rows, 32 at a time.
    pub const DEFAULT: Self = Self::new(4096, 32);

    /// A buffer size of at least one pixel per axis.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width: if width == 0 { 1 } else { width },
            height: if height == 0 { 1 } else { height },
        }
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Splits `rect` into tiles of at most the buffer size, row by row.
///
/// The tiles are disjoint and their union is `rect`. Tiles at the right and
/// bottom edges are cut to fit.
#[must_use]
pub fn tile_rects(rect: PixelRect, config: TileConfig) -> Vec<PixelRect> {
    let mut tiles = Vec::new();
    if rect.is_empty() {
        return tiles;
    }
    let (right, bottom) = (rect.right(), rect.bottom());
    let mut y = rect.y;
    while y < bottom {
        let height = config.height.min(y.abs_diff(bottom));
        let mut x = rect.x;
        while x < right {
            let width = config.width.min(x.abs_diff(right));
            tiles.push(PixelRect::new(x, y, width, height));
            x = x.saturating_add_unsigned(width);
        }
        y = y.saturating_add_unsigned(height);
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_rows_of_default_height() {
        let tiles = tile_rects(PixelRect::new(0, 0, 4096, 100), TileConfig::DEFAULT);
        let heights: Vec<u32> = tiles.iter().map(|t| t.height).collect();
        assert_eq!(heights, [32, 32, 32, 4]);
        assert!(
            tiles.iter().all(|t| t.x == 0 && t.width == 4096),
            "every tile spans the full width"
        );
        assert_eq!(tiles[3].y, 96);
    }

    #[test]
    fn tiles_run_row_major() {
        let tiles = tile_rects(PixelRect::new(-5, 10, 25, 15), TileConfig::new(10, 8));
        let origins: Vec<(i32, i32)> = tiles.iter().map(|t| (t.x, t.y)).collect();
        assert_eq!(origins, [(-5, 10), (5, 10), (15, 10), (-5, 18), (5, 18), (15, 18)]);
        assert_eq!(tiles[2].width, 5, "right edge is cut");
        assert_eq!(tiles[5].height, 7, "bottom edge is cut");
    }

    #[test]
    fn empty_rect_has_no_tiles() {
        assert!(tile_rects(PixelRect::new(3, 3, 0, 9), TileConfig::DEFAULT).is_empty());
    }

    #[test]
    fn zero_sized_buffers_are_widened() {
        assert_eq!(TileConfig::new(0, 0), TileConfig::new(1, 1));
    }
}
