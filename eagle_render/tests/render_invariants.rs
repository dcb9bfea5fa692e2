// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property tests for the render thread pool and the tiling step.
//!
//! 1. A pool without worker threads computes exactly what a pool with
//!    workers computes, for any task without cross-invocation effects.
//! 2. Tiles cover their rectangle exactly: no gaps, no overlaps, none larger
//!    than a buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use eagle_core::damage::PixelRect;
use eagle_render::{RenderThreadPool, TileConfig, tile_rects};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Runs a pure per-index function on `pool`, one output slot per index.
fn run_pure(pool: &RenderThreadPool, seed: u64, count: usize) -> Vec<u64> {
    let slots: Arc<Vec<AtomicU64>> = Arc::new((0..count).map(|_| AtomicU64::new(0)).collect());
    let out = Arc::clone(&slots);
    pool.call_parallel(
        count,
        Arc::new(move |i| {
            let mut x = seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            for _ in 0..64 {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
            }
            out[i].store(x, Ordering::Relaxed);
        }),
    );
    slots.iter().map(|s| s.load(Ordering::Relaxed)).collect()
}

fn rect_strategy() -> impl Strategy<Value = PixelRect> {
    (-300_i32..300, -300_i32..300, 0_u32..400, 0_u32..200)
        .prop_map(|(x, y, w, h)| PixelRect::new(x, y, w, h))
}

fn tile_config_strategy() -> impl Strategy<Value = TileConfig> {
    (1_u32..130, 1_u32..40).prop_map(|(w, h)| TileConfig::new(w, h))
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Degradation equivalence
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sequential_and_parallel_pools_agree(
        seed in any::<u64>(),
        count in 0_usize..200,
        workers in 1_usize..5,
    ) {
        let sequential = RenderThreadPool::new(0).unwrap();
        let parallel = RenderThreadPool::new(workers).unwrap();
        prop_assert_eq!(run_pure(&sequential, seed, count), run_pure(&parallel, seed, count));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Tile coverage and disjointness
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn tiles_cover_exactly(rect in rect_strategy(), config in tile_config_strategy()) {
        let tiles = tile_rects(rect, config);

        let area: u64 = tiles.iter().map(PixelRect::area).sum();
        prop_assert_eq!(area, rect.area(), "tile areas add up to the rectangle");

        let width = rect.width as usize;
        let mut covered = vec![0_u8; width * rect.height as usize];
        for t in &tiles {
            prop_assert!(!t.is_empty(), "empty tile {:?}", t);
            prop_assert!(rect.contains_rect(t), "tile {:?} leaves {:?}", t, rect);
            prop_assert!(
                t.width <= config.width && t.height <= config.height,
                "tile {:?} exceeds the buffer", t
            );
            let (x0, y0) = (t.x.abs_diff(rect.x) as usize, t.y.abs_diff(rect.y) as usize);
            for y in y0..y0 + t.height as usize {
                for x in x0..x0 + t.width as usize {
                    covered[y * width + x] += 1;
                }
            }
        }
        prop_assert!(covered.iter().all(|&c| c == 1), "every pixel is covered exactly once");
    }

    #[test]
    fn tiles_are_row_major(rect in rect_strategy(), config in tile_config_strategy()) {
        let tiles = tile_rects(rect, config);
        for pair in tiles.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(
                (a.y, a.x) < (b.y, b.x),
                "{:?} comes before {:?}", a, b
            );
        }
    }
}
