// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parallel, tiled painting of [`eagle_core`] views.
//!
//! The invalid region of a view is cut into tiles no larger than one render
//! buffer. Every thread of a [`RenderThreadPool`] owns one buffer and claims
//! tiles until none are left; each tile is painted under the view lock and
//! then flushed to the output while the lock is free for the next painter.
//!
//! ```text
//!   View::take_invalid_region()
//!       │
//!       ▼
//!   tile_rects() ──► [tile, tile, tile, ...]   (row-major)
//!                         │
//!         RenderThreadPool::call_parallel(threads)
//!                         │
//!        ┌────────────────┼────────────────┐
//!        ▼                ▼                ▼
//!    buffer 0         buffer 1         buffer n
//!    paint + flush    paint + flush    paint + flush
//! ```
//!
//! - [`RenderThreadPool`] — worker threads sized from the core config.
//! - [`ViewRenderer`] — splits damage into tiles and drives the pool.
//! - [`RenderBackend`] — where buffers live and where tiles go.
//! - [`HeadlessBackend`] — an in-memory backend composing a frame [`Image`].
//! - [`ViewPort`] — an engine repainting a view whenever it is damaged.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Forwards to `eagle_core/trace`; render
//!   passes report to a [`Tracer`](eagle_core::trace::Tracer).
//! - `trace-rich` (disabled by default, implies `trace`): Also reports every
//!   painted tile.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod backend;
mod error;
mod image;
mod pool;
mod port;
mod renderer;
mod tile;

pub use backend::{RenderBackend, paint_tile};
pub use error::{PoolError, RenderError};
pub use image::{HeadlessBackend, Image};
pub use pool::{ParallelTask, RenderThreadPool};
pub use port::ViewPort;
pub use renderer::ViewRenderer;
pub use tile::{TileConfig, tile_rects};
