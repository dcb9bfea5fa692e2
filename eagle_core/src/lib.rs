// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative scheduler, models, panel tree and zoomable view.
//!
//! `eagle_core` is the single-threaded heart of a zoomable user interface.
//! Everything runs in time slices of a [`Scheduler`](scheduler::Scheduler);
//! work is done by engines woken by signals, and the one piece of shared
//! state other threads touch is a view behind its lock.
//!
//! # Architecture
//!
//! ```text
//!   Scheduler::do_time_slice()
//!       │  pending signals ─► wake subscribed engines
//!       ▼
//!   engines, highest priority first
//!       │
//!       ├─► Timer engine ──────────► timer signals
//!       ├─► Context engine ────────► model garbage collection
//!       └─► View update engine ────► notices, auto-expansion, layout
//!                                        │
//!                                        ▼
//!                                   invalid region ─► repaint signal
//! ```
//!
//! **[`scheduler`]** — Engines in five priority classes, signals with
//! clock-ordered delivery, and a [`SchedulerHandle`](scheduler::SchedulerHandle)
//! for other threads.
//!
//! **[`timer`]** — One-shot and periodic timers that fire signals.
//!
//! **[`model`]** / **[`context`]** — Named, shared, reference-counted models
//! in a tree of contexts, with lifetime-based garbage collection.
//!
//! **[`config`]** — The core configuration model, loaded from JSON.
//!
//! **[`panel`]** — Panel handles, the behavior traits and notice flags.
//!
//! **[`view`]** — The view: panel tree, visiting, auto-expansion, input
//! dispatch and painting. Views nest through
//! [`SubViewPanel`](view::SubViewPanel).
//!
//! **[`job`]** — Prioritized job queues for background work.
//!
//! **[`paint`]** / **[`damage`]** — The painter and canvas abstraction, and
//! the invalid region of a view.
//!
//! **[`trace`]** — Typed diagnostics events for time slices and render
//! passes, with a zero-overhead [`Tracer`](trace::Tracer).
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-tile
//!   render events.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod context;
pub mod damage;
pub mod input;
pub mod job;
pub mod model;
pub mod paint;
pub mod panel;
pub mod scheduler;
pub mod time;
pub mod timer;
pub mod trace;
pub mod view;
