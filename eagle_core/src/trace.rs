// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for time slices and render passes.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the scheduler and the view renderer call at each stage. All method bodies
//! default to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! [`RenderSummaryBuilder`] is a convenience helper that collects phase
//! timestamps during a render pass and produces a [`RenderSummary`] at the
//! end.
//!
//! This is separate from the `tracing` log output: events here are typed,
//! fixed-shape records meant for recording and timeline export.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) — gates per-tile [`TileEvent`] records
//!   plus the corresponding `TraceSink` method.

use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a render pass is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// (Re)allocating render buffers.
    Prepare,
    /// Painting and flushing tiles.
    Paint,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after the scheduler finishes a time slice.
#[derive(Clone, Copy, Debug)]
pub struct TimeSliceEvent {
    /// Monotonic time slice counter.
    pub slice: u64,
    /// Number of engine cycles run during the slice.
    pub engines_cycled: u32,
    /// Time when the slice started.
    pub start: HostTime,
    /// Time when the slice ended.
    pub end: HostTime,
}

/// Marks the beginning of a render-pass phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Render pass counter.
    pub pass: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a render-pass phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Render pass counter.
    pub pass: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted once per render pass, before painting starts.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassEvent {
    /// Render pass counter.
    pub pass: u64,
    /// Number of tiles the invalid region was split into.
    pub tile_count: u32,
    /// Number of render buffers in use.
    pub buffer_count: u32,
    /// Number of threads painting (including the caller).
    pub thread_count: u32,
    /// Time when the pass started.
    pub timestamp: HostTime,
}

/// Per-pass timing summary produced by [`RenderSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct RenderSummary {
    /// Render pass counter.
    pub pass: u64,
    /// Number of tiles painted.
    pub tile_count: u32,
    /// Number of render buffers in use.
    pub buffer_count: u32,
    /// Number of threads painting.
    pub thread_count: u32,
    /// Prepare phase duration in milliseconds (0 if not measured).
    pub prepare_ms: u64,
    /// Paint phase duration in milliseconds (0 if not measured).
    pub paint_ms: u64,
}

/// One painted tile.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct TileEvent {
    /// Buffer the tile was painted into.
    pub buffer: u32,
    /// Left edge in view pixels.
    pub x: i32,
    /// Top edge in view pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the scheduler and renderer.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after each time slice.
    fn on_time_slice(&mut self, e: &TimeSliceEvent) {
        _ = e;
    }

    /// Called when a render pass starts.
    fn on_render_pass(&mut self, e: &RenderPassEvent) {
        _ = e;
    }

    /// Called at the beginning of a render-pass phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a render-pass phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called with a per-pass timing summary.
    fn on_render_summary(&mut self, s: &RenderSummary) {
        _ = s;
    }

    /// Called with the tiles of a render pass (requires `trace-rich`
    /// feature).
    #[cfg(feature = "trace-rich")]
    fn on_tiles(&mut self, pass: u64, tiles: &[TileEvent]) {
        _ = (pass, tiles);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Whether events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Emits a [`TimeSliceEvent`].
    #[inline]
    pub fn time_slice(&mut self, e: &TimeSliceEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_time_slice(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RenderPassEvent`].
    #[inline]
    pub fn render_pass(&mut self, e: &RenderPassEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_render_pass(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RenderSummary`].
    #[inline]
    pub fn render_summary(&mut self, s: &RenderSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_render_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }

    /// Emits the tiles of a render pass (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn tiles(&mut self, pass: u64, tiles: &[TileEvent]) {
        if let Some(s) = &mut self.sink {
            s.on_tiles(pass, tiles);
        }
    }
}

// ---------------------------------------------------------------------------
// RenderSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a render pass and produces a
/// [`RenderSummary`].
#[derive(Debug)]
pub struct RenderSummaryBuilder {
    pass: RenderPassEvent,
    phase_starts: [Option<HostTime>; 2],
    phase_ends: [Option<HostTime>; 2],
}

impl RenderSummaryBuilder {
    /// Starts building a summary for the given pass.
    #[must_use]
    pub fn new(pass: &RenderPassEvent) -> Self {
        Self {
            pass: *pass,
            phase_starts: [None; 2],
            phase_ends: [None; 2],
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Consumes the builder and produces the final [`RenderSummary`].
    #[must_use]
    pub fn finish(self) -> RenderSummary {
        RenderSummary {
            pass: self.pass.pass,
            tile_count: self.pass.tile_count,
            buffer_count: self.pass.buffer_count,
            thread_count: self.pass.thread_count,
            prepare_ms: self.phase_duration(PhaseKind::Prepare),
            paint_ms: self.phase_duration(PhaseKind::Paint),
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).millis(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Prepare => 0,
        PhaseKind::Paint => 1,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pass() -> RenderPassEvent {
        RenderPassEvent {
            pass: 42,
            tile_count: 12,
            buffer_count: 4,
            thread_count: 4,
            timestamp: HostTime(1_000),
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_render_pass(&sample_pass());
        sink.on_time_slice(&TimeSliceEvent {
            slice: 1,
            engines_cycled: 0,
            start: HostTime(0),
            end: HostTime(0),
        });
        sink.on_render_summary(&RenderSummaryBuilder::new(&sample_pass()).finish());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        assert!(!tracer.is_active());
        tracer.render_pass(&sample_pass());
    }

    #[test]
    fn summary_builder_computes_durations() {
        let mut builder = RenderSummaryBuilder::new(&sample_pass());
        builder.phase_begin(PhaseKind::Prepare, HostTime(1_000));
        builder.phase_end(PhaseKind::Prepare, HostTime(1_003));
        builder.phase_begin(PhaseKind::Paint, HostTime(1_003));
        builder.phase_end(PhaseKind::Paint, HostTime(1_020));

        let summary = builder.finish();
        assert_eq!(summary.prepare_ms, 3);
        assert_eq!(summary.paint_ms, 17);
        assert_eq!(summary.pass, 42);
        assert_eq!(summary.tile_count, 12);
    }

    #[test]
    fn summary_builder_missing_phases_are_zero() {
        let summary = RenderSummaryBuilder::new(&sample_pass()).finish();
        assert_eq!(summary.prepare_ms, 0);
        assert_eq!(summary.paint_ms, 0);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        struct RecordingSink {
            slices: Vec<u64>,
        }
        impl TraceSink for RecordingSink {
            fn on_time_slice(&mut self, e: &TimeSliceEvent) {
                self.slices.push(e.slice);
            }
        }

        let mut sink = RecordingSink { slices: Vec::new() };
        let mut sched = crate::scheduler::Scheduler::new();
        let mut tracer = Tracer::new(&mut sink);
        sched.do_time_slice_traced(&mut tracer);
        sched.do_time_slice_traced(&mut tracer);
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.slices, &[1, 2]);
    }
}
