// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use eagle_core::trace::{
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, RenderPassEvent, RenderSummary, TileEvent,
    TimeSliceEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    quiet_slices: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("quiet_slices", &self.quiet_slices)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self::with_writer(writer)
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            quiet_slices: false,
        }
    }

    /// Skips time slices in which no engine ran.
    #[must_use]
    pub fn quiet_slices(mut self, quiet: bool) -> Self {
        self.quiet_slices = quiet;
        self
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Prepare => "prepare",
        PhaseKind::Paint => "paint",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_time_slice(&mut self, e: &TimeSliceEvent) {
        if self.quiet_slices && e.engines_cycled == 0 {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[slice] #{} engines={} {}ms..{}ms",
            e.slice,
            e.engines_cycled,
            e.start.millis(),
            e.end.millis(),
        );
    }

    fn on_render_pass(&mut self, e: &RenderPassEvent) {
        let _ = writeln!(
            self.writer,
            "[pass] #{} tiles={} buffers={} threads={} at {}ms",
            e.pass,
            e.tile_count,
            e.buffer_count,
            e.thread_count,
            e.timestamp.millis(),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] pass={} {} at {}ms",
            e.pass,
            phase_name(e.phase),
            e.timestamp.millis(),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] pass={} {} at {}ms",
            e.pass,
            phase_name(e.phase),
            e.timestamp.millis(),
        );
    }

    fn on_render_summary(&mut self, s: &RenderSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] pass={} tiles={} threads={} prepare={}ms paint={}ms",
            s.pass, s.tile_count, s.thread_count, s.prepare_ms, s.paint_ms,
        );
    }

    fn on_tiles(&mut self, pass: u64, tiles: &[TileEvent]) {
        let pixels: u64 = tiles
            .iter()
            .map(|t| u64::from(t.width) * u64::from(t.height))
            .sum();
        let _ = writeln!(
            self.writer,
            "[tiles] pass={pass} count={} pixels={pixels}",
            tiles.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eagle_core::time::HostTime;

    fn slice(engines_cycled: u32) -> TimeSliceEvent {
        TimeSliceEvent {
            slice: 4,
            engines_cycled,
            start: HostTime(100),
            end: HostTime(101),
        }
    }

    #[test]
    fn pretty_print_slice() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_time_slice(&slice(2));
        let output = String::from_utf8(sink.writer).unwrap();
        assert!(output.contains("[slice] #4"), "got: {output}");
        assert!(output.contains("engines=2"), "got: {output}");
    }

    #[test]
    fn quiet_sink_skips_idle_slices() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new()).quiet_slices(true);
        sink.on_time_slice(&slice(0));
        sink.on_render_summary(&RenderSummary {
            pass: 9,
            tile_count: 2,
            buffer_count: 1,
            thread_count: 1,
            prepare_ms: 1,
            paint_ms: 3,
        });
        let output = String::from_utf8(sink.writer).unwrap();
        assert!(!output.contains("[slice]"), "got: {output}");
        assert!(output.contains("paint=3ms"), "got: {output}");
    }
}
