// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Per-tile events ([`on_tiles`](TraceSink::on_tiles)) store only the count.

use eagle_core::time::HostTime;
use eagle_core::trace::{
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, RenderPassEvent, RenderSummary, TileEvent,
    TimeSliceEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_TIME_SLICE: u8 = 1;
const TAG_RENDER_PASS: u8 = 2;
const TAG_PHASE_BEGIN: u8 = 3;
const TAG_PHASE_END: u8 = 4;
const TAG_RENDER_SUMMARY: u8 = 5;
const TAG_TILES_COUNT: u8 = 6;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_time(&mut self, t: HostTime) {
        self.write_u64(t.millis());
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Prepare => 0,
            PhaseKind::Paint => 1,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_time_slice(&mut self, e: &TimeSliceEvent) {
        self.write_u8(TAG_TIME_SLICE);
        self.write_u64(e.slice);
        self.write_u32(e.engines_cycled);
        self.write_time(e.start);
        self.write_time(e.end);
    }

    fn on_render_pass(&mut self, e: &RenderPassEvent) {
        self.write_u8(TAG_RENDER_PASS);
        self.write_u64(e.pass);
        self.write_u32(e.tile_count);
        self.write_u32(e.buffer_count);
        self.write_u32(e.thread_count);
        self.write_time(e.timestamp);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.pass);
        self.write_phase(e.phase);
        self.write_time(e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.pass);
        self.write_phase(e.phase);
        self.write_time(e.timestamp);
    }

    fn on_render_summary(&mut self, s: &RenderSummary) {
        self.write_u8(TAG_RENDER_SUMMARY);
        self.write_u64(s.pass);
        self.write_u32(s.tile_count);
        self.write_u32(s.buffer_count);
        self.write_u32(s.thread_count);
        self.write_u64(s.prepare_ms);
        self.write_u64(s.paint_ms);
    }

    fn on_tiles(&mut self, pass: u64, tiles: &[TileEvent]) {
        self.write_u8(TAG_TILES_COUNT);
        self.write_u64(pass);
        self.write_u32(u32::try_from(tiles.len()).unwrap_or(u32::MAX));
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`TimeSliceEvent`].
    TimeSlice(TimeSliceEvent),
    /// A [`RenderPassEvent`].
    RenderPass(RenderPassEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`RenderSummary`].
    RenderSummary(RenderSummary),
    /// Painted-tile count for a render pass.
    TilesCount {
        /// Render pass counter.
        pass: u64,
        /// Number of tiles painted.
        count: u32,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Prepare,
            _ => PhaseKind::Paint,
        })
    }

    fn decode_time_slice(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TimeSlice(TimeSliceEvent {
            slice: self.read_u64()?,
            engines_cycled: self.read_u32()?,
            start: self.read_time()?,
            end: self.read_time()?,
        }))
    }

    fn decode_render_pass(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RenderPass(RenderPassEvent {
            pass: self.read_u64()?,
            tile_count: self.read_u32()?,
            buffer_count: self.read_u32()?,
            thread_count: self.read_u32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            pass: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            pass: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_render_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RenderSummary(RenderSummary {
            pass: self.read_u64()?,
            tile_count: self.read_u32()?,
            buffer_count: self.read_u32()?,
            thread_count: self.read_u32()?,
            prepare_ms: self.read_u64()?,
            paint_ms: self.read_u64()?,
        }))
    }

    fn decode_tiles_count(&mut self) -> Option<RecordedEvent> {
        let pass = self.read_u64()?;
        let count = self.read_u32()?;
        Some(RecordedEvent::TilesCount { pass, count })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_TIME_SLICE => self.decode_time_slice(),
            TAG_RENDER_PASS => self.decode_render_pass(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_RENDER_SUMMARY => self.decode_render_summary(),
            TAG_TILES_COUNT => self.decode_tiles_count(),
            _ => None, // unknown tag → stop iteration
        }
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
            pass: 7,
            tile_count: 24,
            buffer_count: 4,
            thread_count: 4,
            timestamp: HostTime(1_000),
        }
    }

    #[test]
    fn records_a_whole_render_pass() {
        let mut rec = RecorderSink::new();
        rec.on_time_slice(&TimeSliceEvent {
            slice: 3,
            engines_cycled: 5,
            start: HostTime(990),
            end: HostTime(999),
        });
        rec.on_render_pass(&sample_pass());
        rec.on_phase_begin(&PhaseBeginEvent {
            pass: 7,
            phase: PhaseKind::Paint,
            timestamp: HostTime(1_001),
        });
        rec.on_phase_end(&PhaseEndEvent {
            pass: 7,
            phase: PhaseKind::Paint,
            timestamp: HostTime(1_009),
        });
        rec.on_render_summary(&RenderSummary {
            pass: 7,
            tile_count: 24,
            buffer_count: 4,
            thread_count: 4,
            prepare_ms: 0,
            paint_ms: 8,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 5);
        match &events[0] {
            RecordedEvent::TimeSlice(e) => {
                assert_eq!(e.slice, 3);
                assert_eq!(e.engines_cycled, 5);
                assert_eq!(e.end, HostTime(999));
            }
            other => panic!("expected TimeSlice, got {other:?}"),
        }
        match &events[1] {
            RecordedEvent::RenderPass(e) => {
                assert_eq!(e.pass, 7);
                assert_eq!(e.tile_count, 24);
                assert_eq!(e.timestamp, HostTime(1_000));
            }
            other => panic!("expected RenderPass, got {other:?}"),
        }
        match &events[3] {
            RecordedEvent::PhaseEnd(e) => {
                assert_eq!(e.phase, PhaseKind::Paint);
                assert_eq!(e.timestamp, HostTime(1_009));
            }
            other => panic!("expected PhaseEnd, got {other:?}"),
        }
        match &events[4] {
            RecordedEvent::RenderSummary(s) => {
                assert_eq!(s.paint_ms, 8);
                assert_eq!(s.thread_count, 4);
            }
            other => panic!("expected RenderSummary, got {other:?}"),
        }
    }

    #[test]
    fn tiles_are_recorded_as_a_count() {
        let mut rec = RecorderSink::new();
        let tile = TileEvent {
            buffer: 0,
            x: 0,
            y: 32,
            width: 4096,
            height: 32,
        };
        rec.on_tiles(42, &[tile, tile, tile]);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        match events.as_slice() {
            [RecordedEvent::TilesCount { pass, count }] => {
                assert_eq!(*pass, 42);
                assert_eq!(*count, 3);
            }
            other => panic!("expected one TilesCount, got {other:?}"),
        }
    }

    #[test]
    fn truncated_record_ends_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_render_pass(&sample_pass());
        rec.on_render_pass(&sample_pass());
        let bytes = rec.into_bytes();
        let events: Vec<_> = decode(&bytes[..bytes.len() - 3]).collect();
        assert_eq!(events.len(), 1, "the cut record is dropped");
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }
}
