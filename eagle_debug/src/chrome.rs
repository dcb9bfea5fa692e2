// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use eagle_core::time::HostTime;
use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Track of scheduler events.
const SCHEDULER_TID: u32 = 0;
/// Track of render events.
const RENDER_TID: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Time slices and render passes go to separate tracks.
///
/// # Errors
///
/// Returns any error of `writer`.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::TimeSlice(e) => {
                events.push(json!({
                    "ph": "X",
                    "name": "TimeSlice",
                    "cat": "Scheduler",
                    "ts": us(e.start),
                    "dur": us(e.end) - us(e.start),
                    "pid": 0,
                    "tid": SCHEDULER_TID,
                    "args": {
                        "slice": e.slice,
                        "engines_cycled": e.engines_cycled,
                    }
                }));
            }
            RecordedEvent::RenderPass(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "RenderPass",
                    "cat": "Render",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "s": "t",
                    "args": {
                        "pass": e.pass,
                        "tile_count": e.tile_count,
                        "buffer_count": e.buffer_count,
                        "thread_count": e.thread_count,
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Render",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "args": {
                        "pass": e.pass,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Render",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": RENDER_TID,
                    "args": {
                        "pass": e.pass,
                    }
                }));
            }
            RecordedEvent::RenderSummary(s) => {
                events.push(json!({
                    "ph": "i",
                    "name": "RenderSummary",
                    "cat": "Summary",
                    "ts": 0,
                    "pid": 0,
                    "tid": RENDER_TID,
                    "s": "g",
                    "args": {
                        "pass": s.pass,
                        "tile_count": s.tile_count,
                        "thread_count": s.thread_count,
                        "prepare_ms": s.prepare_ms,
                        "paint_ms": s.paint_ms,
                    }
                }));
            }
            RecordedEvent::TilesCount { pass, count } => {
                events.push(json!({
                    "ph": "C",
                    "name": "Tiles",
                    "cat": "Render",
                    "ts": 0,
                    "pid": 0,
                    "tid": RENDER_TID,
                    "args": {
                        "pass": pass,
                        "count": count,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn us(t: HostTime) -> u64 {
    t.millis().saturating_mul(1000)
}
