// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads events recorded by a
//! [`RecorderSink`](super::recorder::RecorderSink) and writes
//! [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Each client is a separate process (`pid`) in the viewer, so several
//! recordings can be merged into one file with [`export_clients`].
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use sigil_core::reconcile::ReconcileOutcome;
use sigil_core::time::{HostTime, Timebase};

use crate::recorder::RecordedEvent;

// Readiness and drain events share a thread; reconcile and placement get
// their own so the viewer can separate them.
const TID_GATE: u32 = 0;
const TID_RECONCILE: u32 = 1;
const TID_PLACEMENT: u32 = 2;

/// Exports one client's recording as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(
    events: &[RecordedEvent],
    timebase: Timebase,
    writer: &mut dyn Write,
) -> io::Result<()> {
    export_clients(&[events], timebase, writer)
}

/// Exports several clients' recordings into one trace. Client `i` becomes
/// process `i`.
pub fn export_clients(
    clients: &[&[RecordedEvent]],
    timebase: Timebase,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let mut out: Vec<Value> = Vec::new();
    for (pid, events) in clients.iter().enumerate() {
        // Buffered and reconcile events carry no timestamp; they inherit the
        // most recent one seen on the same client.
        let mut last = HostTime::default();
        for recorded in *events {
            out.push(to_json(recorded, pid, &mut last, timebase));
        }
    }
    serde_json::to_writer_pretty(writer, &out)?;
    Ok(())
}

fn to_json(
    recorded: &RecordedEvent,
    pid: usize,
    last: &mut HostTime,
    timebase: Timebase,
) -> Value {
    match recorded {
        RecordedEvent::Readiness(e) => {
            *last = e.now;
            json!({
                "ph": "i",
                "name": format!("{:?}", e.to),
                "cat": "Readiness",
                "ts": timebase.micros(e.now),
                "pid": pid,
                "tid": TID_GATE,
                "s": "p",
                "args": {
                    "frame_index": e.frame_index,
                    "from": format!("{:?}", e.from),
                }
            })
        }
        RecordedEvent::Buffered(e) => json!({
            "ph": "i",
            "name": "Buffered",
            "cat": "Backlog",
            "ts": timebase.micros(*last),
            "pid": pid,
            "tid": TID_GATE,
            "s": "t",
            "args": {
                "frame_index": e.frame_index,
                "entity": e.entity.as_str(),
                "backlog_len": e.backlog_len,
            }
        }),
        RecordedEvent::DrainPass(e) => {
            *last = e.now;
            json!({
                "ph": "C",
                "name": "Backlog",
                "cat": "Backlog",
                "ts": timebase.micros(e.now),
                "pid": pid,
                "tid": TID_GATE,
                "args": {
                    "applied": e.report.applied,
                    "remaining": e.report.remaining,
                }
            })
        }
        RecordedEvent::Abandoned(e) => {
            *last = e.now;
            json!({
                "ph": "i",
                "name": "Abandoned",
                "cat": "Backlog",
                "ts": timebase.micros(e.now),
                "pid": pid,
                "tid": TID_GATE,
                "s": "p",
                "args": {
                    "frame_index": e.frame_index,
                    "passes": e.passes,
                    "dropped": e.dropped,
                }
            })
        }
        RecordedEvent::Reconcile(e) => {
            let (outcome, slots, clamped) = match e.outcome {
                Some(ReconcileOutcome::Cleared) => ("cleared", 0, 0),
                Some(ReconcileOutcome::Rebuilt { slots, clamped }) => ("rebuilt", slots, clamped),
                None => ("unresolved", 0, 0),
            };
            json!({
                "ph": "i",
                "name": "Reconcile",
                "cat": "Reconcile",
                "ts": timebase.micros(*last),
                "pid": pid,
                "tid": TID_RECONCILE,
                "s": "t",
                "args": {
                    "frame_index": e.frame_index,
                    "entity": e.entity.as_str(),
                    "outcome": outcome,
                    "slots": slots,
                    "clamped": clamped,
                }
            })
        }
        RecordedEvent::Placement(e) => {
            *last = e.now;
            json!({
                "ph": "i",
                "name": "Placement",
                "cat": "Placement",
                "ts": timebase.micros(e.now),
                "pid": pid,
                "tid": TID_PLACEMENT,
                "s": "t",
                "args": {
                    "frame_index": e.frame_index,
                    "yaw_degrees": e.yaw_degrees,
                    "yaw_changed": e.yaw_changed,
                    "recomputed": e.recomputed,
                    "deferred": e.deferred,
                    "poses": e.poses,
                }
            })
        }
    }
}
