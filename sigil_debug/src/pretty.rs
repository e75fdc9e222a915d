// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use sigil_core::readiness::ReadinessState;
use sigil_core::reconcile::ReconcileOutcome;
use sigil_core::time::Timebase;
use sigil_core::trace::{
    AbandonedEvent, BufferedEvent, DrainPassEvent, PlacementEvent, ReadinessEvent, ReconcileEvent,
    TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns the destination.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn state_name(state: ReadinessState) -> &'static str {
    match state {
        ReadinessState::NotReady => "not-ready",
        ReadinessState::BuildDelay => "build-delay",
        ReadinessState::Ready => "ready",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_readiness(&mut self, e: &ReadinessEvent) {
        let _ = writeln!(
            self.writer,
            "[readiness] frame={} {} -> {} at {:.1}µs",
            e.frame_index,
            state_name(e.from),
            state_name(e.to),
            self.timebase.micros(e.now),
        );
    }

    fn on_buffered(&mut self, e: &BufferedEvent) {
        let _ = writeln!(
            self.writer,
            "[buffered] frame={} entity={} backlog={}",
            e.frame_index, e.entity, e.backlog_len,
        );
    }

    fn on_drain_pass(&mut self, e: &DrainPassEvent) {
        let _ = writeln!(
            self.writer,
            "[drain] frame={} pass={} applied={} remaining={}",
            e.frame_index, e.report.pass, e.report.applied, e.report.remaining,
        );
    }

    fn on_abandoned(&mut self, e: &AbandonedEvent) {
        let _ = writeln!(
            self.writer,
            "[abandoned] frame={} passes={} dropped={} at {:.1}µs",
            e.frame_index,
            e.passes,
            e.dropped,
            self.timebase.micros(e.now),
        );
    }

    fn on_reconcile(&mut self, e: &ReconcileEvent) {
        let _ = match e.outcome {
            Some(ReconcileOutcome::Cleared) => writeln!(
                self.writer,
                "[reconcile] frame={} entity={} cleared",
                e.frame_index, e.entity,
            ),
            Some(ReconcileOutcome::Rebuilt { slots, clamped }) => writeln!(
                self.writer,
                "[reconcile] frame={} entity={} slots={slots} clamped={clamped}",
                e.frame_index, e.entity,
            ),
            None => writeln!(
                self.writer,
                "[reconcile] frame={} entity={} UNRESOLVED",
                e.frame_index, e.entity,
            ),
        };
    }

    fn on_placement(&mut self, e: &PlacementEvent) {
        let changed = if e.yaw_changed { "changed" } else { "steady" };
        let _ = writeln!(
            self.writer,
            "[placement] frame={} yaw={:.1}° ({changed}) recomputed={} deferred={} poses={}",
            e.frame_index, e.yaw_degrees, e.recomputed, e.deferred, e.poses,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::entity::EntityId;
    use sigil_core::time::HostTime;

    #[test]
    fn pretty_print_readiness() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_readiness(&ReadinessEvent {
            frame_index: 3,
            now: HostTime(2_000),
            from: ReadinessState::NotReady,
            to: ReadinessState::BuildDelay,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("[readiness]"), "got: {output}");
        assert!(output.contains("not-ready -> build-delay"), "got: {output}");
        assert!(output.contains("2.0µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_unresolved_reconcile() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_reconcile(&ReconcileEvent {
            frame_index: 9,
            entity: EntityId::new("goblin").unwrap(),
            outcome: None,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("entity=goblin UNRESOLVED"), "got: {output}");
    }
}
