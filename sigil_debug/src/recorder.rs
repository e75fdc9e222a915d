// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory event recording.
//!
//! [`RecorderSink`] implements [`TraceSink`] and keeps every event as an
//! owned [`RecordedEvent`], in arrival order. Recordings feed
//! [`chrome::export`](crate::chrome::export) and test assertions.

use sigil_core::trace::{
    AbandonedEvent, BufferedEvent, DrainPassEvent, PlacementEvent, ReadinessEvent, ReconcileEvent,
    TraceSink,
};

/// A recorded trace event.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`ReadinessEvent`].
    Readiness(ReadinessEvent),
    /// A [`BufferedEvent`].
    Buffered(BufferedEvent),
    /// A [`DrainPassEvent`].
    DrainPass(DrainPassEvent),
    /// An [`AbandonedEvent`].
    Abandoned(AbandonedEvent),
    /// A [`ReconcileEvent`].
    Reconcile(ReconcileEvent),
    /// A [`PlacementEvent`].
    Placement(PlacementEvent),
}

impl RecordedEvent {
    /// Tick counter the event was emitted on.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        match self {
            Self::Readiness(e) => e.frame_index,
            Self::Buffered(e) => e.frame_index,
            Self::DrainPass(e) => e.frame_index,
            Self::Abandoned(e) => e.frame_index,
            Self::Reconcile(e) => e.frame_index,
            Self::Placement(e) => e.frame_index,
        }
    }

    /// Re-sends the event to another sink.
    pub fn replay(&self, sink: &mut dyn TraceSink) {
        match self {
            Self::Readiness(e) => sink.on_readiness(e),
            Self::Buffered(e) => sink.on_buffered(e),
            Self::DrainPass(e) => sink.on_drain_pass(e),
            Self::Abandoned(e) => sink.on_abandoned(e),
            Self::Reconcile(e) => sink.on_reconcile(e),
            Self::Placement(e) => sink.on_placement(e),
        }
    }
}

/// A [`TraceSink`] that stores events in memory.
#[derive(Debug, Default)]
pub struct RecorderSink {
    events: Vec<RecordedEvent>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Consumes the recorder and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<RecordedEvent> {
        self.events
    }

    /// Number of recorded abandonment events.
    #[must_use]
    pub fn abandonments(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, RecordedEvent::Abandoned(_)))
            .count()
    }

    /// Discards all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl TraceSink for RecorderSink {
    fn on_readiness(&mut self, e: &ReadinessEvent) {
        self.events.push(RecordedEvent::Readiness(*e));
    }

    fn on_buffered(&mut self, e: &BufferedEvent) {
        self.events.push(RecordedEvent::Buffered(e.clone()));
    }

    fn on_drain_pass(&mut self, e: &DrainPassEvent) {
        self.events.push(RecordedEvent::DrainPass(*e));
    }

    fn on_abandoned(&mut self, e: &AbandonedEvent) {
        self.events.push(RecordedEvent::Abandoned(*e));
    }

    fn on_reconcile(&mut self, e: &ReconcileEvent) {
        self.events.push(RecordedEvent::Reconcile(e.clone()));
    }

    fn on_placement(&mut self, e: &PlacementEvent) {
        self.events.push(RecordedEvent::Placement(*e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::backlog::DrainReport;
    use sigil_core::entity::EntityId;
    use sigil_core::readiness::ReadinessState;
    use sigil_core::time::HostTime;

    #[test]
    fn records_in_arrival_order() {
        let mut rec = RecorderSink::new();
        rec.on_readiness(&ReadinessEvent {
            frame_index: 1,
            now: HostTime(10),
            from: ReadinessState::NotReady,
            to: ReadinessState::BuildDelay,
        });
        rec.on_buffered(&BufferedEvent {
            frame_index: 0,
            entity: EntityId::new("orc").unwrap(),
            backlog_len: 1,
        });
        rec.on_drain_pass(&DrainPassEvent {
            frame_index: 2,
            now: HostTime(20),
            report: DrainReport {
                pass: 1,
                applied: 1,
                remaining: 0,
            },
        });

        let frames: Vec<_> = rec.events().iter().map(RecordedEvent::frame_index).collect();
        assert_eq!(frames, [1, 0, 2]);
        assert!(matches!(rec.events()[1], RecordedEvent::Buffered(_)));
        assert_eq!(rec.abandonments(), 0);
    }

    #[test]
    fn counts_abandonments_and_clears() {
        let mut rec = RecorderSink::new();
        rec.on_abandoned(&AbandonedEvent {
            frame_index: 11,
            now: HostTime(110),
            passes: 10,
            dropped: 1,
        });
        assert_eq!(rec.abandonments(), 1);

        let mut copy = RecorderSink::new();
        for event in rec.events() {
            event.replay(&mut copy);
        }
        assert_eq!(copy.events(), rec.events());

        rec.clear();
        assert!(rec.events().is_empty());
    }
}
