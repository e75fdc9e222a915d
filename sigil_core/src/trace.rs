// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured instrumentation for the marker subsystem.
//!
//! This module provides a [`TraceSink`] trait with one method per event the
//! [`MarkerSystem`](crate::driver::MarkerSystem) reports. All method bodies
//! default to no-ops, so implementing only the events you care about is
//! fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`; each method performs a
//! single `Option` branch before dispatching. Every entry point on the
//! system has a `*_traced` variant taking a `&mut Tracer<'_>`; the plain
//! variant passes [`Tracer::none`].
//!
//! Sinks live in `sigil_debug`. Line-oriented logging goes through
//! `tracing` independently of this module.

use crate::backlog::DrainReport;
use crate::entity::EntityId;
use crate::readiness::ReadinessState;
use crate::reconcile::ReconcileOutcome;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the readiness gate changes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Host time of the tick.
    pub now: HostTime,
    /// State before the change.
    pub from: ReadinessState,
    /// State after the change.
    pub to: ReadinessState,
}

/// Emitted when a notification is held in the backlog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedEvent {
    /// Tick counter at receipt.
    pub frame_index: u64,
    /// Entity the notification targets.
    pub entity: EntityId,
    /// Backlog length after buffering.
    pub backlog_len: usize,
}

/// Emitted after every backlog drain pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainPassEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Host time of the pass.
    pub now: HostTime,
    /// Pass counts.
    pub report: DrainReport,
}

/// Emitted once when the backlog is discarded at the pass ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbandonedEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Host time of the final pass.
    pub now: HostTime,
    /// Passes run before giving up.
    pub passes: u32,
    /// Notifications discarded.
    pub dropped: usize,
}

/// Emitted for every reconcile attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Entity reconciled.
    pub entity: EntityId,
    /// What happened, or `None` if the entity could not be resolved.
    pub outcome: Option<ReconcileOutcome>,
}

/// Emitted after each lazy placement pass on a `Ready` tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementEvent {
    /// Tick counter.
    pub frame_index: u64,
    /// Host time of the tick.
    pub now: HostTime,
    /// Camera yaw used, in degrees.
    pub yaw_degrees: f64,
    /// Whether the yaw changed since the previous sample.
    pub yaw_changed: bool,
    /// Entities repositioned.
    pub recomputed: usize,
    /// Entities deferred because their anchor could not be resolved.
    pub deferred: usize,
    /// `set_pose` calls issued.
    pub poses: usize,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives instrumentation events from the marker system.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when the readiness gate changes state.
    fn on_readiness(&mut self, e: &ReadinessEvent) {
        _ = e;
    }
    /// Called when a notification is buffered.
    fn on_buffered(&mut self, e: &BufferedEvent) {
        _ = e;
    }
    /// Called after every drain pass.
    fn on_drain_pass(&mut self, e: &DrainPassEvent) {
        _ = e;
    }
    /// Called when the backlog is abandoned.
    fn on_abandoned(&mut self, e: &AbandonedEvent) {
        _ = e;
    }
    /// Called for every reconcile attempt.
    fn on_reconcile(&mut self, e: &ReconcileEvent) {
        _ = e;
    }
    /// Called after each placement pass.
    fn on_placement(&mut self, e: &PlacementEvent) {
        _ = e;
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
// Tracer
// ---------------------------------------------------------------------------

/// Optional dispatch wrapper around a [`TraceSink`].
pub struct Tracer<'a> {
    sink: Option<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("active", &self.sink.is_some())
            .finish()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self { sink: None }
    }

    /// Whether events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Dispatches a readiness event.
    #[inline]
    pub fn readiness(&mut self, e: &ReadinessEvent) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_readiness(e);
        }
    }

    /// Dispatches a buffered event.
    #[inline]
    pub fn buffered(&mut self, e: &BufferedEvent) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_buffered(e);
        }
    }

    /// Dispatches a drain pass event.
    #[inline]
    pub fn drain_pass(&mut self, e: &DrainPassEvent) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_drain_pass(e);
        }
    }

    /// Dispatches an abandoned event.
    #[inline]
    pub fn abandoned(&mut self, e: &AbandonedEvent) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_abandoned(e);
        }
    }

    /// Dispatches a reconcile event.
    #[inline]
    pub fn reconcile(&mut self, e: &ReconcileEvent) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_reconcile(e);
        }
    }

    /// Dispatches a placement event.
    #[inline]
    pub fn placement(&mut self, e: &PlacementEvent) {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_placement(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        readiness: usize,
        abandoned: usize,
    }

    impl TraceSink for Counter {
        fn on_readiness(&mut self, _: &ReadinessEvent) {
            self.readiness += 1;
        }
        fn on_abandoned(&mut self, _: &AbandonedEvent) {
            self.abandoned += 1;
        }
    }

    #[test]
    fn tracer_dispatches_to_sink() {
        let mut counter = Counter::default();
        {
            let mut tracer = Tracer::new(&mut counter);
            assert!(tracer.is_active());
            tracer.readiness(&ReadinessEvent {
                frame_index: 1,
                now: HostTime(0),
                from: ReadinessState::NotReady,
                to: ReadinessState::BuildDelay,
            });
            tracer.abandoned(&AbandonedEvent {
                frame_index: 2,
                now: HostTime(1),
                passes: 10,
                dropped: 1,
            });
            // Unimplemented methods fall through to the no-op default.
            tracer.drain_pass(&DrainPassEvent {
                frame_index: 2,
                now: HostTime(1),
                report: DrainReport::default(),
            });
        }
        assert_eq!(counter.readiness, 1);
        assert_eq!(counter.abandoned, 1);
    }

    #[test]
    fn none_discards() {
        let mut tracer = Tracer::none();
        assert!(!tracer.is_active());
        tracer.abandoned(&AbandonedEvent {
            frame_index: 0,
            now: HostTime(0),
            passes: 0,
            dropped: 0,
        });
        assert_eq!(format!("{tracer:?}"), "Tracer { active: false }");
    }
}
