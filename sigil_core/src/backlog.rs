// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Buffering and bounded-retry draining of change notifications.
//!
//! Notifications that arrive before the environment is ready are appended to
//! the [`Backlog`] in receipt order. Once the readiness gate enters
//! `BuildDelay` the backlog is drained in passes, one pass per elapsed
//! drain interval:
//!
//! 1. Snapshot and clear the pending entries.
//! 2. Forward each entry, in order, to the apply callback.
//! 3. Entries whose application fails are appended back for the next pass.
//!
//! Delivery is at-least-once, so the apply callback must be idempotent for
//! repeated application of the same value. After `max_passes` passes with
//! entries still pending, the remainder is dropped: liveness over
//! completeness.

use std::collections::VecDeque;

use crate::entity::EntityId;
use crate::readiness::ReadinessState;
use crate::time::{Duration, HostTime};

/// Default ceiling on drain passes before the backlog is abandoned.
pub const MAX_DRAIN_PASSES: u32 = 10;

/// A change delivered by the pub/sub transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChangeNotification {
    /// Entity the change applies to.
    pub entity: EntityId,
    /// Namespace key (the marker topic or its resync topic).
    pub key: String,
    /// Encoded payload.
    pub value: String,
}

impl ChangeNotification {
    /// Creates a notification.
    #[must_use]
    pub fn new(entity: EntityId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Counts from a single drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DrainReport {
    /// 1-based index of this pass since the drain was scheduled.
    pub pass: u32,
    /// Entries applied successfully in this pass.
    pub applied: usize,
    /// Entries still pending after this pass.
    pub remaining: usize,
}

/// Result of a drain pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrainOutcome {
    /// Entries remain; another pass is scheduled.
    Pending(DrainReport),
    /// The backlog is empty.
    Drained(DrainReport),
    /// The pass ceiling was reached with entries still pending; they were
    /// discarded.
    Abandoned {
        /// Counts from the final pass, taken before discarding.
        report: DrainReport,
        /// Number of entries discarded.
        dropped: usize,
    },
}

impl DrainOutcome {
    /// Returns the pass report.
    #[must_use]
    pub const fn report(&self) -> DrainReport {
        match *self {
            Self::Pending(report) | Self::Drained(report) | Self::Abandoned { report, .. } => {
                report
            }
        }
    }

    /// Whether the drain loop has finished (drained or abandoned).
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }
}

/// What [`Backlog::submit`] did with a notification.
#[derive(Debug, PartialEq, Eq)]
pub enum Submission<E> {
    /// The gate was `NotReady`; the notification was buffered.
    Buffered,
    /// The notification was forwarded and applied.
    Applied,
    /// The notification was forwarded and failed.
    Failed(ChangeNotification, E),
}

/// Ordered buffer of pending notifications plus the drain schedule.
#[derive(Clone, Debug)]
pub struct Backlog {
    entries: VecDeque<ChangeNotification>,
    max_passes: u32,
    interval: Duration,
    passes: u32,
    next_pass_at: Option<HostTime>,
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new(MAX_DRAIN_PASSES, Duration::ZERO)
    }
}

impl Backlog {
    /// Creates an empty backlog with the given pass ceiling and delay between
    /// passes.
    #[must_use]
    pub fn new(max_passes: u32, interval: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            max_passes,
            interval,
            passes: 0,
            next_pass_at: None,
        }
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates pending entries in the order they will be applied.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeNotification> + '_ {
        self.entries.iter()
    }

    /// Passes run since the drain was last scheduled.
    #[must_use]
    pub const fn passes(&self) -> u32 {
        self.passes
    }

    /// Whether a drain is scheduled.
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.next_pass_at.is_some()
    }

    /// Appends a notification.
    pub fn push(&mut self, change: ChangeNotification) {
        self.entries.push_back(change);
    }

    /// Buffers `change` while `NotReady`, otherwise forwards it to `apply`.
    pub fn submit<E>(
        &mut self,
        state: ReadinessState,
        change: ChangeNotification,
        apply: impl FnOnce(&ChangeNotification) -> Result<(), E>,
    ) -> Submission<E> {
        if state == ReadinessState::NotReady {
            self.push(change);
            return Submission::Buffered;
        }
        match apply(&change) {
            Ok(()) => Submission::Applied,
            Err(err) => Submission::Failed(change, err),
        }
    }

    /// Starts a fresh drain loop; the first pass is due one interval after
    /// `now`.
    pub fn schedule(&mut self, now: HostTime) {
        self.passes = 0;
        self.next_pass_at = Some(now.saturating_add(self.interval));
    }

    /// Stops the drain loop without touching pending entries.
    pub fn cancel(&mut self) {
        self.passes = 0;
        self.next_pass_at = None;
    }

    /// Whether a scheduled pass is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: HostTime) -> bool {
        self.next_pass_at.is_some_and(|at| now >= at)
    }

    /// Runs one drain pass.
    ///
    /// Every entry pending at the start of the pass is forwarded to `apply`
    /// in order. Failed entries are appended back behind anything pushed
    /// during the pass.
    pub fn drain_pass<E>(
        &mut self,
        now: HostTime,
        mut apply: impl FnMut(&ChangeNotification) -> Result<(), E>,
    ) -> DrainOutcome {
        self.passes = self.passes.saturating_add(1);
        let snapshot: Vec<ChangeNotification> = self.entries.drain(..).collect();

        let mut applied = 0;
        for change in snapshot {
            match apply(&change) {
                Ok(()) => applied += 1,
                Err(_) => self.entries.push_back(change),
            }
        }

        let report = DrainReport {
            pass: self.passes,
            applied,
            remaining: self.entries.len(),
        };

        if self.entries.is_empty() {
            self.next_pass_at = None;
            DrainOutcome::Drained(report)
        } else if self.passes >= self.max_passes {
            let dropped = self.entries.len();
            self.entries.clear();
            self.next_pass_at = None;
            DrainOutcome::Abandoned { report, dropped }
        } else {
            self.next_pass_at = Some(now.saturating_add(self.interval));
            DrainOutcome::Pending(report)
        }
    }
}
