// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Readiness gate: decides when change notifications may be applied.
//!
//! The gate is a single-owner tagged state machine fed once per tick with the
//! environment's loaded status:
//!
//! ```text
//!              loaded (and settled)            backlog drained
//!   NotReady ─────────────────────► BuildDelay ───────────────► Ready
//!      ▲                                 │                        │
//!      └──────────── unloaded ───────────┴────────────────────────┘
//! ```
//!
//! While `NotReady`, incoming notifications are buffered by the
//! [`Backlog`](crate::backlog::Backlog). Entering `BuildDelay` starts the
//! drain timer; the gate moves to `Ready` when the drain completes or is
//! abandoned.
//!
//! # Settling
//!
//! Hosts often report "loaded" while entities are still streaming in. A
//! [`SettleProbe`] can hold the gate in `NotReady` until the reported entity
//! population has stayed unchanged for a configured number of ticks. With a
//! requirement of zero ticks the probe is always settled. Settling only
//! gates the first transition out of `NotReady`.

/// Process-wide readiness of the marker subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadinessState {
    /// Environment not loaded; notifications are buffered.
    NotReady,
    /// Environment loaded; the backlog is being drained.
    BuildDelay,
    /// Backlog drained; notifications are applied directly.
    Ready,
}

/// A state change reported by the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Transition {
    /// State before the change.
    pub from: ReadinessState,
    /// State after the change.
    pub to: ReadinessState,
}

impl Transition {
    /// Whether this transition started the drain phase.
    #[must_use]
    pub fn entered_build_delay(self) -> bool {
        self.to == ReadinessState::BuildDelay
    }

    /// Whether this transition was caused by the environment unloading.
    #[must_use]
    pub fn unloaded(self) -> bool {
        self.to == ReadinessState::NotReady
    }
}

/// Tracks whether the entity population has stopped changing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SettleProbe {
    required_ticks: u32,
    last_population: Option<usize>,
    steady_ticks: u32,
}

impl SettleProbe {
    /// Creates a probe that settles after `required_ticks` unchanged samples.
    #[must_use]
    pub const fn new(required_ticks: u32) -> Self {
        Self {
            required_ticks,
            last_population: None,
            steady_ticks: 0,
        }
    }

    /// Feeds one population sample.
    pub fn observe(&mut self, population: usize) {
        if self.last_population == Some(population) {
            self.steady_ticks = self.steady_ticks.saturating_add(1);
        } else {
            self.last_population = Some(population);
            self.steady_ticks = 0;
        }
    }

    /// Whether the population has been steady long enough.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.required_ticks == 0 || self.steady_ticks >= self.required_ticks
    }

    /// Forgets all samples.
    pub fn reset(&mut self) {
        self.last_population = None;
        self.steady_ticks = 0;
    }
}

/// Single-owner readiness state machine.
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    state: ReadinessState,
    settle: SettleProbe,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ReadinessGate {
    /// Creates a gate in [`ReadinessState::NotReady`].
    ///
    /// `settle_ticks` is the number of unchanged population samples required
    /// before a loaded environment may leave `NotReady`.
    #[must_use]
    pub const fn new(settle_ticks: u32) -> Self {
        Self {
            state: ReadinessState::NotReady,
            settle: SettleProbe::new(settle_ticks),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ReadinessState {
        self.state
    }

    /// Feeds the host's entity population for the settle check.
    pub fn observe_population(&mut self, population: usize) {
        self.settle.observe(population);
    }

    /// Whether the settle requirement is currently met.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settle.is_settled()
    }

    /// Feeds the environment's loaded status for this tick.
    ///
    /// An unloaded environment always forces `NotReady`. A loaded, settled
    /// environment moves `NotReady` to `BuildDelay`. Every other combination
    /// leaves the state unchanged.
    pub fn report_environment_loaded(&mut self, loaded: bool) -> Option<Transition> {
        let next = match (self.state, loaded) {
            (ReadinessState::NotReady, false) => {
                self.settle.reset();
                ReadinessState::NotReady
            }
            (_, false) => ReadinessState::NotReady,
            (ReadinessState::NotReady, true) if self.settle.is_settled() => {
                ReadinessState::BuildDelay
            }
            (state, true) => state,
        };
        self.transition_to(next)
    }

    /// Signals that the backlog drained (or was abandoned).
    ///
    /// Only meaningful during `BuildDelay`; a no-op otherwise.
    pub fn drain_complete(&mut self) -> Option<Transition> {
        if self.state == ReadinessState::BuildDelay {
            self.transition_to(ReadinessState::Ready)
        } else {
            None
        }
    }

    fn transition_to(&mut self, next: ReadinessState) -> Option<Transition> {
        if next == self.state {
            return None;
        }
        let transition = Transition {
            from: self.state,
            to: next,
        };
        if next == ReadinessState::NotReady {
            self.settle.reset();
        }
        self.state = next;
        Some(transition)
    }
}
