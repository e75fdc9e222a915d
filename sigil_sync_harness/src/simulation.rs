// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Several clients sharing one [`Bus`].
//!
//! Each client is a full [`MarkerSystem`] over a [`FakeScene`], a
//! [`FakeSurface`], and a [`BusPort`], with its own [`RecorderSink`]. A
//! client tick first hands over every queued notification, then runs
//! [`MarkerSystem::tick`], then advances the client's clock by
//! [`Simulation::tick_step`].

use sigil_core::codec::decode;
use sigil_core::config::{ConfigError, MarkerConfig};
use sigil_core::driver::{Delivery, MarkerSystem, TickReport, ToggleError};
use sigil_core::entity::EntityId;
use sigil_core::readiness::ReadinessState;
use sigil_core::time::Duration;
use sigil_core::trace::Tracer;
use sigil_debug::recorder::{RecordedEvent, RecorderSink};

use crate::bus::{Bus, BusPort};
use crate::scene::FakeScene;
use crate::surface::FakeSurface;

/// A marker system wired to the harness fakes.
pub type Client = MarkerSystem<FakeScene, FakeSurface, BusPort>;

/// A client whose rendered markers disagree with the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    /// Client index.
    pub client: usize,
    /// Entity in question.
    pub entity: EntityId,
    /// Tokens the client should show, after its capacity clamp.
    pub expected: Vec<String>,
    /// Tokens the client shows.
    pub rendered: Vec<String>,
}

/// Result of [`Simulation::convergence`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Clients compared (those in `Ready`).
    pub clients_checked: usize,
    /// Entities with a stored token list.
    pub entities_checked: usize,
    /// Every mismatch found.
    pub divergences: Vec<Divergence>,
}

impl ConvergenceReport {
    /// Whether every checked client matches the bus.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Clients, their recordings, and the bus they share.
#[derive(Debug)]
pub struct Simulation {
    bus: Bus,
    clients: Vec<Client>,
    recorders: Vec<RecorderSink>,
    tick_step: Duration,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(Bus::new())
    }
}

impl Simulation {
    /// Host ticks per client tick unless changed with
    /// [`set_tick_step`](Self::set_tick_step).
    pub const DEFAULT_TICK_STEP: Duration = Duration(16);

    /// Creates a simulation with no clients.
    #[must_use]
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            clients: Vec::new(),
            recorders: Vec::new(),
            tick_step: Self::DEFAULT_TICK_STEP,
        }
    }

    /// Connects a client and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    pub fn add_client(
        &mut self,
        config: MarkerConfig,
        scene: FakeScene,
    ) -> Result<usize, ConfigError> {
        // Bus queue indices must stay aligned with client indices.
        config.validate()?;
        let port = self.bus.connect();
        let client = MarkerSystem::new(config, scene, FakeSurface::new(), port)?;
        self.clients.push(client);
        self.recorders.push(RecorderSink::new());
        Ok(self.clients.len() - 1)
    }

    /// Clock advance per client tick.
    #[must_use]
    pub fn tick_step(&self) -> Duration {
        self.tick_step
    }

    /// Sets the clock advance per client tick.
    pub fn set_tick_step(&mut self, step: Duration) {
        self.tick_step = step;
    }

    /// The shared bus.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Number of clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether there are no clients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Client `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn client(&self, i: usize) -> &Client {
        &self.clients[i]
    }

    /// Client `i`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn client_mut(&mut self, i: usize) -> &mut Client {
        &mut self.clients[i]
    }

    /// Client `i`'s scene.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn scene_mut(&mut self, i: usize) -> &mut FakeScene {
        self.clients[i].env_mut()
    }

    /// Events recorded for client `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn recording(&self, i: usize) -> &[RecordedEvent] {
        self.recorders[i].events()
    }

    /// Recorders for every client, in client order.
    #[must_use]
    pub fn recorders(&self) -> &[RecorderSink] {
        &self.recorders
    }

    /// Hands every notification queued for client `i` to its system.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn deliver(&mut self, i: usize) -> Vec<Delivery> {
        let client = &mut self.clients[i];
        let pending = client.transport().take_pending();
        let mut tracer = Tracer::new(&mut self.recorders[i]);
        pending
            .into_iter()
            .map(|change| client.on_change_notification_traced(change, &mut tracer))
            .collect()
    }

    /// Delivers, ticks, and advances the clock of client `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn tick(&mut self, i: usize) -> TickReport {
        self.deliver(i);
        let client = &mut self.clients[i];
        let report = client.tick_traced(&mut Tracer::new(&mut self.recorders[i]));
        let step = self.tick_step;
        client.env_mut().advance(step);
        report
    }

    /// Ticks every client once, in index order.
    pub fn tick_all(&mut self) -> Vec<TickReport> {
        (0..self.clients.len()).map(|i| self.tick(i)).collect()
    }

    /// Ticks every client `n` times.
    pub fn run(&mut self, n: usize) {
        for _ in 0..n {
            self.tick_all();
        }
    }

    /// Ticks every client until all are `Ready` or `max_ticks` rounds pass.
    /// Returns the number of rounds run.
    pub fn run_until_ready(&mut self, max_ticks: usize) -> usize {
        for round in 0..max_ticks {
            if self.all_ready() {
                return round;
            }
            self.tick_all();
        }
        max_ticks
    }

    /// Whether every client is `Ready`.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.clients
            .iter()
            .all(|c| c.readiness() == ReadinessState::Ready)
    }

    /// Toggles `token` for `entity` from client `i`.
    ///
    /// # Errors
    ///
    /// Returns [`ToggleError`] for tokens that cannot be encoded.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn toggle(
        &mut self,
        i: usize,
        entity: &EntityId,
        token: &str,
    ) -> Result<String, ToggleError> {
        self.clients[i].toggle_token(entity, token)
    }

    /// Tokens client `i` renders for `entity`, in slot order.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn rendered(&self, i: usize, entity: &EntityId) -> Vec<String> {
        self.clients[i].surface().tokens_for(entity)
    }

    /// Compares every `Ready` client's rendered markers with the bus.
    ///
    /// Only entities the client's scene contains are compared; a hidden
    /// entity still counts, since its markers exist while suppressed.
    #[must_use]
    pub fn convergence(&self) -> ConvergenceReport {
        let stored: Vec<(EntityId, String)> = self
            .bus
            .entries()
            .into_iter()
            .filter(|(_, key, _)| self.clients.iter().any(|c| c.config().topic == *key))
            .map(|(entity, _, value)| (entity, value))
            .collect();

        let mut report = ConvergenceReport {
            entities_checked: stored.len(),
            ..ConvergenceReport::default()
        };
        for (i, client) in self.clients.iter().enumerate() {
            if client.readiness() != ReadinessState::Ready {
                continue;
            }
            report.clients_checked += 1;
            let capacity = client.config().max_slots;
            for (entity, value) in &stored {
                if client.env().entity(entity).is_none() {
                    continue;
                }
                let expected: Vec<String> = decode(value)
                    .truncated(capacity)
                    .iter()
                    .map(str::to_owned)
                    .collect();
                let rendered = self.rendered(i, entity);
                if expected != rendered {
                    report.divergences.push(Divergence {
                        client: i,
                        entity: entity.clone(),
                        expected,
                        rendered,
                    });
                }
            }
        }
        if !report.is_converged() {
            tracing::debug!(divergences = report.divergences.len(), "clients diverged");
        }
        report
    }
}
