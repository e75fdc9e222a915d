// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The periodic driver that wires every component together.
//!
//! [`MarkerSystem`] owns the readiness gate, backlog, reconciler, and
//! placement engine plus the three host collaborators. The host calls
//! [`MarkerSystem::tick`] once per frame and
//! [`MarkerSystem::on_change_notification`] whenever the transport delivers
//! a change, both on the same logical thread.
//!
//! # Tick order
//!
//! 1. Sample population and loaded status; apply any readiness transition.
//!    Entering `BuildDelay` schedules the drain and asks the transport for a
//!    replay. Falling back to `NotReady` tears down every marker and cancels
//!    the drain, keeping buffered notifications.
//! 2. If the gate was already in `BuildDelay` and a drain pass is due, run
//!    it. A drained or abandoned backlog moves the gate to `Ready`.
//! 3. On `Ready` ticks: poll visibility for in-scope entities, feed the
//!    camera yaw, reposition invalidated entities, and poll the menu
//!    trigger.

use thiserror::Error;

use crate::backlog::{Backlog, ChangeNotification, DrainOutcome, Submission};
use crate::codec::{TokenList, decode, encode, is_encodable};
use crate::config::{MarkerConfig, SyncScope};
use crate::entity::EntityId;
use crate::host::{Environment, MarkerSurface, Transport};
use crate::placement::{PlacementEngine, PlacementReport};
use crate::readiness::{ReadinessGate, ReadinessState, Transition};
use crate::reconcile::{
    EntityMarkerState, ReconcileError, ReconcileOutcome, Reconciler, VisibilityChange,
};
use crate::time::HostTime;
use crate::trace::{
    AbandonedEvent, BufferedEvent, DrainPassEvent, PlacementEvent, ReadinessEvent,
    ReconcileEvent, Tracer,
};

/// A token could not be toggled.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ToggleError {
    /// The token is empty or contains a bracket, so it cannot be encoded.
    #[error("token {0:?} cannot be encoded")]
    InvalidToken(String),
}

/// What happened to an incoming notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Held in the backlog until the environment is ready.
    Buffered,
    /// Applied immediately.
    Applied,
    /// Failed during `BuildDelay`; queued for the next drain pass.
    Requeued,
    /// Failed while `Ready`; logged and dropped.
    Dropped,
    /// The key does not belong to this subsystem.
    Ignored,
}

/// The host asked to open the marker menu for an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuRequest {
    /// Selected entity.
    pub entity: EntityId,
    /// Tokens currently stored for it.
    pub active: TokenList,
}

/// Everything one [`MarkerSystem::tick`] did.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    /// Tick counter, starting at 1.
    pub frame_index: u64,
    /// Readiness at the end of the tick.
    pub state: ReadinessState,
    /// Readiness change during the tick, if any.
    pub transition: Option<Transition>,
    /// Drain pass run during the tick, if any.
    pub drain: Option<DrainOutcome>,
    /// Lazy placement pass, on `Ready` ticks.
    pub placement: Option<PlacementReport>,
    /// Menu request, if the trigger fired with an entity selected.
    pub menu: Option<MenuRequest>,
}

/// Borrowed view of the parts needed to apply one notification, split out so
/// the backlog can be drained while they are mutated.
struct Applier<'s, E, R> {
    topic: &'s str,
    resync_topic: &'s str,
    frame_index: u64,
    env: &'s E,
    surface: &'s mut R,
    reconciler: &'s mut Reconciler,
    placement: &'s mut PlacementEngine,
}

impl<E: Environment, R: MarkerSurface> Applier<'_, E, R> {
    fn apply(
        &mut self,
        change: &ChangeNotification,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), ReconcileError> {
        let entity = &change.entity;
        if change.key == self.resync_topic {
            self.placement.invalidate(entity);
            tracing::debug!(entity = %entity, "position resync requested");
            return Ok(());
        }
        debug_assert_eq!(change.key, self.topic, "foreign keys are filtered on receipt");

        let tokens = decode(&change.value);
        let result = self
            .reconciler
            .reconcile(self.env, &mut *self.surface, entity, &tokens);
        tracer.reconcile(&ReconcileEvent {
            frame_index: self.frame_index,
            entity: entity.clone(),
            outcome: result.as_ref().ok().copied(),
        });

        match result? {
            ReconcileOutcome::Cleared => self.placement.untrack(entity),
            ReconcileOutcome::Rebuilt { .. } => {
                self.placement.track(entity);
                let Some(yaw) = self.placement.usable_yaw(self.env.camera_yaw()) else {
                    self.placement.invalidate(entity);
                    return Ok(());
                };
                let anchor = self.env.resolve_anchor(entity);
                if let (Some(state), Some(anchor)) = (self.reconciler.state_mut(entity), anchor)
                    && !state.hidden
                {
                    self.placement
                        .place(state, &anchor, yaw, &mut *self.surface);
                }
            }
        }
        Ok(())
    }
}

/// The marker subsystem for one client.
#[derive(Debug)]
pub struct MarkerSystem<E, R, T> {
    config: MarkerConfig,
    resync_topic: String,
    env: E,
    surface: R,
    transport: T,
    gate: ReadinessGate,
    backlog: Backlog,
    reconciler: Reconciler,
    placement: PlacementEngine,
    frame_index: u64,
}

impl<E, R, T> MarkerSystem<E, R, T>
where
    E: Environment,
    R: MarkerSurface,
    T: Transport,
{
    /// Creates a system in `NotReady` with nothing tracked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::config::ConfigError) if `config` fails
    /// validation.
    pub fn new(
        config: MarkerConfig,
        env: E,
        surface: R,
        transport: T,
    ) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        Ok(Self {
            resync_topic: config.resync_topic(),
            gate: ReadinessGate::new(config.settle_ticks),
            backlog: Backlog::new(config.max_drain_passes, config.drain_interval),
            reconciler: Reconciler::new(config.max_slots),
            placement: PlacementEngine::new(config.layout, config.params),
            frame_index: 0,
            config,
            env,
            surface,
            transport,
        })
    }

    // -- Entry points --

    /// Accepts a change delivered by the transport.
    pub fn on_change_notification(&mut self, change: ChangeNotification) -> Delivery {
        self.on_change_notification_traced(change, &mut Tracer::none())
    }

    /// [`on_change_notification`](Self::on_change_notification) with
    /// instrumentation.
    pub fn on_change_notification_traced(
        &mut self,
        change: ChangeNotification,
        tracer: &mut Tracer<'_>,
    ) -> Delivery {
        if change.key != self.config.topic && change.key != self.resync_topic {
            tracing::debug!(entity = %change.entity, key = %change.key, "ignoring foreign key");
            return Delivery::Ignored;
        }

        let state = self.gate.state();
        let frame_index = self.frame_index;
        let mut applier = Applier {
            topic: &self.config.topic,
            resync_topic: &self.resync_topic,
            frame_index,
            env: &self.env,
            surface: &mut self.surface,
            reconciler: &mut self.reconciler,
            placement: &mut self.placement,
        };
        match self
            .backlog
            .submit(state, change, |c| applier.apply(c, tracer))
        {
            Submission::Buffered => {
                let backlog_len = self.backlog.len();
                if let Some(last) = self.backlog.iter().last() {
                    tracing::debug!(entity = %last.entity, backlog_len, "buffered notification");
                    tracer.buffered(&BufferedEvent {
                        frame_index,
                        entity: last.entity.clone(),
                        backlog_len,
                    });
                }
                Delivery::Buffered
            }
            Submission::Applied => Delivery::Applied,
            Submission::Failed(change, err) if state == ReadinessState::BuildDelay => {
                tracing::debug!(entity = %change.entity, error = %err, "requeued notification");
                self.backlog.push(change);
                Delivery::Requeued
            }
            Submission::Failed(change, err) => {
                tracing::warn!(entity = %change.entity, error = %err, "dropped notification");
                Delivery::Dropped
            }
        }
    }

    /// Advances the system by one host frame.
    pub fn tick(&mut self) -> TickReport {
        self.tick_traced(&mut Tracer::none())
    }

    /// [`tick`](Self::tick) with instrumentation.
    pub fn tick_traced(&mut self, tracer: &mut Tracer<'_>) -> TickReport {
        self.frame_index += 1;
        let now = self.env.now();
        let was = self.gate.state();

        self.gate.observe_population(self.env.population());
        let mut transition = self
            .gate
            .report_environment_loaded(self.env.environment_loaded());
        if let Some(t) = transition {
            self.apply_transition(t, now, tracer);
        }

        let mut drain = None;
        if was == ReadinessState::BuildDelay
            && self.gate.state() == ReadinessState::BuildDelay
            && self.backlog.is_due(now)
        {
            let outcome = self.drain_pass(now, tracer);
            if outcome.is_finished()
                && let Some(t) = self.gate.drain_complete()
            {
                self.apply_transition(t, now, tracer);
                transition = transition.or(Some(t));
            }
            drain = Some(outcome);
        }

        let mut placement = None;
        let mut menu = None;
        if self.gate.state() == ReadinessState::Ready {
            placement = Some(self.ready_pass(now, tracer));
            menu = self.poll_menu();
        }

        TickReport {
            frame_index: self.frame_index,
            state: self.gate.state(),
            transition,
            drain,
            placement,
            menu,
        }
    }

    /// Flips `token` on or off for `entity` and publishes the new list.
    ///
    /// Returns the published blob. The local markers change when the
    /// transport delivers the resulting notification.
    ///
    /// # Errors
    ///
    /// Returns [`ToggleError::InvalidToken`] for tokens that cannot be
    /// encoded.
    pub fn toggle_token(&mut self, entity: &EntityId, token: &str) -> Result<String, ToggleError> {
        if !is_encodable(token) {
            return Err(ToggleError::InvalidToken(token.to_owned()));
        }
        let mut tokens = self
            .transport
            .read(entity, &self.config.topic)
            .map(|blob| decode(&blob))
            .unwrap_or_default();
        let active = tokens.toggle(token);
        let blob = encode(&tokens);
        self.transport.publish(entity, &self.config.topic, &blob);
        tracing::info!(entity = %entity, token, active, "toggled marker");
        Ok(blob)
    }

    /// Publishes a position-resync signal for an entity that was just moved.
    pub fn on_entity_dropped(&mut self, entity: &EntityId) {
        let stamp = self.env.now().ticks().to_string();
        self.transport.publish(entity, &self.resync_topic, &stamp);
        tracing::debug!(entity = %entity, "published position resync");
    }

    // -- Tick stages --

    fn apply_transition(&mut self, t: Transition, now: HostTime, tracer: &mut Tracer<'_>) {
        tracing::info!(from = ?t.from, to = ?t.to, "readiness changed");
        tracer.readiness(&ReadinessEvent {
            frame_index: self.frame_index,
            now,
            from: t.from,
            to: t.to,
        });
        if t.entered_build_delay() {
            self.backlog.schedule(now);
            self.transport.request_replay();
        } else if t.unloaded() {
            self.backlog.cancel();
            self.reconciler.clear_all(&mut self.surface);
            self.placement.clear();
        }
    }

    fn drain_pass(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> DrainOutcome {
        let frame_index = self.frame_index;
        let mut applier = Applier {
            topic: &self.config.topic,
            resync_topic: &self.resync_topic,
            frame_index,
            env: &self.env,
            surface: &mut self.surface,
            reconciler: &mut self.reconciler,
            placement: &mut self.placement,
        };
        let outcome = self
            .backlog
            .drain_pass(now, |c| applier.apply(c, &mut *tracer));

        let report = outcome.report();
        tracing::debug!(
            pass = report.pass,
            applied = report.applied,
            remaining = report.remaining,
            "drain pass"
        );
        tracer.drain_pass(&DrainPassEvent {
            frame_index,
            now,
            report,
        });
        if let DrainOutcome::Abandoned { dropped, .. } = outcome {
            tracing::warn!(
                passes = report.pass,
                dropped,
                "backlog not drained, discarding remaining notifications"
            );
            tracer.abandoned(&AbandonedEvent {
                frame_index,
                now,
                passes: report.pass,
                dropped,
            });
        }
        outcome
    }

    fn ready_pass(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> PlacementReport {
        let selected = match self.config.sync_scope {
            SyncScope::AllTracked => None,
            SyncScope::SelectedOnly => Some(self.env.selected_entity()),
        };
        let in_scope = |entity: &EntityId| match &selected {
            None => true,
            Some(selected) => selected.as_ref() == Some(entity),
        };

        let polled: Vec<EntityId> = self
            .reconciler
            .tracked()
            .filter(|e| in_scope(*e))
            .cloned()
            .collect();
        for entity in &polled {
            let hidden = self.env.is_hidden(entity);
            match self.reconciler.set_hidden(&mut self.surface, entity, hidden) {
                VisibilityChange::Shown => self.placement.invalidate(entity),
                VisibilityChange::Hidden => {
                    tracing::debug!(entity = %entity, "markers hidden");
                }
                VisibilityChange::Unchanged => {}
            }
        }

        let yaw = self.env.camera_yaw();
        let yaw_changed = self.placement.observe_yaw(yaw);
        let report =
            self.placement
                .update(&mut self.reconciler, &self.env, &mut self.surface, in_scope);
        tracer.placement(&PlacementEvent {
            frame_index: self.frame_index,
            now,
            yaw_degrees: yaw,
            yaw_changed,
            recomputed: report.recomputed.len(),
            deferred: report.deferred.len(),
            poses: report.poses,
        });
        report
    }

    fn poll_menu(&mut self) -> Option<MenuRequest> {
        if !self.env.menu_trigger() {
            return None;
        }
        let entity = self.env.selected_entity()?;
        let active = self
            .transport
            .read(&entity, &self.config.topic)
            .map(|blob| decode(&blob))
            .unwrap_or_default();
        Some(MenuRequest { entity, active })
    }

    // -- Accessors --

    /// Current readiness.
    #[must_use]
    pub fn readiness(&self) -> ReadinessState {
        self.gate.state()
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// Key of the position-resync signal.
    #[must_use]
    pub fn resync_topic(&self) -> &str {
        &self.resync_topic
    }

    /// Pending backlog.
    #[must_use]
    pub const fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    /// Number of buffered notifications.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Rendered state for `entity`, if it has markers.
    #[must_use]
    pub fn entity_state(&self, entity: &EntityId) -> Option<&EntityMarkerState> {
        self.reconciler.state(entity)
    }

    /// Entities that currently have markers.
    pub fn tracked(&self) -> impl Iterator<Item = &EntityId> + '_ {
        self.reconciler.tracked()
    }

    /// The placement engine.
    #[must_use]
    pub const fn placement(&self) -> &PlacementEngine {
        &self.placement
    }

    /// The scene environment.
    #[must_use]
    pub const fn env(&self) -> &E {
        &self.env
    }

    /// The scene environment, mutably.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// The render surface.
    #[must_use]
    pub const fn surface(&self) -> &R {
        &self.surface
    }

    /// The render surface, mutably.
    pub fn surface_mut(&mut self) -> &mut R {
        &mut self.surface
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::MAX_DRAIN_PASSES;
    use crate::host::Anchor;
    use crate::host::testing::{TestEnv, TestSurface, TestTransport};
    use crate::trace::{NoopSink, TraceSink};

    type System = MarkerSystem<TestEnv, TestSurface, TestTransport>;

    fn id(raw: &str) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    fn system(config: MarkerConfig, ids: &[&EntityId]) -> System {
        let mut env = TestEnv::with_entities(ids);
        env.loaded = false;
        MarkerSystem::new(config, env, TestSurface::default(), TestTransport::default()).unwrap()
    }

    fn markers(system: &System, topic_value: &str, entity: &EntityId) -> ChangeNotification {
        ChangeNotification::new(entity.clone(), system.config().topic.clone(), topic_value)
    }

    /// Loads the environment and ticks until `Ready`.
    fn make_ready(system: &mut System) {
        system.env_mut().loaded = true;
        for _ in 0..3 {
            if system.tick().state == ReadinessState::Ready {
                return;
            }
        }
        panic!("system did not become ready");
    }

    #[derive(Default)]
    struct Events {
        readiness: Vec<(ReadinessState, ReadinessState)>,
        buffered: usize,
        passes: Vec<u32>,
        abandoned: Vec<usize>,
        reconciles: Vec<Option<ReconcileOutcome>>,
    }

    impl TraceSink for Events {
        fn on_readiness(&mut self, e: &ReadinessEvent) {
            self.readiness.push((e.from, e.to));
        }
        fn on_buffered(&mut self, _: &BufferedEvent) {
            self.buffered += 1;
        }
        fn on_drain_pass(&mut self, e: &DrainPassEvent) {
            self.passes.push(e.report.pass);
        }
        fn on_abandoned(&mut self, e: &AbandonedEvent) {
            self.abandoned.push(e.dropped);
        }
        fn on_reconcile(&mut self, e: &ReconcileEvent) {
            self.reconciles.push(e.outcome);
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = MarkerConfig::ring();
        config.max_slots = 0;
        let result = MarkerSystem::new(
            config,
            TestEnv::default(),
            TestSurface::default(),
            TestTransport::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn not_ready_buffers_then_drains_in_order() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::stack(), &[&e1]);
        let mut events = Events::default();

        for blob in ["[a]", "[a][b]", "[c]"] {
            let change = markers(&sys, blob, &e1);
            let delivery = sys.on_change_notification_traced(change, &mut Tracer::new(&mut events));
            assert_eq!(delivery, Delivery::Buffered);
        }
        assert_eq!(events.buffered, 3);
        assert!(events.reconciles.is_empty(), "nothing applied while NotReady");
        assert_eq!(sys.backlog_len(), 3);

        sys.env_mut().loaded = true;
        let first = sys.tick_traced(&mut Tracer::new(&mut events));
        assert_eq!(first.state, ReadinessState::BuildDelay);
        assert!(first.drain.is_none(), "no pass on the entering tick");
        assert_eq!(sys.transport().replays, 1);

        let second = sys.tick_traced(&mut Tracer::new(&mut events));
        assert!(matches!(second.drain, Some(DrainOutcome::Drained(r)) if r.applied == 3));
        assert_eq!(second.state, ReadinessState::Ready);
        assert_eq!(
            events.readiness,
            vec![
                (ReadinessState::NotReady, ReadinessState::BuildDelay),
                (ReadinessState::BuildDelay, ReadinessState::Ready),
            ]
        );
        // Last writer wins.
        let state = sys.entity_state(&e1).unwrap();
        assert_eq!(state.slot_tokens().collect::<Vec<_>>(), ["c"]);
    }

    #[test]
    fn persistent_failure_abandons_after_ceiling() {
        let e1 = id("E1");
        let ghost = id("E2");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        let mut events = Events::default();

        let change = markers(&sys, "[fire]", &ghost);
        sys.on_change_notification(change);
        sys.env_mut().loaded = true;

        let mut last = None;
        for _ in 0..11 {
            last = Some(sys.tick_traced(&mut Tracer::new(&mut events)));
        }
        let last = last.unwrap();
        assert_eq!(events.passes.len(), MAX_DRAIN_PASSES as usize);
        assert_eq!(events.abandoned, vec![1], "exactly one abandonment");
        assert!(matches!(last.drain, Some(DrainOutcome::Abandoned { dropped: 1, .. })));
        assert_eq!(last.state, ReadinessState::Ready);
        assert_eq!(sys.backlog_len(), 0);

        sys.tick_traced(&mut Tracer::new(&mut events));
        assert_eq!(events.abandoned.len(), 1);
    }

    #[test]
    fn ready_applies_directly_and_places_immediately() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        make_ready(&mut sys);

        let delivery = sys.on_change_notification(markers(&sys, "[fire][poison]", &e1));
        assert_eq!(delivery, Delivery::Applied);
        let state = sys.entity_state(&e1).unwrap();
        assert_eq!(state.slots.len(), 2);
        assert!(state.slots.iter().all(|s| s.pose.is_some()));
        assert!(sys.placement().is_tracked(&e1));
    }

    #[test]
    fn ready_failure_is_dropped() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        make_ready(&mut sys);
        let delivery = sys.on_change_notification(markers(&sys, "[fire]", &id("ghost")));
        assert_eq!(delivery, Delivery::Dropped);
        assert_eq!(sys.backlog_len(), 0);
    }

    #[test]
    fn build_delay_failure_is_requeued() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        sys.env_mut().loaded = true;
        sys.tick();
        assert_eq!(sys.readiness(), ReadinessState::BuildDelay);

        let ghost = id("ghost");
        let delivery = sys.on_change_notification(markers(&sys, "[fire]", &ghost));
        assert_eq!(delivery, Delivery::Requeued);
        assert_eq!(sys.backlog_len(), 1);

        // The entity appears before the next pass.
        sys.env_mut()
            .anchors
            .insert(ghost.clone(), Anchor::at([5.0, 0.0, 0.0]));
        let report = sys.tick();
        assert!(matches!(report.drain, Some(DrainOutcome::Drained(_))));
        assert!(sys.entity_state(&ghost).is_some());
    }

    #[test]
    fn foreign_keys_are_ignored() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        let change = ChangeNotification::new(e1, "other.plugin", "[x]");
        assert_eq!(sys.on_change_notification(change), Delivery::Ignored);
        assert_eq!(sys.backlog_len(), 0);
    }

    #[test]
    fn toggle_publishes_new_blob() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        make_ready(&mut sys);
        let topic = sys.config().topic.clone();
        sys.transport_mut().publish(&e1, &topic, "[fire][poison]");

        assert_eq!(sys.toggle_token(&e1, "poison").unwrap(), "[fire]");
        assert_eq!(sys.transport().read(&e1, &topic).as_deref(), Some("[fire]"));
        assert_eq!(sys.toggle_token(&e1, "poison").unwrap(), "[fire][poison]");
        assert_eq!(
            sys.toggle_token(&e1, "a]b"),
            Err(ToggleError::InvalidToken("a]b".into()))
        );
        assert_eq!(sys.toggle_token(&e1, ""), Err(ToggleError::InvalidToken(String::new())));
    }

    #[test]
    fn toggle_on_empty_store_appends() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        assert_eq!(sys.toggle_token(&e1, "fire").unwrap(), "[fire]");
    }

    #[test]
    fn unload_tears_down_but_keeps_backlog() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        make_ready(&mut sys);
        sys.on_change_notification(markers(&sys, "[fire]", &e1));
        assert_eq!(sys.surface().live.len(), 1);

        sys.env_mut().loaded = false;
        let report = sys.tick();
        assert!(report.transition.is_some_and(|t| t.unloaded()));
        assert!(sys.surface().live.is_empty(), "markers destroyed on unload");
        assert!(sys.tracked().next().is_none());
        assert!(!sys.placement().is_tracked(&e1));

        assert_eq!(
            sys.on_change_notification(markers(&sys, "[ice]", &e1)),
            Delivery::Buffered
        );
        assert_eq!(sys.backlog_len(), 1);
    }

    #[test]
    fn yaw_change_repositions_and_steady_yaw_does_not() {
        let (e1, e2) = (id("E1"), id("E2"));
        let mut sys = system(MarkerConfig::ring(), &[&e1, &e2]);
        make_ready(&mut sys);
        sys.on_change_notification(markers(&sys, "[a]", &e1));
        sys.on_change_notification(markers(&sys, "[b][c]", &e2));

        sys.tick();
        let calls = sys.surface().pose_calls;
        let steady = sys.tick().placement.unwrap();
        assert!(steady.recomputed.is_empty());
        assert_eq!(sys.surface().pose_calls, calls);

        sys.env_mut().yaw = 45.0;
        let moved = sys.tick().placement.unwrap();
        assert_eq!(moved.recomputed, vec![e1, e2]);
        assert_eq!(moved.poses, 3);
    }

    #[test]
    fn non_finite_yaw_never_reaches_the_surface() {
        let e1 = id("E1");
        let mut env = TestEnv::with_entities(&[&e1]);
        env.loaded = false;
        env.yaw = f64::NAN;
        let mut sys =
            MarkerSystem::new(MarkerConfig::ring(), env, TestSurface::default(), TestTransport::default())
                .unwrap();
        make_ready(&mut sys);

        assert_eq!(
            sys.on_change_notification(markers(&sys, "[fire]", &e1)),
            Delivery::Applied
        );
        assert_eq!(sys.surface().live.len(), 1);
        let report = sys.tick().placement.unwrap();
        assert!(report.recomputed.is_empty());
        assert!(sys.surface().poses.is_empty(), "no pose without a usable yaw");

        sys.env_mut().yaw = 30.0;
        assert_eq!(sys.tick().placement.unwrap().recomputed, vec![e1]);
        let finite = |p: &crate::transform::Pose| {
            p.position.iter().all(|c| c.is_finite()) && p.yaw_degrees.is_finite()
        };
        assert!(sys.surface().poses.values().all(finite));
        assert_eq!(sys.surface().poses.len(), 1);
    }

    #[test]
    fn resync_signal_repositions_one_entity() {
        let (e1, e2) = (id("E1"), id("E2"));
        let mut sys = system(MarkerConfig::ring(), &[&e1, &e2]);
        make_ready(&mut sys);
        sys.on_change_notification(markers(&sys, "[a]", &e1));
        sys.on_change_notification(markers(&sys, "[b]", &e2));
        sys.tick();

        sys.env_mut().now = 77;
        sys.on_entity_dropped(&e2);
        let (entity, key, value) = sys.transport().published.last().cloned().unwrap();
        assert_eq!((entity.as_str(), key.as_str(), value.as_str()), ("E2", "sigil.markers.Update", "77"));

        let resync = ChangeNotification::new(e2.clone(), key, value);
        assert_eq!(sys.on_change_notification(resync), Delivery::Applied);
        assert_eq!(sys.tick().placement.unwrap().recomputed, vec![e2]);
    }

    #[test]
    fn hidden_polling_suppresses_and_restores() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        make_ready(&mut sys);
        sys.on_change_notification(markers(&sys, "[a]", &e1));

        sys.env_mut().hidden.insert(e1.clone());
        sys.tick();
        assert!(sys.entity_state(&e1).unwrap().hidden);
        assert!(sys.surface().visible.values().all(|v| !v));

        sys.env_mut().hidden.clear();
        let report = sys.tick().placement.unwrap();
        assert!(!sys.entity_state(&e1).unwrap().hidden);
        assert_eq!(report.recomputed, vec![e1], "showing re-requests placement");
    }

    #[test]
    fn selected_only_scope_limits_polling() {
        let (e1, e2) = (id("E1"), id("E2"));
        let mut config = MarkerConfig::ring();
        config.sync_scope = SyncScope::SelectedOnly;
        let mut sys = system(config, &[&e1, &e2]);
        make_ready(&mut sys);
        sys.on_change_notification(markers(&sys, "[a]", &e1));
        sys.on_change_notification(markers(&sys, "[b]", &e2));

        sys.env_mut().selected = Some(e1.clone());
        sys.env_mut().yaw = 90.0;
        sys.env_mut().hidden.insert(e2.clone());
        let report = sys.tick().placement.unwrap();
        assert_eq!(report.recomputed, vec![e1.clone()]);
        assert_eq!(report.out_of_scope, 1);
        assert!(!sys.entity_state(&e2).unwrap().hidden, "e2 not polled");

        sys.env_mut().hidden.clear();
        sys.env_mut().selected = Some(e2.clone());
        assert_eq!(sys.tick().placement.unwrap().recomputed, vec![e2]);
    }

    #[test]
    fn menu_trigger_reports_selected_entity() {
        let e1 = id("E1");
        let mut sys = system(MarkerConfig::ring(), &[&e1]);
        make_ready(&mut sys);
        let topic = sys.config().topic.clone();
        sys.transport_mut().publish(&e1, &topic, "[fire]");

        sys.env_mut().menu = true;
        assert!(sys.tick().menu.is_none(), "no selection, no menu");

        sys.env_mut().selected = Some(e1.clone());
        sys.env_mut().menu = true;
        let menu = sys.tick().menu.unwrap();
        assert_eq!(menu.entity, e1);
        assert_eq!(menu.active, decode("[fire]"));
        assert!(sys.tick().menu.is_none(), "trigger is consumed");
    }

    #[test]
    fn settle_ticks_delay_build() {
        let e1 = id("E1");
        let mut config = MarkerConfig::ring();
        config.settle_ticks = 2;
        let mut sys = system(config, &[&e1]);
        sys.env_mut().loaded = true;
        assert_eq!(sys.tick().state, ReadinessState::NotReady);
        assert_eq!(sys.tick().state, ReadinessState::NotReady);
        assert_eq!(sys.tick().state, ReadinessState::BuildDelay);
    }

    #[test]
    fn drain_interval_spaces_passes() {
        let ghost = id("ghost");
        let mut config = MarkerConfig::ring();
        config.drain_interval = crate::time::Duration(10);
        let mut sys = system(config, &[]);
        sys.on_change_notification(markers(&sys, "[a]", &ghost));
        sys.env_mut().loaded = true;
        sys.tick();

        sys.env_mut().now = 5;
        assert!(sys.tick().drain.is_none());
        sys.env_mut().now = 10;
        assert!(matches!(sys.tick().drain, Some(DrainOutcome::Pending(_))));
        sys.env_mut().now = 15;
        assert!(sys.tick().drain.is_none());
    }

    #[test]
    fn noop_sink_is_accepted() {
        let mut sys = system(MarkerConfig::ring(), &[]);
        let mut sink = NoopSink;
        let report = sys.tick_traced(&mut Tracer::new(&mut sink));
        assert_eq!(report.frame_index, 1);
    }
}
