// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-entity marker state and token-list reconciliation.
//!
//! The [`Reconciler`] owns one [`EntityMarkerState`] per entity that
//! currently has markers. Reconciling an entity against a decoded
//! [`TokenList`] always tears down its slots and rebuilds them in token
//! order, which makes repeated application of the same value idempotent.
//!
//! Tokens beyond the configured capacity are dropped in list order. This is
//! a documented clamp, not an error.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::TokenList;
use crate::entity::{EntityId, MarkerHandle};
use crate::host::{Environment, MarkerSurface};
use crate::transform::Pose;

/// Hard upper bound on slots per entity.
pub const MAX_SLOTS: usize = 12;

/// Slot capacity of the original three-marker ring layout.
pub const LEGACY_MAX_SLOTS: usize = 3;

/// Why a reconcile could not be applied right now.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The entity has tokens but is not currently in the scene. Retryable.
    #[error("entity {0} cannot be resolved in the scene")]
    Unresolved(EntityId),
}

/// One rendered marker.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSlot {
    /// Dense index, equal to the token's position in the list.
    pub index: usize,
    /// Token shown by this slot.
    pub token: String,
    /// Handle returned by the surface.
    pub handle: MarkerHandle,
    /// Last pose applied, if the slot has been placed.
    pub pose: Option<Pose>,
}

/// Live rendered state for one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityMarkerState {
    /// The entity this state belongs to.
    pub entity: EntityId,
    /// Full decoded token list, including tokens beyond capacity.
    pub active_tokens: TokenList,
    /// One slot per retained token, in token order.
    pub slots: Vec<RenderSlot>,
    /// Whether all slots are suppressed.
    pub hidden: bool,
}

impl EntityMarkerState {
    /// Tokens shown by slots, in slot order.
    pub fn slot_tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.iter().map(|slot| slot.token.as_str())
    }
}

/// What a successful reconcile did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileOutcome {
    /// The token list was empty; all markers for the entity were removed.
    Cleared,
    /// Slots were rebuilt.
    Rebuilt {
        /// Slots now present.
        slots: usize,
        /// Tokens dropped by the capacity clamp.
        clamped: usize,
    },
}

/// Result of [`Reconciler::set_hidden`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisibilityChange {
    /// No slots, or the flag already had the requested value.
    Unchanged,
    /// Slots were suppressed.
    Hidden,
    /// Slots were shown again; their poses may be stale.
    Shown,
}

/// Owner of all [`EntityMarkerState`]s.
#[derive(Debug)]
pub struct Reconciler {
    capacity: usize,
    states: BTreeMap<EntityId, EntityMarkerState>,
}

impl Reconciler {
    /// Creates an empty reconciler retaining at most `capacity` slots per
    /// entity (clamped to [`MAX_SLOTS`]).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "slot capacity must be positive");
        Self {
            capacity: capacity.min(MAX_SLOTS),
            states: BTreeMap::new(),
        }
    }

    /// Slot capacity per entity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the state for `entity`, if it has markers.
    #[must_use]
    pub fn state(&self, entity: &EntityId) -> Option<&EntityMarkerState> {
        self.states.get(entity)
    }

    pub(crate) fn state_mut(&mut self, entity: &EntityId) -> Option<&mut EntityMarkerState> {
        self.states.get_mut(entity)
    }

    /// Entities that currently have markers, in id order.
    pub fn tracked(&self) -> impl Iterator<Item = &EntityId> + '_ {
        self.states.keys()
    }

    /// Whether `entity` currently has markers.
    #[must_use]
    pub fn is_tracked(&self, entity: &EntityId) -> bool {
        self.states.contains_key(entity)
    }

    /// Number of entities with markers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no entity has markers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Makes the rendered markers of `entity` match `tokens`.
    ///
    /// An empty list removes every marker and stops tracking the entity.
    /// Otherwise the existing slots are destroyed and one slot per token is
    /// created, up to capacity. New slots start suppressed if the
    /// environment reports the entity hidden. Placement is left to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Unresolved`] if `tokens` is non-empty and
    /// the entity's anchor cannot be resolved. Nothing is changed in that
    /// case.
    pub fn reconcile(
        &mut self,
        env: &impl Environment,
        surface: &mut impl MarkerSurface,
        entity: &EntityId,
        tokens: &TokenList,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if tokens.is_empty() {
            if let Some(state) = self.states.remove(entity) {
                for slot in state.slots {
                    surface.destroy_marker(slot.handle);
                }
                tracing::debug!(entity = %entity, "cleared markers");
            }
            return Ok(ReconcileOutcome::Cleared);
        }

        if env.resolve_anchor(entity).is_none() {
            return Err(ReconcileError::Unresolved(entity.clone()));
        }
        let hidden = env.is_hidden(entity);

        let state = self
            .states
            .entry(entity.clone())
            .or_insert_with(|| EntityMarkerState {
                entity: entity.clone(),
                active_tokens: TokenList::new(),
                slots: Vec::new(),
                hidden,
            });

        for slot in state.slots.drain(..) {
            surface.destroy_marker(slot.handle);
        }

        let retained = tokens.truncated(self.capacity);
        for (index, token) in retained.iter().enumerate() {
            let handle = surface.create_marker(entity, index, token);
            surface.set_visible(handle, !hidden);
            state.slots.push(RenderSlot {
                index,
                token: token.to_owned(),
                handle,
                pose: None,
            });
        }
        state.active_tokens = tokens.clone();
        state.hidden = hidden;

        let clamped = tokens.len() - retained.len();
        if clamped > 0 {
            tracing::debug!(
                entity = %entity,
                capacity = self.capacity,
                dropped = clamped,
                "token list exceeds slot capacity"
            );
        }
        tracing::debug!(entity = %entity, slots = retained.len(), hidden, "rebuilt markers");

        debug_assert_eq!(
            state.slots.len(),
            state.active_tokens.len().min(self.capacity),
            "slot count must track the clamped token count"
        );

        Ok(ReconcileOutcome::Rebuilt {
            slots: retained.len(),
            clamped,
        })
    }

    /// Suppresses or shows every slot of `entity` without destroying them.
    ///
    /// No-op if the entity has no markers.
    pub fn set_hidden(
        &mut self,
        surface: &mut impl MarkerSurface,
        entity: &EntityId,
        hidden: bool,
    ) -> VisibilityChange {
        let Some(state) = self.states.get_mut(entity) else {
            return VisibilityChange::Unchanged;
        };
        if state.hidden == hidden {
            return VisibilityChange::Unchanged;
        }
        state.hidden = hidden;
        for slot in &state.slots {
            surface.set_visible(slot.handle, !hidden);
        }
        if hidden {
            VisibilityChange::Hidden
        } else {
            VisibilityChange::Shown
        }
    }

    /// Destroys every marker and forgets all entities.
    pub fn clear_all(&mut self, surface: &mut impl MarkerSurface) {
        for (_, state) in core::mem::take(&mut self.states) {
            for slot in state.slots {
                surface.destroy_marker(slot.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::host::testing::{TestEnv, TestSurface};

    fn id(raw: &str) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    fn setup() -> (EntityId, TestEnv, TestSurface, Reconciler) {
        let e1 = id("E1");
        let env = TestEnv::with_entities(&[&e1]);
        (e1, env, TestSurface::default(), Reconciler::new(MAX_SLOTS))
    }

    /// Compares everything except surface handles.
    fn same_shape(a: &EntityMarkerState, b: &EntityMarkerState) -> bool {
        a.entity == b.entity
            && a.active_tokens == b.active_tokens
            && a.hidden == b.hidden
            && a.slots.len() == b.slots.len()
            && a.slots
                .iter()
                .zip(&b.slots)
                .all(|(x, y)| x.index == y.index && x.token == y.token)
    }

    #[test]
    fn fire_and_poison_produce_two_ordered_slots() {
        let (e1, env, mut surface, mut rec) = setup();
        let outcome = rec
            .reconcile(&env, &mut surface, &e1, &decode("[fire][poison]"))
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Rebuilt { slots: 2, clamped: 0 });
        let state = rec.state(&e1).unwrap();
        assert_eq!(state.slot_tokens().collect::<Vec<_>>(), ["fire", "poison"]);
        assert_eq!(state.slots[0].index, 0);
        assert_eq!(state.slots[1].index, 1);
        assert!(rec.is_tracked(&e1));
        assert_eq!(surface.live.len(), 2);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let (e1, env, mut surface, mut rec) = setup();
        let tokens = decode("[a][b][c]");
        rec.reconcile(&env, &mut surface, &e1, &tokens).unwrap();
        let once = rec.state(&e1).unwrap().clone();
        rec.reconcile(&env, &mut surface, &e1, &tokens).unwrap();
        let twice = rec.state(&e1).unwrap();
        assert!(same_shape(&once, twice), "{once:?} vs {twice:?}");
        assert_eq!(surface.live.len(), 3, "old markers must be destroyed");
    }

    #[test]
    fn capacity_clamps_in_list_order() {
        let (e1, env, mut surface, mut rec) = setup();
        let tokens: TokenList = (0..MAX_SLOTS + 5).map(|i| format!("t{i}")).collect();
        let outcome = rec.reconcile(&env, &mut surface, &e1, &tokens).unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Rebuilt {
                slots: MAX_SLOTS,
                clamped: 5
            }
        );
        let state = rec.state(&e1).unwrap();
        assert_eq!(state.slots.len(), MAX_SLOTS);
        assert_eq!(state.active_tokens.len(), MAX_SLOTS + 5);
        for (i, slot) in state.slots.iter().enumerate() {
            assert_eq!(slot.token, format!("t{i}"));
        }
    }

    #[test]
    fn legacy_capacity() {
        let (e1, env, mut surface, _) = setup();
        let mut rec = Reconciler::new(LEGACY_MAX_SLOTS);
        rec.reconcile(&env, &mut surface, &e1, &decode("[a][b][c][d]"))
            .unwrap();
        assert_eq!(rec.state(&e1).unwrap().slots.len(), 3);
    }

    #[test]
    fn empty_list_clears_and_untracks() {
        let (e1, env, mut surface, mut rec) = setup();
        rec.reconcile(&env, &mut surface, &e1, &decode("[a]")).unwrap();
        let outcome = rec
            .reconcile(&env, &mut surface, &e1, &TokenList::new())
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Cleared);
        assert!(!rec.is_tracked(&e1));
        assert!(surface.live.is_empty());
    }

    #[test]
    fn malformed_blob_clears() {
        let (e1, env, mut surface, mut rec) = setup();
        rec.reconcile(&env, &mut surface, &e1, &decode("[a]")).unwrap();
        rec.reconcile(&env, &mut surface, &e1, &decode("garbage"))
            .unwrap();
        assert!(rec.is_empty());
    }

    #[test]
    fn unresolved_entity_is_retryable_and_untouched() {
        let (_, env, mut surface, mut rec) = setup();
        let ghost = id("ghost");
        let err = rec
            .reconcile(&env, &mut surface, &ghost, &decode("[a]"))
            .unwrap_err();
        assert_eq!(err, ReconcileError::Unresolved(ghost.clone()));
        assert!(!rec.is_tracked(&ghost));
        assert_eq!(surface.created, 0);

        // Clearing an unknown entity is fine without an anchor.
        assert_eq!(
            rec.reconcile(&env, &mut surface, &ghost, &TokenList::new()),
            Ok(ReconcileOutcome::Cleared)
        );
    }

    #[test]
    fn hidden_suppresses_without_destroying() {
        let (e1, env, mut surface, mut rec) = setup();
        rec.reconcile(&env, &mut surface, &e1, &decode("[a][b]")).unwrap();
        let created = surface.created;

        assert_eq!(rec.set_hidden(&mut surface, &e1, true), VisibilityChange::Hidden);
        assert_eq!(rec.set_hidden(&mut surface, &e1, true), VisibilityChange::Unchanged);
        let state = rec.state(&e1).unwrap();
        assert!(state.hidden);
        assert_eq!(state.slots.len(), 2, "slots survive hiding");
        assert!(surface.visible.values().all(|v| !v));

        assert_eq!(rec.set_hidden(&mut surface, &e1, false), VisibilityChange::Shown);
        assert!(surface.visible.values().all(|v| *v));
        assert_eq!(surface.created, created, "no markers re-created");
    }

    #[test]
    fn set_hidden_without_slots_is_noop() {
        let (_, _, mut surface, mut rec) = setup();
        assert_eq!(
            rec.set_hidden(&mut surface, &id("nobody"), true),
            VisibilityChange::Unchanged
        );
    }

    #[test]
    fn new_slots_respect_environment_hidden() {
        let (e1, mut env, mut surface, mut rec) = setup();
        env.hidden.insert(e1.clone());
        rec.reconcile(&env, &mut surface, &e1, &decode("[a]")).unwrap();
        assert!(rec.state(&e1).unwrap().hidden);
        assert_eq!(surface.visible.values().copied().collect::<Vec<_>>(), [false]);
    }

    #[test]
    fn clear_all_destroys_everything() {
        let (e1, mut env, mut surface, mut rec) = setup();
        let e2 = id("E2");
        env.anchors.insert(e2.clone(), crate::host::Anchor::at([1.0, 0.0, 0.0]));
        rec.reconcile(&env, &mut surface, &e1, &decode("[a]")).unwrap();
        rec.reconcile(&env, &mut surface, &e2, &decode("[b][c]")).unwrap();
        rec.clear_all(&mut surface);
        assert!(rec.is_empty());
        assert!(surface.live.is_empty());
    }
}
