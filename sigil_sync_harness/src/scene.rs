// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scriptable scene environment.

use std::collections::BTreeMap;

use sigil_core::entity::EntityId;
use sigil_core::host::{Anchor, Environment};
use sigil_core::time::{Duration, HostTime};

/// One entity placed in a [`FakeScene`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneEntity {
    /// Where its markers attach.
    pub anchor: Anchor,
    /// Whether it is hidden from this client.
    pub hidden: bool,
}

/// An [`Environment`] whose every answer is set by the test.
///
/// Time starts at zero and moves only through [`advance`](Self::advance).
#[derive(Clone, Debug, Default)]
pub struct FakeScene {
    loaded: bool,
    now: HostTime,
    yaw: f64,
    entities: BTreeMap<EntityId, SceneEntity>,
    selected: Option<EntityId>,
    menu: bool,
}

impl FakeScene {
    /// Creates an unloaded, empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`spawn`](Self::spawn).
    #[must_use]
    pub fn with_entity(mut self, entity: &EntityId, anchor: Anchor) -> Self {
        self.spawn(entity, anchor);
        self
    }

    /// Builder form of [`set_loaded`](Self::set_loaded).
    #[must_use]
    pub fn loaded(mut self, loaded: bool) -> Self {
        self.loaded = loaded;
        self
    }

    /// Sets whether the scene reports itself as built.
    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    /// Adds or replaces an entity.
    pub fn spawn(&mut self, entity: &EntityId, anchor: Anchor) {
        self.entities.insert(
            entity.clone(),
            SceneEntity {
                anchor,
                hidden: false,
            },
        );
    }

    /// Removes an entity; its anchor no longer resolves.
    pub fn despawn(&mut self, entity: &EntityId) -> Option<SceneEntity> {
        self.entities.remove(entity)
    }

    /// Moves an entity. Returns `false` if it is not in the scene.
    pub fn move_entity(&mut self, entity: &EntityId, position: [f64; 3]) -> bool {
        match self.entities.get_mut(entity) {
            Some(e) => {
                e.anchor.position = position;
                true
            }
            None => false,
        }
    }

    /// Hides or reveals an entity. Returns `false` if it is not in the scene.
    pub fn set_hidden(&mut self, entity: &EntityId, hidden: bool) -> bool {
        match self.entities.get_mut(entity) {
            Some(e) => {
                e.hidden = hidden;
                true
            }
            None => false,
        }
    }

    /// Sets the camera yaw, in degrees.
    pub fn set_yaw(&mut self, yaw: f64) {
        self.yaw = yaw;
    }

    /// Selects an entity, or clears the selection.
    pub fn select(&mut self, entity: Option<EntityId>) {
        self.selected = entity;
    }

    /// Arms the menu trigger for the next tick.
    pub fn trigger_menu(&mut self) {
        self.menu = true;
    }

    /// Advances the clock.
    pub fn advance(&mut self, by: Duration) {
        self.now = self.now.saturating_add(by);
    }

    /// The entity record, if present.
    #[must_use]
    pub fn entity(&self, entity: &EntityId) -> Option<&SceneEntity> {
        self.entities.get(entity)
    }
}

impl Environment for FakeScene {
    fn environment_loaded(&self) -> bool {
        self.loaded
    }

    fn population(&self) -> usize {
        self.entities.len()
    }

    fn now(&self) -> HostTime {
        self.now
    }

    fn camera_yaw(&self) -> f64 {
        self.yaw
    }

    fn resolve_anchor(&self, entity: &EntityId) -> Option<Anchor> {
        if !self.loaded {
            return None;
        }
        self.entities.get(entity).map(|e| e.anchor)
    }

    fn is_hidden(&self, entity: &EntityId) -> bool {
        self.entities.get(entity).is_some_and(|e| e.hidden)
    }

    fn selected_entity(&self) -> Option<EntityId> {
        self.selected.clone()
    }

    fn menu_trigger(&mut self) -> bool {
        core::mem::take(&mut self.menu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unloaded_scene_resolves_nothing() {
        let orc = EntityId::new("orc").unwrap();
        let mut scene = FakeScene::new().with_entity(&orc, Anchor::at([1.0, 0.0, 0.0]));
        assert_eq!(scene.resolve_anchor(&orc), None);

        scene.set_loaded(true);
        assert_eq!(scene.resolve_anchor(&orc).map(|a| a.position), Some([1.0, 0.0, 0.0]));
        assert_eq!(scene.population(), 1);
    }

    #[test]
    fn menu_trigger_is_consumed() {
        let mut scene = FakeScene::new();
        scene.trigger_menu();
        assert!(scene.menu_trigger());
        assert!(!scene.menu_trigger());
    }
}
