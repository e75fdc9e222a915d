// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host collaborator contract.
//!
//! Sigil splits everything it does not own into three collaborator traits.
//! A host integration provides one implementation of each:
//!
//! - **Environment**: Implements [`Environment`] to answer scene queries:
//!   whether the world is loaded, the current camera yaw, where an entity's
//!   anchor is, and whether the entity is hidden.
//!
//! - **Surface**: Implements [`MarkerSurface`] to create, pose, show, hide,
//!   and destroy marker visuals. Core only keeps the returned
//!   [`MarkerHandle`]s.
//!
//! - **Transport**: Implements [`Transport`] to publish and read encoded
//!   token lists. Incoming changes are delivered by calling
//!   [`MarkerSystem::on_change_notification`](crate::driver::MarkerSystem::on_change_notification)
//!   on the same logical thread as the tick.
//!
//! # Frame loop pseudocode
//!
//! ```rust,ignore
//! fn on_frame(system: &mut MarkerSystem<Scene, Surface, Bus>) {
//!     for change in system.transport_mut().poll() {
//!         system.on_change_notification(change);
//!     }
//!     let report = system.tick();
//!     if let Some(menu) = report.menu {
//!         open_marker_menu(menu.entity, &menu.active);
//!     }
//! }
//! ```

use crate::entity::{EntityId, MarkerHandle};
use crate::time::HostTime;
use crate::transform::Pose;

/// Where an entity currently stands in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    /// World position of the entity's base.
    pub position: [f64; 3],
    /// Height of the entity's head above `position`, in world units.
    pub head_height: f64,
    /// The entity's visual scale (1.0 for a medium creature).
    pub visual_scale: f64,
}

impl Anchor {
    /// Creates an anchor with unit scale.
    #[must_use]
    pub const fn at(position: [f64; 3]) -> Self {
        Self {
            position,
            head_height: 1.0,
            visual_scale: 1.0,
        }
    }
}

/// Scene queries answered by the host.
pub trait Environment {
    /// Whether the scene is constructed and entities can be resolved.
    fn environment_loaded(&self) -> bool;

    /// Number of entities the host currently knows about. Used only by the
    /// settle probe.
    fn population(&self) -> usize {
        0
    }

    /// Current monotonic time.
    fn now(&self) -> HostTime;

    /// Current camera yaw, in degrees.
    fn camera_yaw(&self) -> f64;

    /// Resolves an entity's anchor, or `None` if the entity is not currently
    /// in the scene.
    fn resolve_anchor(&self, entity: &EntityId) -> Option<Anchor>;

    /// Whether the entity is currently hidden from this client.
    fn is_hidden(&self, entity: &EntityId) -> bool;

    /// The entity this client has selected, if any.
    fn selected_entity(&self) -> Option<EntityId> {
        None
    }

    /// Polls (and consumes) the manual menu trigger.
    fn menu_trigger(&mut self) -> bool {
        false
    }
}

/// Render primitives for marker visuals.
pub trait MarkerSurface {
    /// Creates the marker for `token` in `slot` of `entity`.
    fn create_marker(&mut self, entity: &EntityId, slot: usize, token: &str) -> MarkerHandle;

    /// Destroys a marker. The handle is not used again.
    fn destroy_marker(&mut self, handle: MarkerHandle);

    /// Moves a marker.
    fn set_pose(&mut self, handle: MarkerHandle, pose: &Pose);

    /// Shows or suppresses a marker without destroying it.
    fn set_visible(&mut self, handle: MarkerHandle, visible: bool);
}

/// Pub/sub state transport.
///
/// Values are stored per `(entity, key)` with last-writer-wins semantics.
pub trait Transport {
    /// Publishes `value` for `(entity, key)`.
    fn publish(&mut self, entity: &EntityId, key: &str, value: &str);

    /// Reads the last stored value for `(entity, key)`.
    fn read(&self, entity: &EntityId, key: &str) -> Option<String>;

    /// Asks the transport to re-deliver every stored value as fresh
    /// notifications. Called when the environment (re)loads.
    fn request_replay(&mut self) {}
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal in-crate collaborators for unit tests.

    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct TestEnv {
        pub(crate) loaded: bool,
        pub(crate) now: u64,
        pub(crate) yaw: f64,
        pub(crate) anchors: BTreeMap<EntityId, Anchor>,
        pub(crate) hidden: BTreeSet<EntityId>,
        pub(crate) selected: Option<EntityId>,
        pub(crate) menu: bool,
    }

    impl TestEnv {
        pub(crate) fn with_entities(ids: &[&EntityId]) -> Self {
            let mut env = Self {
                loaded: true,
                ..Self::default()
            };
            for (i, id) in ids.iter().enumerate() {
                let x = f64::from(u32::try_from(i).unwrap()) * 10.0;
                env.anchors.insert((*id).clone(), Anchor::at([x, 0.0, 0.0]));
            }
            env
        }
    }

    impl Environment for TestEnv {
        fn environment_loaded(&self) -> bool {
            self.loaded
        }

        fn population(&self) -> usize {
            self.anchors.len()
        }

        fn now(&self) -> HostTime {
            HostTime(self.now)
        }

        fn camera_yaw(&self) -> f64 {
            self.yaw
        }

        fn resolve_anchor(&self, entity: &EntityId) -> Option<Anchor> {
            self.anchors.get(entity).copied()
        }

        fn is_hidden(&self, entity: &EntityId) -> bool {
            self.hidden.contains(entity)
        }

        fn selected_entity(&self) -> Option<EntityId> {
            self.selected.clone()
        }

        fn menu_trigger(&mut self) -> bool {
            core::mem::take(&mut self.menu)
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct TestSurface {
        next: u64,
        pub(crate) live: BTreeMap<u64, (EntityId, usize, String)>,
        pub(crate) visible: BTreeMap<u64, bool>,
        pub(crate) poses: BTreeMap<u64, Pose>,
        pub(crate) pose_calls: usize,
        pub(crate) created: usize,
        pub(crate) destroyed: usize,
    }

    impl MarkerSurface for TestSurface {
        fn create_marker(&mut self, entity: &EntityId, slot: usize, token: &str) -> MarkerHandle {
            self.next += 1;
            self.created += 1;
            self.live
                .insert(self.next, (entity.clone(), slot, token.to_owned()));
            MarkerHandle(self.next)
        }

        fn destroy_marker(&mut self, handle: MarkerHandle) {
            assert!(
                self.live.remove(&handle.0).is_some(),
                "double destroy of {handle:?}"
            );
            self.visible.remove(&handle.0);
            self.poses.remove(&handle.0);
            self.destroyed += 1;
        }

        fn set_pose(&mut self, handle: MarkerHandle, pose: &Pose) {
            assert!(self.live.contains_key(&handle.0), "pose on dead {handle:?}");
            self.poses.insert(handle.0, *pose);
            self.pose_calls += 1;
        }

        fn set_visible(&mut self, handle: MarkerHandle, visible: bool) {
            assert!(self.live.contains_key(&handle.0), "visibility on dead {handle:?}");
            self.visible.insert(handle.0, visible);
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct TestTransport {
        pub(crate) store: BTreeMap<(EntityId, String), String>,
        pub(crate) published: Vec<(EntityId, String, String)>,
        pub(crate) replays: usize,
    }

    impl Transport for TestTransport {
        fn publish(&mut self, entity: &EntityId, key: &str, value: &str) {
            self.store
                .insert((entity.clone(), key.to_owned()), value.to_owned());
            self.published
                .push((entity.clone(), key.to_owned(), value.to_owned()));
        }

        fn read(&self, entity: &EntityId, key: &str) -> Option<String> {
            self.store.get(&(entity.clone(), key.to_owned())).cloned()
        }

        fn request_replay(&mut self) {
            self.replays += 1;
        }
    }
}
