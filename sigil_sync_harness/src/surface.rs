// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render surface that keeps markers as plain records.

use std::collections::BTreeMap;

use sigil_core::entity::{EntityId, MarkerHandle};
use sigil_core::host::MarkerSurface;
use sigil_core::transform::Pose;

/// A marker as the surface sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct FakeMarker {
    /// Owning entity.
    pub entity: EntityId,
    /// Slot index at creation.
    pub slot: usize,
    /// Token the marker shows.
    pub token: String,
    /// Last pose set, if any.
    pub pose: Option<Pose>,
    /// Whether the marker is shown.
    pub visible: bool,
}

/// Call counters for a [`FakeSurface`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    /// `create_marker` calls.
    pub created: usize,
    /// `destroy_marker` calls.
    pub destroyed: usize,
    /// `set_pose` calls.
    pub poses: usize,
    /// `set_visible` calls.
    pub visibility: usize,
}

/// A [`MarkerSurface`] that records markers instead of drawing them.
///
/// Calls on handles that are not live are logged and ignored.
#[derive(Debug, Default)]
pub struct FakeSurface {
    next: u64,
    live: BTreeMap<u64, FakeMarker>,
    stats: SurfaceStats,
    misuse: usize,
}

impl FakeSurface {
    /// Creates an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live markers for `entity`, ordered by slot.
    #[must_use]
    pub fn markers_for(&self, entity: &EntityId) -> Vec<&FakeMarker> {
        let mut markers: Vec<_> = self.live.values().filter(|m| m.entity == *entity).collect();
        markers.sort_by_key(|m| m.slot);
        markers
    }

    /// Tokens shown for `entity`, in slot order.
    #[must_use]
    pub fn tokens_for(&self, entity: &EntityId) -> Vec<String> {
        self.markers_for(entity)
            .into_iter()
            .map(|m| m.token.clone())
            .collect()
    }

    /// Number of live markers across all entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Call counters.
    #[must_use]
    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    /// Calls made with a handle that was never created or already destroyed.
    #[must_use]
    pub fn misuse(&self) -> usize {
        self.misuse
    }

    fn live_mut(&mut self, handle: MarkerHandle, op: &'static str) -> Option<&mut FakeMarker> {
        let found = self.live.get_mut(&handle.0);
        if found.is_none() {
            self.misuse += 1;
            tracing::warn!(?handle, op, "surface call on dead marker");
        }
        found
    }
}

impl MarkerSurface for FakeSurface {
    fn create_marker(&mut self, entity: &EntityId, slot: usize, token: &str) -> MarkerHandle {
        self.next += 1;
        self.stats.created += 1;
        self.live.insert(
            self.next,
            FakeMarker {
                entity: entity.clone(),
                slot,
                token: token.to_owned(),
                pose: None,
                visible: true,
            },
        );
        MarkerHandle(self.next)
    }

    fn destroy_marker(&mut self, handle: MarkerHandle) {
        self.stats.destroyed += 1;
        if self.live.remove(&handle.0).is_none() {
            self.misuse += 1;
            tracing::warn!(?handle, "destroying dead marker");
        }
    }

    fn set_pose(&mut self, handle: MarkerHandle, pose: &Pose) {
        self.stats.poses += 1;
        if let Some(marker) = self.live_mut(handle, "set_pose") {
            marker.pose = Some(*pose);
        }
    }

    fn set_visible(&mut self, handle: MarkerHandle, visible: bool) {
        self.stats.visibility += 1;
        if let Some(marker) = self.live_mut(handle, "set_visible") {
            marker.visible = visible;
        }
    }
}
