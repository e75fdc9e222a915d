// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Marker placement: slot layout and lazy recomputation.
//!
//! Layout is a pure function of `(slot index, slot count, anchor, camera
//! yaw)` and one of two modes:
//!
//! - **Ring**: markers fan out around the yaw-facing forward vector at one
//!   height above the anchor. One marker sits centered; more markers spread
//!   symmetrically in steps of [`LayoutParams::fan_step_degrees`] (±20° for
//!   two, −20°/0°/+20° for three). The offset scales with the entity's
//!   visual scale.
//! - **Stack**: markers form rows of up to [`LayoutParams::columns`]
//!   columns above the head, row and column given by `index / columns` and
//!   `index % columns`, each row centered.
//!
//! Both modes billboard each marker toward the camera yaw and apply a
//! uniform scale of `base_scale * sqrt(visual_scale)`.
//!
//! # Recomputation
//!
//! [`PlacementEngine`] keeps a [`DirtyTracker`] with one key per tracked
//! entity, each depending on a shared camera key (see [`dirty`]). A changed
//! yaw sample marks the camera key, which invalidates every entity; resync
//! and un-hide mark a single entity. [`PlacementEngine::update`] drains the
//! channel and repositions only what was marked. An entity whose anchor
//! cannot be resolved is re-marked and retried on the next update.

use std::collections::BTreeMap;

use kurbo::Point;
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use crate::dirty;
use crate::entity::EntityId;
use crate::host::{Anchor, Environment, MarkerSurface};
use crate::reconcile::{EntityMarkerState, Reconciler};
use crate::transform::{Pose, Transform3d};

/// Marker arrangement around an anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LayoutMode {
    /// Fan in front of the entity, facing the camera.
    #[default]
    Ring,
    /// Rows of markers stacked above the head.
    Stack,
}

/// Geometric constants for both layout modes.
///
/// Distances are in world units at visual scale 1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LayoutParams {
    /// Ring: horizontal distance from the anchor toward the camera.
    pub ring_radius: f64,
    /// Ring: height above the anchor.
    pub ring_height: f64,
    /// Ring: angular step between neighboring markers, in degrees.
    pub fan_step_degrees: f64,
    /// Marker tilt about X, in degrees.
    pub pitch_degrees: f64,
    /// Stack: markers per row.
    pub columns: usize,
    /// Stack: maximum rows.
    pub rows: usize,
    /// Stack: horizontal spacing between columns.
    pub column_spacing: f64,
    /// Stack: vertical spacing between rows.
    pub row_step: f64,
    /// Stack: gap between the head and the first row.
    pub head_clearance: f64,
    /// Marker scale at visual scale 1.0.
    pub base_scale: f64,
}

impl LayoutParams {
    /// Default geometry.
    pub const DEFAULT: Self = Self {
        ring_radius: 0.45,
        ring_height: 0.05,
        fan_step_degrees: 20.0,
        pitch_degrees: 20.0,
        columns: 4,
        rows: 4,
        column_spacing: 0.2,
        row_step: 0.2,
        head_clearance: 0.25,
        base_scale: 0.001,
    };

    /// Number of cells in the stack grid.
    #[must_use]
    pub const fn stack_capacity(&self) -> usize {
        self.columns * self.rows
    }
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Fan offset of slot `index` out of `count`, in degrees.
///
/// The half-span is `step * max(count - 1, 2) / 2`, so two markers sit at
/// ±step rather than ±step/2.
#[must_use]
pub fn fan_angle(params: &LayoutParams, index: usize, count: usize) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    let gaps = (count - 1) as f64;
    let half = params.fan_step_degrees * gaps.max(2.0) / 2.0;
    -half + index as f64 * (2.0 * half / gaps)
}

/// Uniform marker scale for an entity, dampened by the square root of its
/// visual scale.
#[must_use]
pub fn marker_scale(params: &LayoutParams, anchor: &Anchor) -> f64 {
    params.base_scale * anchor.visual_scale.max(0.0).sqrt()
}

/// Position in the stack's billboard plane for slot `index` of `count`:
/// `x` across, `y` up from the head, at visual scale 1.0.
fn stack_cell(params: &LayoutParams, index: usize, count: usize) -> Point {
    let columns = params.columns.max(1);
    let row = index / columns;
    let col = index % columns;
    let in_row = columns.min(count - row * columns);
    let centered = col as f64 - (in_row - 1) as f64 / 2.0;
    Point::new(
        centered * params.column_spacing,
        params.head_clearance + row as f64 * params.row_step,
    )
}

/// Computes the pose of slot `index` when `count` slots are active.
#[must_use]
pub fn slot_pose(
    mode: LayoutMode,
    params: &LayoutParams,
    index: usize,
    count: usize,
    anchor: &Anchor,
    yaw_degrees: f64,
) -> Pose {
    debug_assert!(index < count, "slot {index} out of {count}");
    let vs = anchor.visual_scale;
    let (local, facing) = match mode {
        LayoutMode::Ring => {
            let facing = yaw_degrees + fan_angle(params, index, count);
            (
                [0.0, params.ring_height * vs, -params.ring_radius * vs],
                facing,
            )
        }
        LayoutMode::Stack => {
            let cell = stack_cell(params, index, count);
            (
                [cell.x * vs, anchor.head_height + cell.y * vs, 0.0],
                yaw_degrees,
            )
        }
    };
    let offset = Transform3d::from_rotation_y(facing.to_radians()).transform_point(local);
    let [ax, ay, az] = anchor.position;
    Pose {
        position: [ax + offset[0], ay + offset[1], az + offset[2]],
        pitch_degrees: params.pitch_degrees,
        yaw_degrees: facing,
        scale: marker_scale(params, anchor),
    }
}

/// Computes poses for `count` slots.
#[must_use]
pub fn layout(
    mode: LayoutMode,
    params: &LayoutParams,
    count: usize,
    anchor: &Anchor,
    yaw_degrees: f64,
) -> Vec<Pose> {
    (0..count)
        .map(|i| slot_pose(mode, params, i, count, anchor, yaw_degrees))
        .collect()
}

/// Counts from one [`PlacementEngine::update`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementReport {
    /// Entities whose slots were repositioned, in key order.
    pub recomputed: Vec<EntityId>,
    /// Entities skipped because their anchor could not be resolved.
    pub deferred: Vec<EntityId>,
    /// Dirty entities left for a later update because they were out of
    /// scope.
    pub out_of_scope: usize,
    /// Total `set_pose` calls issued.
    pub poses: usize,
}

const CAMERA_KEY: u32 = 0;

/// Lazily recomputes marker poses.
#[derive(Debug)]
pub struct PlacementEngine {
    mode: LayoutMode,
    params: LayoutParams,
    dirty: DirtyTracker<u32>,
    keys: BTreeMap<EntityId, u32>,
    entities: Vec<Option<EntityId>>,
    free_keys: Vec<u32>,
    last_yaw: Option<f64>,
}

impl PlacementEngine {
    /// Creates an engine with no tracked entities and no yaw sample.
    #[must_use]
    pub fn new(mode: LayoutMode, params: LayoutParams) -> Self {
        Self {
            mode,
            params,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            keys: BTreeMap::new(),
            // Key 0 is the camera.
            entities: vec![None],
            free_keys: Vec::new(),
            last_yaw: None,
        }
    }

    /// Layout mode.
    #[must_use]
    pub const fn mode(&self) -> LayoutMode {
        self.mode
    }

    /// Layout geometry.
    #[must_use]
    pub const fn params(&self) -> &LayoutParams {
        &self.params
    }

    /// The yaw sample placements were last invalidated for.
    #[must_use]
    pub const fn last_yaw(&self) -> Option<f64> {
        self.last_yaw
    }

    /// Yaw to lay out with: `sample` when finite, else the last finite
    /// sample. `None` until the host has reported a usable yaw.
    #[must_use]
    pub fn usable_yaw(&self, sample: f64) -> Option<f64> {
        if sample.is_finite() {
            Some(sample)
        } else {
            self.last_yaw
        }
    }

    /// Whether `entity` participates in yaw invalidation.
    #[must_use]
    pub fn is_tracked(&self, entity: &EntityId) -> bool {
        self.keys.contains_key(entity)
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no entity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Starts tracking `entity`. Idempotent.
    pub fn track(&mut self, entity: &EntityId) {
        if self.keys.contains_key(entity) {
            return;
        }
        let key = if let Some(key) = self.free_keys.pop() {
            self.entities[key as usize] = Some(entity.clone());
            key
        } else {
            let key = u32::try_from(self.entities.len()).unwrap_or(u32::MAX);
            self.entities.push(Some(entity.clone()));
            key
        };
        let _ = self.dirty.add_dependency(key, CAMERA_KEY, dirty::PLACEMENT);
        self.keys.insert(entity.clone(), key);
    }

    /// Stops tracking `entity`, discarding any pending invalidation.
    pub fn untrack(&mut self, entity: &EntityId) {
        let Some(key) = self.keys.remove(entity) else {
            return;
        };
        self.dirty.remove_key(key);
        self.entities[key as usize] = None;
        self.free_keys.push(key);
    }

    /// Marks one entity's placement stale.
    pub fn invalidate(&mut self, entity: &EntityId) {
        if let Some(&key) = self.keys.get(entity) {
            self.dirty.mark(key, dirty::PLACEMENT);
        }
    }

    /// Feeds this tick's camera yaw. Any change from the previous sample,
    /// including the first sample, invalidates every tracked entity.
    ///
    /// Non-finite samples are ignored. Returns whether the yaw changed.
    pub fn observe_yaw(&mut self, yaw_degrees: f64) -> bool {
        if !yaw_degrees.is_finite() || self.last_yaw == Some(yaw_degrees) {
            return false;
        }
        self.last_yaw = Some(yaw_degrees);
        self.dirty
            .mark_with(CAMERA_KEY, dirty::PLACEMENT, &EagerPolicy);
        true
    }

    /// Positions every slot of `state` around `anchor` and pushes the poses
    /// to the surface. Returns the number of poses applied.
    pub fn place(
        &self,
        state: &mut EntityMarkerState,
        anchor: &Anchor,
        yaw_degrees: f64,
        surface: &mut impl MarkerSurface,
    ) -> usize {
        let count = state.slots.len();
        for slot in &mut state.slots {
            let pose = slot_pose(self.mode, &self.params, slot.index, count, anchor, yaw_degrees);
            surface.set_pose(slot.handle, &pose);
            slot.pose = Some(pose);
        }
        count
    }

    /// Repositions every invalidated entity that is `in_scope`.
    ///
    /// Hidden entities are skipped and stay clean; showing them again
    /// invalidates them. Out-of-scope and unresolvable entities stay dirty.
    pub fn update(
        &mut self,
        reconciler: &mut Reconciler,
        env: &impl Environment,
        surface: &mut impl MarkerSurface,
        in_scope: impl Fn(&EntityId) -> bool,
    ) -> PlacementReport {
        let mut report = PlacementReport::default();
        // Without a usable yaw everything stays dirty for a later update.
        let Some(yaw) = self.last_yaw.or_else(|| self.usable_yaw(env.camera_yaw())) else {
            return report;
        };

        let mut dirty_keys: Vec<u32> = self
            .dirty
            .drain(dirty::PLACEMENT)
            .affected()
            .deterministic()
            .run()
            .collect();
        dirty_keys.sort_unstable();

        let mut still_dirty = Vec::new();
        for key in dirty_keys {
            if key == CAMERA_KEY {
                continue;
            }
            let Some(Some(entity)) = self.entities.get(key as usize).cloned() else {
                continue;
            };
            if !in_scope(&entity) {
                report.out_of_scope += 1;
                still_dirty.push(key);
                continue;
            }
            let Some(state) = reconciler.state_mut(&entity) else {
                continue;
            };
            if state.hidden {
                continue;
            }
            let Some(anchor) = env.resolve_anchor(&entity) else {
                still_dirty.push(key);
                report.deferred.push(entity);
                continue;
            };
            report.poses += self.place(state, &anchor, yaw, surface);
            report.recomputed.push(entity);
        }

        for key in still_dirty {
            self.dirty.mark(key, dirty::PLACEMENT);
        }
        report
    }

    /// Forgets every tracked entity and the yaw sample.
    pub fn clear(&mut self) {
        *self = Self::new(self.mode, self.params);
    }
}
