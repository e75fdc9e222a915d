// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! Marker placement uses [`understory_dirty`] to decide which entities need
//! their slot poses recomputed.
//!
//! # Propagation semantics
//!
//! Every tracked entity key has a dependency edge onto a single shared camera
//! key. Marking the camera key with
//! [`EagerPolicy`](understory_dirty::EagerPolicy) therefore marks every
//! tracked entity, which is how one changed yaw sample invalidates all cached
//! placements at once. Marking an entity key with the default policy
//! (reconcile, resync, un-hide) affects only that entity.
//!
//! # Consumption
//!
//! Callers never query dirty state directly. Each
//! [`PlacementEngine::update`](crate::placement::PlacementEngine::update)
//! call drains [`PLACEMENT`] and repositions the drained entities.

use understory_dirty::Channel;

/// Slot poses are stale and must be recomputed.
pub const PLACEMENT: Channel = Channel::new(0);
