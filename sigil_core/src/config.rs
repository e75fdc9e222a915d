// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Marker subsystem configuration.
//!
//! [`MarkerConfig`] is a plain value passed to
//! [`MarkerSystem::new`](crate::driver::MarkerSystem::new), which validates
//! it. Two presets cover the shipped layouts: [`MarkerConfig::ring`] (three
//! markers fanned in front of the entity) and [`MarkerConfig::stack`] (up to
//! twelve markers stacked above the head).

use thiserror::Error;

use crate::backlog::MAX_DRAIN_PASSES;
use crate::placement::{LayoutMode, LayoutParams};
use crate::reconcile::{LEGACY_MAX_SLOTS, MAX_SLOTS};
use crate::time::Duration;

/// Default namespace key for marker notifications.
pub const DEFAULT_TOPIC: &str = "sigil.markers";

/// Suffix appended to the topic to form the position-resync key.
pub const RESYNC_SUFFIX: &str = ".Update";

/// Which entities the per-tick visibility poll and lazy placement cover.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncScope {
    /// Every entity with markers.
    #[default]
    AllTracked,
    /// Only the entity the host reports as selected.
    SelectedOnly,
}

/// A rejected configuration.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The topic key is empty.
    #[error("topic must not be empty")]
    EmptyTopic,
    /// `max_slots` is zero.
    #[error("max_slots must be at least 1")]
    ZeroSlots,
    /// `max_slots` exceeds [`MAX_SLOTS`], or [`LEGACY_MAX_SLOTS`] for the
    /// ring layout.
    #[error("max_slots is {requested}, the limit is {limit}")]
    TooManySlots {
        /// Configured value.
        requested: usize,
        /// Limit for the configured layout.
        limit: usize,
    },
    /// Stack layout grid cannot hold `max_slots` markers.
    #[error("stack grid holds {capacity} markers, max_slots is {requested}")]
    StackGridTooSmall {
        /// Configured slot count.
        requested: usize,
        /// `columns * rows`.
        capacity: usize,
    },
    /// `max_drain_passes` is zero.
    #[error("max_drain_passes must be at least 1")]
    ZeroDrainPasses,
    /// A layout parameter is not finite or out of range.
    #[error("layout parameter `{0}` is not finite or out of range")]
    InvalidGeometry(&'static str),
}

/// Configuration for a [`MarkerSystem`](crate::driver::MarkerSystem).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkerConfig {
    /// Namespace key for marker notifications.
    pub topic: String,
    /// Marker arrangement.
    pub layout: LayoutMode,
    /// Slots retained per entity; surplus tokens are dropped. At most
    /// [`LEGACY_MAX_SLOTS`] for the ring layout, whose fan would otherwise
    /// swing markers behind the entity.
    pub max_slots: usize,
    /// Layout geometry.
    pub params: LayoutParams,
    /// Delay between backlog drain passes, in host ticks.
    pub drain_interval: Duration,
    /// Drain passes before the backlog is abandoned.
    pub max_drain_passes: u32,
    /// Unchanged population samples required before leaving `NotReady`.
    pub settle_ticks: u32,
    /// Entities covered by per-tick polling.
    pub sync_scope: SyncScope,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self::ring()
    }
}

impl MarkerConfig {
    /// Three markers fanned in front of the entity.
    #[must_use]
    pub fn ring() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_owned(),
            layout: LayoutMode::Ring,
            max_slots: LEGACY_MAX_SLOTS,
            params: LayoutParams::DEFAULT,
            drain_interval: Duration::ZERO,
            max_drain_passes: MAX_DRAIN_PASSES,
            settle_ticks: 0,
            sync_scope: SyncScope::AllTracked,
        }
    }

    /// Up to twelve markers stacked above the head.
    #[must_use]
    pub fn stack() -> Self {
        Self {
            layout: LayoutMode::Stack,
            max_slots: MAX_SLOTS,
            ..Self::ring()
        }
    }

    /// Key of the position-resync signal.
    #[must_use]
    pub fn resync_topic(&self) -> String {
        format!("{}{RESYNC_SUFFIX}", self.topic)
    }

    /// Checks invariants the subsystem relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.max_slots == 0 {
            return Err(ConfigError::ZeroSlots);
        }
        if self.max_slots > MAX_SLOTS {
            return Err(ConfigError::TooManySlots {
                requested: self.max_slots,
                limit: MAX_SLOTS,
            });
        }
        if self.layout == LayoutMode::Ring && self.max_slots > LEGACY_MAX_SLOTS {
            return Err(ConfigError::TooManySlots {
                requested: self.max_slots,
                limit: LEGACY_MAX_SLOTS,
            });
        }
        if self.max_drain_passes == 0 {
            return Err(ConfigError::ZeroDrainPasses);
        }

        let p = &self.params;
        let finite = [
            ("ring_radius", p.ring_radius),
            ("ring_height", p.ring_height),
            ("fan_step_degrees", p.fan_step_degrees),
            ("pitch_degrees", p.pitch_degrees),
            ("column_spacing", p.column_spacing),
            ("row_step", p.row_step),
            ("head_clearance", p.head_clearance),
        ];
        if let Some((name, _)) = finite.into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::InvalidGeometry(name));
        }
        if !(p.base_scale.is_finite() && p.base_scale > 0.0) {
            return Err(ConfigError::InvalidGeometry("base_scale"));
        }

        if self.layout == LayoutMode::Stack {
            if p.columns == 0 {
                return Err(ConfigError::InvalidGeometry("columns"));
            }
            if self.max_slots > p.stack_capacity() {
                return Err(ConfigError::StackGridTooSmall {
                    requested: self.max_slots,
                    capacity: p.stack_capacity(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert_eq!(MarkerConfig::ring().validate(), Ok(()));
        assert_eq!(MarkerConfig::stack().validate(), Ok(()));
        assert_eq!(MarkerConfig::ring().max_slots, 3);
        assert_eq!(MarkerConfig::stack().max_slots, 12);
    }

    #[test]
    fn resync_topic_appends_suffix() {
        assert_eq!(MarkerConfig::ring().resync_topic(), "sigil.markers.Update");
    }

    #[test]
    fn rejects_slot_counts() {
        let mut config = MarkerConfig::ring();
        config.max_slots = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroSlots));
        config.max_slots = 13;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManySlots {
                requested: 13,
                limit: 12
            })
        );
    }

    #[test]
    fn rejects_small_stack_grid() {
        let mut config = MarkerConfig::stack();
        config.params.rows = 2;
        assert_eq!(
            config.validate(),
            Err(ConfigError::StackGridTooSmall {
                requested: 12,
                capacity: 8
            })
        );
        // The ring layout ignores the grid but not the fan limit.
        config.layout = LayoutMode::Ring;
        config.max_slots = LEGACY_MAX_SLOTS;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn ring_is_limited_to_three_slots() {
        for requested in LEGACY_MAX_SLOTS + 1..=MAX_SLOTS {
            let config = MarkerConfig {
                max_slots: requested,
                ..MarkerConfig::ring()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::TooManySlots {
                    requested,
                    limit: LEGACY_MAX_SLOTS
                }),
                "ring with {requested} slots"
            );
        }
        let stack = MarkerConfig {
            max_slots: 4,
            ..MarkerConfig::stack()
        };
        assert_eq!(stack.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_geometry_and_passes() {
        let mut config = MarkerConfig::ring();
        config.params.ring_radius = f64::NAN;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidGeometry("ring_radius"))
        );

        let mut config = MarkerConfig::ring();
        config.params.base_scale = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidGeometry("base_scale"))
        );

        let mut config = MarkerConfig::ring();
        config.max_drain_passes = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDrainPasses));

        let mut config = MarkerConfig::ring();
        config.topic = " ".into();
        assert_eq!(config.validate(), Err(ConfigError::EmptyTopic));
    }
}
