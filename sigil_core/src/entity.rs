// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Entity and marker identity types.

use core::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The all-zero GUID hosts use as a "no entity" value.
pub const SENTINEL: &str = "00000000-0000-0000-0000-000000000000";

/// Why a raw identifier was rejected by [`EntityId::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InvalidEntityId {
    /// The identifier was empty or whitespace only.
    #[error("entity id is empty")]
    Empty,
    /// The identifier had leading or trailing whitespace.
    #[error("entity id has surrounding whitespace")]
    Padded,
    /// The identifier was the host's "no entity" sentinel.
    #[error("entity id is the empty sentinel")]
    Sentinel,
}

/// Opaque, stable identifier for a renderable entity.
///
/// Used as the key for all per-entity state. Cloning is cheap; the string is
/// shared. Ordering is lexicographic so per-entity tables iterate
/// deterministically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(Arc<str>);

impl EntityId {
    /// Validates and wraps a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEntityId`] for empty identifiers, identifiers with
    /// surrounding whitespace, and the [`SENTINEL`] value. The text is kept
    /// as given, never normalized.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, InvalidEntityId> {
        let raw = raw.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidEntityId::Empty);
        }
        if trimmed.len() != raw.len() {
            return Err(InvalidEntityId::Padded);
        }
        if raw == SENTINEL {
            return Err(InvalidEntityId::Sentinel);
        }
        Ok(Self(Arc::from(raw)))
    }

    /// Returns the identifier text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque reference to a marker created by the render collaborator.
///
/// Markers are created and managed externally; core only stores the handle
/// and passes it back for pose, visibility, and destruction calls.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u64);

impl fmt::Debug for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkerHandle({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_sentinel() {
        assert_eq!(EntityId::new(""), Err(InvalidEntityId::Empty));
        assert_eq!(EntityId::new("   "), Err(InvalidEntityId::Empty));
        assert_eq!(EntityId::new(SENTINEL), Err(InvalidEntityId::Sentinel));
    }

    #[test]
    fn keeps_text_opaque() {
        assert_eq!(EntityId::new(" E1 "), Err(InvalidEntityId::Padded));
        assert_eq!(EntityId::new("E1\n"), Err(InvalidEntityId::Padded));
        assert_ne!(EntityId::new("e1").unwrap(), EntityId::new("E1").unwrap());

        let a = EntityId::new("E1").unwrap();
        let b = EntityId::new(String::from("E1")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "E1");
        assert_eq!(format!("{a}"), "E1");
        assert_eq!(format!("{a:?}"), "EntityId(E1)");
    }
}
