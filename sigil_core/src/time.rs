// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host clock ticks.
//!
//! The core never reads a clock itself. The host reports [`HostTime`] through
//! [`Environment::now`](crate::host::Environment::now) once per tick, and the
//! backlog drain interval is a [`Duration`] in the same units. Diagnostics
//! output converts ticks to wall time with a [`Timebase`].

/// A point on the host's monotonic clock, in host ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// `self + duration`, clamped to the last representable tick.
    ///
    /// Drain deadlines are computed with this so a huge interval means
    /// "never" rather than wrapping into the past.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }
}

/// A span of host ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Duration(pub u64);

impl Duration {
    /// No delay: a drain pass may run on every tick.
    pub const ZERO: Self = Self(0);
}

/// Ratio from host ticks to nanoseconds: `nanos = ticks * numer / denom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator.
    pub numer: u32,
    /// Denominator, never zero.
    pub denom: u32,
}

impl Timebase {
    /// Ticks are nanoseconds.
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// Ticks are milliseconds, as for a frame-counter host.
    pub const MILLIS: Self = Self {
        numer: 1_000_000,
        denom: 1,
    };

    /// # Panics
    ///
    /// Panics if `denom` is zero.
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "zero timebase denominator");
        Self { numer, denom }
    }

    /// Converts `t` to nanoseconds, clamping at `u64::MAX`.
    #[must_use]
    pub fn nanos(self, t: HostTime) -> u64 {
        let wide = u128::from(t.0) * u128::from(self.numer) / u128::from(self.denom);
        u64::try_from(wide).unwrap_or(u64::MAX)
    }

    /// Converts `t` to fractional microseconds, the unit trace viewers use.
    #[must_use]
    pub fn micros(self, t: HostTime) -> f64 {
        self.nanos(t) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timebase_scales_ticks() {
        assert_eq!(Timebase::MILLIS.nanos(HostTime(3)), 3_000_000);
        assert_eq!(Timebase::NANOS.nanos(HostTime(3)), 3);
        assert_eq!(Timebase::new(125, 3).nanos(HostTime(24)), 1000);
        assert!((Timebase::MILLIS.micros(HostTime(2)) - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn huge_ratios_clamp() {
        let tb = Timebase::new(u32::MAX, 1);
        assert_eq!(tb.nanos(HostTime(u64::MAX)), u64::MAX);
    }

    #[test]
    fn deadlines_saturate() {
        assert_eq!(
            HostTime(u64::MAX - 1).saturating_add(Duration(5)),
            HostTime(u64::MAX)
        );
        assert_eq!(HostTime(10).saturating_add(Duration::ZERO), HostTime(10));
    }
}
