// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic millisecond time and pluggable clock sources.
//!
//! [`HostTime`] is a point on a monotonic millisecond axis whose origin is
//! chosen by the [`TimeSource`] that produced it. [`Duration`] is a length on
//! the same axis.
//!
//! The scheduler, timers and model garbage collection all read time through a
//! shared [`TimeSource`]. Production code uses [`SystemClock`]; tests use
//! [`ManualClock`] and advance it explicitly.

use core::fmt;
use core::ops::{Add, Sub};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A point in time expressed as milliseconds on a monotonic axis.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw millisecond value.
    #[inline]
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Saturating addition of a duration.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }

    /// Checked addition of a duration.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, duration: Duration) -> Option<Self> {
        match self.0.checked_add(duration.0) {
            Some(t) => Some(Self(t)),
            None => None,
        }
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({}ms)", self.0)
    }
}

/// A duration in milliseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Creates a duration from whole seconds.
    #[inline]
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Returns the raw millisecond value.
    #[inline]
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }

    /// Saturating subtraction.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Converts to a standard library duration (for sleeping).
    #[inline]
    #[must_use]
    pub const fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl Add for Duration {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({}ms)", self.0)
    }
}

/// A source of monotonic time.
///
/// Implementations must never go backwards.
pub trait TimeSource: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> HostTime;
}

/// The wall clock: milliseconds since the clock was created.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u64 milliseconds cover half a billion years of uptime"
    )]
    fn now(&self) -> HostTime {
        HostTime(self.origin.elapsed().as_millis() as u64)
    }
}

/// A clock that only moves when told to.
///
/// Cloning yields another handle to the same clock.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a manual clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, d: Duration) {
        self.millis.fetch_add(d.0, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    ///
    /// # Panics
    ///
    /// Panics if `t` is earlier than the current time.
    pub fn set(&self, t: HostTime) {
        let prev = self.millis.swap(t.0, Ordering::SeqCst);
        assert!(prev <= t.0, "manual clock must not go backwards ({prev} -> {})", t.0);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> HostTime {
        HostTime(self.millis.load(Ordering::SeqCst))
    }
}
