// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine and signal identity types.

use core::fmt;

/// Sentinel value indicating "no engine", "no signal" or "no link" in index
/// fields.
pub(crate) const INVALID: u32 = u32::MAX;

/// A handle to an engine in a [`Scheduler`](super::Scheduler).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after an engine is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl EngineId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineId({}@gen{})", self.idx, self.generation)
    }
}

/// A handle to a signal in a [`Scheduler`](super::Scheduler).
///
/// Signals carry no payload; firing one wakes every engine subscribed to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl SignalId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalId({}@gen{})", self.idx, self.generation)
    }
}
