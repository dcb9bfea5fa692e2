// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Panel identity.

use core::fmt;

/// A handle to a panel of a [`View`](crate::view::View).
///
/// Contains a slot index and a generation counter, so a handle kept past the
/// deletion of its panel is detected instead of addressing a reused slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanelId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl PanelId {
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

impl fmt::Debug for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PanelId({}@gen{})", self.idx, self.generation)
    }
}
