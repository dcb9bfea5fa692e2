// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The panel tree.
//!
//! A *panel* is a node of the zoomable user interface. Each panel has:
//!
//! - An identity ([`PanelId`]), a generational handle that goes stale when the
//!   panel is deleted, and a name unique among its siblings.
//! - A layout rectangle in the coordinate system of its parent, where the
//!   parent's width is 1.0. A panel's own coordinate system is therefore
//!   `(0, 0)` to `(1, height)`, with `height` the layout tallness.
//! - Viewing state written by the [`View`](crate::view::View): whether it is
//!   viewed, its rectangle on screen and its clip rectangle.
//! - A behavior object ([`PanelBehavior`]) supplying paint, layout, input and
//!   auto-expansion through the capability traits.
//!
//! Panels live in a struct-of-arrays arena owned by their view. Every
//! operation that changes the tree goes through the view, since almost any
//! change affects what is on screen.
//!
//! # Notices
//!
//! Changes are reported to panels in batches: the view accumulates
//! [`NoticeFlags`] per panel and delivers them from its update engine
//! through [`PanelBehavior::notice`], at most once per panel and round no
//! matter how many changes happened.
//!
//! # Auto-expansion
//!
//! A panel with auto-expansion enabled gets [`Expandable::auto_expand`]
//! called once it becomes interesting (its [view
//! condition](crate::view::View::view_condition) reaches the threshold, or
//! the view seeks one of its children), and [`Expandable::auto_shrink`] once
//! it stops being interesting. Children created while expanding are marked
//! and deleted after shrinking.

mod behavior;
mod ctx;
mod id;
mod identity;
pub(crate) mod tree;

pub use behavior::{Expandable, Inputable, Layoutable, Paintable, PanelBehavior};
pub use ctx::PanelCtx;
pub use id::PanelId;
pub use identity::{decode_identity, encode_identity};
pub use tree::Children;

use bitflags::bitflags;

bitflags! {
    /// Kinds of change reported to [`PanelBehavior::notice`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NoticeFlags: u16 {
        /// Children were added, removed or reordered.
        const CHILD_LIST_CHANGED      = 1 << 0;
        /// The layout rectangle or canvas color changed.
        const LAYOUT_CHANGED          = 1 << 1;
        /// Viewed state, viewed rectangle or clip rectangle changed.
        const VIEWING_CHANGED         = 1 << 2;
        /// The enabled state changed.
        const ENABLE_CHANGED          = 1 << 3;
        /// Visited state or visited path changed.
        const VISIT_CHANGED           = 1 << 4;
        /// Active state or active path changed.
        const ACTIVE_CHANGED          = 1 << 5;
        /// Keyboard focus of the panel changed.
        const FOCUS_CHANGED           = 1 << 6;
        /// Keyboard focus of the view changed.
        const VIEW_FOCUS_CHANGED      = 1 << 7;
        /// [`View::update_priority`](crate::view::View::update_priority) may have changed.
        const UPDATE_PRIORITY_CHANGED = 1 << 8;
        /// [`View::memory_limit`](crate::view::View::memory_limit) may have changed.
        const MEMORY_LIMIT_CHANGED    = 1 << 9;
        /// [`View::sought_name`](crate::view::View::sought_name) changed.
        const SOUGHT_NAME_CHANGED     = 1 << 10;
    }
}

bitflags! {
    /// Per-panel state bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub(crate) struct PanelFlags: u32 {
        const VIEWED                  = 1 << 0;
        const IN_VIEWED_PATH          = 1 << 1;
        const ENABLE_SWITCH           = 1 << 2;
        const ENABLED                 = 1 << 3;
        const FOCUSABLE               = 1 << 4;
        const VISITED                 = 1 << 5;
        const IN_VISITED_PATH         = 1 << 6;
        const ACTIVE                  = 1 << 7;
        const IN_ACTIVE_PATH          = 1 << 8;
        const PENDING_INPUT           = 1 << 9;
        const CHILDREN_LAYOUT_INVALID = 1 << 10;
        const AE_ENABLED              = 1 << 11;
        const AE_DECISION_INVALID     = 1 << 12;
        const AE_CALLING              = 1 << 13;
        const AE_EXPANDED             = 1 << 14;
        const CREATED_BY_AE           = 1 << 15;
        const IN_NOTICE_LIST          = 1 << 16;
    }
}

/// How a panel's on-screen size is measured for auto-expansion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewConditionType {
    /// Viewed width times viewed height.
    #[default]
    Area,
    /// Viewed width.
    Width,
    /// Viewed height.
    Height,
    /// The smaller of viewed width and height.
    MinExt,
    /// The larger of viewed width and height.
    MaxExt,
}

/// The view condition at which a panel auto-expands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoExpansionThreshold {
    /// Threshold value, in pixels or square pixels depending on `kind`.
    pub value: f64,
    /// What is measured.
    pub kind: ViewConditionType,
}

impl AutoExpansionThreshold {
    /// 100 square pixels.
    pub const DEFAULT: Self = Self {
        value: 100.0,
        kind: ViewConditionType::Area,
    };

    /// A threshold of `value` measured as `kind`.
    #[must_use]
    pub const fn new(value: f64, kind: ViewConditionType) -> Self {
        Self { value, kind }
    }
}

impl Default for AutoExpansionThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A rectangle given by origin and size.
///
/// Layout rectangles are in parent coordinates; viewed rectangles are in view
/// pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PanelRect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl PanelRect {
    /// Creates a rectangle.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The rectangle as edges.
    #[must_use]
    pub fn to_rect(self) -> kurbo::Rect {
        kurbo::Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

/// Mouse cursor shapes a panel can ask for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// The platform's default arrow.
    #[default]
    Normal,
    /// No cursor.
    Invisible,
    /// Busy.
    Wait,
    /// Crosshair.
    Crosshair,
    /// Text insertion.
    Text,
    /// Pointing hand.
    Hand,
    /// Moving.
    Move,
}
