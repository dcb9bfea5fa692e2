// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The panel behavior contract.
//!
//! A panel's behavior is one boxed [`PanelBehavior`]. The optional
//! capabilities are separate traits, reached through the `as_*` accessors,
//! so a panel only implements what it actually does:
//!
//! ```
//! use eagle_core::paint::{Color, Painter};
//! use eagle_core::panel::{Paintable, PanelBehavior};
//!
//! struct Plain(Color);
//!
//! impl PanelBehavior for Plain {
//!     fn as_paintable(&self) -> Option<&dyn Paintable> {
//!         Some(self)
//!     }
//! }
//!
//! impl Paintable for Plain {
//!     fn paint(&self, painter: &mut Painter<'_>, _canvas_color: Color) {
//!         painter.paint_rect(0.0, 0.0, 1.0, 1.0, self.0);
//!     }
//! }
//! ```

use kurbo::Point;

use super::{Cursor, NoticeFlags, PanelCtx};
use crate::input::{InputEvent, InputState};
use crate::paint::{Color, Painter};

/// Behavior of a panel.
///
/// Every method has a default, so an empty `impl` is a valid, invisible
/// panel. Behaviors are `Send` because render threads paint panels while
/// holding the view lock.
pub trait PanelBehavior: Send {
    /// Called with the changes accumulated since the last call.
    ///
    /// The panel may delete itself here.
    fn notice(&mut self, ctx: &mut PanelCtx<'_>, flags: NoticeFlags) {
        let _ = (ctx, flags);
    }

    /// Title shown for the panel while it is active. `None` inherits the
    /// parent's title.
    fn title(&self) -> Option<String> {
        None
    }

    /// Mouse cursor over the panel. `None` inherits the parent's cursor.
    fn cursor(&self) -> Option<Cursor> {
        None
    }

    /// How much the panel wants a touch at `pos` (view pixels). The default
    /// is 1.0 for focusable panels and 0.0 otherwise.
    fn touch_event_priority(&self, pos: Point, focusable: bool) -> f64 {
        let _ = pos;
        if focusable { 1.0 } else { 0.0 }
    }

    /// The painting capability.
    fn as_paintable(&self) -> Option<&dyn Paintable> {
        None
    }

    /// The child layout capability.
    fn as_layoutable(&mut self) -> Option<&mut dyn Layoutable> {
        None
    }

    /// The input capability.
    fn as_inputable(&mut self) -> Option<&mut dyn Inputable> {
        None
    }

    /// The auto-expansion capability.
    fn as_expandable(&mut self) -> Option<&mut dyn Expandable> {
        None
    }
}

/// A panel that draws itself.
pub trait Paintable {
    /// Paints the panel in its own coordinates: `(0, 0)` to `(1, height)`.
    ///
    /// `canvas_color` is the color already behind the panel, or transparent
    /// when unknown.
    fn paint(&self, painter: &mut Painter<'_>, canvas_color: Color);

    /// Whether [`paint`](Self::paint) covers every pixel of the panel with
    /// opaque color.
    fn is_opaque(&self) -> bool {
        false
    }
}

/// A panel that positions its children.
pub trait Layoutable {
    /// Lays out every child with [`PanelCtx::layout_child`].
    ///
    /// Children may be missing while the panel is partly expanded.
    fn layout_children(&mut self, ctx: &mut PanelCtx<'_>);
}

/// A panel that handles input.
pub trait Inputable {
    /// Handles an event. `mouse` is the mouse position in panel coordinates.
    ///
    /// Eat the event to stop the default handling (focusing and keyboard
    /// navigation) and the handling by ancestors.
    fn input(
        &mut self,
        ctx: &mut PanelCtx<'_>,
        event: &mut InputEvent,
        state: &InputState,
        mouse: Point,
    );
}

/// A panel whose children are created on demand.
pub trait Expandable {
    /// Creates the children. Runs once per expansion.
    fn auto_expand(&mut self, ctx: &mut PanelCtx<'_>);

    /// Forgets the children created by [`auto_expand`](Self::auto_expand).
    /// The view deletes them afterwards.
    fn auto_shrink(&mut self, ctx: &mut PanelCtx<'_>) {
        let _ = ctx;
    }
}
