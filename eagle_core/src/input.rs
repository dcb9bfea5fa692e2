// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Input events and input state delivered to views and panels.

use bitflags::bitflags;
use kurbo::Point;

/// The key or button an [`InputEvent`] is about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InputKey {
    /// No key; the event is empty.
    #[default]
    None,
    /// Left mouse button.
    MouseLeft,
    /// Middle mouse button.
    MouseMiddle,
    /// Right mouse button.
    MouseRight,
    /// Mouse wheel, one notch up.
    WheelUp,
    /// Mouse wheel, one notch down.
    WheelDown,
    /// A touch began.
    Touch,
    /// Tab key.
    Tab,
    /// Enter key.
    Enter,
    /// Escape key.
    Escape,
    /// Cursor left.
    Left,
    /// Cursor right.
    Right,
    /// Cursor up.
    Up,
    /// Cursor down.
    Down,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Home key.
    Home,
    /// End key.
    End,
    /// A key producing text, see [`InputEvent::chars`].
    Char,
}

impl InputKey {
    /// Whether this is a mouse button or wheel.
    #[must_use]
    pub const fn is_mouse(self) -> bool {
        matches!(
            self,
            Self::MouseLeft | Self::MouseMiddle | Self::MouseRight | Self::WheelUp | Self::WheelDown
        )
    }

    /// Whether this is a touch.
    #[must_use]
    pub const fn is_touch(self) -> bool {
        matches!(self, Self::Touch)
    }

    /// Whether this is a keyboard key.
    #[must_use]
    pub const fn is_keyboard(self) -> bool {
        !matches!(self, Self::None) && !self.is_mouse() && !self.is_touch()
    }
}

bitflags! {
    /// Modifier keys held while an event happened.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// Shift.
        const SHIFT = 1 << 0;
        /// Control.
        const CTRL  = 1 << 1;
        /// Alt.
        const ALT   = 1 << 2;
        /// Meta / logo key.
        const META  = 1 << 3;
    }
}

/// A single input event. Panels *eat* an event to stop further handling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputEvent {
    key: InputKey,
    chars: String,
    repeat: u32,
}

impl InputEvent {
    /// An event for `key`.
    #[must_use]
    pub fn key(key: InputKey) -> Self {
        Self {
            key,
            chars: String::new(),
            repeat: 0,
        }
    }

    /// A text input event.
    #[must_use]
    pub fn chars(chars: &str) -> Self {
        Self {
            key: InputKey::Char,
            chars: chars.to_owned(),
            repeat: 0,
        }
    }

    /// Sets the auto-repeat counter.
    #[must_use]
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// The key, or [`InputKey::None`] once eaten.
    #[inline]
    #[must_use]
    pub fn get_key(&self) -> InputKey {
        self.key
    }

    /// The text produced, if any.
    #[must_use]
    pub fn get_chars(&self) -> &str {
        &self.chars
    }

    /// Auto-repeat counter, 0 for the initial press.
    #[must_use]
    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    /// Whether there is nothing left to handle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key == InputKey::None && self.chars.is_empty()
    }

    /// Whether this is a mouse event.
    #[must_use]
    pub fn is_mouse_event(&self) -> bool {
        self.key.is_mouse()
    }

    /// Whether this is a touch event.
    #[must_use]
    pub fn is_touch_event(&self) -> bool {
        self.key.is_touch()
    }

    /// Whether this is a keyboard event.
    #[must_use]
    pub fn is_keyboard_event(&self) -> bool {
        self.key.is_keyboard()
    }

    /// Consumes the event.
    pub fn eat(&mut self) {
        self.key = InputKey::None;
        self.chars.clear();
        self.repeat = 0;
    }
}

/// One touch point in view pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Touch {
    /// Identifies the touch across events.
    pub id: u64,
    /// Position in view pixels.
    pub pos: Point,
}

/// Pointer and modifier state at the time of an event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputState {
    /// Mouse position in view pixels.
    pub mouse: Point,
    /// Active touches, in view pixels.
    pub touches: Vec<Touch>,
    /// Held modifiers.
    pub modifiers: Modifiers,
}

impl InputState {
    /// A state with the mouse at `(x, y)` and no modifiers.
    #[must_use]
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            mouse: Point::new(x, y),
            ..Self::default()
        }
    }

    /// Sets the held modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Position of the first touch, or the mouse when there is none.
    #[must_use]
    pub fn touch_or_mouse(&self) -> Point {
        self.touches.first().map_or(self.mouse, |t| t.pos)
    }

    /// No modifier is held.
    #[must_use]
    pub fn is_no_mod(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Exactly Shift is held.
    #[must_use]
    pub fn is_shift_mod(&self) -> bool {
        self.modifiers == Modifiers::SHIFT
    }

    /// Exactly Alt is held.
    #[must_use]
    pub fn is_alt_mod(&self) -> bool {
        self.modifiers == Modifiers::ALT
    }

    /// Exactly Shift and Alt are held.
    #[must_use]
    pub fn is_shift_alt_mod(&self) -> bool {
        self.modifiers == Modifiers::SHIFT | Modifiers::ALT
    }
}
