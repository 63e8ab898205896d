//! Input abstraction layer.
//!
//! Normalizes pointer presses, key presses and the caret timer into a
//! unified `InputEvent` consumed by the session.

/// Modifier keys held during an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        shift: false,
        alt: false,
        meta: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        ..Modifiers::NONE
    };

    /// Platform command key: ⌘ on macOS, Ctrl elsewhere.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer pressed on the canvas.
    PointerDown { x: f32, y: f32, modifiers: Modifiers },

    /// Pointer moved over the canvas with no button held.
    PointerMove { x: f32, y: f32 },

    /// `KeyboardEvent.key` of a pressed key.
    KeyDown { key: String, modifiers: Modifiers },

    KeyUp { key: String },

    /// Caret blink timer fired.
    Tick,
}

impl InputEvent {
    pub fn pointer_down(x: f32, y: f32, modifiers: Modifiers) -> Self {
        Self::PointerDown { x, y, modifiers }
    }

    pub fn key_down(key: &str, modifiers: Modifiers) -> Self {
        Self::KeyDown {
            key: key.to_string(),
            modifiers,
        }
    }

    /// Extract position if this is a pointer event.
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            Self::PointerDown { x, y, .. } | Self::PointerMove { x, y } => Some((*x, *y)),
            _ => None,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            Self::PointerDown { modifiers, .. } | Self::KeyDown { modifiers, .. } => *modifiers,
            _ => Modifiers::NONE,
        }
    }
}

/// Blinking text caret. Toggled by the timer, forced visible after edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretBlink {
    visible: bool,
}

impl Default for CaretBlink {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl CaretBlink {
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn tick(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn reset(&mut self) {
        self.visible = true;
    }
}
