//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `KeyAction`s. Navigation and
//! structural shortcuts apply to the B-tree builder; typing applies to
//! every editable tree.
//!
//! | Keys | Action |
//! |------|--------|
//! | ← / → | previous / next key in the node |
//! | Ctrl ← / Ctrl → | insert an empty key left / right |
//! | ↑ | parent key |
//! | Ctrl ↑ / Ctrl ↓ | promote / demote |
//! | ↓ held + ← / → | left / right child |
//! | Ctrl Backspace | delete the key |
//! | Backspace | delete a character |

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    // ── Navigation ──
    SelectPrev,
    SelectNext,
    SelectParent,
    DescendLeft,
    DescendRight,

    // ── Structure ──
    InsertLeft,
    InsertRight,
    Promote,
    Demote,
    DeleteKey,

    // ── Text ──
    Backspace,
    Type(char),
}

impl KeyAction {
    /// Whether the action only makes sense on B-tree key cells.
    pub fn is_btree_only(self) -> bool {
        !matches!(self, KeyAction::Backspace | KeyAction::Type(_))
    }
}

/// Resolves key events into shortcut actions.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    ///
    /// `key` is the `KeyboardEvent.key` value. `down_held` reports whether
    /// ↓ is currently held, which turns ←/→ into child navigation.
    /// Returns `None` if the key combo has no binding.
    pub fn resolve(
        key: &str,
        ctrl: bool,
        _shift: bool,
        alt: bool,
        meta: bool,
        down_held: bool,
    ) -> Option<KeyAction> {
        let cmd = ctrl || meta;

        if cmd {
            return match key {
                "ArrowLeft" => Some(KeyAction::InsertLeft),
                "ArrowRight" => Some(KeyAction::InsertRight),
                "ArrowUp" => Some(KeyAction::Promote),
                "ArrowDown" => Some(KeyAction::Demote),
                "Backspace" | "Delete" => Some(KeyAction::DeleteKey),
                _ => None,
            };
        }

        match key {
            "ArrowLeft" if down_held => Some(KeyAction::DescendLeft),
            "ArrowRight" if down_held => Some(KeyAction::DescendRight),
            "ArrowLeft" => Some(KeyAction::SelectPrev),
            "ArrowRight" => Some(KeyAction::SelectNext),
            "ArrowUp" => Some(KeyAction::SelectParent),
            "Backspace" => Some(KeyAction::Backspace),
            _ if alt => None,
            _ => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c == ' ' || c.is_ascii_graphic() => Some(KeyAction::Type(c)),
                    _ => None,
                }
            }
        }
    }
}
