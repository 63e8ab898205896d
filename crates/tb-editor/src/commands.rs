//! Mutation dispatcher.
//!
//! Every edit reaches the session as a `Command` naming an operation, a
//! target node id and an index or flag. `TreeSession::dispatch` runs the
//! same sequence for each structural command:
//!
//! 1. flush pending text into the backend tree,
//! 2. apply the backend operation,
//! 3. recompute the layout,
//! 4. re-project the render tree,
//! 5. resolve the new selection from the operation's `MutationResult`.
//!
//! Commands addressed to unknown ids are no-ops; a selection is still
//! resolved afterwards.

use crate::session::TreeSession;
use tb_core::id::NodeId;
use tb_core::model::{ChildSlot, EditMode, Side};
use tb_core::mutate::{MutationResult, Selection};
use tb_core::side::SideField;

/// A single character typed into, or removed from, a text element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEdit {
    Insert(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    // ── B-tree elements ──
    InsertElement { node: NodeId, index: usize },
    RemoveElement { node: NodeId, index: usize },
    Promote { node: NodeId, index: usize },
    Demote { node: NodeId, index: usize },

    // ── Binary / multiway children ──
    AddChild {
        parent: NodeId,
        slot: ChildSlot,
        as_subtree: bool,
    },
    RemoveChild { node: NodeId },
    Expand { node: NodeId, expanded: bool },

    // ── Pointer mode ──
    Relink {
        source: NodeId,
        side: Side,
        target: NodeId,
    },
    RemoveLink { source: NodeId, side: Side },
    RemovePointerNode { node: NodeId },

    // ── Text and focus ──
    EditText {
        node: NodeId,
        index: usize,
        edit: TextEdit,
    },
    Select { node: NodeId, index: usize },
    Deselect,

    // ── Recurrence worksheet ──
    FocusSide { field: SideField },
    EditSide { field: SideField, edit: TextEdit },

    // ── Whole-tree ──
    Reset,
    ToggleSize,
    /// Switch a binary tree between builder and pointer editing.
    ToggleEditMode,
    Redraw,
}

impl Command {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::InsertElement { .. } => "insert-element",
            Command::RemoveElement { .. } => "remove-element",
            Command::Promote { .. } => "promote",
            Command::Demote { .. } => "demote",
            Command::AddChild { .. } => "add-child",
            Command::RemoveChild { .. } => "remove-child",
            Command::Expand { .. } => "expand",
            Command::Relink { .. } => "relink",
            Command::RemoveLink { .. } => "remove-link",
            Command::RemovePointerNode { .. } => "remove-pointer-node",
            Command::EditText { .. } => "edit-text",
            Command::Select { .. } => "select",
            Command::Deselect => "deselect",
            Command::FocusSide { .. } => "focus-side",
            Command::EditSide { .. } => "edit-side",
            Command::Reset => "reset",
            Command::ToggleSize => "toggle-size",
            Command::ToggleEditMode => "toggle-edit-mode",
            Command::Redraw => "redraw",
        }
    }
}

fn rejected(node: NodeId) -> MutationResult {
    MutationResult {
        selection: Selection::new(node, 0),
        success: false,
    }
}

impl TreeSession {
    /// Apply one command and return the selection afterwards.
    pub fn dispatch(&mut self, command: Command) -> Option<Selection> {
        log::debug!("dispatch {}: {command:?}", command.name());

        if let Command::EditText { node, index, edit } = command {
            if !self.edit_text(node, index, edit) {
                log::debug!("edit-text on {node}[{index}] ignored");
            }
            self.caret.reset();
            return self.selection;
        }
        if let Command::EditSide { field, edit } = command {
            if !self.edit_side(field, edit) {
                log::debug!("edit-side on {field:?} ignored");
            }
            self.caret.reset();
            return self.selection;
        }

        self.flush_text();
        let structural = self.config.structural() && !self.config.pointer_mode();
        let pointer = self.config.pointer_mode();

        let result = match command {
            Command::InsertElement { node, index } if structural => {
                Some(self.tree.insert_element(node, index))
            }
            Command::RemoveElement { node, index } if structural => {
                Some(self.tree.remove_element(node, index))
            }
            Command::Promote { node, index } if structural => Some(self.tree.promote(node, index)),
            Command::Demote { node, index } if structural => Some(self.tree.demote(node, index)),
            Command::AddChild {
                parent,
                slot,
                as_subtree,
            } if structural => Some(self.tree.add_child(
                parent,
                slot,
                as_subtree && self.config.enable_subtrees,
            )),
            Command::RemoveChild { node } if structural => Some(self.tree.remove_child(node)),
            Command::Expand { node, expanded } if self.config.structural() => {
                Some(self.tree.expand(node, expanded))
            }
            Command::Relink {
                source,
                side,
                target,
            } if pointer => {
                let linked = self
                    .board
                    .as_mut()
                    .is_some_and(|b| b.relink(source, side, target));
                self.update_pointers();
                Some(MutationResult {
                    selection: Selection::new(target, 0),
                    success: linked,
                })
            }
            Command::RemoveLink { source, side } if pointer => {
                let removed = self
                    .board
                    .as_mut()
                    .is_some_and(|b| b.remove_link(source, side));
                self.update_pointers();
                Some(MutationResult {
                    selection: Selection::new(source, 0),
                    success: removed,
                })
            }
            Command::RemovePointerNode { node } if self.config.edit_mode == EditMode::PointerDelete => {
                let removed = self.board.as_mut().is_some_and(|b| b.remove_node(node));
                self.update_pointers();
                if removed && self.selection.is_some_and(|s| s.node == node) {
                    self.selection = None;
                }
                None
            }
            Command::Select { node, index } => {
                self.selection = self.valid_selection(Selection::new(node, index));
                self.side_focus = None;
                self.caret.reset();
                return self.selection;
            }
            Command::Deselect => {
                self.selection = None;
                self.side_focus = None;
                return None;
            }
            Command::FocusSide { field } if self.config.recurrence() => {
                self.selection = None;
                self.side_focus = Some(field);
                self.caret.reset();
                return None;
            }
            Command::Reset => {
                self.reset_tree();
                self.selection = None;
                None
            }
            Command::ToggleSize => {
                self.geometry = self.geometry.toggled();
                None
            }
            Command::ToggleEditMode => {
                if !self.toggle_edit_mode() {
                    log::info!("edit mode toggle refused");
                }
                None
            }
            Command::Redraw => None,
            other => {
                log::warn!(
                    "{} is not available in {} mode",
                    other.name(),
                    self.config.edit_mode.as_str()
                );
                Some(rejected(self.tree.root()))
            }
        };

        if pointer && self.pointer_error.is_some() {
            // Positions stay from the last layout unless the node size changed.
            if matches!(command, Command::ToggleSize) {
                self.relayout();
            }
            self.redraw_links();
        } else {
            self.relayout();
        }

        if let Some(result) = result {
            if !result.success {
                log::debug!("{} did not apply", command.name());
            }
            self.resolve_selection(result);
        } else if let Some(current) = self.selection {
            self.selection = self.valid_selection(current);
        }
        self.caret.reset();
        self.selection
    }

    /// Pick the selection named by `result`, falling back to the previous
    /// selection, when the named node no longer exists.
    fn resolve_selection(&mut self, result: MutationResult) {
        let previous = self.selection;
        self.selection = self
            .valid_selection(result.selection)
            .or_else(|| previous.and_then(|s| self.valid_selection(s)));
    }
}
