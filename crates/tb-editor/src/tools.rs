//! Tools translate pointer presses into dispatcher commands.
//!
//! | Modifier | Builder tool | Link tool |
//! |----------|--------------|-----------|
//! | **Ctrl** | Add a subtree placeholder instead of a plain child | Remove the clicked link |

use crate::commands::Command;
use crate::input::InputEvent;
use smallvec::{SmallVec, smallvec};
use tb_core::id::NodeId;
use tb_core::model::{ChildSlot, Side, TreeMode};
use tb_core::project::AffordanceKind;
use tb_render::hit::Hit;

/// Commands produced by one input event.
pub type Commands = SmallVec<[Command; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Builder,
    Link,
}

/// Trait for tools that handle input and produce commands.
pub trait Tool {
    fn kind(&self) -> ToolKind;

    /// Handle an input event and what it hit, returning zero or more commands.
    fn handle(&mut self, event: &InputEvent, hit: Option<Hit>) -> Commands;
}

// ─── Builder Tool ────────────────────────────────────────────────────────

/// Structural editing through affordance buttons.
#[derive(Debug, Clone, Copy)]
pub struct BuilderTool {
    mode: TreeMode,
}

impl BuilderTool {
    pub fn new(mode: TreeMode) -> Self {
        Self { mode }
    }

    fn add(&self, node: NodeId, index: usize, side: Side, subtree: bool) -> Command {
        match self.mode {
            TreeMode::BTree => Command::InsertElement {
                node,
                index: index + side.index(),
            },
            TreeMode::Binary => Command::AddChild {
                parent: node,
                slot: ChildSlot::Side(side),
                as_subtree: subtree,
            },
            TreeMode::Multiway => Command::AddChild {
                parent: node,
                slot: ChildSlot::Append,
                as_subtree: subtree,
            },
        }
    }

    fn delete(&self, node: NodeId, index: usize) -> Command {
        match self.mode {
            TreeMode::BTree => Command::RemoveElement { node, index },
            _ => Command::RemoveChild { node },
        }
    }
}

impl Tool for BuilderTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Builder
    }

    fn handle(&mut self, event: &InputEvent, hit: Option<Hit>) -> Commands {
        let InputEvent::PointerDown { modifiers, .. } = event else {
            return Commands::new();
        };
        match hit {
            Some(Hit::Affordance(a)) => {
                let command = match a.kind {
                    AffordanceKind::Add { side } => self.add(a.node, a.index, side, modifiers.ctrl),
                    AffordanceKind::Delete => self.delete(a.node, a.index),
                    AffordanceKind::Promote => Command::Promote {
                        node: a.node,
                        index: a.index,
                    },
                    AffordanceKind::Demote => Command::Demote {
                        node: a.node,
                        index: a.index,
                    },
                    AffordanceKind::Expand => Command::Expand {
                        node: a.node,
                        expanded: true,
                    },
                    AffordanceKind::Collapse => Command::Expand {
                        node: a.node,
                        expanded: false,
                    },
                    AffordanceKind::Pointer { .. } => return Commands::new(),
                };
                smallvec![command]
            }
            Some(Hit::Node { id, index }) => smallvec![Command::Select { node: id, index }],
            Some(Hit::Side(field)) => smallvec![Command::FocusSide { field }],
            None => smallvec![Command::Deselect],
        }
    }
}

// ─── Link Tool ───────────────────────────────────────────────────────────

/// Pointer-mode link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    NoLinkSelected,
    /// A pointer handle was clicked; the next node click becomes its target.
    LinkSelected { source: NodeId, side: Side },
}

/// Re-links edges directly in pointer mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkTool {
    pub state: LinkState,
}

impl LinkTool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tool for LinkTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Link
    }

    fn handle(&mut self, event: &InputEvent, hit: Option<Hit>) -> Commands {
        let InputEvent::PointerDown { modifiers, .. } = event else {
            return Commands::new();
        };
        let previous = std::mem::take(&mut self.state);
        match hit {
            Some(Hit::Affordance(a)) => match a.kind {
                AffordanceKind::Pointer { side } if modifiers.ctrl => smallvec![Command::RemoveLink {
                    source: a.node,
                    side,
                }],
                AffordanceKind::Pointer { side } => {
                    self.state = LinkState::LinkSelected {
                        source: a.node,
                        side,
                    };
                    Commands::new()
                }
                AffordanceKind::Delete => smallvec![Command::RemovePointerNode { node: a.node }],
                _ => Commands::new(),
            },
            Some(Hit::Node { id, .. }) => match previous {
                LinkState::LinkSelected { source, side } => smallvec![
                    Command::Relink {
                        source,
                        side,
                        target: id,
                    },
                    Command::Select { node: id, index: 0 },
                ],
                LinkState::NoLinkSelected => smallvec![Command::Select { node: id, index: 0 }],
            },
            Some(Hit::Side(_)) => Commands::new(),
            None => smallvec![Command::Deselect],
        }
    }
}
