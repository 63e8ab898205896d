//! Hit testing: point → affordance or node element lookup.
//!
//! Buttons are drawn on top of nodes, so affordances are tested first,
//! then worksheet cells, then nodes. Lists are walked back to front (last
//! drawn = topmost).

use tb_core::id::NodeId;
use tb_core::project::{Affordance, RenderTree};
use tb_core::side::SideField;

/// What a pointer press landed on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    Affordance(Affordance),
    /// A node, plus the key cell under the pointer (0 for circles).
    Node { id: NodeId, index: usize },
    /// A cell of the recurrence worksheet.
    Side(SideField),
}

impl Hit {
    /// The node owning the hit, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Hit::Affordance(a) => Some(a.node),
            Hit::Node { id, .. } => Some(*id),
            Hit::Side(_) => None,
        }
    }
}

/// Find what is at canvas position `(px, py)`.
/// Returns `None` if the press hit the background.
pub fn hit_test(render: &RenderTree, px: f32, py: f32) -> Option<Hit> {
    if let Some(a) = render.affordances.iter().rev().find(|a| a.bounds.contains(px, py)) {
        log::trace!("hit {:?} on {}[{}] at ({px}, {py})", a.kind, a.node, a.index);
        return Some(Hit::Affordance(*a));
    }
    if let Some(cell) = render.side.cell_at(px, py) {
        log::trace!("hit side cell {:?} at ({px}, {py})", cell.field);
        return Some(Hit::Side(cell.field));
    }
    let hit = render
        .nodes
        .iter()
        .rev()
        .filter(|n| !n.subsubtree)
        .find(|n| n.contains(px, py))
        .map(|n| Hit::Node {
            id: n.id,
            index: n.element_at(px),
        });
    match hit {
        Some(Hit::Node { id, index }) => log::trace!("hit {id}[{index}] at ({px}, {py})"),
        _ => log::trace!("miss at ({px}, {py})"),
    }
    hit
}
