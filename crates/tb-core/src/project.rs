//! Render tree projection.
//!
//! Turns a backend tree plus its layout into disposable render nodes,
//! edges and affordances. `project` is a pure function: the same tree,
//! layout and configuration always produce the same render tree. Every
//! render node and affordance carries the id of its backend node.

use crate::config::{BuilderConfig, Geometry, LARGE_RADIUS};
use crate::id::NodeId;
use crate::layout::{Placement, TreeLayout};
use crate::model::*;
use crate::side::SidePanel;
use serde::Serialize;

/// Minimum interval width for a subtree placeholder to draw its fan edges.
const FAN_MIN_SPAN: f32 = 2.5 * LARGE_RADIUS;

// ─── Geometry primitives ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle, `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn square(x: f32, y: f32, side: f32) -> Self {
        Self::new(x, y, side, side)
    }

    /// Edges are inclusive.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

// ─── Render tree ─────────────────────────────────────────────────────────

/// How a node is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Glyph {
    /// A row of key cells (B-tree).
    Cells { width: f32, height: f32 },
    Circle { radius: f32 },
}

/// Which edits the node currently allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_add_nodes: bool,
    pub can_delete_nodes: bool,
    pub can_promote_nodes: bool,
    pub can_demote_nodes: bool,
    /// Whether demote would apply if editing were enabled.
    pub would_demote_nodes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: NodeId,
    /// Top-left for cells, center for circles.
    pub x: f32,
    pub y: f32,
    pub text: Vec<String>,
    pub glyph: Glyph,
    pub bounds: Bounds,
    pub highlight: bool,
    pub subtree: bool,
    pub subsubtree: bool,
    pub parent_index: usize,
    pub capabilities: Capabilities,
    /// Fixed label drawn inside the circle; the text then goes in the
    /// value box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RenderNode {
    /// Whether `(px, py)` is inside the drawn shape or its value box.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        match self.glyph {
            Glyph::Cells { .. } => self.bounds.contains(px, py),
            Glyph::Circle { radius } => {
                let (dx, dy) = (px - self.x, py - self.y);
                dx * dx + dy * dy < radius * radius || self.value_box().is_some_and(|b| b.contains(px, py))
            }
        }
    }

    /// Box at the upper right of a labelled circle holding its text.
    pub fn value_box(&self) -> Option<Bounds> {
        let Glyph::Circle { radius } = self.glyph else {
            return None;
        };
        self.label.as_ref()?;
        let cd = radius * std::f32::consts::FRAC_1_SQRT_2;
        Some(Bounds::square(self.x + cd, self.y - cd - radius, radius))
    }

    /// Index of the key cell under `px`, clamped to the node.
    pub fn element_at(&self, px: f32) -> usize {
        match self.glyph {
            Glyph::Cells { width, .. } if width > 0.0 => {
                let cell = ((px - self.x) / width).floor();
                if cell <= 0.0 {
                    0
                } else {
                    (cell as usize).min(self.text.len().saturating_sub(1))
                }
            }
            _ => 0,
        }
    }
}

/// Which slot of the parent an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeTag {
    Left,
    Right,
    Child(usize),
    /// Decorative edge of a subtree placeholder.
    Fan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    pub from: NodeId,
    /// `None` for edges ending at a synthetic point.
    pub to: Option<NodeId>,
    pub tag: EdgeTag,
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AffordanceKind {
    /// B-tree: new key beside element `index`. Binary: new child on `side`.
    /// Multiway: appended child.
    Add { side: Side },
    Delete,
    Promote,
    Demote,
    /// Pointer-mode link handle.
    Pointer { side: Side },
    Expand,
    Collapse,
}

/// A clickable button tied to `(node, index, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Affordance {
    pub node: NodeId,
    pub index: usize,
    pub kind: AffordanceKind,
    pub bounds: Bounds,
}

/// Everything the drawing collaborator needs for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderTree {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
    pub affordances: Vec<Affordance>,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing_if = "SidePanel::is_empty")]
    pub side: SidePanel,
}

impl RenderTree {
    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn affordances_for(&self, id: NodeId) -> impl Iterator<Item = &Affordance> {
        self.affordances.iter().filter(move |a| a.node == id)
    }

    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &RenderEdge> {
        self.edges.iter().filter(move |e| e.from == id)
    }
}

/// Edge between two circles of radius `r`, clipped to their rims.
pub fn rim_edge(from: NodeId, a: Point, to: NodeId, b: Point, tag: EdgeTag, r: f32) -> RenderEdge {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = if len > f32::EPSILON { (dx / len, dy / len) } else { (0.0, 0.0) };
    RenderEdge {
        from,
        to: Some(to),
        tag,
        start: Point::new(a.x + ux * r, a.y + uy * r),
        end: Point::new(b.x - ux * r, b.y - uy * r),
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────

/// Capability flags for one node, from local structural facts.
pub fn capabilities(
    tree: &BackendTree,
    id: NodeId,
    layout: &TreeLayout,
    config: &BuilderConfig,
    geometry: &Geometry,
) -> Capabilities {
    let Some(node) = tree.get(id) else {
        return Capabilities::default();
    };
    let leaf = node.shape.is_leaf();

    if let NodeShape::BTree { keys, .. } = &node.shape {
        let editable = config.structural();
        return Capabilities {
            can_add_nodes: geometry.node_width(keys.len() + 2) < geometry.canvas_width
                && leaf
                && editable,
            can_delete_nodes: leaf && keys.len() > 1 && editable,
            can_promote_nodes: keys.len() > 2 && editable,
            can_demote_nodes: !leaf && editable,
            would_demote_nodes: !leaf,
        };
    }

    let depth = layout.get(id).map_or(0, |p| p.depth);
    let is_root = node.parent.is_none();
    let flags = node.flags;
    let builder = config.structural();

    let can_add_nodes = builder
        && !flags.subtree
        && !flags.subsubtree
        && match &node.shape {
            NodeShape::Multiway { children, .. } => {
                let first_is_subtree = children
                    .first()
                    .and_then(|c| tree.get(*c))
                    .is_some_and(|c| c.flags.subtree);
                !first_is_subtree
                    && layout.expanded_depth != Some(depth + 1)
                    && config.height_limit.is_none_or(|limit| depth + 1 < limit)
            }
            _ => true,
        };

    let can_delete_nodes = !is_root
        && match config.edit_mode {
            EditMode::Builder | EditMode::Recurrence => match &node.shape {
                NodeShape::Multiway { .. } => (leaf || flags.subtree) && !flags.subsubtree,
                _ => leaf,
            },
            EditMode::PointerDelete => true,
            EditMode::Pointer | EditMode::ViewOnly | EditMode::Value | EditMode::SideLabel => false,
        };

    Capabilities {
        can_add_nodes,
        can_delete_nodes,
        ..Capabilities::default()
    }
}

// ─── Projection ──────────────────────────────────────────────────────────

/// Build the render tree for `tree` laid out as `layout`.
pub fn project(
    tree: &BackendTree,
    layout: &TreeLayout,
    config: &BuilderConfig,
    geometry: &Geometry,
) -> RenderTree {
    let mut projector = Projector {
        tree,
        layout,
        config,
        geometry,
        out: RenderTree {
            width: geometry.canvas_width,
            height: geometry.canvas_height,
            ..RenderTree::default()
        },
    };
    match tree.mode() {
        TreeMode::BTree => {
            projector.btree_node(tree.root());
        }
        TreeMode::Binary | TreeMode::Multiway => {
            projector.circle_node(tree.root());
        }
    }
    log::trace!(
        "projected {} node(s), {} edge(s), {} affordance(s)",
        projector.out.nodes.len(),
        projector.out.edges.len(),
        projector.out.affordances.len()
    );
    projector.out
}

struct Projector<'a> {
    tree: &'a BackendTree,
    layout: &'a TreeLayout,
    config: &'a BuilderConfig,
    geometry: &'a Geometry,
    out: RenderTree,
}

impl Projector<'_> {
    fn render_node(&self, node: &BackendNode, at: &Placement, caps: Capabilities) -> RenderNode {
        let g = self.geometry;
        let text = node.shape.texts();
        let (glyph, bounds) = match node.shape {
            NodeShape::BTree { .. } => (
                Glyph::Cells {
                    width: g.key_width,
                    height: g.key_height,
                },
                Bounds::new(at.x, at.y, g.node_width(text.len()), g.key_height),
            ),
            _ => (
                Glyph::Circle { radius: g.radius },
                Bounds::square(at.x - g.radius, at.y - g.radius, 2.0 * g.radius),
            ),
        };
        RenderNode {
            id: node.id,
            x: at.x,
            y: at.y,
            text,
            glyph,
            bounds,
            highlight: node.flags.highlight,
            subtree: node.flags.subtree,
            subsubtree: node.flags.subsubtree,
            parent_index: node.parent_index(),
            capabilities: caps,
            label: None,
        }
    }

    fn affordance(&mut self, node: NodeId, index: usize, kind: AffordanceKind, x: f32, y: f32) {
        self.out.affordances.push(Affordance {
            node,
            index,
            kind,
            bounds: Bounds::square(x, y, self.geometry.button),
        });
    }

    // ─── B-tree ───

    fn btree_node(&mut self, id: NodeId) -> Option<(f32, f32, usize)> {
        let tree = self.tree;
        let node = tree.get(id)?;
        let at = *self.layout.get(id)?;
        let caps = capabilities(tree, id, self.layout, self.config, self.geometry);
        let rendered = self.render_node(node, &at, caps);
        self.out.nodes.push(rendered);

        let g = *self.geometry;
        let children = node.shape.children();
        for (i, child) in children.into_iter().enumerate() {
            if let Some((cx, cy, len)) = self.btree_node(child) {
                self.out.edges.push(RenderEdge {
                    from: id,
                    to: Some(child),
                    tag: EdgeTag::Child(i),
                    start: Point::new(at.x + g.key_width * i as f32, at.y + g.key_height),
                    end: Point::new(cx + g.node_width(len) / 2.0, cy),
                });
            }
        }

        let len = node.shape.element_count();
        let place = |index: usize, kind: AffordanceKind| -> (f32, f32) {
            let shift = match kind {
                AffordanceKind::Add { side: Side::Left } => 0.0,
                AffordanceKind::Promote | AffordanceKind::Demote => 0.5,
                _ => 1.0,
            };
            let inset = if kind == AffordanceKind::Delete { g.button } else { g.button / 2.0 };
            let x = at.x + g.key_width * (index as f32 + shift) - inset;
            let y = at.y
                + match kind {
                    AffordanceKind::Add { .. } | AffordanceKind::Demote => g.key_height,
                    AffordanceKind::Promote => -g.button,
                    _ => 0.0,
                };
            (x, y)
        };

        let mut pending = Vec::new();
        if caps.can_add_nodes {
            for i in 0..len {
                if i == 0 {
                    pending.push((i, AffordanceKind::Add { side: Side::Left }));
                }
                pending.push((i, AffordanceKind::Add { side: Side::Right }));
            }
        }
        if caps.can_delete_nodes {
            pending.extend((0..len).map(|i| (i, AffordanceKind::Delete)));
        }
        if caps.can_promote_nodes {
            pending.extend((1..len.saturating_sub(1)).map(|i| (i, AffordanceKind::Promote)));
        }
        if caps.can_demote_nodes {
            pending.extend((0..len).map(|i| (i, AffordanceKind::Demote)));
        }
        for (index, kind) in pending {
            let (x, y) = place(index, kind);
            self.affordance(id, index, kind, x, y);
        }

        Some((at.x, at.y, len))
    }

    // ─── Binary / multiway ───

    fn rim_edge(&self, from: NodeId, a: Point, to: NodeId, b: Point, tag: EdgeTag) -> RenderEdge {
        rim_edge(from, a, to, b, tag, self.geometry.radius)
    }

    fn fan_edge(&self, from: NodeId, a: Point, end: Point) -> RenderEdge {
        RenderEdge {
            from,
            to: None,
            tag: EdgeTag::Fan,
            start: a,
            end,
        }
    }

    /// Nodes on a depth, not counting decorations.
    fn visible_at_depth(&self, depth: usize) -> usize {
        self.tree
            .preorder()
            .into_iter()
            .filter(|id| {
                self.layout.get(*id).is_some_and(|p| p.depth == depth)
                    && self.tree.get(*id).is_some_and(|n| !n.flags.subsubtree)
            })
            .count()
    }

    fn circle_node(&mut self, id: NodeId) -> Option<Point> {
        let tree = self.tree;
        let node = tree.get(id)?;
        let at = *self.layout.get(id)?;
        let caps = capabilities(tree, id, self.layout, self.config, self.geometry);
        let rendered = self.render_node(node, &at, caps);
        self.out.nodes.push(rendered);

        let g = *self.geometry;
        let cd = g.rim_offset();
        let bs = g.button;
        let center = Point::new(at.x, at.y);
        let is_root = node.parent.is_none();

        match &node.shape {
            NodeShape::Multiway { children, .. } => {
                if caps.can_add_nodes {
                    self.affordance(id, 0, AffordanceKind::Add { side: Side::Right }, at.x, at.y + cd);
                }
                for (i, child) in children.iter().enumerate() {
                    let Some(child_at) = self.circle_node(*child) else {
                        continue;
                    };
                    if !node.flags.subtree {
                        let edge = self.rim_edge(id, center, *child, child_at, EdgeTag::Child(i));
                        self.out.edges.push(edge);
                    }
                }
                if node.flags.subtree && !children.is_empty() {
                    self.subtree_fan(node, &at);
                }
                if caps.can_delete_nodes {
                    self.affordance(id, 0, AffordanceKind::Delete, at.x + cd, at.y - cd - bs);
                }
            }
            NodeShape::Binary { left, right, .. } => {
                match left.and_then(|l| Some((l, self.circle_node(l)?))) {
                    Some((l, child_at)) => {
                        let edge = self.rim_edge(id, center, l, child_at, EdgeTag::Left);
                        self.out.edges.push(edge);
                    }
                    None if caps.can_add_nodes => {
                        self.affordance(id, 0, AffordanceKind::Add { side: Side::Left }, at.x - cd - bs, at.y + cd);
                    }
                    None => {}
                }
                match right.and_then(|r| Some((r, self.circle_node(r)?))) {
                    Some((r, child_at)) => {
                        let edge = self.rim_edge(id, center, r, child_at, EdgeTag::Right);
                        self.out.edges.push(edge);
                    }
                    None if caps.can_add_nodes => {
                        self.affordance(id, 0, AffordanceKind::Add { side: Side::Right }, at.x + cd, at.y + cd);
                    }
                    None => {}
                }
                if caps.can_delete_nodes {
                    self.affordance(id, 0, AffordanceKind::Delete, at.x + cd, at.y - cd - bs);
                }
                if self.config.pointer_mode() {
                    if is_root {
                        self.affordance(id, 0, AffordanceKind::Pointer { side: Side::Left }, at.x - bs / 2.0, at.y + cd);
                    } else {
                        self.affordance(id, 0, AffordanceKind::Pointer { side: Side::Left }, at.x - cd - bs, at.y + cd);
                        self.affordance(id, 0, AffordanceKind::Pointer { side: Side::Right }, at.x + cd, at.y + cd);
                    }
                }
            }
            NodeShape::BTree { .. } => {}
        }
        Some(center)
    }

    /// Fan edges and the expand / collapse handle of a subtree placeholder.
    fn subtree_fan(&mut self, node: &BackendNode, at: &Placement) {
        let g = *self.geometry;
        let (xl, xr) = at.span;
        let center = Point::new(at.x, at.y);
        let expanded = node.flags.expanded;
        let (lb, rb) = if expanded {
            (0.0, self.config.work_area(self.geometry).0)
        } else {
            (xl, xr)
        };
        if rb - lb > FAN_MIN_SPAN {
            let left = self.fan_edge(node.id, center, Point::new(lb, at.y));
            let right = self.fan_edge(node.id, center, Point::new(rb, at.y));
            self.out.edges.extend([left, right]);
        }
        if let Some(link) = node.parent
            && let Some(parent_at) = self.layout.get(link.id)
            && xr - xl > FAN_MIN_SPAN
        {
            let from = Point::new(parent_at.x, parent_at.y);
            let y = at.y - g.radius / 2.0;
            let left = self.fan_edge(link.id, from, Point::new((at.x + 2.0 * xl) / 3.0, y));
            let right = self.fan_edge(link.id, from, Point::new((at.x + 2.0 * xr) / 3.0, y));
            self.out.edges.extend([left, right]);
        }

        let cd = g.rim_offset();
        let (hx, hy) = (at.x - cd, at.y - cd - 2.0 * g.button);
        if expanded {
            self.affordance(node.id, 0, AffordanceKind::Collapse, hx, hy);
        } else if self.config.structural() && self.visible_at_depth(at.depth) == 1 {
            self.affordance(node.id, 0, AffordanceKind::Expand, hx, hy);
        }
    }
}
