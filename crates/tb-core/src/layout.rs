//! Layout engine.
//!
//! B-trees are laid out layer by layer (BFS depth). Each layer is packed
//! into one or more horizontal sublayers so that every gap between nodes,
//! and between the outer nodes and the canvas edges, stays at least
//! `1.5 × button`. Rows are then stacked top to bottom with a row height
//! that shrinks when the whole tree would not fit.
//!
//! Binary and multiway trees use recursive interval splitting: every node
//! owns a horizontal interval and hands sub-intervals to its children.
//!
//! Layout output is pure cache. It is recomputed from scratch after every
//! mutation and never persisted.

use crate::config::{BuilderConfig, Geometry, MAX_ROW_HEIGHT};
use crate::id::NodeId;
use crate::model::*;
use std::collections::HashMap;

/// Hard ceiling on sublayers per layer.
pub const MAX_SUBLAYERS: usize = 20;

/// Horizontal margin of the interval handed to the root of a circular tree.
const SIDE_MARGIN: f32 = 20.0;

/// Space kept below the deepest row of a circular tree.
const BOTTOM_MARGIN: f32 = 40.0;

/// Where one node ended up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Depth from the root.
    pub depth: usize,
    /// Packing bucket within the depth (always 0 for circular trees).
    pub sublayer: usize,
    /// Visual row: cumulative sublayer index for B-trees, depth otherwise.
    pub row: usize,
    /// Top-left corner for B-tree nodes, center for circular nodes.
    pub x: f32,
    pub y: f32,
    /// Horizontal interval owned by the node (circular trees).
    pub span: (f32, f32),
    /// Height of the subtree rooted here, in rows.
    pub height: usize,
    /// Binary weighting counters for the left and right subtrees.
    pub left_count: usize,
    pub right_count: usize,
}

/// Packing result for one B-tree layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerPacking {
    /// Sublayer of each node, in layer order.
    pub assignment: Vec<usize>,
    /// Gap used in each sublayer.
    pub gaps: Vec<f32>,
    /// Set when the gap invariant could not be met within `MAX_SUBLAYERS`,
    /// or a single node is wider than the canvas allows.
    pub ceiling_hit: bool,
}

impl LayerPacking {
    pub fn sublayer_count(&self) -> usize {
        self.gaps.len()
    }

    /// Left edge of every node, laid out left to right within its sublayer.
    pub fn x_positions(&self, sizes: &[usize], geometry: &Geometry) -> Vec<f32> {
        let mut cursor: Vec<Option<f32>> = vec![None; self.gaps.len()];
        let mut xs = Vec::with_capacity(sizes.len());
        for (&size, &sub) in sizes.iter().zip(&self.assignment) {
            let gap = self.gaps[sub];
            let x = cursor[sub].map_or(gap, |end| end + gap);
            cursor[sub] = Some(x + geometry.node_width(size));
            xs.push(x);
        }
        xs
    }
}

/// Output of one layout pass.
#[derive(Debug, Clone, Default)]
pub struct TreeLayout {
    placements: HashMap<NodeId, Placement>,
    /// Per-depth packing (B-trees only).
    pub layers: Vec<LayerPacking>,
    /// Total number of visual rows.
    pub row_count: usize,
    pub row_height: f32,
    /// Depth of the expanded subtree placeholder, if any.
    pub expanded_depth: Option<usize>,
}

impl TreeLayout {
    pub fn get(&self, id: NodeId) -> Option<&Placement> {
        self.placements.get(&id)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Whether any layer had to settle for an imperfect packing.
    pub fn ceiling_hit(&self) -> bool {
        self.layers.iter().any(|l| l.ceiling_hit)
    }
}

/// Lay out the whole tree.
pub fn compute_layout(tree: &BackendTree, config: &BuilderConfig, geometry: &Geometry) -> TreeLayout {
    match tree.mode() {
        TreeMode::BTree => layout_btree(tree, geometry),
        TreeMode::Binary | TreeMode::Multiway => layout_circles(tree, config, geometry),
    }
}

// ─── B-tree sublayer packing ─────────────────────────────────────────────

fn gap_for(geometry: &Geometry, keys: usize, nodes: usize) -> f32 {
    (geometry.canvas_width - geometry.node_width(keys)) / (nodes as f32 + 1.0)
}

/// Pack one layer, given each node's key count in traversal order.
pub fn pack_layer(sizes: &[usize], geometry: &Geometry) -> LayerPacking {
    if sizes.is_empty() {
        return LayerPacking::default();
    }
    let min_gap = geometry.min_gap();
    let keys: usize = sizes.iter().sum();
    let demand = geometry.node_width(keys) + sizes.len() as f32 * min_gap;
    let estimate = (demand / (geometry.canvas_width - min_gap)).ceil();
    let mut count = if estimate.is_finite() && estimate > 0.0 {
        (estimate as usize).clamp(1, MAX_SUBLAYERS)
    } else {
        MAX_SUBLAYERS
    };

    loop {
        if let Some(packing) = try_pack(sizes, count, geometry) {
            return packing;
        }
        if count >= MAX_SUBLAYERS {
            log::debug!(
                "layer of {} node(s) does not fit in {MAX_SUBLAYERS} sublayers",
                sizes.len()
            );
            return force_pack(sizes, count, geometry);
        }
        count += 1;
        log::trace!("retrying layer with {count} sublayers");
    }
}

/// Greedy fill: nodes stay in order, each going into the current sublayer
/// unless that would push its gap below the minimum. An empty sublayer
/// always accepts a node.
fn try_pack(sizes: &[usize], count: usize, geometry: &Geometry) -> Option<LayerPacking> {
    let min_gap = geometry.min_gap();
    let mut keys = vec![0usize; count];
    let mut nodes = vec![0usize; count];
    let mut assignment = Vec::with_capacity(sizes.len());
    let mut next = 0;

    for &size in sizes {
        while next < count
            && nodes[next] > 0
            && gap_for(geometry, keys[next] + size, nodes[next] + 1) < min_gap
        {
            next += 1;
        }
        if next >= count {
            return None;
        }
        keys[next] += size;
        nodes[next] += 1;
        assignment.push(next);
    }

    let mut ceiling_hit = false;
    let mut gaps = Vec::with_capacity(count);
    for sub in 0..count {
        let gap = gap_for(geometry, keys[sub], nodes[sub]);
        if gap < min_gap {
            if nodes[sub] > 1 {
                return None;
            }
            // One node wider than the canvas: more sublayers cannot help.
            ceiling_hit = true;
        }
        gaps.push(gap);
    }

    Some(LayerPacking {
        assignment,
        gaps,
        ceiling_hit,
    })
}

/// Last resort past the ceiling: overflow piles into the final sublayer.
fn force_pack(sizes: &[usize], count: usize, geometry: &Geometry) -> LayerPacking {
    let min_gap = geometry.min_gap();
    let mut keys = vec![0usize; count];
    let mut nodes = vec![0usize; count];
    let mut assignment = Vec::with_capacity(sizes.len());
    let mut next = 0;

    for &size in sizes {
        while next + 1 < count
            && nodes[next] > 0
            && gap_for(geometry, keys[next] + size, nodes[next] + 1) < min_gap
        {
            next += 1;
        }
        keys[next] += size;
        nodes[next] += 1;
        assignment.push(next);
    }

    LayerPacking {
        assignment,
        gaps: (0..count).map(|s| gap_for(geometry, keys[s], nodes[s])).collect(),
        ceiling_hit: true,
    }
}

/// Row spacing for `rows` stacked B-tree rows.
pub fn btree_row_height(rows: usize, geometry: &Geometry) -> f32 {
    let margins = geometry.button * 4.0 + geometry.key_height;
    if rows > 1 && (rows - 1) as f32 * MAX_ROW_HEIGHT + margins > geometry.canvas_height {
        (geometry.canvas_height - margins) / (rows - 1) as f32
    } else {
        MAX_ROW_HEIGHT
    }
}

fn layout_btree(tree: &BackendTree, geometry: &Geometry) -> TreeLayout {
    let mut placements = HashMap::with_capacity(tree.len());
    let mut packings = Vec::new();
    let mut row_offset = 0;

    for (depth, layer) in tree.layers().into_iter().enumerate() {
        let sizes: Vec<usize> = layer
            .iter()
            .map(|id| tree.get(*id).map_or(1, |n| n.shape.element_count()))
            .collect();
        let packing = pack_layer(&sizes, geometry);
        let xs = packing.x_positions(&sizes, geometry);
        for ((id, sub), x) in layer.iter().zip(&packing.assignment).zip(xs) {
            placements.insert(
                *id,
                Placement {
                    depth,
                    sublayer: *sub,
                    row: row_offset + sub,
                    x,
                    y: 0.0,
                    span: (0.0, geometry.canvas_width),
                    height: 0,
                    left_count: 0,
                    right_count: 0,
                },
            );
        }
        row_offset += packing.sublayer_count();
        packings.push(packing);
    }

    let row_height = btree_row_height(row_offset, geometry);
    for p in placements.values_mut() {
        p.y = geometry.button * 2.0 + p.row as f32 * row_height;
    }

    TreeLayout {
        placements,
        layers: packings,
        row_count: row_offset,
        row_height,
        expanded_depth: None,
    }
}

// ─── Binary / multiway interval layout ───────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Metrics {
    height: usize,
    left: usize,
    right: usize,
}

/// Height plus left/right weighting counters, bottom-up.
fn binary_metrics(tree: &BackendTree, id: Option<NodeId>, out: &mut HashMap<NodeId, Metrics>) -> Metrics {
    let Some(node) = id.and_then(|id| tree.get(id)) else {
        return Metrics::default();
    };
    let (left, right) = match &node.shape {
        NodeShape::Binary { left, right, .. } => (*left, *right),
        _ => (None, None),
    };
    let l = binary_metrics(tree, left, out);
    let r = binary_metrics(tree, right, out);
    let m = Metrics {
        height: 1 + l.height.max(r.height),
        left: 1 + l.left + l.right,
        right: 1 + r.left + r.right,
    };
    out.insert(node.id, m);
    m
}

/// Subtree height; decorative nodes add no row.
fn multiway_metrics(tree: &BackendTree, id: NodeId, out: &mut HashMap<NodeId, Metrics>) -> usize {
    let Some(node) = tree.get(id) else { return 0 };
    let below = node
        .shape
        .children()
        .into_iter()
        .map(|c| multiway_metrics(tree, c, out))
        .max()
        .unwrap_or(0);
    let height = usize::from(!node.flags.subsubtree) + below;
    out.insert(
        id,
        Metrics {
            height,
            ..Metrics::default()
        },
    );
    height
}

struct CirclePass<'a> {
    tree: &'a BackendTree,
    config: &'a BuilderConfig,
    geometry: &'a Geometry,
    metrics: HashMap<NodeId, Metrics>,
    /// Width of the area the tree is laid out in.
    width: f32,
    bottom: f32,
    row_height: f32,
    out: HashMap<NodeId, Placement>,
}

impl CirclePass<'_> {
    fn place(&mut self, id: NodeId, span: (f32, f32), top: f32, depth: usize) {
        let tree = self.tree;
        let Some(node) = tree.get(id) else { return };
        let m = self.metrics.get(&id).copied().unwrap_or_default();
        let is_root = depth == 0;
        let (xl, xr) = span;

        let mut y = (top + (self.bottom - top) / m.height.max(1) as f32).min(top + MAX_ROW_HEIGHT);
        if self.config.fixed_height {
            y = top + self.row_height;
        }
        if node.flags.subsubtree {
            y = top + 2.0 * self.geometry.radius;
        }
        let mut x = match &node.shape {
            NodeShape::Binary { .. } => {
                (xl * m.right as f32 + xr * m.left as f32) / (m.left + m.right).max(1) as f32
            }
            _ => (xl + xr) / 2.0,
        };
        if is_root {
            y = top;
            if self.config.pointer_mode() {
                x = self.width / 2.0;
            }
        }

        self.out.insert(
            id,
            Placement {
                depth,
                sublayer: 0,
                row: depth,
                x,
                y,
                span,
                height: m.height,
                left_count: m.left,
                right_count: m.right,
            },
        );

        match &node.shape {
            NodeShape::Binary { left, right, .. } => {
                let (left, right) = (*left, *right);
                if let Some(l) = left {
                    let left_span = if is_root && self.config.pointer_mode() {
                        (SIDE_MARGIN, self.width - SIDE_MARGIN)
                    } else {
                        (xl, x)
                    };
                    self.place(l, left_span, y, depth + 1);
                }
                if let Some(r) = right {
                    self.place(r, (x, xr), y, depth + 1);
                }
            }
            NodeShape::Multiway { children, .. } | NodeShape::BTree { children, .. } => {
                let children = children.clone();
                let space = (xr - xl) / children.len().max(1) as f32;
                for (i, child) in children.into_iter().enumerate() {
                    let child_span = (xl + space * i as f32, xl + space * (i + 1) as f32);
                    self.place(child, child_span, y, depth + 1);
                }
            }
        }
    }
}

fn layout_circles(tree: &BackendTree, config: &BuilderConfig, geometry: &Geometry) -> TreeLayout {
    let mut metrics = HashMap::with_capacity(tree.len());
    let root_height = match tree.mode() {
        TreeMode::Binary => binary_metrics(tree, Some(tree.root()), &mut metrics).height,
        _ => multiway_metrics(tree, tree.root(), &mut metrics),
    }
    .max(1);

    let top = config.tree_top();
    let (width, height) = config.work_area(geometry);
    let row_height = if config.fixed_height {
        config
            .fixed_row_height()
            .min((height - (geometry.radius + top)) / root_height as f32)
    } else {
        MAX_ROW_HEIGHT
    };
    let expanded_depth = tree
        .preorder()
        .into_iter()
        .filter(|id| tree.get(*id).is_some_and(|n| n.flags.expanded))
        .filter_map(|id| tree.depth(id))
        .last();

    let mut pass = CirclePass {
        tree,
        config,
        geometry,
        metrics,
        width,
        bottom: height - BOTTOM_MARGIN,
        row_height,
        out: HashMap::with_capacity(tree.len()),
    };
    pass.place(
        tree.root(),
        (SIDE_MARGIN, width - SIDE_MARGIN),
        top,
        0,
    );

    TreeLayout {
        placements: pass.out,
        layers: Vec::new(),
        row_count: root_height,
        row_height,
        expanded_depth,
    }
}
