//! Pointer-mode link board.
//!
//! In pointer mode the student edits edges directly. The board holds every
//! node and every `(source, side) → target` link independently of the
//! backend tree; the backend is only rebuilt from the links once they form
//! a valid tree hanging off the `ROOT*` sentinel.

use crate::config::POINTER_SENTINEL;
use crate::id::{IdRegistry, NodeId};
use crate::model::*;
use crate::serialize::{LiteralValue, TreeLiteral, parse_literal, tree_from_literal};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Parse a pointer-mode tree, adding the sentinel root unless the literal
/// already starts with it.
pub fn parse_pointer_tree(input: &str, ids: IdRegistry) -> Result<BackendTree, String> {
    let literal = parse_literal(input)?;
    if literal.value.text() == POINTER_SENTINEL {
        return tree_from_literal(&literal, TreeMode::Binary, ids);
    }
    let wrapped = TreeLiteral {
        value: LiteralValue::One(serde_json::Value::String(POINTER_SENTINEL.to_string())),
        left: Some(Box::new(literal)),
        ..TreeLiteral::default()
    };
    tree_from_literal(&wrapped, TreeMode::Binary, ids)
}

/// The student's tree below the sentinel, if any.
pub fn student_root(tree: &BackendTree) -> Option<NodeId> {
    match tree.get(tree.root()).map(|n| &n.shape) {
        Some(NodeShape::Binary { left, .. }) => *left,
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerNode {
    pub id: NodeId,
    pub value: String,
    pub flags: NodeFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerBoard {
    sentinel: NodeId,
    nodes: BTreeMap<NodeId, PointerNode>,
    links: BTreeMap<(NodeId, Side), NodeId>,
}

impl PointerBoard {
    /// Snapshot the nodes and edges of a binary tree whose root is the sentinel.
    pub fn from_tree(tree: &BackendTree) -> Result<Self, String> {
        if tree.mode() != TreeMode::Binary {
            return Err("Pointer mode requires a binary tree".to_string());
        }
        let mut nodes = BTreeMap::new();
        let mut links = BTreeMap::new();
        for id in tree.preorder() {
            let Some(node) = tree.get(id) else { continue };
            let NodeShape::Binary { value, left, right } = &node.shape else {
                continue;
            };
            nodes.insert(
                id,
                PointerNode {
                    id,
                    value: value.clone(),
                    flags: node.flags,
                },
            );
            if let Some(l) = left {
                links.insert((id, Side::Left), *l);
            }
            if let Some(r) = right {
                links.insert((id, Side::Right), *r);
            }
        }
        Ok(Self {
            sentinel: tree.root(),
            nodes,
            links,
        })
    }

    pub fn sentinel(&self) -> NodeId {
        self.sentinel
    }

    pub fn node(&self, id: NodeId) -> Option<&PointerNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PointerNode> {
        self.nodes.values()
    }

    /// Every link as `(source, side, target)`.
    pub fn links(&self) -> impl Iterator<Item = (NodeId, Side, NodeId)> + '_ {
        self.links.iter().map(|(&(s, side), &t)| (s, side, t))
    }

    pub fn link(&self, source: NodeId, side: Side) -> Option<NodeId> {
        self.links.get(&(source, side)).copied()
    }

    /// Point `source`'s `side` at `target`, replacing any previous link from
    /// that slot. The sentinel only has a left slot and cannot be a target.
    pub fn relink(&mut self, source: NodeId, side: Side, target: NodeId) -> bool {
        if !self.nodes.contains_key(&source) || !self.nodes.contains_key(&target) {
            log::warn!("relink: unknown node in {source} -> {target}");
            return false;
        }
        if target == self.sentinel || (source == self.sentinel && side == Side::Right) {
            log::warn!("relink: {source}/{side:?} -> {target} touches the sentinel");
            return false;
        }
        self.links.insert((source, side), target);
        true
    }

    /// Drop the link leaving `source` on `side`.
    pub fn remove_link(&mut self, source: NodeId, side: Side) -> bool {
        self.links.remove(&(source, side)).is_some()
    }

    /// Delete a node together with every link into or out of it.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if id == self.sentinel || self.nodes.remove(&id).is_none() {
            return false;
        }
        self.links.retain(|&(source, _), target| source != id && *target != id);
        true
    }

    fn value_of(&self, id: NodeId) -> &str {
        self.nodes.get(&id).map_or("", |n| n.value.as_str())
    }

    /// Check that the links form one tree under the sentinel.
    pub fn validate(&self) -> Result<(), String> {
        let mut pointed = HashSet::with_capacity(self.links.len());
        for &target in self.links.values() {
            if !pointed.insert(target) {
                return Err(format!(
                    "Error: multiple pointers pointing to node with value {}",
                    self.value_of(target)
                ));
            }
        }
        if let Some(orphan) = self
            .nodes
            .keys()
            .find(|id| **id != self.sentinel && !pointed.contains(*id))
        {
            return Err(format!(
                "Error: no pointers pointing to node with value {}",
                self.value_of(*orphan)
            ));
        }

        let mut graph: DiGraphMap<NodeId, Side> = DiGraphMap::new();
        for id in self.nodes.keys() {
            graph.add_node(*id);
        }
        for (&(source, side), &target) in &self.links {
            graph.add_edge(source, target, side);
        }
        let mut reached = HashSet::with_capacity(self.nodes.len());
        let mut dfs = Dfs::new(&graph, self.sentinel);
        while let Some(id) = dfs.next(&graph) {
            reached.insert(id);
        }
        if let Some(lost) = self.nodes.keys().find(|id| !reached.contains(*id)) {
            return Err(format!(
                "Error: node with value {} is not reachable from {POINTER_SENTINEL}",
                self.value_of(*lost)
            ));
        }
        Ok(())
    }

    /// Rebuild a backend tree from the links, keeping every node's id.
    pub fn rebuild(&self, ids: IdRegistry) -> Result<BackendTree, String> {
        self.validate()?;
        let nodes: HashMap<NodeId, BackendNode> = self
            .nodes
            .values()
            .map(|n| {
                let shape = NodeShape::Binary {
                    value: n.value.clone(),
                    left: self.link(n.id, Side::Left),
                    right: self.link(n.id, Side::Right),
                };
                let mut node = BackendNode::new(n.id, shape);
                node.flags = n.flags;
                (n.id, node)
            })
            .collect();
        let tree = BackendTree::from_parts(TreeMode::Binary, self.sentinel, nodes, ids);
        tree.check_invariants()?;
        Ok(tree)
    }
}
