//! Backend tree model.
//!
//! The backend tree is the persistent, graded structure. Nodes live in an
//! arena keyed by `NodeId`; children are referenced by id, never owned
//! directly, and every node carries a back-reference (`ParentLink`) to its
//! parent that is recomputed after each structural mutation.
//!
//! Exactly one `NodeShape` variant is used per tree, selected by the tree's
//! `TreeMode` at construction.

use crate::id::{IdRegistry, NodeId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};

/// Ordered keys held by a B-tree node.
pub type Keys = SmallVec<[String; 4]>;

// ─── Modes ───────────────────────────────────────────────────────────────

/// Which node shape a builder instance uses. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TreeMode {
    #[default]
    #[serde(rename = "btree", alias = "b-tree")]
    BTree,
    Binary,
    Multiway,
}

impl TreeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TreeMode::BTree => "btree",
            TreeMode::Binary => "binary",
            TreeMode::Multiway => "multiway",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "btree" | "b-tree" => Some(TreeMode::BTree),
            "binary" => Some(TreeMode::Binary),
            "multiway" | "arbitrary" => Some(TreeMode::Multiway),
            _ => None,
        }
    }
}

/// How the student is allowed to edit the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditMode {
    /// Structural insert/delete through affordances.
    #[default]
    Builder,
    /// Edges are re-linked directly; structure follows the links.
    Pointer,
    /// Pointer mode plus node deletion.
    PointerDelete,
    /// Multiway work-per-call tree beside a column of work-per-level cells.
    Recurrence,
    /// Node text can be edited; the shape is fixed.
    Value,
    /// Like `Value`, with a fixed label drawn beside every node.
    SideLabel,
    /// No editing at all.
    ViewOnly,
}

impl EditMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EditMode::Builder => "builder",
            EditMode::Pointer => "pointer",
            EditMode::PointerDelete => "pointer-delete",
            EditMode::Recurrence => "recurrence",
            EditMode::Value => "value",
            EditMode::SideLabel => "side-label",
            EditMode::ViewOnly => "view-only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "builder" => Some(EditMode::Builder),
            "pointer" => Some(EditMode::Pointer),
            "pointer-delete" => Some(EditMode::PointerDelete),
            "recurrence" => Some(EditMode::Recurrence),
            "value" => Some(EditMode::Value),
            "side-label" => Some(EditMode::SideLabel),
            "view-only" => Some(EditMode::ViewOnly),
            _ => None,
        }
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, EditMode::Pointer | EditMode::PointerDelete)
    }

    /// Whether nodes can be added and removed through affordances.
    pub fn edits_structure(self) -> bool {
        matches!(self, EditMode::Builder | EditMode::Recurrence)
    }

    /// Whether node text can be typed into.
    pub fn edits_text(self) -> bool {
        !self.is_pointer() && self != EditMode::ViewOnly
    }
}

/// Left or right slot of a binary node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn from_is_left(is_left: bool) -> Self {
        if is_left { Side::Left } else { Side::Right }
    }
}

/// Where a new child goes when added to a binary or multiway node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSlot {
    Side(Side),
    /// Position in a multiway child list. Clamped to the list length.
    Index(usize),
    Append,
}

// ─── Nodes ───────────────────────────────────────────────────────────────

/// The per-mode payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeShape {
    Binary {
        value: String,
        left: Option<NodeId>,
        right: Option<NodeId>,
    },
    Multiway {
        value: String,
        children: Vec<NodeId>,
    },
    BTree {
        keys: Keys,
        children: Vec<NodeId>,
    },
}

impl NodeShape {
    /// A childless node holding one empty element.
    pub fn empty(mode: TreeMode) -> Self {
        match mode {
            TreeMode::BTree => NodeShape::BTree {
                keys: smallvec::smallvec![String::new()],
                children: Vec::new(),
            },
            TreeMode::Binary => NodeShape::Binary {
                value: String::new(),
                left: None,
                right: None,
            },
            TreeMode::Multiway => NodeShape::Multiway {
                value: String::new(),
                children: Vec::new(),
            },
        }
    }

    pub fn mode(&self) -> TreeMode {
        match self {
            NodeShape::Binary { .. } => TreeMode::Binary,
            NodeShape::Multiway { .. } => TreeMode::Multiway,
            NodeShape::BTree { .. } => TreeMode::BTree,
        }
    }

    /// Children in visual (left-to-right) order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeShape::Binary { left, right, .. } => left.iter().chain(right.iter()).copied().collect(),
            NodeShape::Multiway { children, .. } | NodeShape::BTree { children, .. } => {
                children.clone()
            }
        }
    }

    /// Children paired with their sibling index (binary: 0 = left, 1 = right).
    pub fn indexed_children(&self) -> Vec<(usize, NodeId)> {
        match self {
            NodeShape::Binary { left, right, .. } => {
                let mut out = Vec::with_capacity(2);
                if let Some(l) = left {
                    out.push((0, *l));
                }
                if let Some(r) = right {
                    out.push((1, *r));
                }
                out
            }
            NodeShape::Multiway { children, .. } | NodeShape::BTree { children, .. } => {
                children.iter().copied().enumerate().collect()
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        match self {
            NodeShape::Binary { left, right, .. } => left.is_none() && right.is_none(),
            NodeShape::Multiway { children, .. } | NodeShape::BTree { children, .. } => {
                children.is_empty()
            }
        }
    }

    /// Number of text elements: the key count for B-tree nodes, otherwise 1.
    pub fn element_count(&self) -> usize {
        match self {
            NodeShape::BTree { keys, .. } => keys.len(),
            _ => 1,
        }
    }

    /// Text elements as displayed.
    pub fn texts(&self) -> Vec<String> {
        match self {
            NodeShape::BTree { keys, .. } => keys.to_vec(),
            NodeShape::Binary { value, .. } | NodeShape::Multiway { value, .. } => {
                vec![value.clone()]
            }
        }
    }

    /// Mutable access to one text element.
    pub fn text_mut(&mut self, index: usize) -> Option<&mut String> {
        match self {
            NodeShape::BTree { keys, .. } => keys.get_mut(index),
            NodeShape::Binary { value, .. } | NodeShape::Multiway { value, .. } => {
                (index == 0).then_some(value)
            }
        }
    }

    /// Replace a child reference in place. Returns false if `old` is not a child.
    pub(crate) fn replace_child(&mut self, old: NodeId, new: NodeId) -> bool {
        match self {
            NodeShape::Binary { left, right, .. } => {
                if *left == Some(old) {
                    *left = Some(new);
                    true
                } else if *right == Some(old) {
                    *right = Some(new);
                    true
                } else {
                    false
                }
            }
            NodeShape::Multiway { children, .. } | NodeShape::BTree { children, .. } => {
                match children.iter_mut().find(|c| **c == old) {
                    Some(slot) => {
                        *slot = new;
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Detach a child reference. Returns false if `child` is not a child.
    pub(crate) fn detach_child(&mut self, child: NodeId) -> bool {
        match self {
            NodeShape::Binary { left, right, .. } => {
                if *left == Some(child) {
                    *left = None;
                    true
                } else if *right == Some(child) {
                    *right = None;
                    true
                } else {
                    false
                }
            }
            NodeShape::Multiway { children, .. } | NodeShape::BTree { children, .. } => {
                let before = children.len();
                children.retain(|c| *c != child);
                children.len() != before
            }
        }
    }
}

/// Back-reference from a node to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub id: NodeId,
    /// Position among the parent's children (binary: 0 = left, 1 = right).
    pub index: usize,
}

/// Presentation flags carried through save/restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Visual emphasis (drawn like an accept state).
    #[serde(default, skip_serializing_if = "is_false")]
    pub highlight: bool,
    /// Collapsed placeholder standing in for a whole subtree.
    #[serde(default, skip_serializing_if = "is_false")]
    pub subtree: bool,
    /// Decorative child of a subtree placeholder.
    #[serde(default, skip_serializing_if = "is_false")]
    pub subsubtree: bool,
    /// Whether a subtree placeholder is shown expanded.
    #[serde(default, skip_serializing_if = "is_false")]
    pub expanded: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One node of the backend tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendNode {
    pub id: NodeId,
    pub shape: NodeShape,
    /// `None` iff this node is the root (serialized as `parentId = -1`).
    pub parent: Option<ParentLink>,
    pub flags: NodeFlags,
}

impl BackendNode {
    pub fn new(id: NodeId, shape: NodeShape) -> Self {
        Self {
            id,
            shape,
            parent: None,
            flags: NodeFlags::default(),
        }
    }

    /// Parent id as exported: the raw id, or -1 for the root.
    pub fn parent_id_raw(&self) -> i64 {
        self.parent.map_or(-1, |p| i64::from(p.id.raw()))
    }

    pub fn parent_index(&self) -> usize {
        self.parent.map_or(0, |p| p.index)
    }
}

// ─── Tree ────────────────────────────────────────────────────────────────

/// The complete backend tree for one builder instance.
///
/// `nodes` doubles as the id → node index; it is pruned to the nodes
/// reachable from `root` after every structural mutation.
#[derive(Debug, Clone)]
pub struct BackendTree {
    mode: TreeMode,
    root: NodeId,
    nodes: HashMap<NodeId, BackendNode>,
    ids: IdRegistry,
}

impl BackendTree {
    /// A tree holding a single empty node.
    #[must_use]
    pub fn new(mode: TreeMode) -> Self {
        Self::with_registry(mode, IdRegistry::new())
    }

    /// A single-node tree drawing ids from an existing registry, so a
    /// restored tree never reuses ids retired earlier in the session.
    #[must_use]
    pub fn with_registry(mode: TreeMode, mut ids: IdRegistry) -> Self {
        let root = ids.allocate();
        let mut nodes = HashMap::new();
        nodes.insert(root, BackendNode::new(root, NodeShape::empty(mode)));
        Self {
            mode,
            root,
            nodes,
            ids,
        }
    }

    /// Assemble a tree from pre-built nodes. Parent links are recomputed.
    pub(crate) fn from_parts(
        mode: TreeMode,
        root: NodeId,
        nodes: HashMap<NodeId, BackendNode>,
        ids: IdRegistry,
    ) -> Self {
        let mut tree = Self {
            mode,
            root,
            nodes,
            ids,
        };
        tree.reindex();
        tree
    }

    pub fn mode(&self) -> TreeMode {
        self.mode
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&BackendNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut BackendNode> {
        self.nodes.get_mut(&id)
    }

    /// Registry the tree allocates from. Handed to a replacement tree on restore.
    pub fn registry(&self) -> &IdRegistry {
        &self.ids
    }

    pub fn into_registry(self) -> IdRegistry {
        self.ids
    }

    /// Insert a detached node with a fresh id.
    pub(crate) fn allocate(&mut self, shape: NodeShape) -> NodeId {
        let id = self.ids.allocate();
        self.nodes.insert(id, BackendNode::new(id, shape));
        id
    }

    /// Insert a detached node under an id that was issued earlier.
    pub(crate) fn insert_existing(&mut self, node: BackendNode) {
        self.nodes.insert(node.id, node);
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id).map(|n| n.shape.children()).unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<ParentLink> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Node ids in depth-first pre-order (parent before children, left to right).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push(id);
                let children = node.shape.children();
                stack.extend(children.into_iter().rev());
            }
        }
        out
    }

    /// Node ids grouped by depth, each layer in left-to-right order.
    pub fn layers(&self) -> Vec<Vec<NodeId>> {
        let mut layers = Vec::new();
        let mut current = vec![self.root];
        while !current.is_empty() {
            let next: Vec<NodeId> = current.iter().flat_map(|id| self.children(*id)).collect();
            layers.push(current);
            current = next;
        }
        layers
    }

    /// Depth of a node (root = 0).
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let mut depth = 0;
        let mut cur = self.get(id)?;
        while let Some(link) = cur.parent {
            depth += 1;
            cur = self.get(link.id)?;
        }
        Some(depth)
    }

    /// Recompute every `ParentLink` from the root down and drop nodes that
    /// are no longer reachable.
    pub(crate) fn reindex(&mut self) {
        let mut reachable = HashSet::with_capacity(self.nodes.len());
        let mut queue = VecDeque::new();
        if let Some(root) = self.nodes.get_mut(&self.root) {
            root.parent = None;
            queue.push_back(self.root);
        }
        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id) {
                continue;
            }
            let children = match self.nodes.get(&id) {
                Some(node) => node.shape.indexed_children(),
                None => continue,
            };
            for (index, child) in children {
                if let Some(child_node) = self.nodes.get_mut(&child) {
                    child_node.parent = Some(ParentLink { id, index });
                    queue.push_back(child);
                }
            }
        }
        let before = self.nodes.len();
        self.nodes.retain(|id, _| reachable.contains(id));
        if self.nodes.len() != before {
            log::trace!("reindex dropped {} detached node(s)", before - self.nodes.len());
        }
    }

    /// Verify the structural invariants: every reachable node appears once,
    /// parent links agree with child lists, the root has no parent, and
    /// internal B-tree nodes hold one more child than keys.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        let mut stack = vec![(self.root, None::<ParentLink>)];
        while let Some((id, expected_parent)) = stack.pop() {
            let node = self
                .nodes
                .get(&id)
                .ok_or_else(|| format!("dangling child reference {id}"))?;
            if !seen.insert(id) {
                return Err(format!("node {id} is reachable more than once"));
            }
            if node.parent != expected_parent {
                return Err(format!(
                    "node {id} has parent link {:?}, expected {:?}",
                    node.parent, expected_parent
                ));
            }
            if let NodeShape::BTree { keys, children } = &node.shape
                && !children.is_empty()
                && children.len() != keys.len() + 1
            {
                return Err(format!(
                    "B-tree node {id} has {} keys but {} children",
                    keys.len(),
                    children.len()
                ));
            }
            if node.shape.mode() != self.mode {
                return Err(format!("node {id} has the wrong shape for this tree"));
            }
            for (index, child) in node.shape.indexed_children() {
                stack.push((child, Some(ParentLink { id, index })));
            }
        }
        if seen.len() != self.nodes.len() {
            return Err(format!(
                "{} node(s) are stored but unreachable",
                self.nodes.len() - seen.len()
            ));
        }
        Ok(())
    }

    /// In-order key sequence of a B-tree (or pre-order values otherwise).
    pub fn flattened_keys(&self) -> Vec<String> {
        fn walk(tree: &BackendTree, id: NodeId, out: &mut Vec<String>) {
            let Some(node) = tree.get(id) else { return };
            match &node.shape {
                NodeShape::BTree { keys, children } => {
                    for (i, key) in keys.iter().enumerate() {
                        if let Some(child) = children.get(i) {
                            walk(tree, *child, out);
                        }
                        out.push(key.clone());
                    }
                    if let Some(last) = children.get(keys.len()) {
                        walk(tree, *last, out);
                    }
                }
                NodeShape::Binary { value, left, right } => {
                    if let Some(l) = left {
                        walk(tree, *l, out);
                    }
                    out.push(value.clone());
                    if let Some(r) = right {
                        walk(tree, *r, out);
                    }
                }
                NodeShape::Multiway { value, children } => {
                    out.push(value.clone());
                    for child in children {
                        walk(tree, *child, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, self.root, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tree_has_single_empty_root() {
        let tree = BackendTree::new(TreeMode::BTree);
        assert_eq!(tree.len(), 1);
        let root = tree.get(tree.root()).unwrap();
        assert_eq!(root.shape.texts(), vec![String::new()]);
        assert_eq!(root.parent_id_raw(), -1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn reindex_drops_detached_nodes() {
        let mut tree = BackendTree::new(TreeMode::Multiway);
        let root = tree.root();
        let child = tree.allocate(NodeShape::empty(TreeMode::Multiway));
        let orphan = tree.allocate(NodeShape::empty(TreeMode::Multiway));
        if let NodeShape::Multiway { children, .. } = &mut tree.get_mut(root).unwrap().shape {
            children.push(child);
        }
        tree.reindex();
        assert!(tree.contains(child));
        assert!(!tree.contains(orphan));
        assert_eq!(tree.parent(child), Some(ParentLink { id: root, index: 0 }));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn binary_children_keep_side_index() {
        let mut tree = BackendTree::new(TreeMode::Binary);
        let root = tree.root();
        let right = tree.allocate(NodeShape::empty(TreeMode::Binary));
        if let NodeShape::Binary { right: r, .. } = &mut tree.get_mut(root).unwrap().shape {
            *r = Some(right);
        }
        tree.reindex();
        assert_eq!(tree.parent(right).unwrap().index, 1);
        assert_eq!(tree.depth(right), Some(1));
        assert_eq!(tree.layers(), vec![vec![root], vec![right]]);
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in [TreeMode::BTree, TreeMode::Binary, TreeMode::Multiway] {
            assert_eq!(TreeMode::parse(mode.as_str()), Some(mode));
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
        }
        for edit in [
            EditMode::Builder,
            EditMode::Pointer,
            EditMode::PointerDelete,
            EditMode::Recurrence,
            EditMode::Value,
            EditMode::SideLabel,
            EditMode::ViewOnly,
        ] {
            assert_eq!(EditMode::parse(edit.as_str()), Some(edit));
            let json = serde_json::to_string(&edit).unwrap();
            assert_eq!(json, format!("\"{}\"", edit.as_str()));
        }
    }

    #[test]
    fn unknown_mode_names_are_rejected() {
        assert_eq!(TreeMode::parse("recurrence"), None);
        assert_eq!(EditMode::parse("animation"), None);
        assert_eq!(EditMode::parse("Builder"), None);
        assert!(serde_json::from_str::<EditMode>("\"animation\"").is_err());
        assert_eq!(TreeMode::parse("arbitrary"), Some(TreeMode::Multiway));
    }

    #[test]
    fn text_and_structure_permissions_per_mode() {
        assert!(EditMode::Recurrence.edits_structure());
        assert!(EditMode::Recurrence.edits_text());
        assert!(!EditMode::Value.edits_structure());
        assert!(EditMode::Value.edits_text());
        assert!(EditMode::SideLabel.edits_text());
        assert!(!EditMode::PointerDelete.edits_text());
        assert!(!EditMode::ViewOnly.edits_text());
    }
}
