//! Structural edits on the backend tree.
//!
//! Every operation is addressed by node id and reports a `MutationResult`
//! naming the element that should be selected afterwards. Operations
//! addressed to an unknown id, or that would break a tree invariant, leave
//! the tree untouched and report `success: false`. Nothing here panics on
//! user input.

use crate::id::NodeId;
use crate::model::*;
use serde::Serialize;

/// A node plus the index of one of its text elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub node: NodeId,
    pub index: usize,
}

impl Selection {
    pub const fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Outcome of a backend mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    /// Where focus should land after the edit.
    pub selection: Selection,
    pub success: bool,
}

impl MutationResult {
    fn ok(node: NodeId, index: usize) -> Self {
        Self {
            selection: Selection::new(node, index),
            success: true,
        }
    }

    fn failed(node: NodeId, index: usize) -> Self {
        Self {
            selection: Selection::new(node, index),
            success: false,
        }
    }
}

/// One half of a split B-tree node.
struct Half {
    keys: Keys,
    children: Vec<NodeId>,
}

impl Half {
    /// A keyless internal half collapses into its only child.
    fn elided_child(&self) -> Option<NodeId> {
        (self.keys.is_empty() && self.children.len() == 1).then(|| self.children[0])
    }
}

impl BackendTree {
    // ─── Element edits (B-tree) ─────────────────────────────────────────

    /// Insert an empty key at `index` in a B-tree leaf.
    pub fn insert_element(&mut self, node: NodeId, index: usize) -> MutationResult {
        let Some(target) = self.get_mut(node) else {
            log::warn!("insert_element: unknown node {node}");
            return MutationResult::failed(node, index);
        };
        match &mut target.shape {
            NodeShape::BTree { keys, children } if children.is_empty() && index <= keys.len() => {
                keys.insert(index, String::new());
                MutationResult::ok(node, index)
            }
            _ => {
                log::warn!("insert_element: {node} cannot take a key at {index}");
                MutationResult::failed(node, index)
            }
        }
    }

    /// Remove the key at `index` from a B-tree leaf holding more than one key.
    /// Selects the key that ends up left of the removed one; a refused
    /// removal keeps the selection on `index`.
    pub fn remove_element(&mut self, node: NodeId, index: usize) -> MutationResult {
        let Some(target) = self.get_mut(node) else {
            log::warn!("remove_element: unknown node {node}");
            return MutationResult::failed(node, index);
        };
        match &mut target.shape {
            NodeShape::BTree { keys, children }
                if children.is_empty() && keys.len() > 1 && index < keys.len() =>
            {
                keys.remove(index);
                MutationResult::ok(node, index.saturating_sub(1))
            }
            _ => {
                log::warn!("remove_element: {node} cannot drop key {index}");
                MutationResult::failed(node, index)
            }
        }
    }

    /// Overwrite one text element.
    pub fn set_text(&mut self, node: NodeId, index: usize, text: &str) -> bool {
        match self.get_mut(node).and_then(|n| n.shape.text_mut(index)) {
            Some(slot) => {
                if slot != text {
                    slot.clear();
                    slot.push_str(text);
                }
                true
            }
            None => false,
        }
    }

    // ─── Child edits (binary / multiway) ────────────────────────────────

    /// Attach a new empty child. In multiway trees a subtree placeholder can
    /// only be added as a first child, and it gets a decorative grandchild.
    pub fn add_child(&mut self, parent: NodeId, slot: ChildSlot, as_subtree: bool) -> MutationResult {
        let mode = self.mode();
        let Some(parent_node) = self.get(parent) else {
            log::warn!("add_child: unknown node {parent}");
            return MutationResult::failed(parent, 0);
        };

        match (&parent_node.shape, mode) {
            (NodeShape::Binary { left, right, .. }, TreeMode::Binary) => {
                let side = match slot {
                    ChildSlot::Side(side) => side,
                    ChildSlot::Index(0) => Side::Left,
                    ChildSlot::Index(_) => Side::Right,
                    ChildSlot::Append if left.is_none() => Side::Left,
                    ChildSlot::Append => Side::Right,
                };
                let occupied = match side {
                    Side::Left => left.is_some(),
                    Side::Right => right.is_some(),
                };
                if occupied {
                    log::warn!("add_child: {parent} already has a {side:?} child");
                    return MutationResult::failed(parent, 0);
                }
                let child = self.allocate(NodeShape::empty(TreeMode::Binary));
                if let Some(c) = self.get_mut(child) {
                    c.flags.subtree = as_subtree;
                }
                if let Some(NodeShape::Binary { left, right, .. }) =
                    self.get_mut(parent).map(|p| &mut p.shape)
                {
                    match side {
                        Side::Left => *left = Some(child),
                        Side::Right => *right = Some(child),
                    }
                }
                self.reindex();
                MutationResult::ok(child, 0)
            }
            (NodeShape::Multiway { children, .. }, TreeMode::Multiway) => {
                let subtree = as_subtree && children.is_empty();
                let position = match slot {
                    ChildSlot::Index(i) => i.min(children.len()),
                    ChildSlot::Side(Side::Left) => 0,
                    ChildSlot::Side(Side::Right) | ChildSlot::Append => children.len(),
                };
                let child = self.allocate(NodeShape::empty(TreeMode::Multiway));
                if subtree {
                    let decoration = self.allocate(NodeShape::empty(TreeMode::Multiway));
                    if let Some(d) = self.get_mut(decoration) {
                        d.flags.subsubtree = true;
                    }
                    if let Some(c) = self.get_mut(child) {
                        c.flags.subtree = true;
                        if let NodeShape::Multiway { children, .. } = &mut c.shape {
                            children.push(decoration);
                        }
                    }
                }
                if let Some(NodeShape::Multiway { children, .. }) =
                    self.get_mut(parent).map(|p| &mut p.shape)
                {
                    children.insert(position, child);
                }
                self.reindex();
                MutationResult::ok(child, 0)
            }
            _ => {
                log::warn!("add_child: not supported in {} trees", mode.as_str());
                MutationResult::failed(parent, 0)
            }
        }
    }

    /// Detach a non-root node and its whole subtree. Selects the parent.
    pub fn remove_child(&mut self, node: NodeId) -> MutationResult {
        let Some(link) = self.parent(node) else {
            log::warn!("remove_child: {node} is the root or unknown");
            return MutationResult::failed(node, 0);
        };
        let detached = self
            .get_mut(link.id)
            .is_some_and(|p| p.shape.detach_child(node));
        if !detached {
            return MutationResult::failed(node, 0);
        }
        self.reindex();
        MutationResult::ok(link.id, 0)
    }

    /// Show or hide the expansion of a subtree placeholder.
    pub fn expand(&mut self, node: NodeId, expanded: bool) -> MutationResult {
        match self.get_mut(node) {
            Some(n) => {
                n.flags.expanded = expanded;
                MutationResult::ok(node, 0)
            }
            None => {
                log::warn!("expand: unknown node {node}");
                MutationResult::failed(node, 0)
            }
        }
    }

    // ─── Promote / demote (B-tree) ──────────────────────────────────────

    /// Split a B-tree node around `index` and move that key up.
    ///
    /// The original node keeps the left half and a new node takes the right
    /// half. If the node has a parent, the key is spliced into the parent at
    /// the node's sibling index; otherwise a new root holding just the key is
    /// created. A half left with no keys is replaced by its only child; a
    /// promote that would leave a keyless leaf is rejected.
    ///
    /// Selects the promoted key in its new home.
    pub fn promote(&mut self, node: NodeId, index: usize) -> MutationResult {
        let Some(target) = self.get(node) else {
            log::warn!("promote: unknown node {node}");
            return MutationResult::failed(node, index);
        };
        let NodeShape::BTree { keys, children } = &target.shape else {
            return MutationResult::failed(node, index);
        };
        if index >= keys.len() {
            log::warn!("promote: {node} has no key {index}");
            return MutationResult::failed(node, index);
        }
        let is_leaf = children.is_empty();
        if is_leaf && (index == 0 || index + 1 == keys.len()) {
            log::warn!("promote: key {index} of leaf {node} would leave an empty node");
            return MutationResult::failed(node, index);
        }

        let promoted = keys[index].clone();
        let left = Half {
            keys: keys[..index].iter().cloned().collect(),
            children: if is_leaf { Vec::new() } else { children[..=index].to_vec() },
        };
        let right = Half {
            keys: keys[index + 1..].iter().cloned().collect(),
            children: if is_leaf { Vec::new() } else { children[index + 1..].to_vec() },
        };
        let parent = target.parent;

        let left_id = match left.elided_child() {
            Some(child) => child,
            None => {
                if let Some(n) = self.get_mut(node) {
                    n.shape = NodeShape::BTree {
                        keys: left.keys,
                        children: left.children,
                    };
                }
                node
            }
        };
        let right_id = match right.elided_child() {
            Some(child) => child,
            None => self.allocate(NodeShape::BTree {
                keys: right.keys,
                children: right.children,
            }),
        };

        let result = match parent {
            None => {
                let new_root = self.allocate(NodeShape::BTree {
                    keys: smallvec::smallvec![promoted],
                    children: vec![left_id, right_id],
                });
                self.set_root(new_root);
                MutationResult::ok(new_root, 0)
            }
            Some(link) => {
                if let Some(NodeShape::BTree { keys, children }) =
                    self.get_mut(link.id).map(|p| &mut p.shape)
                {
                    keys.insert(link.index, promoted);
                    children.splice(link.index..=link.index, [left_id, right_id]);
                }
                MutationResult::ok(link.id, link.index)
            }
        };
        self.reindex();
        log::debug!("promote {node}[{index}] -> {:?}", result.selection);
        result
    }

    /// Merge the two children around key `index` of a B-tree node, pulling
    /// the key down between them.
    ///
    /// If the node held only that key, the merged node replaces it (becoming
    /// the root if the node was the root). Children that are not both leaves
    /// or both internal are rejected, since their merge could not keep one
    /// more child than keys.
    ///
    /// Selects the demoted key inside the merged node.
    pub fn demote(&mut self, node: NodeId, index: usize) -> MutationResult {
        let Some(target) = self.get(node) else {
            log::warn!("demote: unknown node {node}");
            return MutationResult::failed(node, index);
        };
        let NodeShape::BTree { keys, children } = &target.shape else {
            return MutationResult::failed(node, index);
        };
        if index >= keys.len() || index + 1 >= children.len() {
            log::warn!("demote: {node} has no children around key {index}");
            return MutationResult::failed(node, index);
        }
        let separator = keys[index].clone();
        let node_key_count = keys.len();
        let parent = target.parent;
        let (left_id, right_id) = (children[index], children[index + 1]);

        let (Some(left), Some(right)) = (self.get(left_id), self.get(right_id)) else {
            return MutationResult::failed(node, index);
        };
        let (
            NodeShape::BTree {
                keys: left_keys,
                children: left_children,
            },
            NodeShape::BTree {
                keys: right_keys,
                children: right_children,
            },
        ) = (&left.shape, &right.shape)
        else {
            return MutationResult::failed(node, index);
        };
        if left_children.is_empty() != right_children.is_empty() {
            log::warn!("demote: children of {node} around key {index} are at different depths");
            return MutationResult::failed(node, index);
        }

        let split_point = left_keys.len();
        let mut merged_keys: Keys = left_keys.clone();
        merged_keys.push(separator);
        merged_keys.extend(right_keys.iter().cloned());
        let mut merged_children = left_children.clone();
        merged_children.extend(right_children.iter().copied());

        let merged = self.allocate(NodeShape::BTree {
            keys: merged_keys,
            children: merged_children,
        });

        if node_key_count == 1 {
            match parent {
                None => self.set_root(merged),
                Some(link) => {
                    if let Some(p) = self.get_mut(link.id) {
                        p.shape.replace_child(node, merged);
                    }
                }
            }
        } else if let Some(NodeShape::BTree { keys, children }) =
            self.get_mut(node).map(|n| &mut n.shape)
        {
            keys.remove(index);
            children.splice(index..=index + 1, [merged]);
        }

        self.reindex();
        log::debug!("demote {node}[{index}] -> {merged}[{split_point}]");
        MutationResult::ok(merged, split_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::parse_tree;
    use pretty_assertions::assert_eq;

    fn btree(json: &str) -> BackendTree {
        parse_tree(json, TreeMode::BTree).unwrap()
    }

    fn keys_of(tree: &BackendTree, id: NodeId) -> Vec<String> {
        tree.get(id).unwrap().shape.texts()
    }

    #[test]
    fn insert_and_remove_element_on_leaf() {
        let mut tree = btree(r#"{"value": ["a", "c"], "children": []}"#);
        let root = tree.root();
        let r = tree.insert_element(root, 1);
        assert!(r.success);
        assert_eq!(r.selection, Selection::new(root, 1));
        tree.set_text(root, 1, "b");
        assert_eq!(keys_of(&tree, root), vec!["a", "b", "c"]);

        let r = tree.remove_element(root, 2);
        assert!(r.success);
        assert_eq!(r.selection, Selection::new(root, 1));
        let r = tree.remove_element(root, 0);
        assert_eq!(r.selection, Selection::new(root, 0));
        assert_eq!(keys_of(&tree, root), vec!["b"]);
    }

    #[test]
    fn last_key_cannot_be_removed() {
        let mut tree = btree(r#"{"value": ["a"], "children": []}"#);
        let root = tree.root();
        assert!(!tree.remove_element(root, 0).success);
        assert_eq!(keys_of(&tree, root), vec!["a"]);
    }

    #[test]
    fn refused_removal_keeps_the_selected_index() {
        let json = r#"{"value": ["m", "t"], "children": [
            {"value": ["a"], "children": []},
            {"value": ["p"], "children": []},
            {"value": ["x"], "children": []}
        ]}"#;
        let mut tree = btree(json);
        let root = tree.root();
        // Internal node: keys stay put and so does the selection.
        let r = tree.remove_element(root, 1);
        assert!(!r.success);
        assert_eq!(r.selection, Selection::new(root, 1));
        assert_eq!(keys_of(&tree, root), vec!["m", "t"]);

        let leaf = tree.children(root)[2];
        let r = tree.remove_element(leaf, 0);
        assert!(!r.success);
        assert_eq!(r.selection, Selection::new(leaf, 0));
    }

    #[test]
    fn unknown_node_is_a_no_op() {
        let mut tree = btree(r#"{"value": ["a"], "children": []}"#);
        let ghost = NodeId::from_raw(999);
        assert!(!tree.insert_element(ghost, 0).success);
        assert!(!tree.remove_element(ghost, 0).success);
        assert!(!tree.promote(ghost, 0).success);
        assert!(!tree.demote(ghost, 0).success);
        assert!(!tree.expand(ghost, true).success);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn promote_leaf_with_parent_splices_into_parent() {
        let mut tree = btree(
            r#"{"value": ["m"], "children": [
                {"value": ["a", "b", "c"], "children": []},
                {"value": ["x"], "children": []}
            ]}"#,
        );
        let root = tree.root();
        let leaf = tree.children(root)[0];
        let r = tree.promote(leaf, 1);
        assert!(r.success);
        assert_eq!(r.selection, Selection::new(root, 0));
        assert_eq!(keys_of(&tree, root), vec!["b", "m"]);
        let kids = tree.children(root);
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0], leaf, "left half keeps the original id");
        assert_eq!(keys_of(&tree, kids[0]), vec!["a"]);
        assert_eq!(keys_of(&tree, kids[1]), vec!["c"]);
        assert_eq!(tree.parent(kids[1]).unwrap().index, 1);
        assert_eq!(tree.parent(kids[2]).unwrap().index, 2);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn promote_single_key_root_reuses_children() {
        let mut tree = btree(
            r#"{"value": ["m"], "children": [
                {"value": ["a"], "children": []},
                {"value": ["c"], "children": []}
            ]}"#,
        );
        let old_root = tree.root();
        let old_children = tree.children(old_root);
        let r = tree.promote(old_root, 0);
        assert!(r.success);
        let new_root = tree.root();
        assert_ne!(new_root, old_root);
        assert_eq!(r.selection, Selection::new(new_root, 0));
        assert_eq!(tree.len(), 3);
        assert_eq!(keys_of(&tree, new_root), vec!["m"]);
        assert_eq!(tree.children(new_root), old_children);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn promote_edge_key_of_leaf_is_rejected() {
        let mut tree = btree(r#"{"value": ["a", "b"], "children": []}"#);
        let root = tree.root();
        assert!(!tree.promote(root, 0).success);
        assert!(!tree.promote(root, 1).success);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn demote_two_key_node_keeps_parent() {
        let mut tree = btree(
            r#"{"value": ["p"], "children": [
                {"value": ["a"], "children": []},
                {"value": ["b", "d"], "children": [
                    {"value": ["L"], "children": []},
                    {"value": ["M"], "children": []},
                    {"value": ["R"], "children": []}
                ]}
            ]}"#,
        );
        let parent = tree.root();
        let node = tree.children(parent)[1];
        let r = tree.demote(node, 0);
        assert!(r.success);
        let merged = r.selection.node;
        assert_eq!(r.selection.index, 1);
        assert_eq!(keys_of(&tree, merged), vec!["L", "b", "M"]);
        assert_eq!(keys_of(&tree, node), vec!["d"]);
        assert_eq!(tree.children(node)[0], merged);
        assert_eq!(keys_of(&tree, parent), vec!["p"]);
        assert_eq!(tree.children(parent)[1], node);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn demote_single_key_root_replaces_root() {
        let mut tree = btree(
            r#"{"value": ["m"], "children": [
                {"value": ["a"], "children": []},
                {"value": ["c"], "children": []}
            ]}"#,
        );
        let old_root = tree.root();
        let r = tree.demote(old_root, 0);
        assert!(r.success);
        assert_eq!(tree.root(), r.selection.node);
        assert_eq!(keys_of(&tree, tree.root()), vec!["a", "m", "c"]);
        assert_eq!(tree.len(), 1);
        assert!(!tree.contains(old_root));
    }

    #[test]
    fn demote_mixed_depth_children_is_rejected() {
        let mut tree = btree(
            r#"{"value": ["m"], "children": [
                {"value": ["a"], "children": []},
                {"value": ["x"], "children": [
                    {"value": ["w"], "children": []},
                    {"value": ["y"], "children": []}
                ]}
            ]}"#,
        );
        let root = tree.root();
        assert!(!tree.demote(root, 0).success);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn promote_then_demote_preserves_key_order() {
        let mut tree = btree(r#"{"value": ["a", "b", "c", "d", "e"], "children": []}"#);
        let before = tree.flattened_keys();
        let r = tree.promote(tree.root(), 2);
        assert!(r.success);
        let r = tree.demote(r.selection.node, r.selection.index);
        assert!(r.success);
        assert_eq!(tree.flattened_keys(), before);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn add_and_remove_binary_children() {
        let mut tree = BackendTree::new(TreeMode::Binary);
        let root = tree.root();
        let left = tree.add_child(root, ChildSlot::Side(Side::Left), false);
        assert!(left.success);
        assert!(!tree.add_child(root, ChildSlot::Side(Side::Left), false).success);
        let right = tree.add_child(root, ChildSlot::Side(Side::Right), true);
        assert!(tree.get(right.selection.node).unwrap().flags.subtree);
        assert_eq!(tree.len(), 3);

        let r = tree.remove_child(left.selection.node);
        assert!(r.success);
        assert_eq!(r.selection, Selection::new(root, 0));
        assert_eq!(tree.len(), 2);
        assert!(!tree.remove_child(root).success);
    }

    #[test]
    fn multiway_subtree_child_gets_decoration() {
        let mut tree = BackendTree::new(TreeMode::Multiway);
        let root = tree.root();
        let sub = tree.add_child(root, ChildSlot::Append, true).selection.node;
        let node = tree.get(sub).unwrap();
        assert!(node.flags.subtree);
        let deco = tree.children(sub);
        assert_eq!(deco.len(), 1);
        assert!(tree.get(deco[0]).unwrap().flags.subsubtree);

        // A second child is never a placeholder.
        let plain = tree.add_child(root, ChildSlot::Append, true).selection.node;
        assert!(!tree.get(plain).unwrap().flags.subtree);
        assert_eq!(tree.children(root), vec![sub, plain]);
    }

    #[test]
    fn btree_rejects_child_edits() {
        let mut tree = btree(r#"{"value": ["a"], "children": []}"#);
        let root = tree.root();
        assert!(!tree.add_child(root, ChildSlot::Append, false).success);
    }
}
