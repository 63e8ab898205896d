//! Tree literal import and snapshot export.
//!
//! Import accepts a nested literal with a `value` (string or string array)
//! and either `children` or `left`/`right`. Any `id`, `parentId` or
//! `parentIndex` fields in the input are ignored; ids are always reassigned
//! from the session's registry. Input written in the legacy textual
//! encoding (single quotes, `None`/`True`/`False`) is normalized with a
//! token-aware pass before parsing.
//!
//! Export produces the same literal shape with `id`, `parentId` and
//! `parentIndex` injected on every node.

use crate::id::{IdRegistry, NodeId};
use crate::model::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use winnow::combinator::alt;
use winnow::prelude::*;
use winnow::token::{any, take_till, take_while};

// ─── Import ──────────────────────────────────────────────────────────────

/// A node's `value` as written: one scalar or a list of scalars.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl Default for LiteralValue {
    fn default() -> Self {
        LiteralValue::One(serde_json::Value::String(String::new()))
    }
}

impl LiteralValue {
    /// Every element as text.
    pub fn texts(&self) -> Vec<String> {
        match self {
            LiteralValue::Many(items) => items.iter().map(scalar_text).collect(),
            LiteralValue::One(v) => vec![scalar_text(v)],
        }
    }

    /// The value as a single string (list elements are joined).
    pub fn text(&self) -> String {
        match self {
            LiteralValue::Many(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(", "),
            LiteralValue::One(v) => scalar_text(v),
        }
    }
}

fn scalar_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// An incoming tree literal. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeLiteral {
    #[serde(default)]
    pub value: LiteralValue,
    #[serde(default)]
    pub children: Option<Vec<TreeLiteral>>,
    #[serde(default)]
    pub left: Option<Box<TreeLiteral>>,
    #[serde(default)]
    pub right: Option<Box<TreeLiteral>>,
    #[serde(flatten)]
    pub flags: NodeFlags,
}

/// Parse a tree literal, falling back to the legacy encoding if strict JSON fails.
pub fn parse_literal(input: &str) -> Result<TreeLiteral, String> {
    match serde_json::from_str::<TreeLiteral>(input) {
        Ok(literal) => Ok(literal),
        Err(strict) => {
            let normalized = normalize_legacy(input)?;
            serde_json::from_str(&normalized)
                .map_err(|e| format!("Invalid tree literal: {e} (strict parse: {strict})"))
        }
    }
}

/// Parse a tree literal into a fresh backend tree.
#[must_use = "parsing result should be used"]
pub fn parse_tree(input: &str, mode: TreeMode) -> Result<BackendTree, String> {
    parse_tree_with_registry(input, mode, IdRegistry::new())
}

/// Parse a tree literal, drawing ids from an existing registry.
pub fn parse_tree_with_registry(
    input: &str,
    mode: TreeMode,
    ids: IdRegistry,
) -> Result<BackendTree, String> {
    let literal = parse_literal(input)?;
    tree_from_literal(&literal, mode, ids)
}

/// Build a backend tree from a parsed literal. Ids are assigned in pre-order.
pub fn tree_from_literal(
    literal: &TreeLiteral,
    mode: TreeMode,
    mut ids: IdRegistry,
) -> Result<BackendTree, String> {
    let mut nodes = HashMap::new();
    let root = build_node(literal, mode, &mut ids, &mut nodes)?;
    let tree = BackendTree::from_parts(mode, root, nodes, ids);
    tree.check_invariants()?;
    Ok(tree)
}

fn build_node(
    literal: &TreeLiteral,
    mode: TreeMode,
    ids: &mut IdRegistry,
    nodes: &mut HashMap<NodeId, BackendNode>,
) -> Result<NodeId, String> {
    let id = ids.allocate();

    let shape = match mode {
        TreeMode::BTree => {
            let mut keys: Keys = literal.value.texts().into_iter().collect();
            if keys.is_empty() {
                keys.push(String::new());
            }
            let children = build_list(&literal.children, mode, ids, nodes)?;
            if !children.is_empty() && children.len() != keys.len() + 1 {
                return Err(format!(
                    "B-tree node with {} key(s) has {} children",
                    keys.len(),
                    children.len()
                ));
            }
            NodeShape::BTree { keys, children }
        }
        TreeMode::Multiway => NodeShape::Multiway {
            value: literal.value.text(),
            children: build_list(&literal.children, mode, ids, nodes)?,
        },
        TreeMode::Binary => {
            let left = literal
                .left
                .as_deref()
                .map(|l| build_node(l, mode, ids, nodes))
                .transpose()?;
            let right = literal
                .right
                .as_deref()
                .map(|r| build_node(r, mode, ids, nodes))
                .transpose()?;
            NodeShape::Binary {
                value: literal.value.text(),
                left,
                right,
            }
        }
    };

    let mut node = BackendNode::new(id, shape);
    node.flags = literal.flags;
    nodes.insert(id, node);
    Ok(id)
}

fn build_list(
    list: &Option<Vec<TreeLiteral>>,
    mode: TreeMode,
    ids: &mut IdRegistry,
    nodes: &mut HashMap<NodeId, BackendNode>,
) -> Result<Vec<NodeId>, String> {
    list.iter()
        .flatten()
        .map(|child| build_node(child, mode, ids, nodes))
        .collect()
}

// ─── Legacy normalization ────────────────────────────────────────────────

/// Rewrite the legacy encoding into JSON: single-quoted strings become
/// double-quoted, bare `None`/`True`/`False` become `null`/`true`/`false`.
/// Text inside strings is never rewritten.
pub fn normalize_legacy(input: &str) -> Result<String, String> {
    let mut rest = input;
    let mut out = String::with_capacity(input.len());
    while !rest.is_empty() {
        let piece = legacy_token
            .parse_next(&mut rest)
            .map_err(|e| format!("Legacy literal error: {e}"))?;
        out.push_str(&piece);
    }
    Ok(out)
}

fn legacy_token(input: &mut &str) -> ModalResult<String> {
    alt((single_quoted, double_quoted, bare_word, any.map(String::from))).parse_next(input)
}

fn single_quoted(input: &mut &str) -> ModalResult<String> {
    let _ = '\''.parse_next(input)?;
    let mut out = String::from("\"");
    loop {
        let chunk: &str = take_till(0.., ['\'', '\\', '"']).parse_next(input)?;
        out.push_str(chunk);
        match any.parse_next(input)? {
            '\'' => break,
            '"' => out.push_str("\\\""),
            '\\' => {
                let escaped: char = any.parse_next(input)?;
                if escaped == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(escaped);
                }
            }
            other => out.push(other),
        }
    }
    out.push('"');
    Ok(out)
}

fn double_quoted(input: &mut &str) -> ModalResult<String> {
    let start = *input;
    let _ = '"'.parse_next(input)?;
    loop {
        let _: &str = take_till(0.., ['"', '\\']).parse_next(input)?;
        if any.parse_next(input)? == '"' {
            break;
        }
        let _: char = any.parse_next(input)?;
    }
    Ok(start[..start.len() - input.len()].to_string())
}

fn bare_word(input: &mut &str) -> ModalResult<String> {
    let word: &str =
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    let mapped = match word {
        "None" => "null",
        "True" => "true",
        "False" => "false",
        other => other,
    };
    Ok(mapped.to_string())
}

// ─── Export ──────────────────────────────────────────────────────────────

/// Exported `value`: a key list for B-tree nodes, a string otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Keys(Vec<String>),
    Text(String),
}

/// One node of an exported backend snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub value: SnapshotValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<NodeSnapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<Option<Box<NodeSnapshot>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<Option<Box<NodeSnapshot>>>,
    pub id: NodeId,
    pub parent_id: i64,
    pub parent_index: usize,
    #[serde(flatten)]
    pub flags: NodeFlags,
}

/// Snapshot of the whole tree.
pub fn snapshot(tree: &BackendTree) -> Option<NodeSnapshot> {
    snapshot_node(tree, tree.root())
}

/// Snapshot of the subtree rooted at `id`.
pub fn snapshot_node(tree: &BackendTree, id: NodeId) -> Option<NodeSnapshot> {
    let node = tree.get(id)?;
    let boxed = |child: &Option<NodeId>| {
        Some(child.and_then(|c| snapshot_node(tree, c)).map(Box::new))
    };
    let (value, children, left, right) = match &node.shape {
        NodeShape::BTree { keys, children } => (
            SnapshotValue::Keys(keys.to_vec()),
            Some(children.iter().filter_map(|c| snapshot_node(tree, *c)).collect()),
            None,
            None,
        ),
        NodeShape::Multiway { value, children } => (
            SnapshotValue::Text(value.clone()),
            Some(children.iter().filter_map(|c| snapshot_node(tree, *c)).collect()),
            None,
            None,
        ),
        NodeShape::Binary { value, left, right } => (
            SnapshotValue::Text(value.clone()),
            None,
            boxed(left),
            boxed(right),
        ),
    };
    Some(NodeSnapshot {
        value,
        children,
        left,
        right,
        id: node.id,
        parent_id: node.parent_id_raw(),
        parent_index: node.parent_index(),
        flags: node.flags,
    })
}

/// Serialize the whole tree as JSON.
pub fn to_json(tree: &BackendTree) -> Result<String, String> {
    serde_json::to_string(&snapshot(tree)).map_err(|e| format!("Serialization error: {e}"))
}
