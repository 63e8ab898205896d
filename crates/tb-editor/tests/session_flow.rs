//! Integration tests: builder session driven by pointer and keyboard input.
//!
//! Exercises the path `InputEvent → Tool / ShortcutMap → Command → dispatch`
//! against a real backend tree, then checks the tree, the selection and the
//! submission payload.

use pretty_assertions::assert_eq;
use tb_core::id::NodeId;
use tb_core::model::{EditMode, TreeMode};
use tb_core::mutate::Selection;
use tb_core::project::AffordanceKind;
use tb_core::{BuilderConfig, Side};
use tb_editor::commands::Command;
use tb_editor::input::{InputEvent, Modifiers};
use tb_editor::session::TreeSession;

const TWO_LEVEL: &str = include_str!("fixtures/two_level_btree.json");

fn btree(starter: &str) -> TreeSession {
    TreeSession::new(BuilderConfig::default(), Some(starter), None).unwrap()
}

/// Press the centre of the first affordance matching `node`, `index`, `kind`.
fn press_button(s: &mut TreeSession, node: NodeId, index: usize, kind: AffordanceKind, modifiers: Modifiers) -> bool {
    let b = s
        .render()
        .affordances_for(node)
        .find(|a| a.index == index && a.kind == kind)
        .map(|a| a.bounds)
        .unwrap_or_else(|| panic!("no {kind:?} button on {node}[{index}]"));
    s.pointer_down(b.x + b.width / 2.0, b.y + b.height / 2.0, modifiers)
}

fn press_key(s: &mut TreeSession, key: &str) -> bool {
    s.key_down(key, Modifiers::NONE)
}

fn press_ctrl(s: &mut TreeSession, key: &str) -> bool {
    s.key_down(key, Modifiers::CTRL)
}

// ─── Pointer ─────────────────────────────────────────────────────────────

#[test]
fn add_button_inserts_key_and_selects_it() {
    let mut s = btree(r#"{"value": ["a", "b"], "children": []}"#);
    let root = s.tree().root();
    assert!(press_button(&mut s, root, 1, AffordanceKind::Add { side: Side::Right }, Modifiers::NONE));
    assert_eq!(s.tree().flattened_keys(), vec!["a", "b", ""]);
    assert_eq!(s.selection(), Some(Selection::new(root, 2)));

    assert!(press_button(&mut s, root, 0, AffordanceKind::Add { side: Side::Left }, Modifiers::NONE));
    assert_eq!(s.tree().flattened_keys(), vec!["", "a", "b", ""]);
    assert_eq!(s.selection(), Some(Selection::new(root, 0)));
}

#[test]
fn delete_button_removes_key() {
    let mut s = btree(r#"{"value": ["a", "b", "c"], "children": []}"#);
    let root = s.tree().root();
    press_button(&mut s, root, 2, AffordanceKind::Delete, Modifiers::NONE);
    assert_eq!(s.tree().flattened_keys(), vec!["a", "b"]);
    assert_eq!(s.selection(), Some(Selection::new(root, 1)));
}

#[test]
fn clicking_a_cell_selects_its_key() {
    let mut s = btree(r#"{"value": ["a", "b", "c"], "children": []}"#);
    let root = s.tree().root();
    let node = s.render().node(root).unwrap().clone();
    let kw = s.geometry().key_width;
    s.pointer_down(node.bounds.x + kw * 1.5, node.bounds.y + node.bounds.height / 2.0, Modifiers::NONE);
    assert_eq!(s.selection(), Some(Selection::new(root, 1)));

    // Empty canvas deselects.
    s.pointer_down(2.0, s.geometry().canvas_height - 2.0, Modifiers::NONE);
    assert_eq!(s.selection(), None);
}

#[test]
fn ctrl_add_creates_subtree_placeholder_that_expands() {
    let cfg = BuilderConfig {
        enable_subtrees: true,
        ..BuilderConfig::new(TreeMode::Multiway, EditMode::Builder)
    };
    let mut s = TreeSession::new(cfg, Some(r#"{"value": "r", "children": []}"#), None).unwrap();
    let root = s.tree().root();
    press_button(&mut s, root, 0, AffordanceKind::Add { side: Side::Right }, Modifiers::CTRL);

    let child = s.tree().children(root)[0];
    let flags = s.tree().get(child).unwrap().flags;
    assert!(flags.subtree);
    let decoration = s.tree().children(child)[0];
    assert!(s.tree().get(decoration).unwrap().flags.subsubtree);

    press_button(&mut s, child, 0, AffordanceKind::Expand, Modifiers::NONE);
    assert!(s.tree().get(child).unwrap().flags.expanded);
    assert!(s.render().affordances_for(child).any(|a| a.kind == AffordanceKind::Collapse));
}

#[test]
fn plain_add_ignores_ctrl_without_subtree_support() {
    let cfg = BuilderConfig::new(TreeMode::Multiway, EditMode::Builder);
    let mut s = TreeSession::new(cfg, Some(r#"{"value": "r", "children": []}"#), None).unwrap();
    let root = s.tree().root();
    press_button(&mut s, root, 0, AffordanceKind::Add { side: Side::Right }, Modifiers::CTRL);
    let child = s.tree().children(root)[0];
    assert!(!s.tree().get(child).unwrap().flags.subtree);
    assert!(s.tree().children(child).is_empty());
}

#[test]
fn hover_follows_the_pointer_and_clears_when_the_node_goes() {
    let mut s = btree(TWO_LEVEL);
    let root = s.tree().root();
    let leaf = s.tree().children(root)[1];
    let n = s.render().node(leaf).unwrap().clone();
    let (x, y) = (n.bounds.x + 4.0, n.bounds.y + n.bounds.height / 2.0);

    assert!(s.pointer_move(x, y));
    assert_eq!(s.hovered(), Some(leaf));
    assert!(!s.pointer_move(x + 1.0, y));

    // A button belongs to its node.
    let delete = s
        .render()
        .affordances_for(leaf)
        .find(|a| a.kind == AffordanceKind::Delete)
        .map(|a| a.bounds);
    if let Some(b) = delete {
        s.pointer_move(b.x + b.width / 2.0, b.y + b.height / 2.0);
        assert_eq!(s.hovered(), Some(leaf));
    }

    let frame: serde_json::Value = serde_json::from_str(&s.render_json().unwrap()).unwrap();
    assert_eq!(frame["hovered"], leaf.raw());

    assert!(s.handle(InputEvent::PointerMove {
        x: 2.0,
        y: s.geometry().canvas_height - 2.0,
    }));
    assert_eq!(s.hovered(), None);
}

#[test]
fn hovered_node_is_cleared_when_removed() {
    let cfg = BuilderConfig::new(TreeMode::Multiway, EditMode::Builder);
    let mut s = TreeSession::new(
        cfg,
        Some(r#"{"value": "r", "children": [{"value": "c", "children": []}]}"#),
        None,
    )
    .unwrap();
    let child = s.tree().children(s.tree().root())[0];
    let n = s.render().node(child).unwrap().clone();
    s.pointer_move(n.x, n.y);
    assert_eq!(s.hovered(), Some(child));

    s.dispatch(Command::RemoveChild { node: child });
    assert!(!s.tree().contains(child));
    assert_eq!(s.hovered(), None);
}

// ─── Keyboard ────────────────────────────────────────────────────────────

#[test]
fn typing_edits_the_selected_key() {
    let mut s = btree(r#"{"value": ["a", "b"], "children": []}"#);
    let root = s.tree().root();
    s.dispatch(Command::Select { node: root, index: 1 });
    assert!(press_key(&mut s, "c"));
    assert!(press_key(&mut s, "Backspace"));
    assert!(press_key(&mut s, "Backspace"));
    assert!(press_key(&mut s, "9"));
    assert_eq!(s.render().node(root).unwrap().text, vec!["a", "9"]);

    let json = s.snapshot_json().unwrap();
    assert!(json.contains(r#""value":["a","9"]"#), "{json}");
}

#[test]
fn arrows_walk_the_tree() {
    let mut s = btree(TWO_LEVEL);
    let root = s.tree().root();
    let kids = s.tree().children(root);
    s.dispatch(Command::Select { node: root, index: 0 });

    s.handle(InputEvent::key_down("ArrowDown", Modifiers::NONE));
    press_key(&mut s, "ArrowLeft");
    assert_eq!(s.selection(), Some(Selection::new(kids[0], 1)));
    s.handle(InputEvent::KeyUp {
        key: "ArrowDown".into(),
    });

    press_key(&mut s, "ArrowLeft");
    assert_eq!(s.selection(), Some(Selection::new(kids[0], 0)));
    press_key(&mut s, "ArrowLeft");
    assert_eq!(s.selection(), Some(Selection::new(kids[0], 1)));
    press_key(&mut s, "ArrowUp");
    assert_eq!(s.selection(), Some(Selection::new(root, 0)));

    press_key(&mut s, "ArrowDown");
    press_key(&mut s, "ArrowRight");
    assert_eq!(s.selection(), Some(Selection::new(kids[1], 0)));
}

#[test]
fn ctrl_arrows_promote_and_demote() {
    let mut s = btree(r#"{"value": ["a", "b", "c"], "children": []}"#);
    let root = s.tree().root();
    s.dispatch(Command::Select { node: root, index: 1 });

    assert!(press_ctrl(&mut s, "ArrowUp"));
    let new_root = s.tree().root();
    assert_ne!(new_root, root);
    assert_eq!(s.selection(), Some(Selection::new(new_root, 0)));
    assert_eq!(s.tree().len(), 3);

    assert!(press_ctrl(&mut s, "ArrowDown"));
    assert_eq!(s.tree().len(), 1);
    assert_eq!(s.tree().flattened_keys(), vec!["a", "b", "c"]);
    assert_eq!(s.selection(), Some(Selection::new(s.tree().root(), 1)));
    s.tree().check_invariants().unwrap();
}

#[test]
fn ctrl_arrows_insert_beside_selection() {
    let mut s = btree(r#"{"value": ["a"], "children": []}"#);
    let root = s.tree().root();
    s.dispatch(Command::Select { node: root, index: 0 });
    press_ctrl(&mut s, "ArrowRight");
    press_key(&mut s, "z");
    press_ctrl(&mut s, "ArrowLeft");
    assert_eq!(s.tree().flattened_keys(), vec!["a", "", "z"]);
    assert_eq!(s.selection(), Some(Selection::new(root, 1)));

    press_ctrl(&mut s, "Backspace");
    assert_eq!(s.tree().flattened_keys(), vec!["a", "z"]);
}

#[test]
fn structural_shortcuts_respect_capabilities() {
    let mut s = btree(TWO_LEVEL);
    let root = s.tree().root();
    s.dispatch(Command::Select { node: root, index: 0 });
    // The root is not a leaf: no insert, no delete, nothing to promote.
    assert!(!press_ctrl(&mut s, "ArrowRight"));
    assert!(!press_ctrl(&mut s, "Backspace"));
    assert!(!press_ctrl(&mut s, "ArrowUp"));
    assert_eq!(s.tree().flattened_keys(), vec!["d", "h", "m", "r", "w"]);
}

#[test]
fn caret_blinks_only_with_a_selection() {
    let mut s = btree(r#"{"value": ["a"], "children": []}"#);
    assert!(!s.tick());
    s.dispatch(Command::Select {
        node: s.tree().root(),
        index: 0,
    });
    assert!(s.caret_visible());
    assert!(s.tick());
    assert!(!s.caret_visible());
    press_key(&mut s, "x");
    assert!(s.caret_visible());
    assert!(s.svg(&Default::default()).contains("class=\"caret\""));
}

// ─── Whole-tree commands ─────────────────────────────────────────────────

#[test]
fn reset_restores_starter_with_new_ids() {
    let mut s = btree(TWO_LEVEL);
    let before: Vec<NodeId> = s.tree().preorder();
    let issued = s.tree().registry().issued();
    let leaf = s.tree().children(s.tree().root())[0];
    s.dispatch(Command::InsertElement { node: leaf, index: 0 });

    s.dispatch(Command::Reset);
    assert_eq!(s.tree().flattened_keys(), vec!["d", "h", "m", "r", "w"]);
    assert_eq!(s.selection(), None);
    for id in s.tree().preorder() {
        assert!(!before.contains(&id));
        assert!(id.raw() >= issued);
    }
}

#[test]
fn malformed_restore_keeps_state() {
    let mut s = btree(TWO_LEVEL);
    let root = s.tree().root();
    assert!(!s.restore("{\"value\": [\"x\""));
    assert_eq!(s.tree().root(), root);
    assert_eq!(s.tree().flattened_keys(), vec!["d", "h", "m", "r", "w"]);

    assert!(s.restore("{'value': ['q'], 'children': []}"));
    assert_eq!(s.tree().flattened_keys(), vec!["q"]);
}

#[test]
fn view_only_ignores_all_edits() {
    let cfg = BuilderConfig::new(TreeMode::BTree, EditMode::ViewOnly);
    let mut s = TreeSession::new(cfg, Some(TWO_LEVEL), None).unwrap();
    assert!(s.render().affordances.is_empty());
    let root = s.tree().root();
    s.dispatch(Command::Select { node: root, index: 0 });
    assert!(!press_ctrl(&mut s, "ArrowDown"));
    press_key(&mut s, "x");
    assert_eq!(s.tree().flattened_keys(), vec!["d", "h", "m", "r", "w"]);
}

#[test]
fn submission_payload_shape() {
    let mut s = btree(r#"{"value": ["a", "b"], "children": []}"#);
    let root = s.tree().root();
    s.dispatch(Command::Select { node: root, index: 0 });
    press_key(&mut s, "z");

    let payload = serde_json::to_value(s.submission()).unwrap();
    assert_eq!(payload["treeMode"], "btree");
    assert_eq!(payload["currentMode"], "builder");
    assert_eq!(payload["format-errors"], "");
    assert_eq!(payload["backendRoot"]["value"], serde_json::json!(["az", "b"]));
    assert_eq!(payload["backendRoot"]["parentId"], -1);

    let frame: serde_json::Value = serde_json::from_str(&s.render_json().unwrap()).unwrap();
    assert_eq!(frame["caretVisible"], true);
    assert_eq!(frame["selection"]["index"], 0);
    assert!(frame["pointerError"].is_null());
}
