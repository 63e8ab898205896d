//! Integration tests: recurrence worksheets, value-only editing and side
//! labels.
//!
//! Each mode is driven through pointer and key input, then checked against
//! the backend tree, the render snapshot and the submission payload.

use pretty_assertions::assert_eq;
use tb_core::BuilderConfig;
use tb_core::model::{ChildSlot, EditMode, Side, TreeMode};
use tb_core::project::AffordanceKind;
use tb_core::side::SideField;
use tb_editor::commands::Command;
use tb_editor::input::Modifiers;
use tb_editor::session::TreeSession;

const RECURRENCE: &str = include_str!("fixtures/recurrence_starter.json");
const SIDE_VALUES: &str = include_str!("fixtures/side_label_values.json");

fn worksheet(enable_height: bool, enable_final_level: bool) -> TreeSession {
    let cfg = BuilderConfig {
        enable_height,
        enable_final_level,
        leaf_value: "1".into(),
        start_side_tree: vec!["n".into()],
        ..BuilderConfig::new(TreeMode::Multiway, EditMode::Recurrence)
    };
    TreeSession::new(cfg, Some(RECURRENCE), None).unwrap()
}

/// Press the centre of a worksheet cell.
fn click_cell(s: &mut TreeSession, field: SideField) -> bool {
    let b = s
        .render()
        .side
        .cell(field)
        .map(|c| c.bounds)
        .unwrap_or_else(|| panic!("no {field:?} cell"));
    s.pointer_down(b.x + b.width / 2.0, b.y + b.height / 2.0, Modifiers::NONE)
}

fn type_text(s: &mut TreeSession, text: &str) {
    for c in text.chars() {
        s.key_down(&c.to_string(), Modifiers::NONE);
    }
}

// ─── Recurrence ──────────────────────────────────────────────────────────

#[test]
fn worksheet_cells_take_typed_text() {
    let mut s = worksheet(true, false);
    let fields: Vec<SideField> = s.render().side.cells.iter().map(|c| c.field).collect();
    assert_eq!(
        fields,
        vec![SideField::Level(0), SideField::Level(1), SideField::Level(2), SideField::Height]
    );
    assert_eq!(s.render().side.cell(SideField::Level(0)).unwrap().text, "n");

    assert!(click_cell(&mut s, SideField::Level(1)));
    assert_eq!(s.side_focus(), Some(SideField::Level(1)));
    assert_eq!(s.selection(), None);
    type_text(&mut s, "2n");
    assert!(s.key_down("Backspace", Modifiers::NONE));
    type_text(&mut s, "n");
    assert_eq!(s.render().side.cell(SideField::Level(1)).unwrap().text, "2n");

    assert!(click_cell(&mut s, SideField::Height));
    type_text(&mut s, "log n");
    assert_eq!(s.worksheet().height, "log n");

    // Clicking a node moves the caret back into the tree.
    let root = s.render().node(s.tree().root()).map(|n| (n.x, n.y)).unwrap();
    s.pointer_down(root.0, root.1, Modifiers::NONE);
    assert_eq!(s.side_focus(), None);
    assert!(s.selection().is_some());

    let payload = serde_json::to_value(s.submission()).unwrap();
    assert_eq!(payload["currentMode"], "recurrence");
    assert_eq!(payload["treeMode"], "multiway");
    assert_eq!(payload["sideTree"], serde_json::json!(["n", "2n", ""]));
    assert_eq!(payload["height-val"], "log n");
    assert_eq!(payload["leaf-count"], "");
}

#[test]
fn growing_the_tree_adds_a_level_cell() {
    let mut s = worksheet(false, false);
    let root = s.tree().root();
    let leaf = s.tree().children(s.tree().children(root)[0])[0];
    let b = s
        .render()
        .affordances_for(leaf)
        .find(|a| matches!(a.kind, AffordanceKind::Add { .. }))
        .map(|a| a.bounds)
        .unwrap();
    s.pointer_down(b.x + b.width / 2.0, b.y + b.height / 2.0, Modifiers::NONE);
    assert_eq!(s.layout().row_count, 4);
    assert!(s.render().side.cell(SideField::Level(3)).is_some());

    let submission = s.submission();
    assert_eq!(submission.side_tree, Some(vec!["n".into(), "".into(), "".into(), "".into()]));
}

#[test]
fn worksheet_cells_stay_right_of_the_tree() {
    let s = worksheet(true, true);
    let divider = s.render().side.divider.unwrap();
    assert!(s.render().nodes.iter().all(|n| n.x + n.bounds.width / 2.0 < divider));
    assert!(s.render().side.cell(SideField::LeafCount).is_some());
    assert_eq!(s.render().side.leaves.len(), 3);
}

#[test]
fn final_level_leads_the_submitted_side_tree() {
    let mut s = worksheet(false, true);
    click_cell(&mut s, SideField::FinalLevel);
    type_text(&mut s, "c");
    click_cell(&mut s, SideField::LeafCount);
    type_text(&mut s, "4");

    let submission = s.submission();
    assert_eq!(
        submission.side_tree,
        Some(vec!["c".into(), "n".into(), "".into(), "".into()])
    );
    assert_eq!(submission.leaf_count.as_deref(), Some("4"));
}

#[test]
fn stored_answer_restores_tree_and_worksheet() {
    let mut s = worksheet(true, true);
    assert!(s.restore(
        r#"{"WorkPerCall": {"value": "T(n)", "children": []},
            "WorkPerLevel": ["1", "n"], "Height": "1", "LeafCount": "1"}"#
    ));
    assert_eq!(s.tree().len(), 1);
    assert_eq!(s.worksheet().final_level, "1");
    assert_eq!(s.worksheet().levels, vec!["n".to_string()]);
    assert_eq!(s.worksheet().height, "1");
    assert_eq!(s.render().side.cell(SideField::Level(0)).unwrap().text, "n");

    // A bare tree literal is still accepted and keeps the worksheet.
    assert!(s.restore(r#"{"value": "m", "children": []}"#));
    assert_eq!(s.worksheet().height, "1");
    assert!(!s.restore(r#"{"WorkPerCall": "#));

    s.dispatch(Command::Reset);
    assert_eq!(s.tree().len(), 5);
    assert_eq!(s.worksheet().levels, vec!["n".to_string()]);
    assert_eq!(s.worksheet().height, "");
    assert_eq!(s.worksheet().leaf_count, "");
}

#[test]
fn recurrence_forces_a_multiway_tree() {
    let s = TreeSession::from_json(r#"{"treeMode": "binary", "editMode": "recurrence"}"#, None, None).unwrap();
    assert_eq!(s.config().tree_mode, TreeMode::Multiway);
    assert_eq!(s.tree().mode(), TreeMode::Multiway);
    assert!(s.config().fixed_height);
}

#[test]
fn plain_modes_submit_no_worksheet() {
    let mut s = TreeSession::new(BuilderConfig::default(), None, None).unwrap();
    let payload = serde_json::to_value(s.submission()).unwrap();
    assert!(payload.get("sideTree").is_none());
    assert!(payload.get("height-val").is_none());
    assert!(s.render().side.is_empty());
}

// ─── Value mode ──────────────────────────────────────────────────────────

#[test]
fn value_mode_edits_text_but_not_structure() {
    let cfg = BuilderConfig::new(TreeMode::Binary, EditMode::Value);
    let mut s = TreeSession::new(cfg, Some(SIDE_VALUES), None).unwrap();
    assert!(s.render().affordances.is_empty());
    let root = s.tree().root();

    s.dispatch(Command::Select { node: root, index: 0 });
    type_text(&mut s, "5");
    s.dispatch(Command::AddChild {
        parent: s.tree().children(root)[0],
        slot: ChildSlot::Side(Side::Left),
        as_subtree: false,
    });
    s.dispatch(Command::RemoveChild {
        node: s.tree().children(root)[1],
    });
    s.dispatch(Command::ToggleEditMode);

    assert_eq!(s.tree().len(), 3);
    assert_eq!(s.tree().get(root).unwrap().shape.texts(), vec!["105"]);
    assert_eq!(s.config().edit_mode, EditMode::Value);
}

// ─── Side labels ─────────────────────────────────────────────────────────

fn labelled(saved: Option<&str>) -> TreeSession {
    let cfg = BuilderConfig {
        label_tree: Some(serde_json::json!({
            "value": "A",
            "left": {"value": "B", "left": null, "right": null},
            "right": null
        })),
        ..BuilderConfig::new(TreeMode::Binary, EditMode::SideLabel)
    };
    TreeSession::new(cfg, None, saved).unwrap()
}

#[test]
fn labels_keep_the_shape_and_values_fill_by_position() {
    let s = labelled(Some(SIDE_VALUES));
    let root = s.tree().root();
    let left = s.tree().children(root)[0];
    assert_eq!(s.tree().len(), 2);
    assert_eq!(s.label(root), Some("A"));
    assert_eq!(s.label(left), Some("B"));
    assert_eq!(s.tree().get(root).unwrap().shape.texts(), vec!["10"]);
    assert_eq!(s.tree().get(left).unwrap().shape.texts(), vec!["20"]);

    let node = s.render().node(root).unwrap();
    assert_eq!(node.label.as_deref(), Some("A"));
    assert!(node.value_box().is_some());
    assert!(s.render().affordances.is_empty());
}

#[test]
fn clicking_the_value_box_edits_the_value() {
    let mut s = labelled(None);
    let root = s.tree().root();
    assert_eq!(s.tree().get(root).unwrap().shape.texts(), vec![""]);

    let b = s.render().node(root).and_then(|n| n.value_box()).unwrap();
    s.pointer_down(b.x + b.width / 2.0, b.y + b.height / 2.0, Modifiers::NONE);
    assert_eq!(s.selection().map(|sel| sel.node), Some(root));
    type_text(&mut s, "7");

    let payload = serde_json::to_value(s.submission()).unwrap();
    assert_eq!(payload["backendRoot"]["value"], "7");
    assert_eq!(payload["backendRoot"]["left"]["value"], "");
    assert_eq!(s.label(root), Some("A"));
}

#[test]
fn malformed_values_keep_the_labelled_tree() {
    let mut s = labelled(Some(SIDE_VALUES));
    assert!(!s.restore("{\"value\": "));
    assert_eq!(s.tree().get(s.tree().root()).unwrap().shape.texts(), vec!["10"]);

    s.dispatch(Command::Reset);
    let root = s.tree().root();
    assert_eq!(s.tree().get(root).unwrap().shape.texts(), vec![""]);
    assert_eq!(s.label(root), Some("A"));
}
