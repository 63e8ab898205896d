//! Annotations drawn beside the tree.
//!
//! A recurrence worksheet pairs the work-per-call tree with a column of
//! work-per-level cells, an optional height cell and an optional final
//! level carrying the leaf count. In side-label mode every node shows a
//! fixed label while the student fills in a value next to it.

use crate::config::{BuilderConfig, FINAL_LEVEL_LEAVES, Geometry, LARGE_RADIUS};
use crate::id::NodeId;
use crate::layout::TreeLayout;
use crate::model::BackendTree;
use crate::project::{Bounds, Point, RenderTree};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One editable worksheet cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "field", content = "level", rename_all = "kebab-case")]
pub enum SideField {
    /// Work done on tree level `n`, the root level being 0.
    Level(usize),
    /// Work done on the final (leaf) level.
    FinalLevel,
    Height,
    LeafCount,
}

/// Text typed into the worksheet cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worksheet {
    /// Work per level, top level first. May hold more entries than the
    /// tree currently has levels.
    pub levels: Vec<String>,
    pub final_level: String,
    pub height: String,
    pub leaf_count: String,
}

impl Worksheet {
    pub fn new(start: &[String]) -> Self {
        Self {
            levels: start.to_vec(),
            ..Self::default()
        }
    }

    /// Rebuild from a submitted answer. With a final level, its value leads
    /// the submitted list.
    pub fn from_answer(answer: &RecurrenceAnswer, config: &BuilderConfig) -> Self {
        let mut levels = answer.work_per_level.clone();
        let final_level = if config.enable_final_level && !levels.is_empty() {
            levels.remove(0)
        } else {
            String::new()
        };
        Self {
            levels,
            final_level,
            height: answer.height.clone(),
            leaf_count: answer.leaf_count.clone(),
        }
    }

    pub fn text(&self, field: SideField) -> &str {
        match field {
            SideField::Level(i) => self.levels.get(i).map_or("", String::as_str),
            SideField::FinalLevel => &self.final_level,
            SideField::Height => &self.height,
            SideField::LeafCount => &self.leaf_count,
        }
    }

    pub fn text_mut(&mut self, field: SideField) -> &mut String {
        match field {
            SideField::Level(i) => {
                if self.levels.len() <= i {
                    self.levels.resize(i + 1, String::new());
                }
                &mut self.levels[i]
            }
            SideField::FinalLevel => &mut self.final_level,
            SideField::Height => &mut self.height,
            SideField::LeafCount => &mut self.leaf_count,
        }
    }

    /// Work-per-level values for a tree of `depth` levels, as submitted.
    pub fn side_tree(&self, depth: usize, config: &BuilderConfig) -> Vec<String> {
        let mut out = Vec::with_capacity(depth + 1);
        if config.enable_final_level {
            out.push(self.final_level.clone());
        }
        out.extend((0..depth).map(|i| self.text(SideField::Level(i)).to_string()));
        out
    }
}

/// A recurrence answer as stored by the grader after a submission.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecurrenceAnswer {
    pub work_per_call: serde_json::Value,
    #[serde(default)]
    pub work_per_level: Vec<String>,
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub leaf_count: String,
}

/// Parse a stored recurrence answer. Plain tree literals return `None`.
pub fn parse_recurrence_answer(input: &str) -> Option<RecurrenceAnswer> {
    serde_json::from_str(input).ok()
}

// ─── Side panel ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideCell {
    #[serde(flatten)]
    pub field: SideField,
    pub bounds: Bounds,
    pub text: String,
}

/// Fixed text, anchored at its left baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Caption {
    pub text: String,
    pub at: Point,
}

/// Worksheet cells and captions for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SidePanel {
    pub cells: Vec<SideCell>,
    pub captions: Vec<Caption>,
    /// Decorative final-level leaves, text centered on `at`.
    pub leaves: Vec<Caption>,
    /// x of the rule between the tree and the work-per-level column.
    pub divider: Option<f32>,
}

impl SidePanel {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.captions.is_empty()
    }

    pub fn cell(&self, field: SideField) -> Option<&SideCell> {
        self.cells.iter().find(|c| c.field == field)
    }

    pub fn cell_at(&self, px: f32, py: f32) -> Option<&SideCell> {
        self.cells.iter().rev().find(|c| c.bounds.contains(px, py))
    }
}

/// Lay out the worksheet next to a tree laid out as `layout`. Empty unless
/// the configuration is a recurrence worksheet.
pub fn project_side(sheet: &Worksheet, layout: &TreeLayout, config: &BuilderConfig, geometry: &Geometry) -> SidePanel {
    let mut panel = SidePanel::default();
    if !config.recurrence() {
        return panel;
    }
    let (work_w, work_h) = config.work_area(geometry);
    let (canvas_w, canvas_h) = (geometry.canvas_width, geometry.canvas_height);
    let r = geometry.radius;
    let large = LARGE_RADIUS;
    let column_start = if config.enable_height { work_w + large } else { work_w };
    let column_x = (column_start + canvas_w) / 2.0;
    let bottom_y = (work_h + canvas_h) / 2.0;
    let top = config.tree_top();

    let cell = |field: SideField, x: f32, y: f32| SideCell {
        field,
        bounds: Bounds::square(x - r, y - r, 2.0 * r),
        text: sheet.text(field).to_string(),
    };
    let caption = |text: &str, x: f32, y: f32| Caption {
        text: text.to_string(),
        at: Point::new(x, y),
    };

    for level in 0..layout.row_count {
        let y = top + level as f32 * layout.row_height;
        panel.cells.push(cell(SideField::Level(level), column_x, y));
    }
    panel.captions.push(caption("Work Per", work_w + 3.0, 15.0));
    panel.captions.push(caption("Level", work_w + 3.0, 35.0));
    panel.captions.push(caption("Work Per Call", work_w / 2.0 - 2.0 * large, 25.0));
    panel.divider = Some(work_w);

    if config.enable_height {
        panel.cells.push(cell(SideField::Height, work_w, canvas_h / 2.0));
        panel.captions.push(caption(
            "Height",
            work_w - large,
            canvas_h / 2.0 - large - geometry.button / 2.0,
        ));
    }

    if config.enable_final_level {
        panel.cells.push(cell(SideField::FinalLevel, column_x, bottom_y));
        panel.cells.push(cell(SideField::LeafCount, work_w - 1.5 * large, bottom_y));
        panel.captions.push(caption("Total # Leaves:", work_w - 7.0 * large, bottom_y));
        panel.leaves = (0..FINAL_LEVEL_LEAVES)
            .map(|i| caption(&config.leaf_value, r * (1.0 + 2.0 * i as f32), bottom_y))
            .collect();
    }
    panel
}

// ─── Side labels ─────────────────────────────────────────────────────────

/// Take labels from `shape` and values from `values`, matched by child
/// slot. The returned tree has the shape of `shape`; every node's text is
/// the matching value, or empty where `values` has no node.
pub fn merge_labels(shape: BackendTree, values: Option<&BackendTree>) -> (BackendTree, HashMap<NodeId, String>) {
    let mut tree = shape;
    let mut labels = HashMap::with_capacity(tree.len());
    let mut stack = vec![(tree.root(), values.map(BackendTree::root))];

    while let Some((id, counterpart)) = stack.pop() {
        let Some(node) = tree.get(id) else { continue };
        let texts = node.shape.texts();
        let slots = node.shape.indexed_children();
        let value_node = counterpart.and_then(|v| values.and_then(|t| t.get(v)));
        let filled = value_node.map(|n| n.shape.texts()).unwrap_or_default();
        let value_slots = value_node.map(|n| n.shape.indexed_children()).unwrap_or_default();

        labels.insert(id, texts.join(" "));
        for i in 0..texts.len() {
            tree.set_text(id, i, filled.get(i).map_or("", String::as_str));
        }
        for (slot, child) in slots {
            let other = value_slots.iter().find(|(s, _)| *s == slot).map(|(_, c)| *c);
            stack.push((child, other));
        }
    }
    log::debug!("side labels: {} node(s)", labels.len());
    (tree, labels)
}

/// Attach labels to the projected nodes.
pub fn label_nodes(render: &mut RenderTree, labels: &HashMap<NodeId, String>) {
    for node in &mut render.nodes {
        node.label = labels.get(&node.id).cloned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::compute_layout;
    use crate::model::{EditMode, TreeMode};
    use crate::serialize::parse_tree;
    use pretty_assertions::assert_eq;

    fn recurrence() -> BuilderConfig {
        BuilderConfig::new(TreeMode::Multiway, EditMode::Recurrence)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_level_cell_per_tree_level() {
        let tree = parse_tree(
            r#"{"value": "n", "children": [{"value": "n/2", "children": [{"value": "1", "children": []}]}]}"#,
            TreeMode::Multiway,
        )
        .unwrap();
        let cfg = recurrence();
        let geo = cfg.geometry();
        let layout = compute_layout(&tree, &cfg, &geo);
        let sheet = Worksheet::new(&strings(&["n", "n"]));
        let panel = project_side(&sheet, &layout, &cfg, &geo);

        let fields: Vec<SideField> = panel.cells.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec![SideField::Level(0), SideField::Level(1), SideField::Level(2)]);
        let texts: Vec<&str> = panel.cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["n", "n", ""]);

        // Cells line up with the tree rows.
        for (cell, id) in panel.cells.iter().zip(tree.preorder()) {
            let y = layout.get(id).unwrap().y;
            assert!((cell.bounds.y + cell.bounds.height / 2.0 - y).abs() < 1e-3);
        }
        let (work_w, _) = cfg.work_area(&geo);
        assert!(panel.cells.iter().all(|c| c.bounds.x > work_w));
        assert_eq!(panel.divider, Some(work_w));
    }

    #[test]
    fn height_and_final_level_add_cells() {
        let tree = parse_tree(r#"{"value": "n", "children": []}"#, TreeMode::Multiway).unwrap();
        let cfg = BuilderConfig {
            enable_height: true,
            enable_final_level: true,
            leaf_value: "c".into(),
            ..recurrence()
        };
        let geo = cfg.geometry();
        let layout = compute_layout(&tree, &cfg, &geo);
        let panel = project_side(&Worksheet::default(), &layout, &cfg, &geo);

        assert!(panel.cell(SideField::Height).is_some());
        assert!(panel.cell(SideField::FinalLevel).is_some());
        let leaf_count = panel.cell(SideField::LeafCount).unwrap();
        let (cx, cy) = (
            leaf_count.bounds.x + leaf_count.bounds.width / 2.0,
            leaf_count.bounds.y + leaf_count.bounds.height / 2.0,
        );
        assert_eq!(panel.cell_at(cx, cy).map(|c| c.field), Some(SideField::LeafCount));
        assert_eq!(panel.leaves.len(), FINAL_LEVEL_LEAVES);
        assert!(panel.leaves.iter().all(|l| l.text == "c"));
        assert!(panel.captions.iter().any(|c| c.text == "Height"));
    }

    #[test]
    fn plain_modes_have_no_side_panel() {
        let tree = BackendTree::new(TreeMode::Multiway);
        let cfg = BuilderConfig::new(TreeMode::Multiway, EditMode::Builder);
        let geo = cfg.geometry();
        let layout = compute_layout(&tree, &cfg, &geo);
        assert!(project_side(&Worksheet::default(), &layout, &cfg, &geo).is_empty());
    }

    #[test]
    fn side_tree_puts_the_final_level_first() {
        let mut sheet = Worksheet::new(&strings(&["n", "2n", "4n"]));
        sheet.final_level = "c".into();
        *sheet.text_mut(SideField::Level(4)) = "x".into();
        assert_eq!(sheet.levels.len(), 5);

        let plain = recurrence();
        assert_eq!(sheet.side_tree(2, &plain), strings(&["n", "2n"]));
        let with_final = BuilderConfig {
            enable_final_level: true,
            ..recurrence()
        };
        assert_eq!(sheet.side_tree(2, &with_final), strings(&["c", "n", "2n"]));
    }

    #[test]
    fn stored_answer_restores_the_worksheet() {
        let answer = parse_recurrence_answer(
            r#"{"WorkPerCall": {"value": "n", "children": []},
                "WorkPerLevel": ["c", "n"], "Height": "log n", "LeafCount": "n"}"#,
        )
        .unwrap();
        let cfg = BuilderConfig {
            enable_final_level: true,
            ..recurrence()
        };
        let sheet = Worksheet::from_answer(&answer, &cfg);
        assert_eq!(sheet.final_level, "c");
        assert_eq!(sheet.levels, strings(&["n"]));
        assert_eq!(sheet.height, "log n");
        assert_eq!(sheet.leaf_count, "n");

        assert_eq!(parse_recurrence_answer(r#"{"value": "n", "children": []}"#), None);
    }

    #[test]
    fn labels_come_from_the_shape_and_values_by_slot() {
        let shape = parse_tree(
            r#"{"value": "A", "left": {"value": "B", "left": null, "right": null},
                "right": {"value": "C", "left": null, "right": null}}"#,
            TreeMode::Binary,
        )
        .unwrap();
        let values = parse_tree(
            r#"{"value": "1", "left": null, "right": {"value": "3", "left": null, "right": null}}"#,
            TreeMode::Binary,
        )
        .unwrap();
        let root = shape.root();
        let (b, c) = (shape.children(root)[0], shape.children(root)[1]);

        let (tree, labels) = merge_labels(shape, Some(&values));
        assert_eq!(tree.len(), 3);
        assert_eq!(labels[&root], "A");
        assert_eq!(labels[&b], "B");
        assert_eq!(labels[&c], "C");
        assert_eq!(tree.get(root).unwrap().shape.texts(), vec!["1"]);
        assert_eq!(tree.get(b).unwrap().shape.texts(), vec![""]);
        assert_eq!(tree.get(c).unwrap().shape.texts(), vec!["3"]);

        let (blank, _) = merge_labels(tree, None);
        assert!(blank.preorder().iter().all(|id| blank.get(*id).unwrap().shape.texts() == vec![""]));
    }
}
