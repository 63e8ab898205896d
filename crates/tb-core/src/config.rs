//! Builder configuration and canvas geometry.

use crate::model::{EditMode, TreeMode};
use serde::{Deserialize, Serialize};

/// Side length of every square affordance.
pub const BUTTON_SIZE: f32 = 13.0;

/// Key cell sizes for B-tree nodes.
pub const LARGE_KEY: (f32, f32) = (40.0, 60.0);
pub const SMALL_KEY: (f32, f32) = (26.0, 39.0);

/// Circle radii for binary / multiway nodes.
pub const LARGE_RADIUS: f32 = 30.0;
pub const SMALL_RADIUS: f32 = 20.0;

/// Longest vertical edge between two rows.
pub const MAX_ROW_HEIGHT: f32 = 190.0;

/// Row height used when `fixed_height` is set, before it shrinks to fit.
pub const FIXED_ROW_HEIGHT: f32 = 140.0;

/// Fixed row height of a recurrence worksheet.
pub const RECURRENCE_ROW_HEIGHT: f32 = 180.0;

/// Decorative leaves drawn on the final level of a recurrence worksheet.
pub const FINAL_LEVEL_LEAVES: usize = 3;

/// Value of the sentinel root in pointer mode.
pub const POINTER_SENTINEL: &str = "ROOT*";

/// Canvas and glyph dimensions for one builder instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// Width of one key cell (B-tree).
    pub key_width: f32,
    /// Height of a B-tree node.
    pub key_height: f32,
    /// Radius of a circular node (binary / multiway).
    pub radius: f32,
    pub button: f32,
    /// Whether the small preset is active.
    pub small: bool,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::btree()
    }
}

impl Geometry {
    /// 800×600 B-tree canvas with large key cells.
    pub fn btree() -> Self {
        Self {
            canvas_width: 800.0,
            canvas_height: 600.0,
            key_width: LARGE_KEY.0,
            key_height: LARGE_KEY.1,
            radius: LARGE_RADIUS,
            button: BUTTON_SIZE,
            small: false,
        }
    }

    /// 781×588 work area for binary and multiway trees.
    pub fn tree() -> Self {
        Self {
            canvas_width: 781.0,
            canvas_height: 588.0,
            ..Self::btree()
        }
    }

    pub fn for_mode(mode: TreeMode) -> Self {
        match mode {
            TreeMode::BTree => Self::btree(),
            TreeMode::Binary | TreeMode::Multiway => Self::tree(),
        }
    }

    /// Switch to the small or large glyph preset, keeping the canvas.
    pub fn with_size(mut self, small: bool) -> Self {
        let (kw, kh) = if small { SMALL_KEY } else { LARGE_KEY };
        self.key_width = kw;
        self.key_height = kh;
        self.radius = if small { SMALL_RADIUS } else { LARGE_RADIUS };
        self.small = small;
        self
    }

    /// Flip between the large and small presets.
    pub fn toggled(self) -> Self {
        self.with_size(!self.small)
    }

    /// Smallest horizontal gap allowed between B-tree nodes in one sublayer.
    pub fn min_gap(&self) -> f32 {
        self.button * 1.5
    }

    /// Width of a B-tree node holding `keys` keys.
    pub fn node_width(&self, keys: usize) -> f32 {
        keys as f32 * self.key_width
    }

    /// Offset from a circle's center to its 45° rim point.
    pub fn rim_offset(&self) -> f32 {
        self.radius * std::f32::consts::FRAC_1_SQRT_2
    }
}

/// Per-instance builder options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuilderConfig {
    pub tree_mode: TreeMode,
    pub edit_mode: EditMode,
    /// Restrict typed characters to ASCII digits.
    pub numeric_only: bool,
    /// Ctrl-adding a child creates a subtree placeholder.
    pub enable_subtrees: bool,
    /// Nodes at this depth or deeper cannot gain children (multiway).
    pub height_limit: Option<usize>,
    /// Use a uniform row height instead of spreading rows over the canvas.
    pub fixed_height: bool,
    /// Start with the small glyph preset.
    pub small: bool,

    // ── Recurrence worksheet ──
    /// Show a height cell between the tree and the work-per-level column.
    pub enable_height: bool,
    /// Show the final (leaf) level with its leaf-count cell.
    pub enable_final_level: bool,
    /// Text of the decorative leaves on the final level.
    pub leaf_value: String,
    /// Initial work-per-level values, top level first.
    pub start_side_tree: Vec<String>,

    /// Side-label mode: the tree whose shape is edited and whose values are
    /// drawn as labels beside the nodes.
    pub label_tree: Option<serde_json::Value>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            tree_mode: TreeMode::BTree,
            edit_mode: EditMode::Builder,
            numeric_only: false,
            enable_subtrees: false,
            height_limit: None,
            fixed_height: false,
            small: false,
            enable_height: false,
            enable_final_level: false,
            leaf_value: String::new(),
            start_side_tree: Vec::new(),
            label_tree: None,
        }
    }
}

impl BuilderConfig {
    pub fn new(tree_mode: TreeMode, edit_mode: EditMode) -> Self {
        Self {
            tree_mode,
            edit_mode,
            ..Self::default()
        }
        .normalized()
    }

    /// Settle options that depend on the edit mode. A recurrence worksheet
    /// is always a multiway tree with fixed rows and no subtree placeholders.
    pub fn normalized(mut self) -> Self {
        if self.recurrence() {
            if self.tree_mode != TreeMode::Multiway {
                log::warn!(
                    "recurrence mode needs a multiway tree, ignoring tree mode {}",
                    self.tree_mode.as_str()
                );
                self.tree_mode = TreeMode::Multiway;
            }
            self.fixed_height = true;
            self.enable_subtrees = false;
        }
        self
    }

    pub fn recurrence(&self) -> bool {
        self.edit_mode == EditMode::Recurrence
    }

    /// Initial geometry for this configuration.
    pub fn geometry(&self) -> Geometry {
        Geometry::for_mode(self.tree_mode).with_size(self.small)
    }

    /// Structural edits through affordances (not pointer links).
    pub fn structural(&self) -> bool {
        self.edit_mode.edits_structure()
    }

    /// Pointer mode only applies to binary trees.
    pub fn pointer_mode(&self) -> bool {
        self.tree_mode == TreeMode::Binary && self.edit_mode.is_pointer()
    }

    /// Top margin of the root row for circular trees. Leaves room for the
    /// expand handle, the worksheet captions or the root's value box.
    pub fn tree_top(&self) -> f32 {
        let roomy = self.enable_subtrees || self.recurrence() || self.edit_mode == EditMode::SideLabel;
        if roomy { 70.0 } else { 35.0 }
    }

    /// Cap on the uniform row height when `fixed_height` is set.
    pub fn fixed_row_height(&self) -> f32 {
        if self.recurrence() { RECURRENCE_ROW_HEIGHT } else { FIXED_ROW_HEIGHT }
    }

    /// Part of the canvas the tree itself is laid out in. A recurrence
    /// worksheet keeps a column on the right for the work-per-level cells
    /// and, with a final level, a strip at the bottom.
    pub fn work_area(&self, geometry: &Geometry) -> (f32, f32) {
        if !self.recurrence() {
            return (geometry.canvas_width, geometry.canvas_height);
        }
        let height_gap = if self.enable_height { LARGE_RADIUS / 2.0 } else { 0.0 };
        let width = geometry.canvas_width - 2.0 * geometry.radius - 2.0 * geometry.button - height_gap;
        let height = if self.enable_final_level {
            geometry.canvas_height - 2.5 * LARGE_RADIUS - 10.0
        } else {
            geometry.canvas_height
        };
        (width, height)
    }

    /// Literal used when no starter tree is given.
    pub fn empty_literal(&self) -> &'static str {
        match self.tree_mode {
            TreeMode::BTree => r#"{"value": [""], "children": []}"#,
            TreeMode::Binary => r#"{"value": "", "left": null, "right": null}"#,
            TreeMode::Multiway => r#"{"value": "", "children": []}"#,
        }
    }
}
