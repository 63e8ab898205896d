//! Builder-instance context.
//!
//! A `TreeSession` owns everything one builder on the page needs: the
//! backend tree (single source of truth), its layout and render snapshot,
//! the current selection, text typed since the last structural edit, the
//! caret blink state and, in pointer mode, the link board. Recurrence
//! worksheets add the work-per-level cells; side-label mode adds the fixed
//! labels drawn in the nodes.
//!
//! Input flows `InputEvent → Tool / ShortcutMap → Command → dispatch`; every
//! mutation goes through `TreeSession::dispatch` in `commands.rs`.

use crate::commands::{Command, TextEdit};
use crate::input::{CaretBlink, InputEvent, Modifiers};
use crate::shortcuts::{KeyAction, ShortcutMap};
use crate::tools::{BuilderTool, LinkTool, Tool};
use serde::Serialize;
use std::collections::HashMap;
use tb_core::config::{BuilderConfig, Geometry};
use tb_core::id::{IdRegistry, NodeId};
use tb_core::layout::{TreeLayout, compute_layout};
use tb_core::model::{BackendTree, EditMode, Side, TreeMode};
use tb_core::mutate::Selection;
use tb_core::pointer::{PointerBoard, parse_pointer_tree, student_root};
use tb_core::project::{EdgeTag, Point, RenderTree, project, rim_edge};
use tb_core::serialize::{NodeSnapshot, parse_tree_with_registry, snapshot, snapshot_node, to_json};
use tb_core::side::{SideField, Worksheet, label_nodes, merge_labels, parse_recurrence_answer, project_side};
use tb_render::hit::hit_test;
use tb_render::svg::render_svg;
use tb_render::theme::TreeTheme;

/// Text typed into one element but not yet committed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingText {
    pub node: NodeId,
    pub index: usize,
    pub text: String,
}

/// Payload handed to the grader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    #[serde(rename = "backendRoot")]
    pub backend_root: Option<NodeSnapshot>,
    #[serde(rename = "currentMode")]
    pub current_mode: EditMode,
    #[serde(rename = "treeMode")]
    pub tree_mode: TreeMode,
    /// Pointer validation message, empty when the links are valid.
    #[serde(rename = "format-errors")]
    pub format_errors: String,
    /// Work per level, final level first when shown (recurrence only).
    #[serde(rename = "sideTree", skip_serializing_if = "Option::is_none")]
    pub side_tree: Option<Vec<String>>,
    #[serde(rename = "leaf-count", skip_serializing_if = "Option::is_none")]
    pub leaf_count: Option<String>,
    #[serde(rename = "height-val", skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
}

/// One drawable frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Frame<'a> {
    render: &'a RenderTree,
    selection: Option<Selection>,
    side_focus: Option<SideField>,
    hovered: Option<NodeId>,
    caret_visible: bool,
    pointer_error: Option<&'a str>,
}

pub struct TreeSession {
    pub(crate) config: BuilderConfig,
    pub(crate) geometry: Geometry,
    pub(crate) tree: BackendTree,
    pub(crate) layout: TreeLayout,
    pub(crate) render: RenderTree,
    pub(crate) selection: Option<Selection>,
    pub(crate) pending: Option<PendingText>,
    pub(crate) caret: CaretBlink,
    /// Node under the pointer, or the node owning the button under it.
    pub(crate) hovered: Option<NodeId>,

    // ── Pointer mode ──
    pub(crate) board: Option<PointerBoard>,
    pub(crate) pointer_error: Option<String>,
    /// Last tree rebuilt from a valid link configuration.
    pub(crate) last_valid: Option<BackendTree>,

    // ── Recurrence / side labels ──
    pub(crate) sheet: Worksheet,
    pub(crate) side_focus: Option<SideField>,
    pub(crate) labels: HashMap<NodeId, String>,

    starter: Option<String>,
    /// ↓ is held, so ←/→ descend instead of cycling.
    down_held: bool,
    builder_tool: BuilderTool,
    link_tool: LinkTool,
}

impl TreeSession {
    /// Create a session from a starter tree, then restore a saved tree on top.
    ///
    /// A malformed starter is logged and replaced by the empty tree for the
    /// mode; a malformed saved tree is logged and the starter is kept. Only
    /// a failure to build the empty tree is an error.
    ///
    /// In side-label mode the shape comes from the configured label tree
    /// (or the starter) and the saved tree only supplies values.
    pub fn new(config: BuilderConfig, starter: Option<&str>, saved: Option<&str>) -> Result<Self, String> {
        let config = config.normalized();
        let geometry = config.geometry();
        let parsed = starter.and_then(|literal| match parse_for(&config, literal, IdRegistry::new()) {
            Ok(tree) => Some(tree),
            Err(e) => {
                log::warn!("starter tree rejected, starting empty: {e}");
                None
            }
        });
        let (tree, starter) = match parsed {
            Some(tree) => (tree, starter),
            None => (parse_for(&config, config.empty_literal(), IdRegistry::new())?, None),
        };
        let layout = compute_layout(&tree, &config, &geometry);
        let render = project(&tree, &layout, &config, &geometry);
        let sheet = Worksheet::new(&config.start_side_tree);

        let mut session = Self {
            builder_tool: BuilderTool::new(config.tree_mode),
            link_tool: LinkTool::new(),
            config,
            geometry,
            tree,
            layout,
            render,
            selection: None,
            pending: None,
            caret: CaretBlink::default(),
            hovered: None,
            board: None,
            pointer_error: None,
            last_valid: None,
            sheet,
            side_focus: None,
            labels: HashMap::new(),
            starter: starter.map(str::to_string),
            down_held: false,
        };
        session.attach_board();
        if session.config.edit_mode == EditMode::SideLabel {
            if !session.attach_labels(saved) && saved.is_some() {
                session.attach_labels(None);
            }
        } else if let Some(saved) = saved {
            session.restore(saved);
        }
        session.relayout();
        log::debug!(
            "session: {} tree, {} mode, {} node(s)",
            session.config.tree_mode.as_str(),
            session.config.edit_mode.as_str(),
            session.tree.len()
        );
        Ok(session)
    }

    /// Like [`TreeSession::new`] with the configuration given as JSON.
    pub fn from_json(config_json: &str, starter: Option<&str>, saved: Option<&str>) -> Result<Self, String> {
        let config: BuilderConfig = serde_json::from_str(config_json).map_err(|e| {
            log::warn!("builder config rejected: {e}");
            format!("Invalid builder config: {e}")
        })?;
        Self::new(config, starter, saved)
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn tree(&self) -> &BackendTree {
        &self.tree
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    pub fn render(&self) -> &RenderTree {
        &self.render
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    /// Worksheet cell taking typed text, if any.
    pub fn side_focus(&self) -> Option<SideField> {
        self.side_focus
    }

    pub fn worksheet(&self) -> &Worksheet {
        &self.sheet
    }

    /// Fixed label of a node in side-label mode.
    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    pub fn caret_visible(&self) -> bool {
        self.caret.visible()
    }

    pub fn pointer_error(&self) -> Option<&str> {
        self.pointer_error.as_deref()
    }

    pub fn board(&self) -> Option<&PointerBoard> {
        self.board.as_ref()
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Route one input event. Returns whether a redraw is needed.
    pub fn handle(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::PointerDown { x, y, modifiers } => self.pointer_down(x, y, modifiers),
            InputEvent::PointerMove { x, y } => self.pointer_move(x, y),
            InputEvent::KeyDown { key, modifiers } => self.key_down(&key, modifiers),
            InputEvent::KeyUp { key } => {
                self.key_up(&key);
                false
            }
            InputEvent::Tick => self.tick(),
        }
    }

    pub fn pointer_down(&mut self, x: f32, y: f32, modifiers: Modifiers) -> bool {
        let hit = hit_test(&self.render, x, y);
        let event = InputEvent::pointer_down(x, y, modifiers);
        let commands = if self.config.pointer_mode() {
            self.link_tool.handle(&event, hit)
        } else {
            self.builder_tool.handle(&event, hit)
        };
        let redraw = !commands.is_empty() || self.config.pointer_mode();
        for command in commands {
            self.dispatch(command);
        }
        redraw
    }

    /// Track the node under the pointer. Returns whether it changed.
    pub fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        let hovered = hit_test(&self.render, x, y).and_then(|hit| hit.node());
        let changed = hovered != self.hovered;
        self.hovered = hovered;
        changed
    }

    pub fn key_down(&mut self, key: &str, modifiers: Modifiers) -> bool {
        if key == "ArrowDown" && !modifiers.command() {
            self.down_held = true;
            return false;
        }
        let Some(action) = ShortcutMap::resolve(
            key,
            modifiers.ctrl,
            modifiers.shift,
            modifiers.alt,
            modifiers.meta,
            self.down_held,
        ) else {
            return false;
        };
        let Some(command) = self.command_for_key(action) else {
            log::trace!("{action:?} has no effect here");
            return false;
        };
        self.dispatch(command);
        true
    }

    pub fn key_up(&mut self, key: &str) {
        if key == "ArrowDown" {
            self.down_held = false;
        }
    }

    /// Caret timer. Returns whether the caret is on screen at all.
    pub fn tick(&mut self) -> bool {
        self.caret.tick();
        self.selection.is_some() || self.side_focus.is_some()
    }

    fn command_for_key(&self, action: KeyAction) -> Option<Command> {
        if let Some(field) = self.side_focus {
            let edit = match action {
                KeyAction::Type(c) => TextEdit::Insert(c),
                KeyAction::Backspace => TextEdit::Backspace,
                _ => return None,
            };
            return Some(Command::EditSide { field, edit });
        }
        let sel = self.selection?;
        if action.is_btree_only() && self.config.tree_mode != TreeMode::BTree {
            return None;
        }
        let node = self.render.node(sel.node)?;
        let caps = node.capabilities;
        let count = node.text.len().max(1);
        let (id, index) = (sel.node, sel.index);

        let command = match action {
            KeyAction::Type(c) => Command::EditText {
                node: id,
                index,
                edit: TextEdit::Insert(c),
            },
            KeyAction::Backspace => Command::EditText {
                node: id,
                index,
                edit: TextEdit::Backspace,
            },
            KeyAction::SelectPrev => Command::Select {
                node: id,
                index: (index + count - 1) % count,
            },
            KeyAction::SelectNext => Command::Select {
                node: id,
                index: (index + 1) % count,
            },
            KeyAction::SelectParent => {
                let parent = self.tree.parent(id)?;
                let keys = self.tree.get(parent.id)?.shape.element_count();
                Command::Select {
                    node: parent.id,
                    index: parent.index.min(keys.saturating_sub(1)),
                }
            }
            KeyAction::DescendLeft => {
                let child = *self.tree.children(id).get(index)?;
                let keys = self.tree.get(child)?.shape.element_count();
                Command::Select {
                    node: child,
                    index: keys.saturating_sub(1),
                }
            }
            KeyAction::DescendRight => {
                let child = *self.tree.children(id).get(index + 1)?;
                Command::Select { node: child, index: 0 }
            }
            KeyAction::InsertLeft if caps.can_add_nodes => Command::InsertElement { node: id, index },
            KeyAction::InsertRight if caps.can_add_nodes => Command::InsertElement {
                node: id,
                index: index + 1,
            },
            KeyAction::Promote if caps.can_promote_nodes => Command::Promote { node: id, index },
            KeyAction::Demote if caps.can_demote_nodes => Command::Demote { node: id, index },
            KeyAction::DeleteKey if caps.can_delete_nodes => Command::RemoveElement { node: id, index },
            _ => return None,
        };
        Some(command)
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Replace the tree with a saved one. Ids continue from the current
    /// registry. On a parse failure the current state is kept.
    ///
    /// A recurrence worksheet also accepts its stored answer format; in
    /// side-label mode only the values are taken from `saved`.
    pub fn restore(&mut self, saved: &str) -> bool {
        if self.config.edit_mode == EditMode::SideLabel {
            return self.attach_labels(Some(saved));
        }
        let answer = self.config.recurrence().then(|| parse_recurrence_answer(saved)).flatten();
        let literal = match &answer {
            Some(answer) => answer.work_per_call.to_string(),
            None => saved.to_string(),
        };
        let ids = self.tree.registry().clone();
        match parse_for(&self.config, &literal, ids) {
            Ok(tree) => {
                self.pending = None;
                self.tree = tree;
                self.selection = None;
                self.side_focus = None;
                if let Some(answer) = &answer {
                    self.sheet = Worksheet::from_answer(answer, &self.config);
                }
                self.attach_board();
                self.relayout();
                true
            }
            Err(e) => {
                log::warn!("restore failed, keeping current tree: {e}");
                false
            }
        }
    }

    /// Backend snapshot as JSON, with pending text committed.
    pub fn snapshot_json(&mut self) -> Result<String, String> {
        self.flush_text();
        to_json(&self.tree)
    }

    /// Grading payload. In pointer mode the student's tree below the
    /// sentinel is submitted, from the last valid rebuild while the links
    /// are invalid.
    pub fn submission(&mut self) -> Submission {
        self.flush_text();
        let backend_root = if self.config.pointer_mode() {
            let source = match (&self.pointer_error, &self.last_valid) {
                (Some(_), Some(valid)) => valid,
                _ => &self.tree,
            };
            student_root(source).and_then(|id| snapshot_node(source, id))
        } else {
            snapshot(&self.tree)
        };
        let recurrence = self.config.recurrence();
        Submission {
            backend_root,
            current_mode: self.config.edit_mode,
            tree_mode: self.config.tree_mode,
            format_errors: self.pointer_error.clone().unwrap_or_default(),
            side_tree: recurrence.then(|| self.sheet.side_tree(self.layout.row_count, &self.config)),
            leaf_count: recurrence.then(|| self.sheet.leaf_count.clone()),
            height: recurrence.then(|| self.sheet.height.clone()),
        }
    }

    pub fn render_json(&self) -> Result<String, String> {
        let frame = Frame {
            render: &self.render,
            selection: self.selection,
            side_focus: self.side_focus,
            hovered: self.hovered,
            caret_visible: self.caret.visible(),
            pointer_error: self.pointer_error.as_deref(),
        };
        serde_json::to_string(&frame).map_err(|e| format!("Serialization error: {e}"))
    }

    pub fn svg(&self, theme: &TreeTheme) -> String {
        render_svg(&self.render, self.selection, self.side_focus, self.caret.visible(), theme)
    }

    // ─── Dispatcher internals ────────────────────────────────────────────

    /// Apply one typed character or backspace to the pending buffer.
    pub(crate) fn edit_text(&mut self, node: NodeId, index: usize, edit: TextEdit) -> bool {
        if !self.config.edit_mode.edits_text() {
            return false;
        }
        let Some(current) = self.tree.get(node).and_then(|n| n.shape.texts().into_iter().nth(index)) else {
            return false;
        };
        if self.pending.as_ref().is_some_and(|p| p.node != node || p.index != index) {
            self.flush_text();
        }
        let mut text = match self.pending.take() {
            Some(p) => p.text,
            None => current,
        };
        let changed = match edit {
            TextEdit::Insert(c) if self.config.numeric_only && !c.is_ascii_digit() => false,
            TextEdit::Insert(c) => {
                text.push(c);
                true
            }
            TextEdit::Backspace => text.pop().is_some(),
        };
        self.show_text(node, index, &text);
        self.pending = Some(PendingText { node, index, text });
        changed
    }

    /// Apply one typed character or backspace to a worksheet cell.
    pub(crate) fn edit_side(&mut self, field: SideField, edit: TextEdit) -> bool {
        if !self.config.recurrence() {
            return false;
        }
        self.flush_text();
        let numeric_only = self.config.numeric_only;
        let text = self.sheet.text_mut(field);
        let changed = match edit {
            TextEdit::Insert(c) if numeric_only && !c.is_ascii_digit() => false,
            TextEdit::Insert(c) => {
                text.push(c);
                true
            }
            TextEdit::Backspace => text.pop().is_some(),
        };
        self.render.side = project_side(&self.sheet, &self.layout, &self.config, &self.geometry);
        changed
    }

    /// Commit pending text into the backend tree.
    pub(crate) fn flush_text(&mut self) {
        if let Some(p) = self.pending.take()
            && !self.tree.set_text(p.node, p.index, &p.text)
        {
            log::debug!("pending text for {}[{}] dropped", p.node, p.index);
        }
    }

    fn show_text(&mut self, node: NodeId, index: usize, text: &str) {
        if let Some(slot) = self
            .render
            .nodes
            .iter_mut()
            .find(|n| n.id == node)
            .and_then(|n| n.text.get_mut(index))
        {
            text.clone_into(slot);
        }
    }

    /// Clamp a selection to an existing node and element.
    pub(crate) fn valid_selection(&self, sel: Selection) -> Option<Selection> {
        if let Some(board) = &self.board
            && self.pointer_error.is_some()
        {
            return board.node(sel.node).map(|_| Selection::new(sel.node, 0));
        }
        let count = self.tree.get(sel.node)?.shape.element_count();
        Some(Selection::new(sel.node, sel.index.min(count.saturating_sub(1))))
    }

    /// Recompute layout and projection from the backend tree.
    pub(crate) fn relayout(&mut self) {
        self.layout = compute_layout(&self.tree, &self.config, &self.geometry);
        if self.layout.ceiling_hit() {
            log::debug!("layout hit the sublayer ceiling");
        }
        self.render = project(&self.tree, &self.layout, &self.config, &self.geometry);
        self.render.side = project_side(&self.sheet, &self.layout, &self.config, &self.geometry);
        if !self.labels.is_empty() {
            label_nodes(&mut self.render, &self.labels);
        }
        if self.hovered.is_some_and(|id| self.render.node(id).is_none()) {
            self.hovered = None;
        }
        if let Some(p) = self.pending.clone() {
            self.show_text(p.node, p.index, &p.text);
        }
    }

    /// Validate the link board and rebuild the backend tree from it.
    pub(crate) fn update_pointers(&mut self) {
        let Some(board) = &self.board else {
            return;
        };
        match board.rebuild(self.tree.registry().clone()) {
            Ok(tree) => {
                self.last_valid = Some(tree.clone());
                self.tree = tree;
                self.pointer_error = None;
            }
            Err(e) => {
                log::info!("pointer links invalid: {e}");
                self.pointer_error = Some(e);
            }
        }
    }

    /// Redraw links from the board while it does not form a tree. Node
    /// positions stay where they were last laid out.
    pub(crate) fn redraw_links(&mut self) {
        let Some(board) = &self.board else {
            return;
        };
        self.render.nodes.retain(|n| board.node(n.id).is_some());
        self.render.affordances.retain(|a| board.node(a.node).is_some());
        if self.hovered.is_some_and(|id| board.node(id).is_none()) {
            self.hovered = None;
        }
        let r = self.geometry.radius;
        let centre = |id: NodeId| -> Option<Point> {
            self.render.node(id).map(|n| Point::new(n.x, n.y))
        };
        let edges = board
            .links()
            .filter_map(|(source, side, target)| {
                let tag = match side {
                    Side::Left => EdgeTag::Left,
                    Side::Right => EdgeTag::Right,
                };
                Some(rim_edge(source, centre(source)?, target, centre(target)?, tag, r))
            })
            .collect();
        self.render.edges = edges;
    }

    /// Start over from the starter tree.
    pub(crate) fn reset_tree(&mut self) {
        self.side_focus = None;
        if self.config.recurrence() {
            self.sheet = Worksheet::new(&self.config.start_side_tree);
        }
        if self.config.edit_mode == EditMode::SideLabel {
            self.attach_labels(None);
            return;
        }
        let literal = self.starter.clone();
        let literal = literal.as_deref().unwrap_or(self.config.empty_literal());
        let ids = self.tree.registry().clone();
        match parse_for(&self.config, literal, ids) {
            Ok(tree) => {
                self.pending = None;
                self.tree = tree;
                self.attach_board();
            }
            Err(e) => log::warn!("reset failed: {e}"),
        }
    }

    /// Switch a binary tree between builder and pointer editing. Refused
    /// while the links are invalid.
    pub(crate) fn toggle_edit_mode(&mut self) -> bool {
        let toggles = matches!(self.config.edit_mode, EditMode::Builder | EditMode::Pointer);
        if self.config.tree_mode != TreeMode::Binary || !toggles {
            return false;
        }
        let ids = self.tree.registry().clone();
        if self.config.pointer_mode() {
            self.update_pointers();
            if self.pointer_error.is_some() {
                return false;
            }
            let literal = match student_root(&self.tree).and_then(|id| snapshot_node(&self.tree, id)) {
                Some(student) => match serde_json::to_string(&student) {
                    Ok(json) => json,
                    Err(e) => {
                        log::warn!("cannot leave pointer mode: {e}");
                        return false;
                    }
                },
                None => self.config.empty_literal().to_string(),
            };
            match parse_tree_with_registry(&literal, TreeMode::Binary, ids) {
                Ok(tree) => self.tree = tree,
                Err(e) => {
                    log::warn!("cannot leave pointer mode: {e}");
                    return false;
                }
            }
            self.config.edit_mode = EditMode::Builder;
        } else {
            let literal = match to_json(&self.tree) {
                Ok(json) => json,
                Err(e) => {
                    log::warn!("cannot enter pointer mode: {e}");
                    return false;
                }
            };
            match parse_pointer_tree(&literal, ids) {
                Ok(tree) => self.tree = tree,
                Err(e) => {
                    log::warn!("cannot enter pointer mode: {e}");
                    return false;
                }
            }
            self.config.edit_mode = EditMode::Pointer;
        }
        self.selection = None;
        self.attach_board();
        true
    }

    /// Side-label mode: take the shape and labels from the label tree (or
    /// the starter) and fill values by position from `values`, falling back
    /// to the starter. Returns false, keeping the current tree, when either
    /// literal is malformed.
    fn attach_labels(&mut self, values: Option<&str>) -> bool {
        let shape_literal = match &self.config.label_tree {
            Some(tree) => tree.to_string(),
            None => self
                .starter
                .clone()
                .unwrap_or_else(|| self.config.empty_literal().to_string()),
        };
        let shape = match parse_for(&self.config, &shape_literal, self.tree.registry().clone()) {
            Ok(tree) => tree,
            Err(e) => {
                log::warn!("label tree rejected: {e}");
                return false;
            }
        };
        let value_literal = values.or(self.starter.as_deref());
        let value_tree = match value_literal.map(|literal| parse_for(&self.config, literal, IdRegistry::new())) {
            Some(Ok(tree)) => Some(tree),
            Some(Err(e)) => {
                log::warn!("side-label values rejected, keeping current tree: {e}");
                return false;
            }
            None => None,
        };
        let (tree, labels) = merge_labels(shape, value_tree.as_ref());
        self.pending = None;
        self.selection = None;
        self.tree = tree;
        self.labels = labels;
        self.relayout();
        true
    }

    /// Build the link board for pointer mode, or drop it otherwise.
    fn attach_board(&mut self) {
        self.pointer_error = None;
        self.link_tool = LinkTool::new();
        if !self.config.pointer_mode() {
            self.board = None;
            self.last_valid = None;
            return;
        }
        match PointerBoard::from_tree(&self.tree) {
            Ok(board) => {
                self.board = Some(board);
                self.last_valid = Some(self.tree.clone());
            }
            Err(e) => {
                log::warn!("pointer board unavailable: {e}");
                self.board = None;
                self.last_valid = None;
            }
        }
    }
}

fn parse_for(config: &BuilderConfig, literal: &str, ids: IdRegistry) -> Result<BackendTree, String> {
    if config.pointer_mode() {
        parse_pointer_tree(literal, ids)
    } else {
        parse_tree_with_registry(literal, config.tree_mode, ids)
    }
}
