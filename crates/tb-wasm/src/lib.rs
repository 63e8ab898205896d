//! WASM bridge for the tree builder widget.
//!
//! Compiled via `wasm-pack build --target web`. The page forwards pointer
//! and key events here and redraws when a handler returns `true`.

mod render2d;

use tb_core::model::TreeMode;
use tb_core::serialize::parse_tree;
use tb_editor::commands::Command;
use tb_editor::input::Modifiers;
use tb_editor::session::TreeSession;
use tb_render::theme::TreeTheme;
use wasm_bindgen::prelude::*;
use web_sys::CanvasRenderingContext2d;

/// One builder instance on the page.
#[wasm_bindgen]
pub struct TreeBuilderCanvas {
    session: TreeSession,
    /// `false` = light (default), `true` = dark.
    dark_mode: bool,
}

#[wasm_bindgen]
impl TreeBuilderCanvas {
    /// Create a builder from its JSON configuration, an optional starter
    /// tree and an optional saved tree. Empty strings count as absent.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, starter: &str, saved: &str) -> Result<TreeBuilderCanvas, JsValue> {
        console_error_panic_hook_setup();
        fn present(s: &str) -> Option<&str> {
            (!s.trim().is_empty()).then_some(s)
        }
        let session = TreeSession::from_json(config_json, present(starter), present(saved))
            .map_err(|e| JsValue::from_str(&e))?;
        Ok(Self {
            session,
            dark_mode: false,
        })
    }

    /// Draw the current frame.
    pub fn render(&self, ctx: &CanvasRenderingContext2d) {
        render2d::render_tree(
            ctx,
            self.session.render(),
            self.session.selection(),
            self.session.side_focus(),
            self.session.hovered(),
            self.session.caret_visible(),
            self.session.pointer_error(),
            &self.theme(),
        );
    }

    pub fn set_theme(&mut self, is_dark: bool) {
        self.dark_mode = is_dark;
    }

    // ─── Events ──────────────────────────────────────────────────────────

    /// Handle a pointer press. Returns true if a redraw is needed.
    pub fn handle_pointer_down(&mut self, x: f32, y: f32, shift: bool, ctrl: bool, alt: bool, meta: bool) -> bool {
        let mods = Modifiers {
            ctrl,
            shift,
            alt,
            meta,
        };
        self.session.pointer_down(x, y, mods)
    }

    /// Handle pointer movement. Returns true if the hovered node changed.
    pub fn handle_pointer_move(&mut self, x: f32, y: f32) -> bool {
        self.session.pointer_move(x, y)
    }

    /// Handle a key press. Returns true if a redraw is needed.
    pub fn handle_key_down(&mut self, key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> bool {
        let mods = Modifiers {
            ctrl,
            shift,
            alt,
            meta,
        };
        self.session.key_down(key, mods)
    }

    pub fn handle_key_up(&mut self, key: &str) {
        self.session.key_up(key);
    }

    /// Caret blink timer. Returns true if a redraw is needed.
    pub fn tick(&mut self) -> bool {
        self.session.tick()
    }

    // ─── Toolbar ─────────────────────────────────────────────────────────

    pub fn reset(&mut self) {
        self.session.dispatch(Command::Reset);
    }

    pub fn toggle_size(&mut self) {
        self.session.dispatch(Command::ToggleSize);
    }

    /// Switch a binary tree between builder and pointer editing. Returns the
    /// mode name afterwards.
    pub fn toggle_mode(&mut self) -> String {
        self.session.dispatch(Command::ToggleEditMode);
        self.session.config().edit_mode.as_str().to_string()
    }

    pub fn redraw(&mut self) {
        self.session.dispatch(Command::Redraw);
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Replace the tree with a saved one. Returns `false` on parse error,
    /// keeping the current tree.
    pub fn restore(&mut self, saved: &str) -> bool {
        self.session.restore(saved)
    }

    /// Backend snapshot with ids, or `{}` if serialization fails.
    pub fn get_snapshot(&mut self) -> String {
        self.session.snapshot_json().unwrap_or_else(|e| {
            log::error!("{e}");
            "{}".to_string()
        })
    }

    /// Grading payload as JSON.
    pub fn get_submission(&mut self) -> String {
        let submission = self.session.submission();
        serde_json::to_string(&submission).unwrap_or_else(|e| {
            log::error!("Serialization error: {e}");
            "{}".to_string()
        })
    }

    /// Render snapshot for drawing outside the canvas.
    pub fn get_render_json(&self) -> String {
        self.session.render_json().unwrap_or_else(|e| {
            log::error!("{e}");
            "{}".to_string()
        })
    }

    /// Current frame as a standalone SVG document.
    pub fn get_svg(&self) -> String {
        self.session.svg(&self.theme())
    }

    pub fn get_pointer_error(&self) -> String {
        self.session.pointer_error().unwrap_or_default().to_string()
    }

    fn theme(&self) -> TreeTheme {
        if self.dark_mode { TreeTheme::dark() } else { TreeTheme::light() }
    }
}

/// Set up a panic hook that routes panic messages to `console.error`.
fn console_error_panic_hook_setup() {
    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static SET_HOOK: Once = Once::new();
        SET_HOOK.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                let msg = format!("Tree builder WASM panic: {info}");
                web_sys::console::error_1(&msg.into());
            }));
        });
    }
}

// ─── Standalone validation (no canvas needed) ────────────────────────────

/// Validate a tree literal for the given mode. Returns JSON:
/// `{"ok":true,"nodes":N}` or `{"ok":false,"error":"..."}`.
#[wasm_bindgen]
pub fn validate_tree(literal: &str, mode: &str) -> String {
    let Some(mode) = TreeMode::parse(mode) else {
        return serde_json::json!({"ok": false, "error": format!("unknown tree mode: {mode}")}).to_string();
    };
    match parse_tree(literal, mode) {
        Ok(tree) => serde_json::json!({"ok": true, "nodes": tree.len()}).to_string(),
        Err(e) => serde_json::json!({"ok": false, "error": e}).to_string(),
    }
}
