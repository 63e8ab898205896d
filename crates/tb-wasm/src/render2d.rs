//! Canvas2D renderer.
//!
//! Draws a projected `RenderTree` to an HTML `<canvas>` via
//! `CanvasRenderingContext2d`. Mirrors the SVG export in `tb-render`.

use tb_core::id::NodeId;
use tb_core::mutate::Selection;
use tb_core::project::{Affordance, AffordanceKind, EdgeTag, Glyph, RenderNode, RenderTree};
use tb_core::side::{SideField, SidePanel};
use tb_render::theme::TreeTheme;
use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

const FONT: &str = "16px Inter, system-ui, sans-serif";
const BUTTON_FONT: &str = "bold 11px Inter, system-ui, sans-serif";
const SMALL_FONT: &str = "11px Inter, system-ui, sans-serif";

/// Render one frame.
pub fn render_tree(
    ctx: &CanvasRenderingContext2d,
    render: &RenderTree,
    selection: Option<Selection>,
    side_focus: Option<SideField>,
    hovered: Option<NodeId>,
    caret_visible: bool,
    pointer_error: Option<&str>,
    theme: &TreeTheme,
) {
    let (w, h) = (render.width as f64, render.height as f64);
    ctx.set_fill_style_str(theme.bg);
    ctx.fill_rect(0.0, 0.0, w, h);

    draw_edges(ctx, render, theme);
    draw_side(ctx, &render.side, side_focus, caret_visible, h, theme);
    for node in &render.nodes {
        let selected = selection.filter(|s| s.node == node.id).map(|s| s.index);
        draw_node(ctx, node, selected, hovered == Some(node.id), caret_visible, theme);
    }
    for a in &render.affordances {
        draw_button(ctx, a, theme);
    }

    if let Some(message) = pointer_error {
        ctx.set_font(FONT);
        ctx.set_fill_style_str(theme.delete_fill);
        ctx.set_text_align("left");
        ctx.set_text_baseline("bottom");
        let _ = ctx.fill_text(message, 8.0, h - 8.0);
    }
}

fn draw_edges(ctx: &CanvasRenderingContext2d, render: &RenderTree, theme: &TreeTheme) {
    ctx.save();
    ctx.set_line_width(1.5);
    for edge in &render.edges {
        if edge.tag == EdgeTag::Fan {
            ctx.set_stroke_style_str(theme.fan);
            let _ = ctx.set_line_dash(&js_sys::Array::of2(&JsValue::from_f64(4.0), &JsValue::from_f64(3.0)));
        } else {
            ctx.set_stroke_style_str(theme.edge);
            let _ = ctx.set_line_dash(&js_sys::Array::new());
        }
        ctx.begin_path();
        ctx.move_to(edge.start.x as f64, edge.start.y as f64);
        ctx.line_to(edge.end.x as f64, edge.end.y as f64);
        ctx.stroke();
    }
    ctx.restore();
}

fn draw_node(
    ctx: &CanvasRenderingContext2d,
    node: &RenderNode,
    selected: Option<usize>,
    hovered: bool,
    caret_visible: bool,
    theme: &TreeTheme,
) {
    let stroke = if node.highlight {
        theme.highlight_stroke
    } else if hovered {
        theme.hover_stroke
    } else {
        theme.node_stroke
    };
    ctx.save();
    ctx.set_font(FONT);
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    ctx.set_line_width(1.5);

    match node.glyph {
        Glyph::Cells { width, height } => {
            let (width, height) = (width as f64, height as f64);
            for (i, key) in node.text.iter().enumerate() {
                let x = node.x as f64 + width * i as f64;
                let y = node.y as f64;
                let fill = if selected == Some(i) { theme.selected_fill } else { theme.node_fill };
                ctx.set_fill_style_str(fill);
                ctx.fill_rect(x, y, width, height);
                ctx.set_stroke_style_str(stroke);
                ctx.stroke_rect(x, y, width, height);
                label(ctx, key, x + width / 2.0, y + height / 2.0, theme);
                if caret_visible && selected == Some(i) {
                    caret(ctx, key, x + width / 2.0, y + height / 2.0, theme);
                }
            }
        }
        Glyph::Circle { radius } => {
            let (cx, cy, r) = (node.x as f64, node.y as f64, radius as f64);
            let text = node.text.first().map_or("", String::as_str);
            if node.subsubtree {
                label(ctx, text, cx, cy, theme);
                ctx.restore();
                return;
            }
            let fill = if selected.is_some() { theme.selected_fill } else { theme.node_fill };
            ctx.begin_path();
            let _ = ctx.arc(cx, cy, r, 0.0, std::f64::consts::TAU);
            ctx.set_fill_style_str(fill);
            ctx.fill();
            ctx.set_stroke_style_str(stroke);
            ctx.stroke();
            if node.highlight {
                ctx.begin_path();
                let _ = ctx.arc(cx, cy, r - 4.0, 0.0, std::f64::consts::TAU);
                ctx.stroke();
            }
            if let (Some(front), Some(b)) = (&node.label, node.value_box()) {
                label(ctx, front, cx, cy, theme);
                let (bx, by, side) = (b.x as f64, b.y as f64, b.width as f64);
                ctx.set_fill_style_str(fill);
                ctx.fill_rect(bx, by, side, side);
                ctx.set_line_width(1.0);
                ctx.stroke_rect(bx, by, side, side);
                ctx.set_font(SMALL_FONT);
                label(ctx, text, bx + side / 2.0, by + side / 2.0, theme);
                if caret_visible && selected.is_some() {
                    caret(ctx, text, bx + side / 2.0, by + side / 2.0, theme);
                }
            } else {
                label(ctx, text, cx, cy, theme);
                if caret_visible && selected.is_some() {
                    caret(ctx, text, cx, cy, theme);
                }
            }
        }
    }
    ctx.restore();
}

fn draw_side(
    ctx: &CanvasRenderingContext2d,
    panel: &SidePanel,
    focus: Option<SideField>,
    caret_visible: bool,
    height: f64,
    theme: &TreeTheme,
) {
    ctx.save();
    if let Some(x) = panel.divider {
        ctx.set_stroke_style_str(theme.fan);
        ctx.set_line_width(1.0);
        ctx.begin_path();
        ctx.move_to(x as f64, 0.0);
        ctx.line_to(x as f64, height);
        ctx.stroke();
    }
    ctx.set_fill_style_str(theme.text);
    ctx.set_font(SMALL_FONT);
    ctx.set_text_align("left");
    ctx.set_text_baseline("alphabetic");
    for caption in &panel.captions {
        let _ = ctx.fill_text(&caption.text, caption.at.x as f64, caption.at.y as f64);
    }
    ctx.set_font(FONT);
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    for leaf in &panel.leaves {
        label(ctx, &leaf.text, leaf.at.x as f64, leaf.at.y as f64, theme);
    }
    ctx.set_line_width(1.5);
    for cell in &panel.cells {
        let b = cell.bounds;
        let (x, y, w, h) = (b.x as f64, b.y as f64, b.width as f64, b.height as f64);
        let focused = focus == Some(cell.field);
        ctx.set_fill_style_str(if focused { theme.selected_fill } else { theme.node_fill });
        ctx.fill_rect(x, y, w, h);
        ctx.set_stroke_style_str(theme.node_stroke);
        ctx.stroke_rect(x, y, w, h);
        label(ctx, &cell.text, x + w / 2.0, y + h / 2.0, theme);
        if caret_visible && focused {
            caret(ctx, &cell.text, x + w / 2.0, y + h / 2.0, theme);
        }
    }
    ctx.restore();
}

fn label(ctx: &CanvasRenderingContext2d, text: &str, x: f64, y: f64, theme: &TreeTheme) {
    if text.is_empty() {
        return;
    }
    ctx.set_fill_style_str(theme.text);
    let _ = ctx.fill_text(text, x, y);
}

fn caret(ctx: &CanvasRenderingContext2d, text: &str, cx: f64, cy: f64, theme: &TreeTheme) {
    let advance = ctx.measure_text(text).map_or(0.0, |m| m.width());
    let x = cx + advance / 2.0 + 1.0;
    ctx.set_stroke_style_str(theme.text);
    ctx.set_line_width(1.0);
    ctx.begin_path();
    ctx.move_to(x, cy - 9.0);
    ctx.line_to(x, cy + 9.0);
    ctx.stroke();
}

fn draw_button(ctx: &CanvasRenderingContext2d, a: &Affordance, theme: &TreeTheme) {
    let b = a.bounds;
    let (x, y, w, h) = (b.x as f64, b.y as f64, b.width as f64, b.height as f64);
    let (fill, glyph) = match a.kind {
        AffordanceKind::Add { .. } | AffordanceKind::Expand => (theme.button_fill, "+"),
        AffordanceKind::Delete => (theme.delete_fill, "×"),
        AffordanceKind::Promote => (theme.button_fill, "↑"),
        AffordanceKind::Demote => (theme.button_fill, "↓"),
        AffordanceKind::Collapse => (theme.button_fill, "−"),
        AffordanceKind::Pointer { .. } => (theme.edge, ""),
    };
    ctx.save();
    ctx.set_fill_style_str(fill);
    ctx.fill_rect(x, y, w, h);
    if !glyph.is_empty() {
        ctx.set_font(BUTTON_FONT);
        ctx.set_fill_style_str(theme.button_glyph);
        ctx.set_text_align("center");
        ctx.set_text_baseline("middle");
        let _ = ctx.fill_text(glyph, x + w / 2.0, y + h / 2.0);
    }
    ctx.restore();
}
