use crate::theme::TreeTheme;
use tb_core::mutate::Selection;
use tb_core::project::{AffordanceKind, EdgeTag, Glyph, RenderNode, RenderTree};
use tb_core::side::{SideField, SidePanel};

const FONT_SIZE: f32 = 16.0;
const SMALL_FONT_SIZE: f32 = 11.0;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Rough advance width used to place the caret after typed text.
fn text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * 0.6
}

/// Render one frame of the tree as a standalone SVG document.
///
/// `selection` fills the selected key cell (or circle) and `side_focus` the
/// focused worksheet cell; when `caret_visible` is set a text caret is drawn
/// after the focused text.
pub fn render_svg(
    render: &RenderTree,
    selection: Option<Selection>,
    side_focus: Option<SideField>,
    caret_visible: bool,
    theme: &TreeTheme,
) -> String {
    let (width, height) = (render.width, render.height);
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    ));
    svg.push_str("<style>\n");
    svg.push_str("  text { font-family: Inter, system-ui, sans-serif; }\n");
    svg.push_str("</style>\n");
    svg.push_str(&format!(
        "<rect x=\"0\" y=\"0\" width=\"{width}\" height=\"{height}\" fill=\"{}\" />\n",
        theme.bg
    ));

    for edge in &render.edges {
        let dash = if edge.tag == EdgeTag::Fan { " stroke-dasharray=\"4 3\"" } else { "" };
        let stroke = if edge.tag == EdgeTag::Fan { theme.fan } else { theme.edge };
        svg.push_str(&format!(
            "  <line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{stroke}\" stroke-width=\"1.5\"{dash} />\n",
            edge.start.x, edge.start.y, edge.end.x, edge.end.y
        ));
    }

    render_side_svg(&mut svg, &render.side, side_focus, caret_visible, theme);

    for node in &render.nodes {
        let selected = selection.filter(|s| s.node == node.id).map(|s| s.index);
        render_node_svg(&mut svg, node, selected, caret_visible, theme);
    }

    for a in &render.affordances {
        let b = a.bounds;
        let (fill, glyph) = match a.kind {
            AffordanceKind::Add { .. } | AffordanceKind::Expand => (theme.button_fill, "+"),
            AffordanceKind::Delete => (theme.delete_fill, "×"),
            AffordanceKind::Promote => (theme.button_fill, "↑"),
            AffordanceKind::Demote => (theme.button_fill, "↓"),
            AffordanceKind::Collapse => (theme.button_fill, "−"),
            AffordanceKind::Pointer { .. } => (theme.edge, ""),
        };
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"2\" ry=\"2\" fill=\"{fill}\" />\n",
            b.x, b.y, b.width, b.height
        ));
        if !glyph.is_empty() {
            svg.push_str(&format!(
                "  <text x=\"{}\" y=\"{}\" font-size=\"{SMALL_FONT_SIZE}\" fill=\"{}\" text-anchor=\"middle\">{glyph}</text>\n",
                b.x + b.width / 2.0,
                b.y + b.height - 2.5,
                theme.button_glyph
            ));
        }
    }

    svg.push_str("</svg>");
    svg
}

fn render_node_svg(
    out: &mut String,
    node: &RenderNode,
    selected: Option<usize>,
    caret_visible: bool,
    theme: &TreeTheme,
) {
    let stroke = if node.highlight { theme.highlight_stroke } else { theme.node_stroke };
    match node.glyph {
        Glyph::Cells { width, height } => {
            for (i, key) in node.text.iter().enumerate() {
                let x = node.x + width * i as f32;
                let fill = if selected == Some(i) { theme.selected_fill } else { theme.node_fill };
                out.push_str(&format!(
                    "  <rect x=\"{x}\" y=\"{}\" width=\"{width}\" height=\"{height}\" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"1.5\" />\n",
                    node.y
                ));
                let cx = x + width / 2.0;
                let cy = node.y + height / 2.0 + FONT_SIZE * 0.35;
                push_label(out, cx, cy, key, theme);
                if caret_visible && selected == Some(i) {
                    push_caret(out, cx + text_width(key, FONT_SIZE) / 2.0 + 1.0, cy, theme);
                }
            }
        }
        Glyph::Circle { radius } => {
            let text = node.text.first().map_or("", String::as_str);
            let cy = node.y + FONT_SIZE * 0.35;
            if node.subsubtree {
                // Decorations are a label only; the fan edges draw the shape.
                push_label(out, node.x, cy, text, theme);
                return;
            }
            let fill = if selected.is_some() { theme.selected_fill } else { theme.node_fill };
            out.push_str(&format!(
                "  <circle cx=\"{}\" cy=\"{}\" r=\"{radius}\" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"1.5\" />\n",
                node.x, node.y
            ));
            if node.highlight {
                out.push_str(&format!(
                    "  <circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"none\" stroke=\"{stroke}\" stroke-width=\"1.5\" />\n",
                    node.x,
                    node.y,
                    radius - 4.0
                ));
            }
            if let (Some(label), Some(b)) = (&node.label, node.value_box()) {
                push_label(out, node.x, cy, label, theme);
                out.push_str(&format!(
                    "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"1\" />\n",
                    b.x, b.y, b.width, b.height
                ));
                let (bx, by) = (b.x + b.width / 2.0, b.y + b.height / 2.0 + SMALL_FONT_SIZE * 0.35);
                push_text(out, bx, by, text, SMALL_FONT_SIZE, theme);
                if caret_visible && selected.is_some() {
                    push_caret(out, bx + text_width(text, SMALL_FONT_SIZE) / 2.0 + 1.0, by, theme);
                }
                return;
            }
            push_label(out, node.x, cy, text, theme);
            if caret_visible && selected.is_some() {
                push_caret(out, node.x + text_width(text, FONT_SIZE) / 2.0 + 1.0, cy, theme);
            }
        }
    }
}

/// Worksheet column, captions and final-level leaves.
fn render_side_svg(
    out: &mut String,
    panel: &SidePanel,
    focus: Option<SideField>,
    caret_visible: bool,
    theme: &TreeTheme,
) {
    if let Some(x) = panel.divider {
        out.push_str(&format!(
            "  <line x1=\"{x}\" y1=\"0\" x2=\"{x}\" y2=\"100%\" stroke=\"{}\" stroke-width=\"1\" />\n",
            theme.fan
        ));
    }
    for caption in &panel.captions {
        out.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"{SMALL_FONT_SIZE}\" fill=\"{}\">{}</text>\n",
            caption.at.x,
            caption.at.y,
            theme.text,
            escape(&caption.text)
        ));
    }
    for leaf in &panel.leaves {
        push_label(out, leaf.at.x, leaf.at.y + FONT_SIZE * 0.35, &leaf.text, theme);
    }
    for cell in &panel.cells {
        let b = cell.bounds;
        let focused = focus == Some(cell.field);
        let fill = if focused { theme.selected_fill } else { theme.node_fill };
        out.push_str(&format!(
            "  <rect class=\"side\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{fill}\" stroke=\"{}\" stroke-width=\"1.5\" />\n",
            b.x, b.y, b.width, b.height, theme.node_stroke
        ));
        let (cx, cy) = (b.x + b.width / 2.0, b.y + b.height / 2.0 + FONT_SIZE * 0.35);
        push_label(out, cx, cy, &cell.text, theme);
        if caret_visible && focused {
            push_caret(out, cx + text_width(&cell.text, FONT_SIZE) / 2.0 + 1.0, cy, theme);
        }
    }
}

fn push_label(out: &mut String, x: f32, y: f32, text: &str, theme: &TreeTheme) {
    push_text(out, x, y, text, FONT_SIZE, theme);
}

fn push_text(out: &mut String, x: f32, y: f32, text: &str, size: f32, theme: &TreeTheme) {
    if text.is_empty() {
        return;
    }
    out.push_str(&format!(
        "  <text x=\"{x}\" y=\"{y}\" font-size=\"{size}\" fill=\"{}\" text-anchor=\"middle\">{}</text>\n",
        theme.text,
        escape(text)
    ));
}

fn push_caret(out: &mut String, x: f32, baseline: f32, theme: &TreeTheme) {
    out.push_str(&format!(
        "  <line class=\"caret\" x1=\"{x}\" y1=\"{}\" x2=\"{x}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"1\" />\n",
        baseline - FONT_SIZE,
        baseline + 2.0,
        theme.text
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_core::side::{Worksheet, project_side};
    use tb_core::{BuilderConfig, EditMode, TreeMode, compute_layout, parse_tree, project};

    fn render(json: &str, cfg: &BuilderConfig) -> RenderTree {
        let tree = parse_tree(json, cfg.tree_mode).unwrap();
        let geo = cfg.geometry();
        project(&tree, &compute_layout(&tree, cfg, &geo), cfg, &geo)
    }

    #[test]
    fn one_cell_per_key_and_escaped_text() {
        let out = render(r#"{"value": ["a<b", "c"], "children": []}"#, &BuilderConfig::default());
        let svg = render_svg(&out, None, None, false, &TreeTheme::light());
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("a&lt;b"));
        assert!(!svg.contains("class=\"caret\""));
        // Background, 2 cells, 3 add and 2 delete buttons.
        assert_eq!(svg.matches("<rect").count(), 1 + 2 + 5);
    }

    #[test]
    fn caret_follows_selection() {
        let out = render(r#"{"value": ["a", "b"], "children": []}"#, &BuilderConfig::default());
        let sel = Selection::new(out.nodes[0].id, 1);
        let svg = render_svg(&out, Some(sel), None, true, &TreeTheme::light());
        assert_eq!(svg.matches("class=\"caret\"").count(), 1);
        assert_eq!(svg.matches(TreeTheme::light().selected_fill).count(), 1);
        let hidden = render_svg(&out, Some(sel), None, false, &TreeTheme::light());
        assert!(!hidden.contains("class=\"caret\""));
    }

    #[test]
    fn highlighted_circle_gets_inner_ring() {
        let cfg = BuilderConfig::new(TreeMode::Binary, EditMode::ViewOnly);
        let out = render(r#"{"value": "r", "highlight": true, "left": null, "right": null}"#, &cfg);
        let svg = render_svg(&out, None, None, false, &TreeTheme::dark());
        assert_eq!(svg.matches("<circle").count(), 2);
        assert!(svg.contains(TreeTheme::dark().highlight_stroke));
    }

    #[test]
    fn worksheet_cells_and_captions_are_drawn() {
        let cfg = BuilderConfig {
            enable_height: true,
            ..BuilderConfig::new(TreeMode::Multiway, EditMode::Recurrence)
        };
        let tree = parse_tree(r#"{"value": "n", "children": []}"#, cfg.tree_mode).unwrap();
        let geo = cfg.geometry();
        let layout = compute_layout(&tree, &cfg, &geo);
        let mut out = project(&tree, &layout, &cfg, &geo);
        let mut sheet = Worksheet::default();
        sheet.height = "log n".into();
        out.side = project_side(&sheet, &layout, &cfg, &geo);

        let svg = render_svg(&out, None, Some(SideField::Height), true, &TreeTheme::light());
        assert_eq!(svg.matches("class=\"side\"").count(), 2);
        assert!(svg.contains(">Work Per Call</text>"));
        assert!(svg.contains(">log n</text>"));
        assert_eq!(svg.matches("class=\"caret\"").count(), 1);
    }

    #[test]
    fn labelled_node_shows_label_and_boxed_value() {
        let cfg = BuilderConfig::new(TreeMode::Binary, EditMode::SideLabel);
        let mut out = render(r#"{"value": "42", "left": null, "right": null}"#, &cfg);
        out.nodes[0].label = Some("A".into());
        let svg = render_svg(&out, None, None, false, &TreeTheme::light());
        assert!(svg.contains(&format!("font-size=\"{FONT_SIZE}\" fill=\"{}\" text-anchor=\"middle\">A</text>", TreeTheme::light().text)));
        assert!(svg.contains(&format!("font-size=\"{SMALL_FONT_SIZE}\" fill=\"{}\" text-anchor=\"middle\">42</text>", TreeTheme::light().text)));
        // Background and the value box.
        assert_eq!(svg.matches("<rect").count(), 2);
    }
}
