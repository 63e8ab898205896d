/// Colors used when drawing a tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeTheme {
    pub bg: &'static str,
    pub node_fill: &'static str,
    pub node_stroke: &'static str,
    pub selected_fill: &'static str,
    pub highlight_stroke: &'static str,
    /// Outline of the node under the pointer.
    pub hover_stroke: &'static str,
    pub text: &'static str,
    pub edge: &'static str,
    pub fan: &'static str,
    pub button_fill: &'static str,
    pub button_glyph: &'static str,
    pub delete_fill: &'static str,
}

impl TreeTheme {
    pub fn light() -> Self {
        Self {
            bg: "#FFFFFF",
            node_fill: "#F5F5F7",
            node_stroke: "#1D1D1F",
            selected_fill: "#CCE4FF",
            highlight_stroke: "#FF9500",
            hover_stroke: "#0071E3",
            text: "#1D1D1F",
            edge: "#1D1D1F",
            fan: "#86868B",
            button_fill: "#34C759",
            button_glyph: "#FFFFFF",
            delete_fill: "#FF3B30",
        }
    }

    pub fn dark() -> Self {
        Self {
            bg: "#1C1C1E",
            node_fill: "#2C2C2E",
            node_stroke: "#E5E5EA",
            selected_fill: "#0A3D75",
            highlight_stroke: "#FF9F0A",
            hover_stroke: "#0A84FF",
            text: "#F2F2F7",
            edge: "#E5E5EA",
            fan: "#98989D",
            button_fill: "#30D158",
            button_glyph: "#1C1C1E",
            delete_fill: "#FF453A",
        }
    }
}

impl Default for TreeTheme {
    fn default() -> Self {
        Self::light()
    }
}
