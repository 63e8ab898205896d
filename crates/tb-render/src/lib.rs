pub mod hit;
pub mod svg;
pub mod theme;

pub use hit::{Hit, hit_test};
pub use svg::render_svg;
pub use theme::TreeTheme;
