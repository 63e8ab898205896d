pub mod config;
pub mod id;
pub mod layout;
pub mod model;
pub mod mutate;
pub mod pointer;
pub mod project;
pub mod serialize;
pub mod side;

pub use config::{BuilderConfig, Geometry};
pub use id::{IdRegistry, NodeId};
pub use layout::{TreeLayout, compute_layout};
pub use model::*;
pub use mutate::{MutationResult, Selection};
pub use pointer::PointerBoard;
pub use project::{Affordance, AffordanceKind, RenderTree, project};
pub use serialize::{parse_tree, snapshot, to_json};
