pub mod commands;
pub mod input;
pub mod session;
pub mod shortcuts;
pub mod tools;

pub use commands::{Command, TextEdit};
pub use input::{InputEvent, Modifiers};
pub use session::{Submission, TreeSession};
pub use shortcuts::{KeyAction, ShortcutMap};
pub use tools::{Tool, ToolKind};
