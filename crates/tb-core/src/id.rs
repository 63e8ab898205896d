use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by a backend node, its render node, and every
/// affordance attached to it. 4 bytes, Copy, Eq, Hash in O(1).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Wrap a raw id. Only the registry and tests should need this.
    pub const fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out monotonically increasing ids for one builder instance.
///
/// Retired ids are never handed out again within a session, so anything
/// still holding a stale id (a render node, a half-finished pointer link)
/// simply fails to resolve instead of aliasing a newer node.
#[derive(Debug, Clone)]
pub struct IdRegistry {
    next: u32,
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdRegistry {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Allocate a fresh id.
    pub fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    /// The id the next call to `allocate` will return.
    pub fn peek(&self) -> NodeId {
        NodeId(self.next)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u32 {
        self.next
    }
}
