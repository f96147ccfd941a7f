use std::fmt;

use uuid::Uuid;

/// A wrapper for the arena slot of a node inside one tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the value of the actual node without having to access and risk overriding the internal value
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        NodeId(value)
    }
}

/// Identity of one search tree. Every reset draws a fresh value, so the
/// external node keys (`<tree>:<slot>`) of two trees never collide.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TreeId(Uuid);

impl TreeId {
    pub fn new() -> Self {
        TreeId(Uuid::new_v4())
    }

    /// Render the externally visible id of a node in this tree.
    pub fn node_key(&self, node_id: NodeId) -> String {
        format!("{}:{}", self.0.simple(), node_id.index())
    }
}

impl Default for TreeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
