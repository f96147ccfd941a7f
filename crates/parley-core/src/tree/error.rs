use thiserror::Error;

use crate::tree::{ids::NodeId, node::NodeStatus};

/// Error type for search tree construction and mutation.
///
/// Every variant signals a broken invariant (a programming error), so callers
/// treat them as fatal to the search that hit them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// Attempted to attach a child under a node id that does not exist in the arena.
    #[error("unknown parent node {}", parent.index())]
    UnknownParent { parent: NodeId },

    /// Attempted to access a node id that does not exist in the arena.
    #[error("node {} not found", node_id.index())]
    NotFound { node_id: NodeId },

    /// Node statuses only move forward.
    #[error("node {} cannot move from {from} to {to}", node_id.index())]
    StatusRegression {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    /// Evaluation scores must be finite and within `[0, 1]`.
    #[error("score {score} for node {} is outside [0, 1]", node_id.index())]
    InvalidScore { node_id: NodeId, score: f64 },

    /// A second expansion was started while one is still in flight.
    #[error("node {} is already being expanded", node_id.index())]
    ExpansionInFlight { node_id: NodeId },
}
