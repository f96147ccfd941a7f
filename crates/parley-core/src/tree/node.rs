use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    conversation::ConversationState,
    tree::{ids::NodeId, stats::VisitStats},
};

/// Evaluation lifecycle of a node. Ordered so that a transition is valid
/// only when it does not move backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Exploring,
    Evaluating,
    Complete,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Exploring => "exploring",
            NodeStatus::Evaluating => "evaluating",
            NodeStatus::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enum to help determine if a node has been expanded or not.
/// `Expanding` marks an oracle call in flight for this node.
pub enum ExpansionState {
    Unexpanded,
    Expanding,
    Expanded,
}

#[derive(Debug, Clone)]
/// One vertex of the search: the conversation reached by following
/// `action` from the parent, with the statistics backpropagation maintains.
pub struct Node {
    state: ConversationState,
    action: Option<String>,
    depth: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    stats: VisitStats,
    status: NodeStatus,
    evaluation_score: Option<f64>,
    expansion_state: ExpansionState,
}

impl Node {
    pub(crate) fn root(state: ConversationState) -> Self {
        Node::new(state, None, 0, None)
    }

    pub(crate) fn child(
        state: ConversationState,
        action: String,
        depth: u32,
        parent: NodeId,
    ) -> Self {
        Node::new(state, Some(action), depth, Some(parent))
    }

    fn new(
        state: ConversationState,
        action: Option<String>,
        depth: u32,
        parent: Option<NodeId>,
    ) -> Self {
        Node {
            state,
            action,
            depth,
            parent,
            children: Vec::new(),
            stats: VisitStats::new(),
            status: NodeStatus::Exploring,
            evaluation_score: None,
            expansion_state: ExpansionState::Unexpanded,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// The utterance leading here from the parent; `None` only for the root.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn stats(&self) -> VisitStats {
        self.stats
    }

    pub fn visits(&self) -> u64 {
        self.stats.visits()
    }

    pub fn mean_value(&self) -> f64 {
        self.stats.mean()
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == NodeStatus::Complete
    }

    pub fn evaluation_score(&self) -> Option<f64> {
        self.evaluation_score
    }

    pub fn expansion_state(&self) -> ExpansionState {
        self.expansion_state
    }

    /// Helper to be called to see if a node is expanded
    pub fn is_expanded(&self) -> bool {
        self.expansion_state == ExpansionState::Expanded
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(crate) fn record(&mut self, reward: f64) {
        self.stats.record(reward);
    }

    pub(crate) fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub(crate) fn set_evaluation_score(&mut self, score: f64) {
        self.evaluation_score = Some(score);
    }

    pub(crate) fn set_expansion_state(&mut self, state: ExpansionState) {
        self.expansion_state = state;
    }
}
