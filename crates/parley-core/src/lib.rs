mod conversation;
mod events;
mod oracle;
mod search;
mod tree;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use conversation::ConversationState;
pub use events::{EventEnvelope, EventPublisher, LogicalClock, PublishError, SearchEvent};
pub use oracle::{NEUTRAL_SCORE, Oracle, OracleError, clamp_unit};
pub use search::config::{SearchConfig, SearchConfigError};
pub use search::controller::{
    IterationMetrics, RunMetrics, SearchController, SearchError, SearchOutcome, Termination,
};
pub use search::request::{SearchRequest, Submission};
pub use tree::error::TreeError;
pub use tree::ids::{NodeId, TreeId};
pub use tree::node::{ExpansionState, Node, NodeStatus};
pub use tree::search_tree::{LeafStep, SearchLimits, SearchTree, SharedTree, TreePolicyResult};
pub use tree::snapshot::{NodeSnapshot, TreeSnapshot};
pub use tree::stats::{TreeStatistics, VisitStats};
