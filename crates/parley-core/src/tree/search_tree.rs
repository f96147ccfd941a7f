use std::{cmp::Ordering, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    conversation::ConversationState,
    tree::{
        arena::Arena,
        error::TreeError,
        ids::{NodeId, TreeId},
        node::{ExpansionState, Node, NodeStatus},
        snapshot::{NodeSnapshot, TreeSnapshot},
        stats::TreeStatistics,
    },
};

/// A tree shared between its search task and readers such as snapshot requests.
/// The lock is only ever held for synchronous tree work, never across oracle calls.
pub type SharedTree = Arc<Mutex<SearchTree>>;

/// Bounds the tree policy respects when deciding whether a node may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub branching_factor: usize,
    /// Deepest depth (relative to the root) a node may be created at.
    pub max_depth: u32,
}

/// What the controller should do with the leaf the tree policy stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStep {
    /// The leaf has no score yet.
    Evaluate,
    /// The leaf is scored and may grow new children.
    Expand,
    /// The leaf can neither grow nor be rescored; backpropagate its score again.
    Revisit,
}

#[derive(Debug, Clone)]
/// Result of one selection pass from the root.
pub struct TreePolicyResult {
    pub path: Vec<NodeId>, // nodes from root to leaf, inclusive
    pub leaf: NodeId,
    pub step: LeafStep,
}

#[derive(Debug, Clone)]
/// Owns the arena (root is always at index 0) and is the only place that
/// creates or mutates nodes.
pub struct SearchTree {
    id: TreeId,
    arena: Arena<Node>,
    stats: TreeStatistics,
}

impl SearchTree {
    /// Create a tree with a single root node.
    pub fn new(root_state: ConversationState) -> Self {
        let mut tree = SearchTree {
            id: TreeId::new(),
            arena: Arena::new(),
            stats: TreeStatistics::default(),
        };
        tree.create_root(root_state);
        tree
    }

    /// Discard every node and start over from a fresh root under a new tree id.
    pub fn create_root(&mut self, state: ConversationState) -> NodeId {
        self.id = TreeId::new();
        self.arena = Arena::new();
        self.stats = TreeStatistics::default();
        self.stats.observe_node(0);
        self.arena.allocate(Node::root(state))
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Return the root node id.
    pub fn root_id(&self) -> NodeId {
        NodeId::from(0)
    }

    pub fn root(&self) -> Result<&Node, TreeError> {
        self.get(self.root_id())
    }

    /// Return how many nodes exist in the tree arena.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn statistics(&self) -> TreeStatistics {
        self.stats
    }

    pub fn get(&self, node_id: NodeId) -> Result<&Node, TreeError> {
        self.arena.get(node_id).ok_or(TreeError::NotFound { node_id })
    }

    pub(crate) fn get_mut(&mut self, node_id: NodeId) -> Result<&mut Node, TreeError> {
        self.arena
            .get_mut(node_id)
            .ok_or(TreeError::NotFound { node_id })
    }

    /// Iterate all nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.arena.iter()
    }

    /// Render the external key of a node.
    pub fn node_key(&self, node_id: NodeId) -> String {
        self.id.node_key(node_id)
    }

    /// Attach a new `exploring` child under `parent`.
    ///
    /// The child is allocated before it is linked, so a listed child id always
    /// resolves to a node.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        action: impl Into<String>,
        state: ConversationState,
    ) -> Result<NodeId, TreeError> {
        let depth = match self.arena.get(parent) {
            Some(node) => node.depth() + 1,
            None => return Err(TreeError::UnknownParent { parent }),
        };

        let child_id = self
            .arena
            .allocate(Node::child(state, action.into(), depth, parent));
        self.get_mut(parent)?.push_child(child_id);
        self.stats.observe_node(depth);
        Ok(child_id)
    }

    /// Find the child of `parent` reached by exactly `action`.
    pub fn child_with_action(
        &self,
        parent: NodeId,
        action: &str,
    ) -> Result<Option<NodeId>, TreeError> {
        let node = self.get(parent)?;
        for child in node.children() {
            if self.get(*child)?.action() == Some(action) {
                return Ok(Some(*child));
            }
        }
        Ok(None)
    }

    /// Claim the node for expansion. An expanded node may be claimed again to
    /// top up missing children; only one claim may be in flight.
    pub fn begin_expansion(&mut self, node_id: NodeId) -> Result<(), TreeError> {
        let node = self.get_mut(node_id)?;
        if node.expansion_state() == ExpansionState::Expanding {
            return Err(TreeError::ExpansionInFlight { node_id });
        }
        node.set_expansion_state(ExpansionState::Expanding);
        Ok(())
    }

    pub fn finish_expansion(&mut self, node_id: NodeId) -> Result<(), TreeError> {
        self.get_mut(node_id)?
            .set_expansion_state(ExpansionState::Expanded);
        Ok(())
    }

    /// Release an in-flight expansion, keeping whatever children earlier
    /// expansions attached.
    pub fn abort_expansion(&mut self, node_id: NodeId) -> Result<(), TreeError> {
        let node = self.get_mut(node_id)?;
        if node.expansion_state() == ExpansionState::Expanding {
            let previous = if node.children().is_empty() {
                ExpansionState::Unexpanded
            } else {
                ExpansionState::Expanded
            };
            node.set_expansion_state(previous);
        }
        Ok(())
    }

    /// Move a node to `evaluating`. Idempotent while already evaluating.
    pub fn begin_evaluation(&mut self, node_id: NodeId) -> Result<(), TreeError> {
        self.advance_status(node_id, NodeStatus::Evaluating)
    }

    /// Record the node's score and mark it `complete`. A score is set exactly once.
    pub fn complete_evaluation(&mut self, node_id: NodeId, score: f64) -> Result<(), TreeError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(TreeError::InvalidScore { node_id, score });
        }
        let node = self.get(node_id)?;
        if node.is_complete() {
            return Err(TreeError::StatusRegression {
                node_id,
                from: NodeStatus::Complete,
                to: NodeStatus::Complete,
            });
        }
        self.advance_status(node_id, NodeStatus::Complete)?;
        self.get_mut(node_id)?.set_evaluation_score(score);
        Ok(())
    }

    fn advance_status(&mut self, node_id: NodeId, to: NodeStatus) -> Result<(), TreeError> {
        let node = self.get_mut(node_id)?;
        let from = node.status();
        if to < from {
            return Err(TreeError::StatusRegression { node_id, from, to });
        }
        node.set_status(to);
        Ok(())
    }

    /// Record `value` on `leaf` and every ancestor up to the root.
    /// Returns the touched nodes, leaf first.
    pub fn backpropagate(&mut self, leaf: NodeId, value: f64) -> Result<Vec<NodeId>, TreeError> {
        let path = self.path_to_root(leaf)?;
        for node_id in &path {
            self.get_mut(*node_id)?.record(value);
        }
        Ok(path)
    }

    /// Nodes from `node_id` up to the root, inclusive.
    pub fn path_to_root(&self, node_id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            path.push(id);
            current = self.get(id)?.parent();
        }
        Ok(path)
    }

    /// Pick the child of `node_id` with the highest UCB1 score.
    /// In case of equal scores the earlier child wins.
    pub fn select_child(&self, node_id: NodeId, c: f64) -> Result<Option<NodeId>, TreeError> {
        let node = self.get(node_id)?;
        let parent_visits = node.visits();

        let mut best: Option<(NodeId, f64)> = None;
        for child_id in node.children() {
            let score = self.get(*child_id)?.stats().ucb_score(parent_visits, c);
            best = match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((*child_id, score)),
            };
        }

        Ok(best.map(|(id, _)| id))
    }

    /// Walk from the root through fully expanded, scored nodes and stop at the
    /// first node that needs work.
    pub fn tree_policy(&self, c: f64, limits: SearchLimits) -> Result<TreePolicyResult, TreeError> {
        let mut current = self.root_id();
        let mut path = vec![current];

        loop {
            let node = self.get(current)?;

            if !node.is_complete() {
                return Ok(TreePolicyResult {
                    path,
                    leaf: current,
                    step: LeafStep::Evaluate,
                });
            }

            let at_limit = node.depth() >= limits.max_depth || node.state().is_terminal();
            let fully_expanded = node.children().len() >= limits.branching_factor;

            if !at_limit && !fully_expanded {
                return Ok(TreePolicyResult {
                    path,
                    leaf: current,
                    step: LeafStep::Expand,
                });
            }

            // Past this point the node is at the depth/turn limit or already full
            let next = if at_limit {
                None
            } else {
                self.select_child(current, c)?
            };

            match next {
                Some(child) => {
                    path.push(child);
                    current = child;
                }
                None => {
                    return Ok(TreePolicyResult {
                        path,
                        leaf: current,
                        step: LeafStep::Revisit,
                    });
                }
            }
        }
    }

    /// Scored root children, best first: mean value descending, then visits
    /// descending, then creation order.
    pub fn ranked_root_children(&self) -> Result<Vec<NodeId>, TreeError> {
        let root = self.root()?;
        let mut ranked = Vec::with_capacity(root.children().len());
        for child_id in root.children() {
            let child = self.get(*child_id)?;
            if child.is_complete() {
                ranked.push((*child_id, child.mean_value(), child.visits()));
            }
        }

        // stable sort keeps creation order for full ties
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });

        Ok(ranked.into_iter().map(|(id, _, _)| id).collect())
    }

    /// External view of one node.
    pub fn snapshot(&self, node_id: NodeId) -> Result<NodeSnapshot, TreeError> {
        let node = self.get(node_id)?;
        Ok(NodeSnapshot {
            node_id: self.node_key(node_id),
            parent_id: node.parent().map(|parent| self.node_key(parent)),
            state: node.state().to_string(),
            visits: node.visits(),
            value: node.stats().value_sum(),
            action_taken: node.action().map(str::to_owned),
            depth: node.depth(),
            children_ids: node
                .children()
                .iter()
                .map(|child| self.node_key(*child))
                .collect(),
            status: node.status(),
            evaluation_score: node.evaluation_score(),
        })
    }

    /// External view of the whole tree, in creation order.
    pub fn snapshot_all(&self) -> Result<TreeSnapshot, TreeError> {
        let nodes = self
            .nodes()
            .map(|(id, _)| self.snapshot(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TreeSnapshot {
            schema_version: 1,
            tree_id: self.id.to_string(),
            root_node_id: self.node_key(self.root_id()),
            node_count: self.node_count(),
            max_depth: self.stats.max_depth,
            nodes,
        })
    }
}
