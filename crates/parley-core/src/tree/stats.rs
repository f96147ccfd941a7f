use serde::Serialize;

/// Stores the numbers MCTS updates constantly
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisitStats {
    visits: u64,
    value_sum: f64,
}

impl VisitStats {
    pub fn new() -> Self {
        VisitStats {
            visits: 0,
            value_sum: 0.0,
        }
    }

    /// Retrieve the amount of backpropagation passes that touched the node
    pub fn visits(&self) -> u64 {
        self.visits
    }

    /// Retrieve the running sum of backpropagated rewards.
    pub fn value_sum(&self) -> f64 {
        self.value_sum
    }

    /// Function to be used for backpropagation.
    /// Immediately records the reward and increments the visits.
    pub fn record(&mut self, reward: f64) {
        self.visits += 1;
        self.value_sum += reward;
    }

    pub fn is_unvisited(&self) -> bool {
        self.visits == 0
    }

    /// Mean reward, zero while unvisited.
    pub fn mean(&self) -> f64 {
        if self.is_unvisited() {
            0.0
        } else {
            self.value_sum / self.visits as f64
        }
    }

    /// UCB1 score relative to a parent with `parent_visits` passes.
    /// Unvisited nodes score +inf so they are always tried first.
    pub fn ucb_score(&self, parent_visits: u64, c: f64) -> f64 {
        if self.is_unvisited() {
            f64::INFINITY
        } else {
            let n_parent = parent_visits.max(1) as f64;
            self.mean() + c * f64::sqrt(f64::ln(n_parent) / self.visits as f64)
        }
    }
}

/// Derived tree-wide numbers, refreshed on every structural mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStatistics {
    pub total_nodes: usize,
    pub max_depth: u32,
}

impl TreeStatistics {
    pub(crate) fn observe_node(&mut self, depth: u32) {
        self.total_nodes += 1;
        self.max_depth = self.max_depth.max(depth);
    }
}
