use std::time::Duration;

use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    events::{EventPublisher, PublishError, SearchEvent},
    oracle::{NEUTRAL_SCORE, Oracle, clamp_unit},
    search::config::SearchConfig,
    tree::{
        error::TreeError,
        ids::NodeId,
        search_tree::{LeafStep, SearchLimits, SearchTree},
        snapshot::NodeSnapshot,
        stats::TreeStatistics,
    },
};

/// Error type for a search run.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A tree invariant was violated; the tree should be discarded.
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("search cancelled")]
    Cancelled,

    #[error("event channel closed")]
    ChannelClosed,
}

impl From<PublishError> for SearchError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Closed => SearchError::ChannelClosed,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The simulation budget was used up.
    Budget,
    /// The wall-clock budget elapsed.
    Deadline,
    /// The root conversation is already at its turn limit.
    TurnLimit,
}

/// Per-iteration metrics emitted by the search.
#[derive(Debug, Clone, Copy)]
pub struct IterationMetrics {
    pub leaf: NodeId,
    pub path_len: usize,
    pub children_created: usize,
    pub evaluated: Option<NodeId>,
    pub score: f64,
    pub fallback_score: bool,
}

/// Aggregate metrics for a complete search run.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub iterations_requested: usize,
    pub iterations_completed: usize,
    pub evaluations: usize,
    pub fallback_evaluations: usize,
    pub children_created: usize,
    pub elapsed: Duration,
}

impl RunMetrics {
    fn new(iterations_requested: usize) -> Self {
        RunMetrics {
            iterations_requested,
            iterations_completed: 0,
            evaluations: 0,
            fallback_evaluations: 0,
            children_created: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, metrics: &IterationMetrics) {
        self.iterations_completed += 1;
        self.children_created += metrics.children_created;
        if metrics.evaluated.is_some() {
            self.evaluations += 1;
            if metrics.fallback_score {
                self.fallback_evaluations += 1;
            }
        }
    }
}

/// Ranked result of a finished search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Root actions, best first.
    pub options: Vec<String>,
    pub best_action: Option<String>,
    /// Mean value of the best root action, or of the root when nothing was explored.
    pub state_evaluation: f64,
    pub termination: Termination,
    pub metrics: RunMetrics,
    pub statistics: TreeStatistics,
}

struct Evaluation {
    score: f64,
    fallback: bool,
}

/// Drives selection, expansion, evaluation and backpropagation over one tree.
///
/// The tree lock is taken for each synchronous step and released across
/// oracle calls and event delivery, so readers can snapshot mid-search.
pub struct SearchController<'a, O: Oracle + ?Sized> {
    config: &'a SearchConfig,
    oracle: &'a O,
}

impl<'a, O: Oracle + ?Sized> SearchController<'a, O> {
    pub fn new(config: &'a SearchConfig, oracle: &'a O) -> Self {
        SearchController { config, oracle }
    }

    /// Run the search until a budget is exhausted, then publish `complete`.
    pub async fn run(
        &self,
        tree: &Mutex<SearchTree>,
        publisher: &mut EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        self.run_with_hook(tree, publisher, cancel, |_| {}).await
    }

    /// Run the search and invoke a callback after each completed iteration.
    pub async fn run_with_hook<FHook>(
        &self,
        tree: &Mutex<SearchTree>,
        publisher: &mut EventPublisher,
        cancel: &CancellationToken,
        mut on_iteration: FHook,
    ) -> Result<SearchOutcome, SearchError>
    where
        FHook: FnMut(&IterationMetrics),
    {
        let started = Instant::now();
        let deadline = started + self.config.time_budget();
        let mut metrics = RunMetrics::new(self.config.iterations);

        let limits = {
            let tree = tree.lock().await;
            self.config.limits(tree.root()?.state().remaining_turns())
        };

        let termination = if limits.max_depth == 0 {
            Termination::TurnLimit
        } else {
            let mut termination = Termination::Budget;
            for _ in 0..self.config.iterations {
                if Instant::now() >= deadline {
                    termination = Termination::Deadline;
                    break;
                }
                ensure_live(cancel)?;

                let iteration = self.iterate(tree, limits, publisher, cancel).await?;
                on_iteration(&iteration);
                metrics.record(&iteration);
            }
            termination
        };

        ensure_live(cancel)?;
        metrics.elapsed = started.elapsed();
        let outcome = self.conclude(tree, termination, metrics).await?;

        let stats = outcome.statistics;
        emit(
            publisher,
            SearchEvent::Complete {
                best_action: outcome.best_action.clone(),
                options: outcome.options.clone(),
                state_evaluation: outcome.state_evaluation,
            },
            stats,
            cancel,
        )
        .await?;

        info!(
            iterations = outcome.metrics.iterations_completed,
            total_nodes = stats.total_nodes,
            max_depth = stats.max_depth,
            options = outcome.options.len(),
            state_evaluation = outcome.state_evaluation,
            termination = ?outcome.termination,
            "search finished"
        );

        Ok(outcome)
    }

    /// Execute one complete iteration: selection, expansion, evaluation, backpropagation.
    pub async fn iterate(
        &self,
        tree: &Mutex<SearchTree>,
        limits: SearchLimits,
        publisher: &mut EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<IterationMetrics, SearchError> {
        let policy = {
            let tree = tree.lock().await;
            tree.tree_policy(self.config.exploration, limits)?
        };

        let mut created = Vec::new();
        let target = match policy.step {
            LeafStep::Evaluate => Some(policy.leaf),
            LeafStep::Expand => {
                created = self.expand(tree, policy.leaf, limits, publisher, cancel).await?;
                created.first().copied()
            }
            LeafStep::Revisit => None,
        };

        let (backprop_from, evaluation) = match target {
            Some(node_id) => (node_id, self.evaluate(tree, node_id, publisher, cancel).await?),
            None => {
                // Nothing new to score: reuse the leaf's score
                let tree = tree.lock().await;
                let score = tree
                    .get(policy.leaf)?
                    .evaluation_score()
                    .unwrap_or(NEUTRAL_SCORE);
                (
                    policy.leaf,
                    Evaluation {
                        score,
                        fallback: false,
                    },
                )
            }
        };

        self.backpropagate(tree, backprop_from, evaluation.score, publisher, cancel)
            .await?;

        Ok(IterationMetrics {
            leaf: policy.leaf,
            path_len: policy.path.len(),
            children_created: created.len(),
            evaluated: target,
            score: evaluation.score,
            fallback_score: evaluation.fallback,
        })
    }

    /// Ask the oracle for candidates and attach one child per distinct candidate.
    /// Oracle failure releases the claim so a later iteration can try again.
    async fn expand(
        &self,
        tree: &Mutex<SearchTree>,
        node_id: NodeId,
        limits: SearchLimits,
        publisher: &mut EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<Vec<NodeId>, SearchError> {
        ensure_live(cancel)?;

        let (state, wanted) = {
            let mut tree = tree.lock().await;
            tree.begin_expansion(node_id)?;
            let node = tree.get(node_id)?;
            let wanted = limits.branching_factor.saturating_sub(node.children().len());
            (node.state().clone(), wanted)
        };

        let result = self.oracle.generate_actions(&state, wanted).await;

        let (created, snapshots, stats) = {
            let mut tree = tree.lock().await;
            if cancel.is_cancelled() {
                tree.abort_expansion(node_id)?;
                return Err(SearchError::Cancelled);
            }

            let candidates = match result {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(node = node_id.index(), error = %err, "expansion failed, node stays expandable");
                    tree.abort_expansion(node_id)?;
                    return Ok(Vec::new());
                }
            };

            let mut created = Vec::new();
            for candidate in candidates.into_iter().take(wanted) {
                let action = candidate.trim();
                if action.is_empty() || tree.child_with_action(node_id, action)?.is_some() {
                    debug!(node = node_id.index(), "skipping empty or duplicate candidate");
                    continue;
                }
                let child_state = state.with_utterance(action);
                created.push(tree.add_child(node_id, action, child_state)?);
            }
            tree.finish_expansion(node_id)?;

            let snapshots = created
                .iter()
                .map(|child| tree.snapshot(*child))
                .collect::<Result<Vec<_>, _>>()?;
            (created, snapshots, tree.statistics())
        };

        for node in snapshots {
            emit(publisher, SearchEvent::Expansion { node }, stats, cancel).await?;
        }

        Ok(created)
    }

    /// Score one node, falling back to the neutral score when the oracle fails.
    async fn evaluate(
        &self,
        tree: &Mutex<SearchTree>,
        node_id: NodeId,
        publisher: &mut EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, SearchError> {
        ensure_live(cancel)?;

        let (state, snapshot, stats) = {
            let mut tree = tree.lock().await;
            tree.begin_evaluation(node_id)?;
            let state = tree.get(node_id)?.state().clone();
            (state, tree.snapshot(node_id)?, tree.statistics())
        };
        emit(publisher, SearchEvent::Evaluation { node: snapshot }, stats, cancel).await?;

        let result = self.oracle.evaluate_state(&state, state.goal()).await;
        ensure_live(cancel)?;

        let evaluation = match result.map(clamp_unit) {
            Ok(Some(score)) => Evaluation {
                score,
                fallback: false,
            },
            Ok(None) => {
                warn!(node = node_id.index(), "non-finite score, using neutral fallback");
                Evaluation {
                    score: NEUTRAL_SCORE,
                    fallback: true,
                }
            }
            Err(err) => {
                warn!(node = node_id.index(), error = %err, "evaluation failed, using neutral fallback");
                Evaluation {
                    score: NEUTRAL_SCORE,
                    fallback: true,
                }
            }
        };

        let (snapshot, stats) = {
            let mut tree = tree.lock().await;
            tree.complete_evaluation(node_id, evaluation.score)?;
            (tree.snapshot(node_id)?, tree.statistics())
        };
        emit(publisher, SearchEvent::Evaluation { node: snapshot }, stats, cancel).await?;

        Ok(evaluation)
    }

    /// Record `score` from `leaf` to the root and publish one event per touched node.
    async fn backpropagate(
        &self,
        tree: &Mutex<SearchTree>,
        leaf: NodeId,
        score: f64,
        publisher: &mut EventPublisher,
        cancel: &CancellationToken,
    ) -> Result<(), SearchError> {
        let (snapshots, stats): (Vec<NodeSnapshot>, TreeStatistics) = {
            let mut tree = tree.lock().await;
            let path = tree.backpropagate(leaf, score)?;
            let snapshots = path
                .iter()
                .map(|node_id| tree.snapshot(*node_id))
                .collect::<Result<Vec<_>, _>>()?;
            (snapshots, tree.statistics())
        };

        for node in snapshots {
            emit(publisher, SearchEvent::Backprop { node }, stats, cancel).await?;
        }
        Ok(())
    }

    async fn conclude(
        &self,
        tree: &Mutex<SearchTree>,
        termination: Termination,
        metrics: RunMetrics,
    ) -> Result<SearchOutcome, SearchError> {
        let tree = tree.lock().await;
        let ranked = tree.ranked_root_children()?;

        let mut options = Vec::with_capacity(ranked.len());
        for node_id in &ranked {
            if let Some(action) = tree.get(*node_id)?.action() {
                options.push(action.to_string());
            }
        }

        let state_evaluation = match ranked.first() {
            Some(best) => tree.get(*best)?.mean_value(),
            None => {
                let root = tree.root()?;
                if root.visits() > 0 {
                    root.mean_value()
                } else {
                    NEUTRAL_SCORE
                }
            }
        };

        Ok(SearchOutcome {
            best_action: options.first().cloned(),
            options,
            state_evaluation,
            termination,
            metrics,
            statistics: tree.statistics(),
        })
    }
}

/// Publish unless the search was cancelled, before or while waiting for the consumer.
async fn emit(
    publisher: &mut EventPublisher,
    event: SearchEvent,
    stats: TreeStatistics,
    cancel: &CancellationToken,
) -> Result<(), SearchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SearchError::Cancelled),
        sent = publisher.publish(event, stats) => Ok(sent?),
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), SearchError> {
    if cancel.is_cancelled() {
        Err(SearchError::Cancelled)
    } else {
        Ok(())
    }
}
