use std::{collections::HashMap, time::Duration};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    ConversationState, EventEnvelope, EventPublisher, LogicalClock, NodeStatus, SearchConfig,
    SearchController, SearchError, SearchEvent, SearchTree, testing::ScriptedOracle,
};

fn state() -> ConversationState {
    ConversationState::new(
        "extend deadline by 2 weeks",
        vec!["Hi, can we talk about the deadline?".to_string()],
        0,
        3,
    )
}

async fn run_and_collect(iterations: usize) -> (Vec<EventEnvelope>, SearchTree) {
    let config = SearchConfig {
        iterations,
        ..SearchConfig::default()
    };
    let oracle = ScriptedOracle::new();
    let tree = Mutex::new(SearchTree::new(state()));
    let (tx, mut rx) = mpsc::channel(4096);
    let mut publisher = EventPublisher::new(tx, LogicalClock::new(), Duration::from_secs(1));

    SearchController::new(&config, &oracle)
        .run(&tree, &mut publisher, &CancellationToken::new())
        .await
        .expect("search should finish");
    drop(publisher);

    let mut events = Vec::new();
    while let Some(envelope) = rx.recv().await {
        events.push(envelope);
    }
    (events, tree.into_inner())
}

fn kind(event: &SearchEvent) -> &'static str {
    match event {
        SearchEvent::Expansion { .. } => "expansion",
        SearchEvent::Evaluation { .. } => "evaluation",
        SearchEvent::Backprop { .. } => "backprop",
        SearchEvent::Complete { .. } => "complete",
        SearchEvent::Error { .. } => "error",
        SearchEvent::Snapshot { .. } => "snapshot",
    }
}

#[tokio::test]
async fn sequence_numbers_increase_and_complete_comes_last() {
    let (events, _) = run_and_collect(8).await;

    assert!(events.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    assert_eq!(events.first().map(|e| e.seq), Some(1));

    let last = events.last().expect("at least the completion event");
    assert!(matches!(last.event, SearchEvent::Complete { .. }));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.event, SearchEvent::Complete { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn each_node_is_created_then_scored_then_backpropagated() {
    let (events, tree) = run_and_collect(12).await;
    let root_key = tree.node_key(tree.root_id());

    let mut per_node: HashMap<String, Vec<(&'static str, NodeStatus)>> = HashMap::new();
    for envelope in &events {
        if let Some(node) = envelope.event.node() {
            per_node
                .entry(node.node_id.clone())
                .or_default()
                .push((kind(&envelope.event), node.status));
        }
    }

    for (node_id, history) in &per_node {
        let position = |wanted: &str| history.iter().position(|(k, _)| *k == wanted);

        if *node_id == root_key {
            assert_eq!(position("expansion"), None);
        } else {
            assert_eq!(position("expansion"), Some(0), "{node_id}: {history:?}");
        }

        if let Some(first_eval) = position("evaluation") {
            assert_eq!(history[first_eval].1, NodeStatus::Evaluating);
            assert_eq!(history[first_eval + 1], ("evaluation", NodeStatus::Complete));
            if let Some(first_backprop) = position("backprop") {
                assert!(first_eval < first_backprop, "{node_id}: {history:?}");
            }
        }

        // backprop never reports a node that was not scored
        for (kind, status) in history {
            if *kind == "backprop" && *node_id != root_key {
                assert_eq!(*status, NodeStatus::Complete, "{node_id}");
            }
        }
    }
}

#[tokio::test]
async fn envelope_statistics_track_tree_growth() {
    let (events, tree) = run_and_collect(12).await;

    assert!(events.windows(2).all(|pair| pair[0].total_nodes <= pair[1].total_nodes));
    let last = events.last().unwrap();
    assert_eq!(last.total_nodes, tree.node_count());
    assert_eq!(last.max_depth, tree.statistics().max_depth);
}

#[tokio::test]
async fn dropped_receiver_aborts_the_search() {
    let config = SearchConfig::default();
    let oracle = ScriptedOracle::new();
    let tree = Mutex::new(SearchTree::new(state()));
    let (tx, rx) = mpsc::channel(16);
    drop(rx);
    let mut publisher = EventPublisher::new(tx, LogicalClock::new(), Duration::from_millis(10));

    let err = SearchController::new(&config, &oracle)
        .run(&tree, &mut publisher, &CancellationToken::new())
        .await
        .expect_err("closed channel should abort");
    assert!(matches!(err, SearchError::ChannelClosed));
}
