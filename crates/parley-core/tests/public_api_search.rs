use std::sync::Arc;

use parley_core::{
    ConversationState, EventPublisher, SearchConfig, SearchController, SearchRequest, SearchTree,
    SharedTree, Submission, testing::ScriptedOracle,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn request(messages: &[&str], current_turn: u32) -> SearchRequest {
    SearchRequest {
        goal: "extend deadline by 2 weeks".to_string(),
        messages: messages.iter().map(|m| m.to_string()).collect(),
        current_turn,
        max_turns: 3,
    }
}

#[tokio::test]
async fn public_search_prefers_the_higher_scoring_opening() {
    let config = SearchConfig {
        iterations: 12,
        ..SearchConfig::default()
    };
    let oracle = ScriptedOracle::new()
        .with_actions(|state, k| {
            Ok((0..k)
                .map(|i| format!("turn {} proposal {i}", state.current_turn()))
                .collect())
        })
        .with_score_table(
            &[
                ("turn 0 proposal 0", 0.2),
                ("turn 0 proposal 1", 0.8),
                ("turn 0 proposal 2", 0.4),
            ],
            0.5,
        );

    let request = request(&["Hi, can we talk about the deadline?"], 0);
    let tree: SharedTree = Arc::new(Mutex::new(SearchTree::new(request.root_state())));

    let outcome = SearchController::new(&config, &oracle)
        .run(&tree, &mut EventPublisher::detached(), &CancellationToken::new())
        .await
        .expect("search should succeed");

    assert_eq!(outcome.best_action.as_deref(), Some("turn 0 proposal 1"));
    assert_eq!(outcome.options.len(), 3);
    assert!(outcome.state_evaluation > 0.5);
    assert!(outcome.statistics.total_nodes > 4);
}

#[test]
fn public_submission_classification_drives_reuse() {
    let searched = request(&["Hi"], 0);

    assert_eq!(searched.classify(None), Submission::Fresh);
    assert_eq!(searched.clone().classify(Some(&searched)), Submission::Unchanged);
    assert_eq!(
        request(&["Hi", "Sure"], 1).classify(Some(&searched)),
        Submission::Advanced
    );
    assert_eq!(request(&["Hello"], 0).classify(Some(&searched)), Submission::Stale);
    assert!(!Submission::Unchanged.requires_reset());
    assert!(Submission::Advanced.requires_reset());
}

#[test]
fn public_root_state_mirrors_request() {
    let state: ConversationState = request(&["Hi"], 1).root_state();
    assert_eq!(state.messages(), ["Hi"]);
    assert_eq!(state.current_turn(), 1);
    assert_eq!(state.remaining_turns(), 2);
}
