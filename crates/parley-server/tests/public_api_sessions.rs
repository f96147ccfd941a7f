use std::{sync::Arc, time::Duration};

use parley_core::{EventEnvelope, SearchConfig, SearchEvent, SearchRequest, testing::ScriptedOracle};
use parley_server::{SessionConfig, SessionError, SessionId, SessionManager, SubmitOutcome};
use tokio::{sync::mpsc::Receiver, time::Instant};

fn manager_with(oracle: ScriptedOracle) -> SessionManager {
    SessionManager::new(
        Arc::new(oracle),
        SearchConfig::default(),
        SessionConfig {
            event_buffer: 1024,
            ..SessionConfig::default()
        },
    )
}

fn manager() -> SessionManager {
    manager_with(ScriptedOracle::new())
}

fn request(goal: &str, messages: &[&str]) -> SearchRequest {
    SearchRequest {
        goal: goal.to_string(),
        messages: messages.iter().map(|m| m.to_string()).collect(),
        current_turn: 0,
        max_turns: 5,
    }
}

async fn until_complete(events: &mut Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut seen = Vec::new();
    while let Some(envelope) = events.recv().await {
        let done = matches!(envelope.event, SearchEvent::Complete { .. });
        seen.push(envelope);
        if done {
            break;
        }
    }
    seen
}

async fn wait_idle(manager: &SessionManager, id: SessionId) {
    while manager.is_searching(id).await.unwrap() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn identical_resubmission_keeps_the_tree() {
    let manager = manager();
    let (id, mut events) = manager.open().await;
    let req = request("extend deadline by 2 weeks", &["Hi, can we talk about the deadline?"]);

    assert_eq!(manager.submit(id, req.clone()).await.unwrap(), SubmitOutcome::Fresh);
    until_complete(&mut events).await;
    wait_idle(&manager, id).await;
    let first = manager.tree(id).await.unwrap().expect("tree after submit");

    let outcome = manager.submit(id, req).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Reused { continued: true });
    until_complete(&mut events).await;
    wait_idle(&manager, id).await;

    let second = manager.tree(id).await.unwrap().expect("tree kept");
    assert!(Arc::ptr_eq(&first, &second));
    let tree = second.lock().await;
    assert_eq!(tree.root().unwrap().visits(), 24);
}

#[tokio::test(start_paused = true)]
async fn resubmission_while_searching_does_not_restart() {
    let manager = manager_with(ScriptedOracle::new().with_delay(Duration::from_secs(1)));
    let (id, _events) = manager.open().await;
    let req = request("raise", &["Can we discuss my salary?"]);

    manager.submit(id, req.clone()).await.unwrap();
    assert!(manager.is_searching(id).await.unwrap());
    assert_eq!(
        manager.submit(id, req).await.unwrap(),
        SubmitOutcome::Reused { continued: false }
    );
}

#[tokio::test(start_paused = true)]
async fn changed_conversation_starts_from_a_fresh_root() {
    let manager = manager_with(ScriptedOracle::new().with_delay(Duration::from_secs(1)));
    let (id, mut events) = manager.open().await;
    let first = request("extend deadline", &["Hi, can we talk about the deadline?"]);

    manager.submit(id, first).await.unwrap();
    until_complete(&mut events).await;
    wait_idle(&manager, id).await;
    let old_tree = manager.tree(id).await.unwrap().unwrap();
    assert!(old_tree.lock().await.node_count() > 1);

    let advanced = request(
        "extend deadline",
        &["Hi, can we talk about the deadline?", "Sure, what do you need?"],
    );
    assert_eq!(manager.submit(id, advanced).await.unwrap(), SubmitOutcome::Advanced);
    let new_tree = manager.tree(id).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&old_tree, &new_tree));
    {
        let tree = new_tree.lock().await;
        assert_eq!(tree.statistics().total_nodes, 1);
        assert_ne!(tree.id(), old_tree.lock().await.id());
    }

    let diverged = request("extend deadline", &["Something else entirely"]);
    assert_eq!(manager.submit(id, diverged).await.unwrap(), SubmitOutcome::Stale);

    let new_goal = request("raise", &["Something else entirely"]);
    assert_eq!(manager.submit(id, new_goal).await.unwrap(), SubmitOutcome::Stale);
    let tree = manager.tree(id).await.unwrap().unwrap();
    assert_eq!(tree.lock().await.statistics().total_nodes, 1);
}

#[tokio::test]
async fn sessions_never_share_nodes_or_events() {
    let manager = manager();
    let (a, mut events_a) = manager.open().await;
    let (b, mut events_b) = manager.open().await;
    assert_ne!(a, b);

    manager
        .submit(a, request("extend deadline", &["Can we move the deadline?"]))
        .await
        .unwrap();
    manager
        .submit(b, request("raise", &["Can we discuss compensation?"]))
        .await
        .unwrap();

    let seen_a = until_complete(&mut events_a).await;
    let seen_b = until_complete(&mut events_b).await;

    let tree_a = manager.snapshot(a).await.unwrap().unwrap().tree_id;
    let tree_b = manager.snapshot(b).await.unwrap().unwrap().tree_id;
    assert_ne!(tree_a, tree_b);

    for (seen, own, other) in [(&seen_a, &tree_a, &tree_b), (&seen_b, &tree_b, &tree_a)] {
        assert_eq!(seen[0].seq, 1);
        for envelope in seen {
            if let Some(node) = envelope.event.node() {
                assert!(node.node_id.starts_with(&format!("{own}:")));
                assert!(!node.node_id.starts_with(&format!("{other}:")));
            }
        }
    }
}

#[tokio::test]
async fn snapshot_command_publishes_tree_and_dot() {
    let manager = manager();
    let (id, mut events) = manager.open().await;

    manager.publish_snapshot(id).await.unwrap();
    let envelope = events.recv().await.unwrap();
    assert!(matches!(envelope.event, SearchEvent::Error { .. }));

    manager
        .submit(id, request("extend deadline", &["Can we move the deadline?"]))
        .await
        .unwrap();
    until_complete(&mut events).await;
    wait_idle(&manager, id).await;

    manager.publish_snapshot(id).await.unwrap();
    let envelope = events.recv().await.unwrap();
    match envelope.event {
        SearchEvent::Snapshot { tree, dot } => {
            assert_eq!(tree.node_count, envelope.total_nodes);
            assert!(dot.starts_with("digraph mcts {"));
            assert!(dot.contains(&tree.root_node_id));
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn reset_drops_the_tree() {
    let manager = manager_with(ScriptedOracle::new().with_delay(Duration::from_secs(1)));
    let (id, _events) = manager.open().await;
    let req = request("raise", &["Can we discuss my salary?"]);

    manager.submit(id, req.clone()).await.unwrap();
    manager.reset(id).await.unwrap();
    assert!(manager.tree(id).await.unwrap().is_none());
    assert!(!manager.is_searching(id).await.unwrap());

    assert_eq!(manager.submit(id, req).await.unwrap(), SubmitOutcome::Fresh);
}

#[tokio::test]
async fn closed_sessions_are_forgotten() {
    let manager = manager();
    let (id, mut events) = manager.open().await;
    assert_eq!(manager.session_count().await, 1);

    manager.close(id).await;
    assert_eq!(manager.session_count().await, 0);
    assert!(events.recv().await.is_none());

    let err = manager
        .submit(id, request("raise", &["hello"]))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::UnknownSession(id));
}

#[tokio::test(start_paused = true)]
async fn idle_sessions_are_reaped() {
    let manager = manager();
    let (stale, mut stale_events) = manager.open().await;
    tokio::time::advance(Duration::from_secs(600)).await;
    let (fresh, _fresh_events) = manager.open().await;

    let reaped = manager
        .reap_idle(Instant::now() + Duration::from_secs(400))
        .await;

    assert_eq!(reaped, vec![stale]);
    assert_eq!(manager.session_count().await, 1);
    assert!(stale_events.recv().await.is_none());
    assert!(manager.tree(fresh).await.is_ok());
}
