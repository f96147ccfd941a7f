//! Search telemetry: the events a search emits and the publisher that
//! stamps and delivers them.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc, time::timeout};
use tracing::debug;

use crate::tree::{
    snapshot::{NodeSnapshot, TreeSnapshot},
    stats::TreeStatistics,
};

/// Externally visible search events, tagged by `event_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SearchEvent {
    Expansion {
        node: NodeSnapshot,
    },
    Evaluation {
        node: NodeSnapshot,
    },
    Backprop {
        node: NodeSnapshot,
    },
    Complete {
        best_action: Option<String>,
        options: Vec<String>,
        state_evaluation: f64,
    },
    Error {
        message: String,
    },
    Snapshot {
        tree: TreeSnapshot,
        dot: String,
    },
}

impl SearchEvent {
    /// The node carried by node-level events.
    pub fn node(&self) -> Option<&NodeSnapshot> {
        match self {
            SearchEvent::Expansion { node }
            | SearchEvent::Evaluation { node }
            | SearchEvent::Backprop { node } => Some(node),
            _ => None,
        }
    }
}

/// An event as delivered: ordered by the session clock and carrying the tree
/// statistics at emission time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: SearchEvent,
    pub total_nodes: usize,
    pub max_depth: u32,
}

impl EventEnvelope {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Monotonic logical clock shared by everything that emits on one session.
///
/// Publishers stamp and enqueue under the clock's lock, so a consumer of one
/// channel sees `seq` strictly increasing even with several publishers.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock(Arc<Mutex<u64>>);

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next tick, starting at 1.
    pub fn tick(&self) -> u64 {
        self.stamp(|seq| seq)
    }

    pub fn current(&self) -> u64 {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the clock and run `with` on the new tick before anyone else can.
    fn stamp<R>(&self, with: impl FnOnce(u64) -> R) -> R {
        let mut seq = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *seq += 1;
        with(*seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The receiving side is gone; nobody will ever read further events.
    #[error("event channel closed")]
    Closed,
}

/// Delivers events to a bounded channel without ever blocking the search for
/// longer than `publish_timeout` per event.
#[derive(Debug)]
pub struct EventPublisher {
    sink: Option<mpsc::Sender<EventEnvelope>>,
    clock: LogicalClock,
    publish_timeout: Duration,
    dropped: u64,
}

impl EventPublisher {
    pub fn new(
        sink: mpsc::Sender<EventEnvelope>,
        clock: LogicalClock,
        publish_timeout: Duration,
    ) -> Self {
        EventPublisher {
            sink: Some(sink),
            clock,
            publish_timeout,
            dropped: 0,
        }
    }

    /// A publisher with no consumer; every event is discarded.
    pub fn detached() -> Self {
        EventPublisher {
            sink: None,
            clock: LogicalClock::new(),
            publish_timeout: Duration::ZERO,
            dropped: 0,
        }
    }

    /// Events given up on because the consumer did not keep up.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub async fn publish(
        &mut self,
        event: SearchEvent,
        stats: TreeStatistics,
    ) -> Result<(), PublishError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        // the tick is taken only once a slot is held, so dropped events leave no gap
        let permit = match timeout(self.publish_timeout, sink.reserve()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PublishError::Closed),
            Err(_) => {
                self.dropped += 1;
                debug!(dropped = self.dropped, "slow consumer, event dropped");
                return Ok(());
            }
        };

        self.clock.stamp(|seq| {
            permit.send(EventEnvelope {
                seq,
                event,
                total_nodes: stats.total_nodes,
                max_depth: stats.max_depth,
            })
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> TreeStatistics {
        TreeStatistics {
            total_nodes: 3,
            max_depth: 1,
        }
    }

    fn error_event(message: &str) -> SearchEvent {
        SearchEvent::Error {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn envelopes_carry_increasing_sequence_numbers() {
        let (tx, mut rx) = mpsc::channel(8);
        let clock = LogicalClock::new();
        let mut publisher = EventPublisher::new(tx, clock.clone(), Duration::from_millis(50));

        publisher.publish(error_event("a"), stats()).await.unwrap();
        publisher.publish(error_event("b"), stats()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(first.total_nodes, 3);
        assert_eq!(clock.current(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut publisher = EventPublisher::new(tx, LogicalClock::new(), Duration::from_millis(10));

        publisher.publish(error_event("kept"), stats()).await.unwrap();
        publisher.publish(error_event("dropped"), stats()).await.unwrap();

        assert_eq!(publisher.dropped(), 1);
        let kept = rx.recv().await.unwrap();
        assert_eq!(kept.event, error_event("kept"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_events_leave_no_sequence_gap() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut publisher = EventPublisher::new(tx, LogicalClock::new(), Duration::from_millis(10));

        publisher.publish(error_event("first"), stats()).await.unwrap();
        publisher.publish(error_event("dropped"), stats()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().seq, 1);

        publisher.publish(error_event("second"), stats()).await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, error_event("second"));
        assert_eq!(second.seq, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn publishers_sharing_a_clock_deliver_in_sequence_order() {
        let (tx, mut rx) = mpsc::channel(1);
        let clock = LogicalClock::new();
        let mut search = EventPublisher::new(tx.clone(), clock.clone(), Duration::from_secs(5));
        let mut side = EventPublisher::new(tx, clock.clone(), Duration::from_secs(5));

        search.publish(error_event("fills the channel"), stats()).await.unwrap();
        let waiting = tokio::spawn(async move {
            for name in ["a", "b", "c"] {
                search.publish(error_event(name), stats()).await.unwrap();
            }
        });
        let snapshot = tokio::spawn(async move {
            side.publish(error_event("snapshot"), stats()).await.unwrap();
        });

        let mut seqs = Vec::new();
        for _ in 0..5 {
            seqs.push(rx.recv().await.unwrap().seq);
        }
        waiting.await.unwrap();
        snapshot.await.unwrap();

        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(clock.current(), 5);
    }

    #[tokio::test]
    async fn closed_channel_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut publisher = EventPublisher::new(tx, LogicalClock::new(), Duration::from_millis(10));

        let err = publisher
            .publish(error_event("lost"), stats())
            .await
            .expect_err("closed receiver should fail");
        assert_eq!(err, PublishError::Closed);
    }

    #[tokio::test]
    async fn detached_publisher_accepts_everything() {
        let mut publisher = EventPublisher::detached();
        publisher.publish(error_event("x"), stats()).await.unwrap();
        assert_eq!(publisher.dropped(), 0);
    }

    #[test]
    fn wire_format_flattens_event_into_envelope() {
        let envelope = EventEnvelope {
            seq: 7,
            event: SearchEvent::Complete {
                best_action: Some("Could we do two weeks?".to_string()),
                options: vec!["Could we do two weeks?".to_string()],
                state_evaluation: 0.8,
            },
            total_nodes: 4,
            max_depth: 1,
        };

        let value: serde_json::Value =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["event_type"], "complete");
        assert_eq!(value["best_action"], "Could we do two weeks?");
        assert_eq!(value["options"][0], "Could we do two weeks?");
        assert_eq!(value["state_evaluation"], 0.8);
        assert_eq!(value["total_nodes"], 4);
        assert_eq!(value["max_depth"], 1);
        assert_eq!(value["seq"], 7);
    }
}
