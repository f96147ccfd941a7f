//! Per-connection search sessions.
//!
//! Each session owns one search tree, one event channel, one logical clock
//! and at most one running search task. Sessions never share trees.

use std::{collections::HashMap, fmt, sync::Arc};

use parley_core::{
    EventEnvelope, EventPublisher, LogicalClock, Oracle, SearchConfig, SearchController,
    SearchError, SearchEvent, SearchRequest, SearchTree, SharedTree, Submission, TreeSnapshot,
    TreeStatistics,
};
use thiserror::Error;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;

const DOT_MAX_DEPTH: u32 = 5;
const DOT_MAX_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// What a submission did to the session's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First submission on the session: new tree, search started.
    Fresh,
    /// Same conversation as before. The tree is kept; `continued` is true when
    /// no search was running and a continuation search was started.
    Reused { continued: bool },
    /// The conversation moved forward: fresh root, search restarted.
    Advanced,
    /// Goal changed, history diverged or the previous search failed: fresh root.
    Stale,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

struct SearchTask {
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), SearchError>>,
}

impl SearchTask {
    fn stop(self) {
        self.cancel.cancel();
    }
}

struct Session {
    tree: Option<SharedTree>,
    last_request: Option<SearchRequest>,
    clock: LogicalClock,
    events: mpsc::Sender<EventEnvelope>,
    task: Option<SearchTask>,
    last_active: Instant,
}

impl Session {
    fn publisher(&self, settings: &SessionConfig) -> EventPublisher {
        EventPublisher::new(
            self.events.clone(),
            self.clock.clone(),
            settings.publish_timeout(),
        )
    }

    fn stop_search(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop();
        }
    }
}

/// Owns every live session and their search tasks.
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Session>>,
    oracle: Arc<dyn Oracle>,
    search: Arc<SearchConfig>,
    settings: SessionConfig,
}

impl SessionManager {
    pub fn new(oracle: Arc<dyn Oracle>, search: SearchConfig, settings: SessionConfig) -> Self {
        SessionManager {
            sessions: Mutex::new(HashMap::new()),
            oracle,
            search: Arc::new(search),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    /// Register a new session and hand back the receiving end of its event stream.
    pub async fn open(&self) -> (SessionId, mpsc::Receiver<EventEnvelope>) {
        let id = SessionId::new();
        let (events, receiver) = mpsc::channel(self.settings.event_buffer);
        let session = Session {
            tree: None,
            last_request: None,
            clock: LogicalClock::new(),
            events,
            task: None,
            last_active: Instant::now(),
        };
        self.sessions.lock().await.insert(id, session);
        debug!(session = %id, "session opened");
        (id, receiver)
    }

    /// Start, restart or continue the session's search for `request`.
    pub async fn submit(
        &self,
        id: SessionId,
        request: SearchRequest,
    ) -> Result<SubmitOutcome, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.last_active = Instant::now();

        let mut submission = request.classify(session.last_request.as_ref());

        let mut running = false;
        if let Some(task) = session.task.take() {
            if task.handle.is_finished() {
                match task.handle.await {
                    Ok(Ok(())) | Ok(Err(SearchError::Cancelled)) => {}
                    Ok(Err(err)) => {
                        debug!(session = %id, error = %err, "previous search failed, resetting");
                        submission = Submission::Stale;
                    }
                    Err(err) => {
                        warn!(session = %id, error = %err, "search task panicked, resetting");
                        submission = Submission::Stale;
                    }
                }
            } else {
                running = true;
                session.task = Some(task);
            }
        }

        let outcome = match submission {
            Submission::Unchanged => {
                if !running {
                    self.spawn_search(id, session);
                }
                SubmitOutcome::Reused { continued: !running }
            }
            other => {
                session.stop_search();
                session.tree = Some(Arc::new(Mutex::new(SearchTree::new(request.root_state()))));
                session.last_request = Some(request);
                self.spawn_search(id, session);
                match other {
                    Submission::Fresh => SubmitOutcome::Fresh,
                    Submission::Advanced => SubmitOutcome::Advanced,
                    _ => SubmitOutcome::Stale,
                }
            }
        };

        info!(session = %id, outcome = ?outcome, "submission accepted");
        Ok(outcome)
    }

    fn spawn_search(&self, id: SessionId, session: &mut Session) {
        let Some(tree) = session.tree.clone() else {
            return;
        };
        let cancel = CancellationToken::new();
        let publisher = session.publisher(&self.settings);
        let handle = tokio::spawn(run_search(
            id,
            self.search.clone(),
            self.oracle.clone(),
            tree,
            publisher,
            cancel.clone(),
        ));
        session.task = Some(SearchTask { cancel, handle });
    }

    /// Cancel the running search and drop the tree; the next submission starts fresh.
    pub async fn reset(&self, id: SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.stop_search();
        session.tree = None;
        session.last_request = None;
        session.last_active = Instant::now();
        info!(session = %id, "session reset");
        Ok(())
    }

    /// Remove the session and cancel its search.
    pub async fn close(&self, id: SessionId) {
        if let Some(mut session) = self.sessions.lock().await.remove(&id) {
            session.stop_search();
            debug!(session = %id, "session closed");
        }
    }

    /// Close every session idle for longer than the configured timeout.
    pub async fn reap_idle(&self, now: Instant) -> Vec<SessionId> {
        let idle_timeout = self.settings.idle_timeout();
        let mut sessions = self.sessions.lock().await;
        let idle: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| now.saturating_duration_since(session.last_active) > idle_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &idle {
            if let Some(mut session) = sessions.remove(id) {
                session.stop_search();
                info!(session = %id, "idle session reaped");
            }
        }
        idle
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether a search task is currently running for the session.
    pub async fn is_searching(&self, id: SessionId) -> Result<bool, SessionError> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
        Ok(session
            .task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished()))
    }

    /// The session's current tree, if a conversation was submitted.
    pub async fn tree(&self, id: SessionId) -> Result<Option<SharedTree>, SessionError> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
        Ok(session.tree.clone())
    }

    /// Snapshot of the whole tree, taken between search steps.
    pub async fn snapshot(&self, id: SessionId) -> Result<Option<TreeSnapshot>, SessionError> {
        let Some(tree) = self.tree(id).await? else {
            return Ok(None);
        };
        let tree = tree.lock().await;
        match tree.snapshot_all() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(session = %id, error = %err, "snapshot failed");
                Ok(None)
            }
        }
    }

    /// Send the tree snapshot and its DOT rendering down the session's event stream.
    pub async fn publish_snapshot(&self, id: SessionId) -> Result<(), SessionError> {
        let mut publisher = self.publisher(id).await?;
        let event = match self.snapshot(id).await? {
            Some(tree) => {
                let dot = tree.to_dot(DOT_MAX_DEPTH, DOT_MAX_WIDTH);
                SearchEvent::Snapshot { tree, dot }
            }
            None => SearchEvent::Error {
                message: "no conversation submitted yet".to_string(),
            },
        };
        let stats = self.statistics(id).await?;
        if publisher.publish(event, stats).await.is_err() {
            debug!(session = %id, "snapshot not delivered, channel closed");
        }
        Ok(())
    }

    /// Report a problem to the session's client without touching its search.
    pub async fn publish_error(&self, id: SessionId, message: String) -> Result<(), SessionError> {
        let mut publisher = self.publisher(id).await?;
        let stats = self.statistics(id).await?;
        deliver_error(id, &mut publisher, message, stats).await;
        Ok(())
    }

    async fn publisher(&self, id: SessionId) -> Result<EventPublisher, SessionError> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
        Ok(session.publisher(&self.settings))
    }

    async fn statistics(&self, id: SessionId) -> Result<TreeStatistics, SessionError> {
        Ok(match self.tree(id).await? {
            Some(tree) => tree.lock().await.statistics(),
            None => TreeStatistics::default(),
        })
    }
}

async fn run_search(
    id: SessionId,
    config: Arc<SearchConfig>,
    oracle: Arc<dyn Oracle>,
    tree: SharedTree,
    mut publisher: EventPublisher,
    cancel: CancellationToken,
) -> Result<(), SearchError> {
    let controller = SearchController::new(config.as_ref(), oracle.as_ref());
    match controller.run(&tree, &mut publisher, &cancel).await {
        Ok(outcome) => {
            info!(
                session = %id,
                options = outcome.options.len(),
                state_evaluation = outcome.state_evaluation,
                dropped_events = publisher.dropped(),
                "search complete"
            );
            Ok(())
        }
        Err(SearchError::Cancelled) => {
            debug!(session = %id, "search cancelled");
            Err(SearchError::Cancelled)
        }
        Err(SearchError::ChannelClosed) => {
            debug!(session = %id, "client gone, search stopped");
            Err(SearchError::ChannelClosed)
        }
        Err(err) => {
            warn!(session = %id, error = %err, "search failed");
            let stats = tree.lock().await.statistics();
            deliver_error(id, &mut publisher, err.to_string(), stats).await;
            Err(err)
        }
    }
}

/// Best effort: a client that already left cannot be told anything.
/// Returns whether the event reached the channel.
async fn deliver_error(
    id: SessionId,
    publisher: &mut EventPublisher,
    message: String,
    stats: TreeStatistics,
) -> bool {
    match publisher.publish(SearchEvent::Error { message }, stats).await {
        Ok(()) => true,
        Err(err) => {
            debug!(session = %id, error = %err, "error event not delivered");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn publisher_for(capacity: usize) -> (EventPublisher, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        let publisher = EventPublisher::new(tx, LogicalClock::new(), Duration::from_millis(50));
        (publisher, rx)
    }

    #[tokio::test]
    async fn failure_reaches_a_listening_client() {
        let (mut publisher, mut rx) = publisher_for(4);
        let id = SessionId::new();

        let delivered =
            deliver_error(id, &mut publisher, "tree broke".to_string(), TreeStatistics::default())
                .await;

        assert!(delivered);
        let envelope = rx.recv().await.unwrap();
        assert_eq!(
            envelope.event,
            SearchEvent::Error {
                message: "tree broke".to_string()
            }
        );
    }

    #[tokio::test]
    async fn failure_after_the_client_left_is_not_delivered() {
        let (mut publisher, rx) = publisher_for(4);
        drop(rx);

        let delivered = deliver_error(
            SessionId::new(),
            &mut publisher,
            "tree broke".to_string(),
            TreeStatistics::default(),
        )
        .await;

        assert!(!delivered);
    }
}
