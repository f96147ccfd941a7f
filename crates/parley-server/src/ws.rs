//! WebSocket stream of search events, one session per connection.

use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use parley_core::SearchRequest;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    sessions::{SessionError, SessionId},
    state::AppState,
};

/// How long the forward task may take to flush and send the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Command { command: Command },
    Submit(SubmitFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Command {
    Snapshot,
    Reset,
}

#[derive(Debug, Deserialize)]
struct SubmitFrame {
    goal: String,
    messages: Vec<String>,
    #[serde(default)]
    current_turn: u32,
    max_turns: Option<u32>,
}

/// GET /ws/mcts
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut events) = state.sessions.open().await;
    info!(session = %id, "websocket connected");

    let (mut sender, mut receiver) = socket.split();

    let mut forward = tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            let json = match envelope.to_json() {
                Ok(json) => json,
                Err(err) => {
                    warn!(seq = envelope.seq, error = %err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        // channel closed means the session is gone
        if let Err(err) = sender.send(Message::Close(None)).await {
            debug!(error = %err, "close frame not sent");
        }
    });

    let mut forward_done = false;
    loop {
        let handled = tokio::select! {
            _ = &mut forward => {
                forward_done = true;
                break;
            }
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&state, id, text.as_str()).await,
                Some(Ok(Message::Binary(_))) => {
                    report(&state, id, "binary frames are not supported".to_string()).await
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => Ok(()),
                Some(Err(err)) => {
                    debug!(session = %id, error = %err, "websocket receive failed");
                    break;
                }
            },
        };

        if let Err(err) = handled {
            info!(session = %id, error = %err, "session expired, closing websocket");
            break;
        }
    }

    state.sessions.close(id).await;
    if !forward_done && timeout(CLOSE_GRACE, &mut forward).await.is_err() {
        forward.abort();
    }
    info!(session = %id, "websocket disconnected");
}

/// Act on one text frame. Fails only when the session no longer exists.
async fn handle_frame(state: &AppState, id: SessionId, text: &str) -> Result<(), SessionError> {
    let inbound = match serde_json::from_str::<Inbound>(text) {
        Ok(inbound) => inbound,
        Err(err) => return report(state, id, format!("invalid message: {err}")).await,
    };

    match inbound {
        Inbound::Command {
            command: Command::Snapshot,
        } => state.sessions.publish_snapshot(id).await,
        Inbound::Command {
            command: Command::Reset,
        } => state.sessions.reset(id).await,
        Inbound::Submit(frame) => {
            if frame.goal.trim().is_empty() {
                return report(state, id, "goal must not be empty".to_string()).await;
            }
            let request = SearchRequest {
                goal: frame.goal,
                messages: frame.messages,
                current_turn: frame.current_turn,
                max_turns: frame.max_turns.unwrap_or(state.default_max_turns()),
            };
            state.sessions.submit(id, request).await.map(|_| ())
        }
    }
}

async fn report(state: &AppState, id: SessionId, message: String) -> Result<(), SessionError> {
    debug!(session = %id, reason = %message, "rejecting websocket frame");
    state.sessions.publish_error(id, message).await
}
