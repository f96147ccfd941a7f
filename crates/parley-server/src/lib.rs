//! HTTP and WebSocket surface for the negotiation copilot.

pub mod config;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;
use tokio::time::{Instant, interval};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

pub use config::{ConfigError, ServerConfig, SessionConfig};
pub use sessions::{SessionError, SessionId, SessionManager, SubmitOutcome};
pub use state::AppState;

/// Build the full application router with permissive CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::router().layer(cors).with_state(state)
}

/// Periodically close sessions that have been idle too long.
pub fn spawn_reaper(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let reaped = state.sessions.reap_idle(Instant::now()).await;
            if !reaped.is_empty() {
                debug!(reaped = reaped.len(), "reaper pass");
            }
        }
    })
}
