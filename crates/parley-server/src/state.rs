//! Shared application state for the HTTP and WebSocket handlers.

use std::sync::Arc;

use parley_core::{Oracle, SearchConfig};

use crate::{config::ServerConfig, sessions::SessionManager};

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub oracle: Arc<dyn Oracle>,
    pub search: Arc<SearchConfig>,
    /// Echoed back by `/negotiate` so clients can link to a tree viewer.
    pub visualization_url: Option<String>,
}

impl AppState {
    pub fn new(config: &ServerConfig, oracle: Arc<dyn Oracle>) -> Self {
        let sessions = SessionManager::new(
            oracle.clone(),
            config.search.clone(),
            config.sessions.clone(),
        );
        AppState {
            sessions: Arc::new(sessions),
            oracle,
            search: Arc::new(config.search.clone()),
            visualization_url: config.visualization_url.clone(),
        }
    }

    pub fn default_max_turns(&self) -> u32 {
        self.search.default_max_turns
    }
}
