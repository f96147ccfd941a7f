//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parley_core::{EventPublisher, SearchController, SearchRequest, SearchTree};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{state::AppState, ws::ws_handler};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/negotiate", post(negotiate))
        .route("/ws/mcts", get(ws_handler))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct NegotiationRequest {
    pub goal: String,
    pub messages: Vec<String>,
    #[serde(default)]
    pub current_turn: u32,
    pub max_turns: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NegotiationResponse {
    pub options: Vec<String>,
    pub state_evaluation: f64,
    pub visualization_url: Option<String>,
}

/// POST /negotiate - run one search to completion and return the ranked options.
async fn negotiate(
    State(state): State<AppState>,
    Json(req): Json<NegotiationRequest>,
) -> Result<Json<NegotiationResponse>, ApiError> {
    if req.goal.trim().is_empty() {
        return Err(ApiError::BadRequest("goal must not be empty".to_string()));
    }

    let request = SearchRequest {
        goal: req.goal,
        messages: req.messages,
        current_turn: req.current_turn,
        max_turns: req.max_turns.unwrap_or(state.default_max_turns()),
    };
    let tree = Mutex::new(SearchTree::new(request.root_state()));

    let outcome = SearchController::new(state.search.as_ref(), state.oracle.as_ref())
        .run(&tree, &mut EventPublisher::detached(), &CancellationToken::new())
        .await
        .map_err(|err| {
            error!(error = %err, "negotiate search failed");
            ApiError::Internal(format!("Error processing request: {err}"))
        })?;

    if outcome.options.is_empty() {
        return Err(ApiError::BadRequest(
            "No valid response options available".to_string(),
        ));
    }

    info!(
        options = outcome.options.len(),
        state_evaluation = outcome.state_evaluation,
        iterations = outcome.metrics.iterations_completed,
        "negotiate finished"
    );

    Ok(Json(NegotiationResponse {
        options: outcome.options,
        state_evaluation: outcome.state_evaluation,
        visualization_url: state.visualization_url.clone(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
