use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::ConversationState;

/// Score assigned when the oracle cannot produce one: the midpoint of `[0, 1]`.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Failure kinds of the language oracle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Transport failure or per-call timeout.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The response could not be parsed into the requested shape.
    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

/// Move generator and position evaluator for conversation states.
///
/// Implementations are expected to be safe to retry; the underlying model
/// may still answer differently each time.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Propose exactly `k` candidate next utterances, best guess first.
    async fn generate_actions(
        &self,
        state: &ConversationState,
        k: usize,
    ) -> Result<Vec<String>, OracleError>;

    /// Score how close `state` is to achieving `goal`, in `[0, 1]`.
    async fn evaluate_state(&self, state: &ConversationState, goal: &str)
    -> Result<f64, OracleError>;
}

#[async_trait]
impl<O: Oracle + ?Sized> Oracle for Arc<O> {
    async fn generate_actions(
        &self,
        state: &ConversationState,
        k: usize,
    ) -> Result<Vec<String>, OracleError> {
        (**self).generate_actions(state, k).await
    }

    async fn evaluate_state(
        &self,
        state: &ConversationState,
        goal: &str,
    ) -> Result<f64, OracleError> {
        (**self).evaluate_state(state, goal).await
    }
}

/// Clamp an oracle score into `[0, 1]`. Non-finite values have no meaningful
/// clamp and yield `None`.
pub fn clamp_unit(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value.clamp(0.0, 1.0))
    } else {
        None
    }
}
