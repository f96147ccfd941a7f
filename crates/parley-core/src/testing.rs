//! Deterministic oracle for headless tests of the search loop.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    conversation::ConversationState,
    oracle::{Oracle, OracleError},
};

type ActionFn = dyn Fn(&ConversationState, usize) -> Result<Vec<String>, OracleError> + Send + Sync;
type ScoreFn = dyn Fn(&ConversationState) -> Result<f64, OracleError> + Send + Sync;

/// Oracle whose answers are pure functions of the conversation state.
///
/// By default it proposes `"option {i} at turn {t}"` candidates and scores a
/// state by how many of its utterances contain the word "deadline".
pub struct ScriptedOracle {
    actions: Box<ActionFn>,
    scores: Box<ScoreFn>,
    delay: Duration,
    generate_calls: AtomicUsize,
    evaluate_calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        ScriptedOracle {
            actions: Box::new(|state, k| {
                Ok((1..=k)
                    .map(|i| format!("option {i} at turn {}", state.current_turn()))
                    .collect())
            }),
            scores: Box::new(|state| {
                let hits = state
                    .messages()
                    .iter()
                    .filter(|message| message.contains("deadline"))
                    .count();
                Ok((hits as f64 * 0.25).min(1.0))
            }),
            delay: Duration::ZERO,
            generate_calls: AtomicUsize::new(0),
            evaluate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_actions<F>(mut self, actions: F) -> Self
    where
        F: Fn(&ConversationState, usize) -> Result<Vec<String>, OracleError> + Send + Sync + 'static,
    {
        self.actions = Box::new(actions);
        self
    }

    pub fn with_scores<F>(mut self, scores: F) -> Self
    where
        F: Fn(&ConversationState) -> Result<f64, OracleError> + Send + Sync + 'static,
    {
        self.scores = Box::new(scores);
        self
    }

    /// Score every state by looking up its last utterance; unknown utterances score `default`.
    pub fn with_score_table(self, table: &[(&str, f64)], default: f64) -> Self {
        let table: Vec<(String, f64)> = table
            .iter()
            .map(|(action, score)| (action.to_string(), *score))
            .collect();
        self.with_scores(move |state| {
            let last = state.messages().last().map(String::as_str);
            Ok(table
                .iter()
                .find(|(action, _)| Some(action.as_str()) == last)
                .map(|(_, score)| *score)
                .unwrap_or(default))
        })
    }

    /// Every evaluation fails with `Malformed`.
    pub fn with_malformed_scores(self) -> Self {
        self.with_scores(|_| Err(OracleError::Malformed("no number in response".to_string())))
    }

    /// Every generation fails with `Unavailable`.
    pub fn with_unavailable_actions(self) -> Self {
        self.with_actions(|_, _| Err(OracleError::Unavailable("connection refused".to_string())))
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate_actions(
        &self,
        state: &ConversationState,
        k: usize,
    ) -> Result<Vec<String>, OracleError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        (self.actions)(state, k)
    }

    async fn evaluate_state(
        &self,
        state: &ConversationState,
        _goal: &str,
    ) -> Result<f64, OracleError> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        (self.scores)(state)
    }
}
