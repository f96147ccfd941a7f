use async_trait::async_trait;
use parley_core::{ConversationState, Oracle, OracleError};
use tokio::{
    sync::Mutex,
    time::{Instant, sleep, sleep_until, timeout},
};
use tracing::{debug, error, warn};

use crate::{
    backend::{ChatBackend, ChatRequest, OpenAiCompatBackend},
    config::{OracleConfig, OracleConfigError},
    parse::{parse_candidates, parse_score},
    prompts::{evaluation_request, generation_request},
    retry::RetryPolicy,
};

/// [`Oracle`] backed by a chat model.
///
/// Every call is paced, time-limited and retried; nothing is cached, so
/// asking twice about the same state samples the model twice.
pub struct OracleClient<B> {
    backend: B,
    config: OracleConfig,
    retry: RetryPolicy,
    last_call: Mutex<Option<Instant>>,
}

impl OracleClient<OpenAiCompatBackend> {
    /// Client for the configured OpenAI-compatible endpoint.
    pub fn from_config(config: OracleConfig) -> Result<Self, OracleConfigError> {
        config.validate()?;
        let backend = OpenAiCompatBackend::from_config(&config)?;
        Ok(Self::new(backend, config))
    }
}

impl<B: ChatBackend> OracleClient<B> {
    pub fn new(backend: B, config: OracleConfig) -> Self {
        let retry = config.retry_policy();
        OracleClient {
            backend,
            config,
            retry,
            last_call: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Wait until `min_delay` has passed since the previous call started.
    async fn pace(&self) {
        let min_delay = self.config.min_delay();
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + min_delay;
            if Instant::now() < ready_at {
                sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    async fn attempt<T>(
        &self,
        request: &ChatRequest,
        parse: &(dyn Fn(&str) -> Result<T, OracleError> + Sync),
    ) -> Result<T, OracleError> {
        self.pace().await;
        let limit = self.config.timeout();
        match timeout(limit, self.backend.complete(request)).await {
            Err(_) => Err(OracleError::Unavailable(format!(
                "no response within {}ms",
                limit.as_millis()
            ))),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(text)) => parse(&text),
        }
    }

    /// Run one logical call, retrying both failure kinds until attempts run out.
    async fn call<T>(
        &self,
        op: &'static str,
        request: &ChatRequest,
        parse: &(dyn Fn(&str) -> Result<T, OracleError> + Sync),
    ) -> Result<T, OracleError> {
        let mut attempt = 1;
        loop {
            match self.attempt(request, parse).await {
                Ok(value) => {
                    debug!(op, attempt, "oracle call succeeded");
                    return Ok(value);
                }
                Err(err) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.jittered_backoff(attempt);
                    warn!(op, attempt, error = %err, delay_ms = delay.as_millis() as u64, "oracle call failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(op, attempts = attempt, error = %err, "oracle call failed");
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<B: ChatBackend> Oracle for OracleClient<B> {
    async fn generate_actions(
        &self,
        state: &ConversationState,
        k: usize,
    ) -> Result<Vec<String>, OracleError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let request = generation_request(&self.config, state, k);
        self.call("generate_actions", &request, &|text| parse_candidates(text, k))
            .await
    }

    async fn evaluate_state(
        &self,
        state: &ConversationState,
        goal: &str,
    ) -> Result<f64, OracleError> {
        let request = evaluation_request(&self.config, state, goal);
        self.call("evaluate_state", &request, &parse_score).await
    }
}
