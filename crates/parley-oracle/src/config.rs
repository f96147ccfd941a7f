use std::{env, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_GENERATION_SYSTEM_PROMPT: &str = "You are an expert conversationalist. \
Given a conversation goal and history, generate appropriate next responses that would help \
achieve the goal effectively. Be strategic, professional, and context-aware.";

pub const DEFAULT_EVALUATION_SYSTEM_PROMPT: &str = "You are an expert conversation evaluator. \
Given a conversation state with a goal and message history, evaluate how well the conversation \
is progressing towards the goal on a scale from 0 to 1.";

/// Settings for the language-model oracle and its HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible API root, without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer key.
    pub api_key_env: String,
    /// Per-call time limit, retries excluded.
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Minimum spacing between the start of two backend calls.
    pub min_delay_ms: u64,
    pub generation_temperature: f32,
    pub generation_max_tokens: u32,
    pub evaluation_temperature: f32,
    pub evaluation_max_tokens: u32,
    pub generation_system_prompt: String,
    pub evaluation_system_prompt: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            base_url: "https://api.together.xyz/v1".to_string(),
            model: "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free".to_string(),
            api_key_env: "TOGETHER_API_KEY".to_string(),
            timeout_ms: 30_000,
            max_attempts: 2,
            backoff_ms: 500,
            max_backoff_ms: 4_000,
            min_delay_ms: 100,
            generation_temperature: 0.7,
            generation_max_tokens: 150,
            evaluation_temperature: 0.1,
            evaluation_max_tokens: 16,
            generation_system_prompt: DEFAULT_GENERATION_SYSTEM_PROMPT.to_string(),
            evaluation_system_prompt: DEFAULT_EVALUATION_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> Result<(), OracleConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(OracleConfigError::Invalid(
                "base_url must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(OracleConfigError::Invalid("model must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(OracleConfigError::Invalid(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(OracleConfigError::Invalid(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.max_backoff_ms < self.backoff_ms {
            return Err(OracleConfigError::Invalid(
                "max_backoff_ms must be >= backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Read the bearer key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, OracleConfigError> {
        match env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(OracleConfigError::MissingApiKey(self.api_key_env.clone())),
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleConfigError {
    #[error("invalid oracle config: {0}")]
    Invalid(String),

    #[error("API key variable {0} is not set")]
    MissingApiKey(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
