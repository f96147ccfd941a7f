use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{OracleConfig, OracleConfigError},
    error::BackendError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One chat completion call, independent of the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// A chat-completions provider returning the assistant's text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, BackendError>;
}

/// Backend for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatBackend {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, OracleConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| OracleConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build a backend from config, reading the key from the environment.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleConfigError> {
        Self::new(&config.base_url, config.model.clone(), config.api_key()?)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::timeout(format!("request timeout: {e}"))
                } else {
                    BackendError::network(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::network(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|resp| resp.error.message)
                .unwrap_or(text);
            return Err(match status.as_u16() {
                401 | 403 => BackendError::auth(format!("authentication failed: {message}")),
                429 => BackendError::rate_limit(format!("rate limit exceeded: {message}")),
                500..=599 => BackendError::server(format!("HTTP {status}: {message}")),
                _ => BackendError::invalid_request(format!("HTTP {status}: {message}")),
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::decode(format!("failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::decode("response has no message content"))?;

        debug!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content.trim().to_string())
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        let backend = OpenAiCompatBackend::new("https://api.example.test/v1/", "m", "k").unwrap();
        assert_eq!(backend.endpoint, "https://api.example.test/v1/chat/completions");
    }

    #[test]
    fn request_body_is_openai_shaped() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.5,
            max_tokens: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "m");
        assert_eq!(value["messages"][1]["role"], "user");
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn response_content_is_extracted() {
        let parsed: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" 0.7 "}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" 0.7 "));
    }
}
