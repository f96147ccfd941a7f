//! Language-model oracle: prompts a chat-completions endpoint to propose and
//! score negotiation utterances.

mod backend;
mod client;
mod config;
mod error;
mod parse;
mod prompts;
mod retry;

pub use backend::{ChatBackend, ChatMessage, ChatRequest, OpenAiCompatBackend};
pub use client::OracleClient;
pub use config::{OracleConfig, OracleConfigError};
pub use error::{BackendError, BackendErrorKind};
pub use parse::{parse_candidates, parse_score};
pub use prompts::{evaluation_request, generation_request};
pub use retry::RetryPolicy;
