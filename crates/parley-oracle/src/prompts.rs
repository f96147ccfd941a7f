use parley_core::ConversationState;

use crate::{
    backend::{ChatMessage, ChatRequest},
    config::OracleConfig,
};

/// Request asking the model for `k` distinct next utterances.
pub fn generation_request(config: &OracleConfig, state: &ConversationState, k: usize) -> ChatRequest {
    let user = format!(
        "Given this conversation state:\n{state}\n\n\
         Generate {k} different possible responses that would help achieve the conversation goal. \
         Each response should be strategic and different.\n\
         Format: Return ONLY the responses, one per line."
    );
    ChatRequest {
        messages: vec![
            ChatMessage::system(&config.generation_system_prompt),
            ChatMessage::user(user),
        ],
        temperature: config.generation_temperature,
        max_tokens: Some(config.generation_max_tokens),
    }
}

/// Request asking the model to score `state` against `goal`.
pub fn evaluation_request(config: &OracleConfig, state: &ConversationState, goal: &str) -> ChatRequest {
    let user = format!(
        "Evaluate this conversation state:\n{state}\n\n\
         Consider:\n\
         1. Progress toward the goal: {goal}\n\
         2. Professional tone\n\
         3. Strategic effectiveness\n\n\
         Respond with ONLY a number between 0 and 1."
    );
    ChatRequest {
        messages: vec![
            ChatMessage::system(&config.evaluation_system_prompt),
            ChatMessage::user(user),
        ],
        temperature: config.evaluation_temperature,
        max_tokens: Some(config.evaluation_max_tokens),
    }
}
