use std::fmt;

use serde::{Deserialize, Serialize};

/// One point in the negotiation: the goal plus every utterance exchanged so far.
///
/// States are never mutated in place; following an action produces a new
/// state through [`ConversationState::with_utterance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    goal: String,
    messages: Vec<String>,
    current_turn: u32,
    max_turns: u32,
}

impl ConversationState {
    pub fn new(
        goal: impl Into<String>,
        messages: Vec<String>,
        current_turn: u32,
        max_turns: u32,
    ) -> Self {
        ConversationState {
            goal: goal.into(),
            messages,
            current_turn,
            max_turns,
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// No further utterances are proposed once the turn limit is reached.
    pub fn is_terminal(&self) -> bool {
        self.current_turn >= self.max_turns
    }

    pub fn remaining_turns(&self) -> u32 {
        self.max_turns.saturating_sub(self.current_turn)
    }

    /// The state reached by saying `utterance` next.
    pub fn with_utterance(&self, utterance: impl Into<String>) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.extend(self.messages.iter().cloned());
        messages.push(utterance.into());
        ConversationState {
            goal: self.goal.clone(),
            messages,
            current_turn: self.current_turn + 1,
            max_turns: self.max_turns,
        }
    }
}

/// Prompt-facing rendering, also used as the `state` field of node snapshots.
impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Goal: {}", self.goal)?;
        writeln!(f, "History:")?;
        if self.messages.is_empty() {
            writeln!(f, "  No messages")?;
        } else {
            for message in &self.messages {
                writeln!(f, "  {message}")?;
            }
        }
        write!(f, "Turn: {}/{}", self.current_turn, self.max_turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_appends_and_advances_turn() {
        let state = ConversationState::new("raise", vec!["hello".to_string()], 1, 3);
        let next = state.with_utterance("I'd like a raise");

        assert_eq!(next.messages(), ["hello", "I'd like a raise"]);
        assert_eq!(next.current_turn(), 2);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(next.goal(), "raise");
    }

    #[test]
    fn terminal_at_turn_limit() {
        let state = ConversationState::new("g", Vec::new(), 2, 3);
        assert!(!state.is_terminal());
        assert!(state.with_utterance("x").is_terminal());
        assert_eq!(state.remaining_turns(), 1);
    }

    #[test]
    fn display_renders_prompt_layout() {
        let empty = ConversationState::new("extend deadline", Vec::new(), 0, 5);
        assert_eq!(
            empty.to_string(),
            "Goal: extend deadline\nHistory:\n  No messages\nTurn: 0/5"
        );

        let filled = empty.with_utterance("Hi");
        assert_eq!(
            filled.to_string(),
            "Goal: extend deadline\nHistory:\n  Hi\nTurn: 1/5"
        );
    }
}
