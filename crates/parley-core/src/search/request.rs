use serde::{Deserialize, Serialize};

use crate::conversation::ConversationState;

/// The real conversation a search is asked to plan from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub goal: String,
    pub messages: Vec<String>,
    pub current_turn: u32,
    pub max_turns: u32,
}

/// How a new request relates to the one a session searched before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Nothing was searched yet.
    Fresh,
    /// Same goal, messages and turn: the existing tree is still valid.
    Unchanged,
    /// The conversation moved forward past the searched root.
    Advanced,
    /// Goal changed or the history diverged from the searched one.
    Stale,
}

impl Submission {
    /// Whether the previous tree must be discarded.
    pub fn requires_reset(self) -> bool {
        !matches!(self, Submission::Unchanged)
    }
}

impl SearchRequest {
    pub fn root_state(&self) -> ConversationState {
        ConversationState::new(
            self.goal.clone(),
            self.messages.clone(),
            self.current_turn,
            self.max_turns,
        )
    }

    /// Classify `self` against the previously searched request.
    pub fn classify(&self, previous: Option<&SearchRequest>) -> Submission {
        let Some(previous) = previous else {
            return Submission::Fresh;
        };

        if self.goal != previous.goal || !self.messages.starts_with(&previous.messages) {
            return Submission::Stale;
        }

        if self.messages.len() > previous.messages.len() {
            return Submission::Advanced;
        }

        if self.current_turn == previous.current_turn && self.max_turns == previous.max_turns {
            Submission::Unchanged
        } else {
            Submission::Stale
        }
    }
}
