//! # Transcript Store
//!
//! Ordered record of every turn in one interview session. The transcript is only
//! ever appended to; it is handed to the response generator as context and to the
//! archive once the session ends.
//!
//! ## Ownership:
//! A session has exactly one writer at a time. The supervisor seeds the greeting,
//! then moves the transcript into the inbound handler, which hands it back when it
//! exits. No lock is involved.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

/// A single utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Append-only list of turns in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns the candidate has answered.
    pub fn user_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_keep_append_order() {
        let mut transcript = Transcript::new();
        transcript.push_assistant("Hello");
        transcript.push_user("Hi");
        transcript.push_assistant("Next question");

        let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(transcript.last().unwrap().content, "Next question");
        assert_eq!(transcript.user_turns(), 1);
    }

    #[test]
    fn test_serializes_as_role_content_pairs() {
        let mut transcript = Transcript::new();
        transcript.push_user("Tell me about yourself");

        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "role": "user", "content": "Tell me about yourself" }])
        );
    }
}
