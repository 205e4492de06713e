#![allow(clippy::module_name_repetitions)]
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stored_object;

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry in a message's `sources` list: a video cited by the assistant
/// while answering, with the relevance score of the chunk it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub relevance_score: f32,
}

stored_object!(Message, "message", {
    conversation_id: String,
    role: MessageRole,
    content: String,
    sources: Vec<SourceRef>,
    timestamp: chrono::DateTime<chrono::Utc>,
});

impl Message {
    pub fn new(
        conversation_id: String,
        role: MessageRole,
        content: String,
        sources: Option<Vec<SourceRef>>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id,
            role,
            content,
            sources: sources.unwrap_or_default(),
            timestamp: now,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

/// Renders a message history as `Role: content` lines, one per message, in
/// the order given. Used to build the conversation-history portion of a
/// chat prompt.
#[must_use]
pub fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|msg| format!("{msg}"))
        .collect::<Vec<String>>()
        .join("\n")
}
