//! Message types for conversations sent to providers.
//!
//! Provides a structured [`Message`] type with [`Role`] and [`Content`] enums
//! that represent conversation turns. Adapters convert these to their own
//! wire formats and never mutate them.

use serde::{Deserialize, Serialize};

/// A single message in a conversation.
///
/// The `Content` enum is `untagged` for serde so messages serialize to the
/// plain `{"role": "...", "content": "..."}` shape chat backends expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

/// The role of a message sender in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message content, currently text-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
        }
    }
    pub fn text(&self) -> &str {
        match &self.content {
            Content::Text(s) => s,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Flattens a conversation into a single `Human:`/`Assistant:` prompt.
///
/// Used for text-generation backends with no native multi-turn chat. System
/// messages are rendered as human turns. The prompt always ends with an open
/// `Assistant:` turn for the model to complete.
pub fn flatten_prompt(messages: &[Message]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| match m.role {
            Role::Assistant => format!("Assistant: {}", m.text()),
            _ => format!("Human: {}", m.text()),
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}
