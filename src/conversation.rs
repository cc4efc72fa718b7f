//! Conversation data model: messages and the persisted rolling history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current schema version of the persisted state file.
pub const STATE_SCHEMA_VERSION: &str = "2";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Rolling conversation history persisted between invocations.
///
/// `history` never holds the system message; it is prepended fresh from the
/// configuration on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(rename = "version")]
    pub schema_version: String,
    #[serde(rename = "conversation", default)]
    pub history: Vec<Message>,
    #[serde(rename = "lastConversationUpdate")]
    pub last_update: DateTime<Utc>,
}

impl ConversationState {
    /// Empty state stamped at `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            history: Vec::new(),
            last_update: now,
        }
    }

    pub fn has_system_message(&self) -> bool {
        self.history.iter().any(|m| m.role == Role::System)
    }
}
