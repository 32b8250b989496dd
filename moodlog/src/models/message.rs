//! Chat message exchanged between the user and the companion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the companion.
    #[serde(alias = "model")]
    Assistant,
}

impl MessageRole {
    /// Wire name used by OpenAI-compatible vendors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Speaker label used when a conversation is flattened into a transcript.
    pub const fn transcript_label(self) -> &'static str {
        match self {
            Self::User => "用户",
            Self::Assistant => "AI",
        }
    }

    /// Parse a role from its wire name.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" | "model" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in a conversation.
///
/// Messages arriving over the API may omit `id` and `timestamp`; both are
/// filled in on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique identifier (UUIDv7).
    #[serde(default = "new_message_id")]
    pub id: String,
    /// Who wrote the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// When the message was created.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with a fresh id and the current time.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

fn new_message_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_id_or_timestamp() {
        let json = r#"{"role":"user","content":"今天好累"}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "今天好累");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn serializes_camel_case() {
        let msg = ChatMessage::assistant("hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn model_role_maps_to_assistant() {
        assert_eq!(MessageRole::from_wire("model"), Some(MessageRole::Assistant));
        assert_eq!(MessageRole::from_wire("system"), None);
    }
}
