//! Conversation session between the user and the companion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChatMessage, Focus, MessageRole};

/// A conversation from its first message until the user finishes.
///
/// The message sequence is append-only; once closed, no further messages
/// are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    /// Unique session identifier.
    pub id: String,
    /// Theme of the conversation.
    pub focus: Focus,
    messages: Vec<ChatMessage>,
    /// When the session began.
    pub start_time: DateTime<Utc>,
    /// When the session was closed, if it has been.
    pub end_time: Option<DateTime<Utc>>,
}

/// Returned when appending to a session that has already ended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("conversation {0} is closed")]
pub struct SessionClosed(pub String);

impl ConversationSession {
    /// Start a new session.
    pub fn new(focus: Focus) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            focus,
            messages: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Append a message and return a reference to it.
    pub fn push(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Result<&ChatMessage, SessionClosed> {
        if self.is_closed() {
            return Err(SessionClosed(self.id.clone()));
        }
        self.messages.push(ChatMessage::new(role, content));
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Messages in insertion order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Mark the session finished. Closing twice keeps the first end time.
    pub fn close(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    pub const fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Whether the user has said anything yet.
    pub fn has_user_input(&self) -> bool {
        self.messages.iter().any(|m| m.role == MessageRole::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_preserves_insertion_order() {
        let mut session = ConversationSession::new(Focus::Event);
        session.push(MessageRole::Assistant, "今天过得怎么样？").unwrap();
        session.push(MessageRole::User, "还不错").unwrap();

        let contents: Vec<_> = session.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["今天过得怎么样？", "还不错"]);
        assert!(session.has_user_input());
    }

    #[test]
    fn closed_session_rejects_messages() {
        let mut session = ConversationSession::new(Focus::All);
        session.push(MessageRole::User, "hello").unwrap();
        session.close();

        let err = session.push(MessageRole::User, "again").unwrap_err();
        assert_eq!(err, SessionClosed(session.id.clone()));
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let mut session = ConversationSession::new(Focus::Growth);
        session.close();
        let first = session.end_time;
        session.close();
        assert_eq!(session.end_time, first);
        assert!(session.end_time.unwrap() >= session.start_time);
    }
}
