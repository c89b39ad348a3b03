//! Conversation messages and captured data recorded on a step.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{MessageId, Timestamp};

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A message as stored in a step's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: Timestamp,
}

/// A message as handed in by a driver; id and timestamp are filled in when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(default)]
    pub id: Option<MessageId>,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Materializes the message, generating a fresh id and using `now` where missing.
    pub fn into_message(self, now: Timestamp) -> ConversationMessage {
        ConversationMessage {
            id: self.id.unwrap_or_else(MessageId::generate),
            role: self.role,
            content: self.content,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}

/// One `{label, value}` pair extracted from a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedField {
    pub label: String,
    pub value: String,
}

impl CapturedField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_message_fills_missing_fields() {
        let now = Timestamp::now();
        let msg = NewMessage::new(MessageRole::User, "My hero is a dragon").into_message(now);

        assert_eq!(msg.timestamp, now);
        assert!(msg.id.as_str().starts_with("msg-"));
        assert_eq!(msg.role, MessageRole::User);
    }

    #[test]
    fn into_message_keeps_supplied_fields() {
        let earlier = Timestamp::now().plus_secs(-60);
        let msg = NewMessage::new(MessageRole::Assistant, "Hello!")
            .with_id(MessageId::new("transport-1"))
            .with_timestamp(earlier)
            .into_message(Timestamp::now());

        assert_eq!(msg.id, MessageId::new("transport-1"));
        assert_eq!(msg.timestamp, earlier);
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
