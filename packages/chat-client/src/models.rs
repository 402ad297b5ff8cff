//! Chat data model: identifiers, messages and conversation records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque conversation (chat room) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConversationId(String);

/// Opaque message identifier, unique per message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is blank
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        // Some backends send numeric keys; both forms map to the same id
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                match WireId::deserialize(deserializer)? {
                    WireId::Text(text) => Ok(Self(text)),
                    WireId::Number(number) => Ok(Self(number.to_string())),
                }
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

string_id!(ConversationId);
string_id!(MessageId);

/// A chat message with every field resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A message as it arrives on the wire
///
/// Legacy hub payloads may omit the conversation id; the dispatcher resolves
/// it (and every other default) once via [`RawMessage::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: Option<MessageId>,
    #[serde(default, alias = "roomId", alias = "chatRoomId")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: Option<bool>,
}

/// Field that made a raw message undeliverable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Id,
    ConversationId,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::ConversationId => write!(f, "conversationId"),
        }
    }
}

impl RawMessage {
    /// Resolve defaults, attaching `fallback` when the payload carries no conversation id
    pub fn resolve(self, fallback: Option<&ConversationId>) -> Result<Message, MissingField> {
        let id = self
            .id
            .filter(|id| !id.is_blank())
            .ok_or(MissingField::Id)?;
        let conversation_id = self
            .conversation_id
            .filter(|c| !c.is_blank())
            .or_else(|| fallback.cloned())
            .ok_or(MissingField::ConversationId)?;

        Ok(Message {
            id,
            conversation_id,
            sender_id: self.sender_id.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            is_read: self.is_read.unwrap_or(false),
        })
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        Self {
            id: Some(message.id),
            conversation_id: Some(message.conversation_id),
            sender_id: Some(message.sender_id),
            content: Some(message.content),
            created_at: Some(message.created_at),
            is_read: Some(message.is_read),
        }
    }
}

/// Conversation record returned on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub ad_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub created_at: DateTime<Utc>,
}

/// Row in the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub ad_id: String,
    #[serde(default)]
    pub ad_title: Option<String>,
    #[serde(default)]
    pub other_party_name: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

/// Participant of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Full conversation detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: ConversationId,
    pub ad_id: String,
    #[serde(default)]
    pub ad_title: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
}

/// Acknowledgement of a mark-read request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadAck {
    #[serde(default)]
    pub marked_count: u32,
}

// Request bodies

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateConversationRequest<'a> {
    pub ad_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(alias = "error", alias = "title")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_payload_conversation() {
        let raw: RawMessage = serde_json::from_str(
            r#"{"id":"m1","conversationId":"c1","senderId":"u1","content":"hi","isRead":true}"#,
        )
        .unwrap();
        let message = raw.resolve(Some(&ConversationId::from("fallback"))).unwrap();
        assert_eq!(message.conversation_id.as_str(), "c1");
        assert!(message.is_read);
    }

    #[test]
    fn test_resolve_uses_fallback_for_legacy_payload() {
        let raw: RawMessage = serde_json::from_str(r#"{"id":"m1","content":"hi"}"#).unwrap();
        let message = raw.resolve(Some(&ConversationId::from("c9"))).unwrap();
        assert_eq!(message.conversation_id.as_str(), "c9");
        assert_eq!(message.sender_id, "");
        assert!(!message.is_read);
    }

    #[test]
    fn test_resolve_without_any_conversation_fails() {
        let raw: RawMessage = serde_json::from_str(r#"{"id":"m1","conversationId":""}"#).unwrap();
        assert_eq!(raw.resolve(None), Err(MissingField::ConversationId));
    }

    #[test]
    fn test_resolve_without_id_fails() {
        let raw = RawMessage {
            conversation_id: Some("c1".into()),
            ..RawMessage::default()
        };
        assert_eq!(raw.resolve(None), Err(MissingField::Id));
    }

    #[test]
    fn test_room_id_alias_accepted() {
        let raw: RawMessage = serde_json::from_str(r#"{"id":"m1","roomId":"r7"}"#).unwrap();
        assert_eq!(raw.conversation_id, Some(ConversationId::from("r7")));
    }

    #[test]
    fn test_numeric_ids_accepted() {
        let raw: RawMessage =
            serde_json::from_str(r#"{"id":1042,"conversationId":7,"content":"hi"}"#).unwrap();
        let message = raw.resolve(None).unwrap();
        assert_eq!(message.id, MessageId::from("1042"));
        assert_eq!(message.conversation_id, ConversationId::from("7"));
    }

    #[test]
    fn test_id_of_wrong_type_rejected() {
        assert!(serde_json::from_str::<ConversationId>(r#"{"id":"c1"}"#).is_err());
    }

    #[test]
    fn test_summary_defaults() {
        let summary: ConversationSummary =
            serde_json::from_str(r#"{"id":"c1","adId":"ad-1"}"#).unwrap();
        assert_eq!(summary.unread_count, 0);
        assert!(summary.last_message_at.is_none());
    }
}
