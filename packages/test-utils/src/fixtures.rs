//! JSON fixtures in the chat API's wire format

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

fn fixed_time(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
        + chrono::Duration::seconds(offset_secs)
}

/// Fixture for chat message records
#[derive(Debug, Clone)]
pub struct MessageFixture {
    pub id: String,
    /// `None` renders a legacy payload without a conversation id
    pub conversation_id: Option<String>,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl MessageFixture {
    /// Create an unread message from `user-1`
    pub fn new(id: &str, conversation_id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            sender_id: "user-1".to_string(),
            content: content.to_string(),
            created_at: fixed_time(0),
            is_read: false,
        }
    }

    /// Message in the legacy shape with no conversation id
    pub fn legacy(id: &str, content: &str) -> Self {
        Self {
            conversation_id: None,
            ..Self::new(id, "", content)
        }
    }

    pub fn from_sender(mut self, sender_id: &str) -> Self {
        self.sender_id = sender_id.to_string();
        self
    }

    /// Shift the timestamp by `secs` seconds
    pub fn at(mut self, secs: i64) -> Self {
        self.created_at = fixed_time(secs);
        self
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "id": self.id,
            "senderId": self.sender_id,
            "content": self.content,
            "createdAt": self.created_at.to_rfc3339(),
            "isRead": self.is_read
        });
        if let Some(conversation_id) = &self.conversation_id {
            value["conversationId"] = json!(conversation_id);
        }
        value
    }
}

/// Fixture for a freshly created conversation
#[derive(Debug, Clone)]
pub struct ConversationFixture {
    pub id: String,
    pub ad_id: String,
    pub buyer_id: String,
    pub seller_id: String,
}

impl ConversationFixture {
    /// Conversation about `ad_id` with a random id
    pub fn new(ad_id: &str) -> Self {
        Self::with_id(&uuid::Uuid::new_v4().to_string(), ad_id)
    }

    pub fn with_id(id: &str, ad_id: &str) -> Self {
        Self {
            id: id.to_string(),
            ad_id: ad_id.to_string(),
            buyer_id: "user-1".to_string(),
            seller_id: "user-2".to_string(),
        }
    }

    /// Convert to the creation response
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "adId": self.ad_id,
            "buyerId": self.buyer_id,
            "sellerId": self.seller_id,
            "createdAt": fixed_time(0).to_rfc3339()
        })
    }

    /// Convert to the detail response
    pub fn to_detail_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "adId": self.ad_id,
            "adTitle": format!("Ad {}", self.ad_id),
            "participants": [
                {"userId": self.buyer_id, "displayName": "Buyer"},
                {"userId": self.seller_id, "displayName": "Seller"}
            ],
            "createdAt": fixed_time(0).to_rfc3339(),
            "unreadCount": 0
        })
    }
}

/// Fixture for a conversation list row
#[derive(Debug, Clone)]
pub struct SummaryFixture {
    pub id: String,
    pub ad_id: String,
    pub last_message: Option<String>,
    pub unread_count: u32,
}

impl SummaryFixture {
    pub fn new(id: &str, ad_id: &str) -> Self {
        Self {
            id: id.to_string(),
            ad_id: ad_id.to_string(),
            last_message: None,
            unread_count: 0,
        }
    }

    /// Row with a last message and unread count
    pub fn unread(id: &str, ad_id: &str, last_message: &str, unread_count: u32) -> Self {
        Self {
            last_message: Some(last_message.to_string()),
            unread_count,
            ..Self::new(id, ad_id)
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "adId": self.ad_id,
            "adTitle": format!("Ad {}", self.ad_id),
            "otherPartyName": "Seller",
            "lastMessage": self.last_message,
            "lastMessageAt": self.last_message.as_ref().map(|_| fixed_time(60).to_rfc3339()),
            "unreadCount": self.unread_count
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_message_has_no_conversation() {
        let json = MessageFixture::legacy("m1", "hi").to_json();
        assert!(json.get("conversationId").is_none());
        assert_eq!(json["id"], "m1");
    }

    #[test]
    fn test_conversation_fixture_ids_are_unique() {
        assert_ne!(
            ConversationFixture::new("ad-1").id,
            ConversationFixture::new("ad-1").id
        );
    }
}
