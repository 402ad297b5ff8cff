//! Push channel plumbing: wire codec and transports
//!
//! The hub speaks the JSON hub protocol over a websocket: a handshake, then
//! record-separated frames carrying named invocations in both directions.

pub mod protocol;
pub mod transport;
mod websocket;

pub use transport::{HandshakeRequest, HubLink, HubTransport};
pub use websocket::WebSocketTransport;

use serde_json::Value;

use crate::models::{ConversationId, RawMessage};

/// Server-push method delivering a new message
pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
/// Server-push method announcing a conversation was read
pub const MESSAGES_READ: &str = "MessagesRead";
/// Client method adding this connection to a conversation group
pub const JOIN_CONVERSATION: &str = "JoinConversation";
/// Client method removing this connection from a conversation group
pub const LEAVE_CONVERSATION: &str = "LeaveConversation";

/// Inbound event from the hub
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A message pushed to the conversation's members
    ReceiveMessage(RawMessage),
    /// Someone read a conversation; informational
    MessagesRead(ConversationId),
    /// Transport ended; `error` is set for abnormal closes
    Closed { error: Option<String> },
}

/// Outbound fire-and-forget hub call
#[derive(Debug, Clone, PartialEq)]
pub struct HubInvocation {
    pub target: String,
    pub arguments: Vec<Value>,
}

impl HubInvocation {
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }

    /// Join the group for a conversation
    pub fn join(conversation_id: &ConversationId) -> Self {
        Self::new(
            JOIN_CONVERSATION,
            vec![Value::String(conversation_id.to_string())],
        )
    }

    /// Leave the group for a conversation
    pub fn leave(conversation_id: &ConversationId) -> Self {
        Self::new(
            LEAVE_CONVERSATION,
            vec![Value::String(conversation_id.to_string())],
        )
    }
}
