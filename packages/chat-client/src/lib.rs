//! Real-time chat delivery client for the Bazaar marketplace
//!
//! This crate keeps one live channel to the message hub so chat messages show
//! up in open conversations as soon as they are sent, and reconciles pushed
//! messages with the ones returned by the REST API so each is shown once.
//!
//! # Pieces
//!
//! - [`ConnectionManager`]: connection state machine with single-flight
//!   connect, a failure circuit breaker and a backoff reconnect loop
//! - [`ObserverRegistry`]: per-conversation message observers and
//!   connection-state observers, with drop-to-unsubscribe handles
//! - [`MessageDispatcher`]: the one path to observers, with deduplication
//! - [`ChatClient`]: REST operations plus conversation views
//!
//! # Thread Safety
//!
//! `ChatClient` is `Clone + Send + Sync`. Clones share one connection, one
//! registry and one dispatcher.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bazaar_chat_client::{ChatClient, StaticTokenSource};
//! use bazaar_shared_config::CommonConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CommonConfig::from_env()?;
//! let client = ChatClient::new(&config, Arc::new(StaticTokenSource::new("token")))?;
//!
//! let conversation = client.create_conversation("ad-42").await?;
//! let _view = client.open_conversation(conversation.id.clone(), |message| {
//!     println!("{}: {}", message.sender_id, message.content);
//! });
//!
//! client.send_message(&conversation.id, "Is this still available?").await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod backoff;
mod breaker;
mod client;
mod connection;
mod dispatcher;
mod error;
pub mod hub;
mod manager;
mod models;
mod notice;
mod registry;
mod state;
mod token;

pub use api::ChatApi;
pub use backoff::ReconnectPolicy;
pub use breaker::{CooldownWindow, FailureCircuitBreaker};
pub use client::{ChatClient, ConversationView};
pub use connection::ChannelConnection;
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use error::{ChatError, ChatResult, ConnectError, ConnectResult, FailureKind};
pub use manager::ConnectionManager;
pub use models::{
    Conversation, ConversationDetail, ConversationId, ConversationSummary, MarkReadAck, Message,
    MessageId, MissingField, Participant, RawMessage,
};
pub use notice::{Notice, NoticeGate, NoticeKind, NoticeSink, TracingNoticeSink};
pub use registry::{ConnectionCallback, MessageCallback, ObserverRegistry, Subscription};
pub use state::ConnectionState;
pub use token::{SessionTokens, StaticTokenSource, TokenSource};
