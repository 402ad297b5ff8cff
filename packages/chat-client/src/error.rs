//! Error types for the chat client
//!
//! Two families: [`ConnectError`] for the push channel (cheap to clone so one
//! in-flight connect outcome can be handed to every waiter) and [`ChatError`]
//! for request/response operations surfaced to the caller.

use thiserror::Error;

use crate::models::ConversationId;

/// Broad classification of a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing login or credential; never counted by the circuit breaker
    Configuration,
    /// Handshake or mid-session transport failure
    Transport,
    /// Circuit breaker is open; terminal until re-enabled
    Saturation,
    /// Attempt superseded by a later state change
    Cancelled,
}

/// Errors raised by the connection state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// No active login or empty credential
    #[error("not authenticated: no active login or access token")]
    NotAuthenticated,

    /// Real-time delivery disabled (manually or by the circuit breaker)
    #[error("real-time delivery is disabled")]
    Disabled,

    /// Underlying transport failed
    #[error("hub transport failed: {0}")]
    Transport(String),

    /// Hub rejected or garbled the protocol handshake
    #[error("hub handshake failed: {0}")]
    Handshake(String),

    /// Waited too long for a connection
    #[error("timed out after {0} seconds waiting for the hub connection")]
    Timeout(u64),

    /// A newer state change made this attempt irrelevant
    #[error("connection attempt superseded")]
    Superseded,

    /// Operation needs a live connection and none exists
    #[error("no live hub connection")]
    NotConnected,
}

impl ConnectError {
    /// Classify the failure
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotAuthenticated => FailureKind::Configuration,
            Self::Disabled => FailureKind::Saturation,
            Self::Superseded => FailureKind::Cancelled,
            Self::Transport(_) | Self::Handshake(_) | Self::Timeout(_) | Self::NotConnected => {
                FailureKind::Transport
            }
        }
    }

    /// Whether this failure advances the circuit breaker
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Handshake(_) | Self::Timeout(_)
        )
    }
}

/// Result type for connection operations
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Errors returned by chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// No active login; request not sent
    #[error("not authenticated")]
    NotAuthenticated,

    /// Caller supplied an unusable argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the expected JSON
    #[error("failed to parse chat API response: {0}")]
    Json(#[from] serde_json::Error),

    /// API answered with an error status
    #[error("chat API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Conversation or ad does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Request timed out
    #[error("request to chat API timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limited by the API
    #[error("rate limited by chat API")]
    RateLimited,

    /// Read retries exhausted
    #[error("all {attempts} retry attempts failed. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Sending a message failed; nothing was delivered locally
    #[error("message to conversation {conversation_id} was not sent: {reason}")]
    Delivery {
        conversation_id: ConversationId,
        reason: String,
    },

    /// Push channel failure surfaced to a caller that asked for it
    #[error(transparent)]
    Connection(#[from] ConnectError),
}

impl ChatError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Retries on timeouts, rate limiting, connect failures and 5xx answers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited => true,
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Short human-readable reason suitable for a UI toast
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Please sign in to use chat.".to_string(),
            Self::NotFound(_) => "This conversation is no longer available.".to_string(),
            Self::RateLimited => "Too many requests, try again shortly.".to_string(),
            Self::Delivery { reason, .. } => format!("Message not sent: {}", reason),
            Self::InvalidInput(reason) => reason.clone(),
            Self::Timeout(_) | Self::Http(_) | Self::RetriesExhausted { .. } => {
                "Chat service is unreachable.".to_string()
            }
            Self::Api { message, .. } => message.clone(),
            Self::Json(_) => "Unexpected response from chat service.".to_string(),
            Self::Connection(e) => e.to_string(),
        }
    }
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
