//! Request/response client for the marketplace chat API

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bazaar_shared_config::ChatApiConfig;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::error::{ChatError, ChatResult};
use crate::models::{
    Conversation, ConversationDetail, ConversationId, ConversationSummary,
    CreateConversationRequest, ErrorResponse, MarkReadAck, Message, RawMessage,
    SendMessageRequest,
};
use crate::token::TokenSource;

/// Maximum error body size to prevent memory exhaustion
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Chat API client
///
/// Reads retry transient failures with exponential backoff; writes are sent
/// exactly once.
#[derive(Clone)]
pub struct ChatApi {
    http_client: Client,
    config: ChatApiConfig,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for ChatApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatApi")
            .field("url", &self.config.url)
            .field("retry_attempts", &self.config.retry_attempts)
            .finish()
    }
}

impl ChatApi {
    /// Create a new API client from configuration
    pub fn new(config: &ChatApiConfig, tokens: Arc<dyn TokenSource>) -> ChatResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Bazaar/1.0")
            .build()?;

        Ok(Self::with_client(config, tokens, http_client))
    }

    /// Create a client with a custom HTTP client (for testing)
    pub fn with_client(
        config: &ChatApiConfig,
        tokens: Arc<dyn TokenSource>,
        http_client: Client,
    ) -> Self {
        Self {
            http_client,
            config: config.clone(),
            tokens,
        }
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    /// Execute a read with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> ChatResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ChatResult<T>>,
    {
        if self.config.retry_attempts == 0 {
            return operation().await;
        }

        let mut last_error = None;

        for attempt in 0..self.config.retry_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < self.config.retry_attempts {
                        let delay = self.config.retry_base_delay_ms * 2_u64.pow(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.config.retry_attempts,
                            delay_ms = delay,
                            error = %e,
                            "Chat API read failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ChatError::RetriesExhausted {
            attempts: self.config.retry_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Truncate error body, respecting UTF-8 boundaries
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    /// Attach the bearer credential; fails before any network traffic without one
    fn authorize(&self, request: RequestBuilder) -> ChatResult<RequestBuilder> {
        let token = self
            .tokens
            .usable_token()
            .ok_or(ChatError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    /// Send a request and map transport and status failures
    async fn execute(&self, request: RequestBuilder, what: &str) -> ChatResult<Response> {
        let response = self.authorize(request)?.send().await.map_err(|e| {
            if e.is_timeout() {
                ChatError::Timeout(self.config.timeout_secs)
            } else {
                ChatError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = Self::truncate_error_body(response.text().await.unwrap_or_default());
        Err(Self::status_error(status, body, what))
    }

    fn status_error(status: StatusCode, body: String, what: &str) -> ChatError {
        match status {
            StatusCode::UNAUTHORIZED => ChatError::NotAuthenticated,
            StatusCode::NOT_FOUND => ChatError::NotFound(what.to_string()),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Chat API rate limited");
                ChatError::RateLimited
            }
            _ => {
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.message)
                    .unwrap_or(body);
                ChatError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> ChatResult<T> {
        self.with_retry(|| async move {
            let response = self.execute(self.http_client.get(url), what).await?;
            let text = response.text().await?;
            Ok(serde_json::from_str(&text)?)
        })
        .await
    }

    /// Start (or reopen) the conversation about an ad
    #[instrument(skip(self))]
    pub async fn create_conversation(&self, ad_id: &str) -> ChatResult<Conversation> {
        let ad_id = ad_id.trim();
        if ad_id.is_empty() {
            return Err(ChatError::InvalidInput("ad id cannot be empty".to_string()));
        }

        let request = self
            .http_client
            .post(self.config.rooms_url())
            .json(&CreateConversationRequest { ad_id });
        let response = self.execute(request, &format!("ad {}", ad_id)).await?;
        let conversation: Conversation = serde_json::from_str(&response.text().await?)?;

        debug!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    /// Conversations of the current user
    #[instrument(skip(self))]
    pub async fn list_conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        let conversations: Vec<ConversationSummary> =
            self.get_json(&self.config.rooms_url(), "conversations").await?;
        debug!(count = conversations.len(), "Listed conversations");
        Ok(conversations)
    }

    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> ChatResult<ConversationDetail> {
        self.get_json(
            &self.config.room_url(conversation_id.as_str()),
            &format!("conversation {}", conversation_id),
        )
        .await
    }

    /// Message history, oldest first
    ///
    /// Entries that cannot be resolved (no id) are skipped with a warning.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn list_messages(&self, conversation_id: &ConversationId) -> ChatResult<Vec<Message>> {
        let raw: Vec<RawMessage> = self
            .get_json(
                &self.config.messages_url(conversation_id.as_str()),
                &format!("conversation {}", conversation_id),
            )
            .await?;

        let messages = raw
            .into_iter()
            .filter_map(|raw| match raw.resolve(Some(conversation_id)) {
                Ok(message) => Some(message),
                Err(field) => {
                    warn!(missing = %field, "Skipping history entry");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(count = messages.len(), "Fetched message history");
        Ok(messages)
    }

    /// Post a message; the response is the stored message
    #[instrument(skip_all, fields(conversation_id = %conversation_id, content_len = content.len()))]
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> ChatResult<Message> {
        let request = self
            .http_client
            .post(self.config.messages_url(conversation_id.as_str()))
            .json(&SendMessageRequest { content });
        let response = self
            .execute(request, &format!("conversation {}", conversation_id))
            .await?;
        let raw: RawMessage = serde_json::from_str(&response.text().await?)?;

        raw.resolve(Some(conversation_id)).map_err(|field| ChatError::Api {
            status: 200,
            message: format!("sent message response is missing {}", field),
        })
    }

    /// Mark every message in the conversation as read
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn mark_read(&self, conversation_id: &ConversationId) -> ChatResult<MarkReadAck> {
        let request = self
            .http_client
            .post(self.config.mark_read_url(conversation_id.as_str()));
        let response = self
            .execute(request, &format!("conversation {}", conversation_id))
            .await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(MarkReadAck::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}
