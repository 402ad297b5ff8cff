//! Mock chat API server
//!
//! Provides a [`MockChatApiServer`] that simulates the marketplace chat REST
//! endpoints for client tests.

use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{ConversationFixture, MessageFixture, SummaryFixture};

/// Mock chat API server
///
/// Every mount requires an `Authorization` header, so a request sent without
/// a credential gets no match (404 from wiremock).
///
/// # Example
///
/// ```rust,ignore
/// use bazaar_test_utils::{MockChatApiServer, SummaryFixture};
///
/// #[tokio::test]
/// async fn test_list() {
///     let server = MockChatApiServer::start().await;
///     server.mock_list_conversations(vec![SummaryFixture::new("c1", "ad-1")]).await;
///
///     // Configure ChatApiConfig with server.url()
/// }
/// ```
pub struct MockChatApiServer {
    server: MockServer,
}

impl MockChatApiServer {
    /// Start a new mock chat API server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Number of requests received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Mount a mock for conversation creation
    pub async fn mock_create_conversation(&self, conversation: ConversationFixture) {
        Mock::given(method("POST"))
            .and(path("/api/chat/rooms"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(conversation.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for the conversation list
    pub async fn mock_list_conversations(&self, summaries: Vec<SummaryFixture>) {
        let body: Vec<serde_json::Value> = summaries.iter().map(|s| s.to_json()).collect();

        Mock::given(method("GET"))
            .and(path("/api/chat/rooms"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for conversation detail
    pub async fn mock_get_conversation(&self, conversation: ConversationFixture) {
        Mock::given(method("GET"))
            .and(path(format!("/api/chat/rooms/{}", conversation.id)))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversation.to_detail_json()))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for message history
    pub async fn mock_list_messages(&self, conversation_id: &str, messages: Vec<MessageFixture>) {
        let body: Vec<serde_json::Value> = messages.iter().map(|m| m.to_json()).collect();

        Mock::given(method("GET"))
            .and(path(format!("/api/chat/rooms/{}/messages", conversation_id)))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a successful send returning `stored`
    pub async fn mock_send_message(&self, conversation_id: &str, stored: MessageFixture) {
        Mock::given(method("POST"))
            .and(path(format!("/api/chat/rooms/{}/messages", conversation_id)))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201).set_body_json(stored.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a failed send
    pub async fn mock_send_failure(&self, conversation_id: &str, status_code: u16, error_message: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/api/chat/rooms/{}/messages", conversation_id)))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "message": error_message
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for marking a conversation read
    pub async fn mock_mark_read(&self, conversation_id: &str, marked_count: u32) {
        Mock::given(method("POST"))
            .and(path(format!("/api/chat/rooms/{}/read", conversation_id)))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "markedCount": marked_count
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for server error on every chat route
    pub async fn mock_server_error(&self, error_message: &str) {
        Mock::given(wiremock::matchers::path_regex("^/api/chat/.*"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "message": error_message
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for rate limiting on every chat route
    pub async fn mock_rate_limit(&self) {
        Mock::given(wiremock::matchers::path_regex("^/api/chat/.*"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "60")
                    .set_body_json(json!({
                        "message": "Rate limit exceeded"
                    })),
            )
            .mount(&self.server)
            .await;
    }
}
