//! Shared test utilities for the Bazaar chat workspace
//!
//! This crate provides a mock of the marketplace chat API plus JSON fixtures
//! in the API's wire format, so client tests run without a backend.
//!
//! # Mock Services
//!
//! - [`MockChatApiServer`] - wiremock-backed chat REST API
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_test_utils::{MessageFixture, MockChatApiServer};
//!
//! #[tokio::test]
//! async fn test_send() {
//!     let server = MockChatApiServer::start().await;
//!     server
//!         .mock_send_message("c1", MessageFixture::new("m1", "c1", "hello"))
//!         .await;
//!
//!     // Point ChatApiConfig at server.url()
//! }
//! ```

mod chat_api;
mod fixtures;

pub use chat_api::MockChatApiServer;
pub use fixtures::{ConversationFixture, MessageFixture, SummaryFixture};
