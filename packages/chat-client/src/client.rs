//! Public facade tying the REST client, dispatcher and connection together

use std::sync::Arc;

use bazaar_shared_config::{ChatApiConfig, CommonConfig, HubConfig};
use tracing::{debug, info, instrument};

use crate::api::ChatApi;
use crate::dispatcher::{DispatchOutcome, MessageDispatcher};
use crate::error::{ChatError, ChatResult};
use crate::hub::{HubTransport, WebSocketTransport};
use crate::manager::ConnectionManager;
use crate::models::{
    Conversation, ConversationDetail, ConversationId, ConversationSummary, MarkReadAck, Message,
};
use crate::notice::{NoticeSink, TracingNoticeSink};
use crate::registry::{ObserverRegistry, Subscription};
use crate::token::TokenSource;

/// Chat client for one signed-in user
///
/// Every REST call works without the push channel; operations that show
/// messages nudge the channel into connecting without waiting for it.
#[derive(Clone)]
pub struct ChatClient {
    api: ChatApi,
    connection: ConnectionManager,
    dispatcher: MessageDispatcher,
    registry: ObserverRegistry,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("api", &self.api)
            .field("connection", &self.connection)
            .finish()
    }
}

impl ChatClient {
    /// Client with the websocket hub transport and log-only notices
    pub fn new(config: &CommonConfig, tokens: Arc<dyn TokenSource>) -> ChatResult<Self> {
        Self::with_parts(
            &config.api,
            config.hub.clone(),
            tokens,
            Arc::new(WebSocketTransport::new()),
            Arc::new(TracingNoticeSink),
        )
    }

    /// Client with explicit collaborators
    pub fn with_parts(
        api_config: &ChatApiConfig,
        hub_config: HubConfig,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn HubTransport>,
        notice_sink: Arc<dyn NoticeSink>,
    ) -> ChatResult<Self> {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let api = ChatApi::new(api_config, Arc::clone(&tokens))?;
        let connection =
            ConnectionManager::new(hub_config, transport, tokens, dispatcher.clone(), notice_sink);

        Ok(Self {
            api,
            connection,
            dispatcher,
            registry,
        })
    }

    /// Push channel lifecycle (enable, disable, stop, state)
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn api(&self) -> &ChatApi {
        &self.api
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub async fn create_conversation(&self, ad_id: &str) -> ChatResult<Conversation> {
        self.api.create_conversation(ad_id).await
    }

    pub async fn list_conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        self.api.list_conversations().await
    }

    pub async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> ChatResult<ConversationDetail> {
        self.api.get_conversation(conversation_id).await
    }

    /// Fetch history and count it as delivered
    ///
    /// A later push of a fetched message is suppressed.
    pub async fn list_messages(&self, conversation_id: &ConversationId) -> ChatResult<Vec<Message>> {
        self.connection.ensure_connected();
        let messages = self.api.list_messages(conversation_id).await?;
        self.dispatcher
            .mark_seen(conversation_id, messages.iter().map(|m| &m.id));
        Ok(messages)
    }

    /// Send through the REST API and deliver the stored message locally
    ///
    /// On failure nothing is delivered and the caller gets
    /// [`ChatError::Delivery`] with a readable reason.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
    ) -> ChatResult<Message> {
        if content.trim().is_empty() {
            return Err(ChatError::InvalidInput(
                "message content cannot be empty".to_string(),
            ));
        }
        self.connection.ensure_connected();

        let message = self
            .api
            .send_message(conversation_id, content)
            .await
            .map_err(|e| match e {
                ChatError::NotAuthenticated => ChatError::NotAuthenticated,
                other => ChatError::Delivery {
                    conversation_id: conversation_id.clone(),
                    reason: other.to_string(),
                },
            })?;

        match self.dispatcher.deliver(message.clone()) {
            DispatchOutcome::Delivered { observers } => {
                debug!(message_id = %message.id, observers, "Delivered sent message")
            }
            DispatchOutcome::Duplicate => {
                debug!(message_id = %message.id, "Sent message already arrived by push")
            }
            DispatchOutcome::Dropped(_) => {}
        }
        Ok(message)
    }

    pub async fn mark_read(&self, conversation_id: &ConversationId) -> ChatResult<MarkReadAck> {
        self.api.mark_read(conversation_id).await
    }

    /// Open a live view of a conversation
    ///
    /// Registers `callback`, makes the conversation the fallback for pushes
    /// without a conversation id, joins its hub group and nudges the channel
    /// into connecting. Dropping the view undoes all of it.
    pub fn open_conversation<F>(&self, conversation_id: ConversationId, callback: F) -> ConversationView
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let subscription = self
            .registry
            .subscribe_to_conversation(conversation_id.clone(), callback);
        self.dispatcher.open_view(&conversation_id);
        self.connection.join_conversation(&conversation_id);
        self.connection.ensure_connected();
        info!(conversation_id = %conversation_id, "Conversation view opened");

        ConversationView {
            conversation_id,
            subscription: Some(subscription),
            dispatcher: self.dispatcher.clone(),
            connection: self.connection.clone(),
        }
    }

    /// Observe messages of a conversation without opening a view
    pub fn subscribe_to_conversation<F>(
        &self,
        conversation_id: ConversationId,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.registry.subscribe_to_conversation(conversation_id, callback)
    }

    /// Observe connectivity; the callback runs once right away with the current value
    pub fn subscribe_to_connection_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.registry.subscribe_to_connection_state(callback)
    }
}

/// Open conversation view; closing or dropping it releases everything it holds
#[must_use = "dropping a ConversationView closes it immediately"]
pub struct ConversationView {
    conversation_id: ConversationId,
    subscription: Option<Subscription>,
    dispatcher: MessageDispatcher,
    connection: ConnectionManager,
}

impl ConversationView {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Make this view the fallback for pushes without a conversation id
    pub fn focus(&self) {
        self.dispatcher.set_focus(&self.conversation_id);
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        subscription.unsubscribe();
        self.dispatcher.close_view(&self.conversation_id);
        self.connection.leave_conversation(&self.conversation_id);
        info!(conversation_id = %self.conversation_id, "Conversation view closed");
    }
}

impl Drop for ConversationView {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ConversationView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationView")
            .field("conversation_id", &self.conversation_id)
            .field("open", &self.subscription.is_some())
            .finish()
    }
}
