//! Observer registry for messages and connection-state changes
//!
//! Message observers are keyed by conversation and notified in registration
//! order. Connection observers form one flat list. Every subscription returns a
//! [`Subscription`] handle; calling [`Subscription::unsubscribe`] or dropping
//! the handle removes exactly that callback, and a conversation whose last
//! observer leaves is removed from the map.
//!
//! Callbacks run outside the registry lock, so they may subscribe or
//! unsubscribe re-entrantly. A panicking callback is caught and logged; the
//! remaining observers are still notified.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::models::{ConversationId, Message};

/// Callback for messages of one conversation
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Callback for connection-state changes (`true` = connected)
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

type ObserverId = u64;

#[derive(Default)]
struct RegistryInner {
    next_id: ObserverId,
    conversations: HashMap<ConversationId, Vec<(ObserverId, MessageCallback)>>,
    connection: Vec<(ObserverId, ConnectionCallback)>,
    connected: bool,
}

impl RegistryInner {
    fn allocate_id(&mut self) -> ObserverId {
        self.next_id += 1;
        self.next_id
    }
}

/// Registry of message and connection-state observers
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

enum SubscriptionKey {
    Conversation(ConversationId, ObserverId),
    Connection(ObserverId),
}

/// Disposer for one registered callback
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    key: Option<SubscriptionKey>,
}

impl Subscription {
    /// Remove the callback now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        match key {
            SubscriptionKey::Conversation(conversation_id, id) => {
                if let Some(observers) = inner.conversations.get_mut(&conversation_id) {
                    observers.retain(|(observer_id, _)| *observer_id != id);
                    if observers.is_empty() {
                        inner.conversations.remove(&conversation_id);
                        debug!(conversation_id = %conversation_id, "Last observer left conversation");
                    }
                }
            }
            SubscriptionKey::Connection(id) => {
                inner.connection.retain(|(observer_id, _)| *observer_id != id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = match &self.key {
            Some(SubscriptionKey::Conversation(id, _)) => format!("conversation:{}", id),
            Some(SubscriptionKey::Connection(_)) => "connection".to_string(),
            None => "released".to_string(),
        };
        f.debug_struct("Subscription").field("key", &key).finish()
    }
}

fn isolate<F: FnOnce()>(what: &str, callback: F) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(observer = what, reason = %reason, "Observer callback panicked");
            false
        }
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for messages in `conversation_id`
    pub fn subscribe_to_conversation<F>(
        &self,
        conversation_id: ConversationId,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner
            .conversations
            .entry(conversation_id.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            registry: Arc::downgrade(&self.inner),
            key: Some(SubscriptionKey::Conversation(conversation_id, id)),
        }
    }

    /// Register a connection-state observer; it is called once right away with the current state
    pub fn subscribe_to_connection_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let callback: ConnectionCallback = Arc::new(callback);
        let (id, connected) = {
            let mut inner = self.inner.lock();
            let id = inner.allocate_id();
            inner.connection.push((id, Arc::clone(&callback)));
            (id, inner.connected)
        };

        isolate("connection", || callback(connected));

        Subscription {
            registry: Arc::downgrade(&self.inner),
            key: Some(SubscriptionKey::Connection(id)),
        }
    }

    /// Notify the conversation's observers; returns how many completed without panicking
    pub fn publish_message(&self, message: &Message) -> usize {
        let observers: Vec<MessageCallback> = {
            let inner = self.inner.lock();
            match inner.conversations.get(&message.conversation_id) {
                Some(observers) => observers.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return 0,
            }
        };

        observers
            .iter()
            .filter(|callback| isolate("message", || callback(message)))
            .count()
    }

    /// Record and broadcast the connection state
    pub fn publish_connection_state(&self, is_connected: bool) -> usize {
        let observers: Vec<ConnectionCallback> = {
            let mut inner = self.inner.lock();
            inner.connected = is_connected;
            inner.connection.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        observers
            .iter()
            .filter(|callback| isolate("connection", || callback(is_connected)))
            .count()
    }

    /// Last published connection state
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Conversations with at least one observer
    pub fn conversation_count(&self) -> usize {
        self.inner.lock().conversations.len()
    }

    /// Observers registered for one conversation
    pub fn observer_count(&self, conversation_id: &ConversationId) -> usize {
        self.inner
            .lock()
            .conversations
            .get(conversation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn connection_observer_count(&self) -> usize {
        self.inner.lock().connection.len()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ObserverRegistry")
            .field("conversations", &inner.conversations.len())
            .field("connection_observers", &inner.connection.len())
            .field("connected", &inner.connected)
            .finish()
    }
}
