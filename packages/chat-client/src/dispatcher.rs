//! Single entry point for messages on their way to observers
//!
//! Both delivery paths (hub push and the acknowledgement of a local send) go
//! through [`MessageDispatcher`]. It resolves the conversation id, drops
//! payloads that cannot be attributed to a conversation, and suppresses any
//! message id already delivered for that conversation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::models::{ConversationId, Message, MessageId, MissingField, RawMessage};
use crate::registry::ObserverRegistry;

/// What happened to a dispatched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to `observers` callbacks
    Delivered { observers: usize },
    /// Id already delivered for this conversation
    Duplicate,
    /// Payload unusable; nothing delivered
    Dropped(MissingField),
}

#[derive(Default)]
struct ConversationLedger {
    open_views: usize,
    seen: HashSet<MessageId>,
    delivered: Vec<MessageId>,
}

impl ConversationLedger {
    fn record(&mut self, id: &MessageId) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.delivered.push(id.clone());
        true
    }
}

#[derive(Default)]
struct DispatchState {
    ledgers: HashMap<ConversationId, ConversationLedger>,
    /// Open views, most recent last; the last one is the fallback conversation
    focus: Vec<ConversationId>,
}

/// Deduplicating fan-out in front of the [`ObserverRegistry`]
#[derive(Clone)]
pub struct MessageDispatcher {
    registry: ObserverRegistry,
    state: Arc<Mutex<DispatchState>>,
}

impl MessageDispatcher {
    pub fn new(registry: ObserverRegistry) -> Self {
        Self {
            registry,
            state: Arc::new(Mutex::new(DispatchState::default())),
        }
    }

    pub fn registry(&self) -> &ObserverRegistry {
        &self.registry
    }

    /// Resolve a wire message and deliver it
    ///
    /// `fallback` takes precedence over the focused conversation when the
    /// payload has no conversation id.
    pub fn dispatch(&self, raw: RawMessage, fallback: Option<&ConversationId>) -> DispatchOutcome {
        let focused = self.focus();
        let fallback = fallback.or(focused.as_ref());

        match raw.resolve(fallback) {
            Ok(message) => self.deliver(message),
            Err(field) => {
                warn!(missing = %field, "Dropping message that cannot be attributed to a conversation");
                DispatchOutcome::Dropped(field)
            }
        }
    }

    /// Deliver an already-resolved message unless its id was seen before
    pub fn deliver(&self, message: Message) -> DispatchOutcome {
        let fresh = self
            .state
            .lock()
            .ledgers
            .entry(message.conversation_id.clone())
            .or_default()
            .record(&message.id);

        if !fresh {
            debug!(
                message_id = %message.id,
                conversation_id = %message.conversation_id,
                "Suppressing duplicate message"
            );
            return DispatchOutcome::Duplicate;
        }

        let observers = self.registry.publish_message(&message);
        DispatchOutcome::Delivered { observers }
    }

    /// Treat ids as delivered without notifying anyone (history already on screen)
    pub fn mark_seen<'a, I>(&self, conversation_id: &ConversationId, ids: I)
    where
        I: IntoIterator<Item = &'a MessageId>,
    {
        let mut state = self.state.lock();
        let ledger = state.ledgers.entry(conversation_id.clone()).or_default();
        for id in ids {
            ledger.record(id);
        }
    }

    /// A conversation view opened; it becomes the fallback conversation
    pub fn open_view(&self, conversation_id: &ConversationId) {
        let mut state = self.state.lock();
        state
            .ledgers
            .entry(conversation_id.clone())
            .or_default()
            .open_views += 1;
        state.focus.push(conversation_id.clone());
    }

    /// A conversation view closed
    ///
    /// The ledger is released with the last view, unless observers registered
    /// outside a view still watch the conversation; they keep its dedup history.
    pub fn close_view(&self, conversation_id: &ConversationId) {
        let observed = self.registry.observer_count(conversation_id) > 0;
        let mut state = self.state.lock();
        if let Some(pos) = state.focus.iter().rposition(|c| c == conversation_id) {
            state.focus.remove(pos);
        }
        let release = match state.ledgers.get_mut(conversation_id) {
            Some(ledger) => {
                ledger.open_views = ledger.open_views.saturating_sub(1);
                ledger.open_views == 0 && !observed
            }
            None => false,
        };
        if release {
            state.ledgers.remove(conversation_id);
            debug!(conversation_id = %conversation_id, "Released dedup ledger");
        }
    }

    /// Bring an open view to the front; returns false if no view of it is open
    pub fn set_focus(&self, conversation_id: &ConversationId) -> bool {
        let mut state = self.state.lock();
        match state.focus.iter().rposition(|c| c == conversation_id) {
            Some(pos) => {
                let focused = state.focus.remove(pos);
                state.focus.push(focused);
                true
            }
            None => false,
        }
    }

    /// Conversation used for payloads without one
    pub fn focus(&self) -> Option<ConversationId> {
        self.state.lock().focus.last().cloned()
    }

    /// Delivered ids for a conversation, in delivery order
    pub fn delivered_ids(&self, conversation_id: &ConversationId) -> Vec<MessageId> {
        self.state
            .lock()
            .ledgers
            .get(conversation_id)
            .map(|ledger| ledger.delivered.clone())
            .unwrap_or_default()
    }

    /// Conversations with an open view
    pub fn open_view_count(&self) -> usize {
        self.state
            .lock()
            .ledgers
            .values()
            .filter(|ledger| ledger.open_views > 0)
            .count()
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageDispatcher")
            .field("ledgers", &state.ledgers.len())
            .field("focus", &state.focus.last())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    fn raw(id: &str, conversation: Option<&str>) -> RawMessage {
        RawMessage {
            id: Some(id.into()),
            conversation_id: conversation.map(ConversationId::from),
            content: Some("hello".to_string()),
            ..RawMessage::default()
        }
    }

    fn counting(registry: &ObserverRegistry, conversation: &str) -> (Arc<AtomicUsize>, crate::Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sub = registry.subscribe_to_conversation(conversation.into(), move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn test_duplicate_id_delivered_once() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let (count, _sub) = counting(&registry, "C1");

        assert_eq!(
            dispatcher.dispatch(raw("M1", Some("C1")), None),
            DispatchOutcome::Delivered { observers: 1 }
        );
        assert_eq!(
            dispatcher.dispatch(raw("M1", Some("C1")), None),
            DispatchOutcome::Duplicate
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_id_in_other_conversation_is_independent() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());

        dispatcher.dispatch(raw("M1", Some("C1")), None);
        assert_eq!(
            dispatcher.dispatch(raw("M1", Some("C2")), None),
            DispatchOutcome::Delivered { observers: 0 }
        );
    }

    #[test]
    #[traced_test]
    fn test_no_conversation_and_no_fallback_is_dropped() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let (count, _sub) = counting(&registry, "C1");

        assert_eq!(
            dispatcher.dispatch(raw("M1", None), None),
            DispatchOutcome::Dropped(MissingField::ConversationId)
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(logs_contain("cannot be attributed to a conversation"));
    }

    #[test]
    fn test_explicit_fallback_attached() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let (count, _sub) = counting(&registry, "C1");

        let fallback = ConversationId::from("C1");
        dispatcher.dispatch(raw("M1", None), Some(&fallback));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_focused_view_is_fallback() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let (count, _sub) = counting(&registry, "C2");

        dispatcher.open_view(&"C1".into());
        dispatcher.open_view(&"C2".into());
        dispatcher.dispatch(raw("M1", None), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        dispatcher.close_view(&"C2".into());
        assert_eq!(dispatcher.focus(), Some(ConversationId::from("C1")));
    }

    #[test]
    fn test_set_focus_only_for_open_views() {
        let dispatcher = MessageDispatcher::new(ObserverRegistry::new());
        dispatcher.open_view(&"C1".into());
        dispatcher.open_view(&"C2".into());

        assert!(dispatcher.set_focus(&"C1".into()));
        assert_eq!(dispatcher.focus(), Some(ConversationId::from("C1")));
        assert!(!dispatcher.set_focus(&"C3".into()));
        assert_eq!(dispatcher.focus(), Some(ConversationId::from("C1")));
    }

    #[test]
    fn test_mark_seen_suppresses_later_push() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let (count, _sub) = counting(&registry, "C1");

        let history = vec![MessageId::from("M1"), MessageId::from("M2")];
        dispatcher.mark_seen(&"C1".into(), &history);

        assert_eq!(
            dispatcher.dispatch(raw("M2", Some("C1")), None),
            DispatchOutcome::Duplicate
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ledger_released_with_last_view() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry);
        let c1 = ConversationId::from("C1");

        dispatcher.open_view(&c1);
        dispatcher.open_view(&c1);
        dispatcher.dispatch(raw("M1", Some("C1")), None);

        dispatcher.close_view(&c1);
        assert_eq!(dispatcher.delivered_ids(&c1), vec![MessageId::from("M1")]);

        dispatcher.close_view(&c1);
        assert!(dispatcher.delivered_ids(&c1).is_empty());
        assert_eq!(dispatcher.open_view_count(), 0);
    }

    #[test]
    fn test_ledger_kept_while_subscriber_outlives_view() {
        let registry = ObserverRegistry::new();
        let dispatcher = MessageDispatcher::new(registry.clone());
        let (count, _sub) = counting(&registry, "C1");
        let c1 = ConversationId::from("C1");

        dispatcher.dispatch(raw("M1", Some("C1")), None);
        dispatcher.open_view(&c1);
        dispatcher.close_view(&c1);

        assert_eq!(
            dispatcher.dispatch(raw("M1", Some("C1")), None),
            DispatchOutcome::Duplicate
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.open_view_count(), 0);
    }
}
