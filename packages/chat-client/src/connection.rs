//! The one live hub session
//!
//! A [`ChannelConnection`] wraps a handshaken [`HubLink`] and a forwarding task
//! that feeds pushed messages into the dispatcher. It is never reused: each
//! successful connect builds a new one, and dropping it tears down the
//! forwarder so a stale session cannot deliver into its successor.

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, MessageDispatcher};
use crate::error::{ConnectError, ConnectResult};
use crate::hub::{HubEvent, HubInvocation, HubLink};

/// Live hub session owned by the connection manager
pub struct ChannelConnection {
    epoch: u64,
    outbound: mpsc::Sender<HubInvocation>,
    forwarder: JoinHandle<()>,
}

impl ChannelConnection {
    /// Start forwarding events from `link`
    ///
    /// `on_closed` runs once when the session ends on its own, with the close
    /// error if the end was abnormal. It does not run after the connection is
    /// dropped.
    pub(crate) fn attach<F>(
        link: HubLink,
        epoch: u64,
        dispatcher: MessageDispatcher,
        on_closed: F,
    ) -> Self
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        let HubLink {
            mut events,
            outbound,
        } = link;

        let forwarder = tokio::spawn(async move {
            let error = loop {
                match events.recv().await {
                    Some(HubEvent::ReceiveMessage(raw)) => {
                        if let DispatchOutcome::Dropped(field) = dispatcher.dispatch(raw, None) {
                            debug!(epoch, missing = %field, "Pushed message dropped");
                        }
                    }
                    Some(HubEvent::MessagesRead(conversation_id)) => {
                        debug!(conversation_id = %conversation_id, "Conversation marked read");
                    }
                    Some(HubEvent::Closed { error }) => break error,
                    None => break Some("hub link ended without a close".to_string()),
                }
            };
            on_closed(error);
        });

        info!(epoch, "Hub session attached");
        Self {
            epoch,
            outbound,
            forwarder,
        }
    }

    /// Attempt epoch this session was created by
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a fire-and-forget hub call
    pub fn send(&self, invocation: HubInvocation) -> ConnectResult<()> {
        match self.outbound.try_send(invocation) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(invocation)) => {
                warn!(target = %invocation.target, "Hub outbound queue full, dropping call");
                Err(ConnectError::Transport("outbound queue full".to_string()))
            }
            Err(TrySendError::Closed(_)) => Err(ConnectError::NotConnected),
        }
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        self.forwarder.abort();
        debug!(epoch = self.epoch, "Hub session torn down");
    }
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("epoch", &self.epoch)
            .field("closed", &self.outbound.is_closed())
            .finish()
    }
}
