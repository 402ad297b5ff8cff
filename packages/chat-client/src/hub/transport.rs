//! Transport seam between the connection manager and the wire

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{HubEvent, HubInvocation};
use crate::error::ConnectResult;

/// Capacity of the inbound event and outbound invocation queues
pub const LINK_CAPACITY: usize = 256;

/// Everything a transport needs for one connection attempt
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Fully resolved endpoint, credential included
    pub url: String,
    /// Deadline for connect plus protocol handshake
    pub handshake_timeout: Duration,
}

/// A live, handshaken hub session
///
/// Dropping `outbound` asks the transport to close; the transport reports the
/// end of the session with a final [`HubEvent::Closed`] and then closes `events`.
#[derive(Debug)]
pub struct HubLink {
    pub events: mpsc::Receiver<HubEvent>,
    pub outbound: mpsc::Sender<HubInvocation>,
}

impl HubLink {
    /// Create a link plus the transport-side halves
    pub fn channel() -> (Self, mpsc::Sender<HubEvent>, mpsc::Receiver<HubInvocation>) {
        let (event_tx, events) = mpsc::channel(LINK_CAPACITY);
        let (outbound, invocation_rx) = mpsc::channel(LINK_CAPACITY);
        (Self { events, outbound }, event_tx, invocation_rx)
    }
}

/// Opens hub sessions
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Connect and complete the protocol handshake
    async fn open(&self, request: HandshakeRequest) -> ConnectResult<HubLink>;
}
