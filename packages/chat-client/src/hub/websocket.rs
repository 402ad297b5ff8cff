//! Websocket transport on tokio-tungstenite

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::protocol::{self, HubFrame};
use super::transport::{HandshakeRequest, HubLink, HubTransport};
use super::{HubEvent, HubInvocation};
use crate::error::{ConnectError, ConnectResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client keep-alive; the hub drops silent clients after 30 seconds
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Production transport: websocket + JSON hub protocol
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn open(&self, request: HandshakeRequest) -> ConnectResult<HubLink> {
        let secs = request.handshake_timeout.as_secs();

        let (mut ws, response) = timeout(request.handshake_timeout, connect_async(request.url.as_str()))
            .await
            .map_err(|_| ConnectError::Timeout(secs))?
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        debug!(status = %response.status(), "Hub websocket opened");

        ws.send(WsMessage::Text(protocol::handshake_request()))
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

        let leftover = timeout(request.handshake_timeout, read_handshake(&mut ws))
            .await
            .map_err(|_| ConnectError::Timeout(secs))??;

        let (link, event_tx, invocation_rx) = HubLink::channel();
        let (sink, stream) = ws.split();
        tokio::spawn(pump(sink, stream, event_tx, invocation_rx, leftover));
        Ok(link)
    }
}

/// Wait for the handshake answer; returns frames that arrived with it
async fn read_handshake(ws: &mut WsStream) -> ConnectResult<String> {
    while let Some(message) = ws.next().await {
        match message.map_err(|e| ConnectError::Transport(e.to_string()))? {
            WsMessage::Text(text) => {
                let (first, rest) = match text.split_once(protocol::RECORD_SEPARATOR) {
                    Some((first, rest)) => (first.to_string(), rest.to_string()),
                    None => (text.clone(), String::new()),
                };
                protocol::parse_handshake_response(&first).map_err(ConnectError::Handshake)?;
                return Ok(rest);
            }
            WsMessage::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "closed during handshake".to_string());
                return Err(ConnectError::Handshake(reason));
            }
            _ => {}
        }
    }
    Err(ConnectError::Transport(
        "stream ended during handshake".to_string(),
    ))
}

enum Flow {
    Continue,
    /// Session over; carries the close error, if any
    Closed(Option<String>),
    /// Owner went away; stop silently
    Detached,
}

async fn forward_frames(payload: &str, events: &mpsc::Sender<HubEvent>) -> Flow {
    for frame in protocol::split_frames(payload) {
        match protocol::decode_frame(frame) {
            Ok(HubFrame::Invocation { target, arguments }) => {
                if let Some(event) = protocol::invocation_to_event(&target, arguments) {
                    if events.send(event).await.is_err() {
                        return Flow::Detached;
                    }
                }
            }
            Ok(HubFrame::Ping) => {}
            Ok(HubFrame::Close { error }) => return Flow::Closed(error),
            Ok(HubFrame::Other(kind)) => debug!(kind, "Ignoring hub frame"),
            Err(e) => warn!(error = %e, "Undecodable hub frame"),
        }
    }
    Flow::Continue
}

async fn pump(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut stream: SplitStream<WsStream>,
    events: mpsc::Sender<HubEvent>,
    mut outbound: mpsc::Receiver<HubInvocation>,
    leftover: String,
) {
    let mut flow = forward_frames(&leftover, &events).await;
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await;

    while let Flow::Continue = flow {
        flow = tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => forward_frames(&text, &events).await,
                Some(Ok(WsMessage::Close(frame))) => Flow::Closed(
                    frame
                        .filter(|f| f.code != CloseCode::Normal)
                        .map(|f| format!("closed with {}: {}", u16::from(f.code), f.reason)),
                ),
                Some(Ok(_)) => Flow::Continue,
                Some(Err(e)) => Flow::Closed(Some(e.to_string())),
                None => Flow::Closed(Some("connection reset".to_string())),
            },
            invocation = outbound.recv() => match invocation {
                Some(invocation) => {
                    match sink.send(WsMessage::Text(protocol::encode_invocation(&invocation))).await {
                        Ok(()) => Flow::Continue,
                        Err(e) => Flow::Closed(Some(e.to_string())),
                    }
                }
                None => Flow::Detached,
            },
            _ = keepalive.tick() => match sink.send(WsMessage::Text(protocol::ping_frame())).await {
                Ok(()) => Flow::Continue,
                Err(e) => Flow::Closed(Some(e.to_string())),
            },
        };
    }

    let _ = sink.close().await;
    if let Flow::Closed(error) = flow {
        debug!(error = ?error, "Hub session ended");
        let _ = events.send(HubEvent::Closed { error }).await;
    }
}
