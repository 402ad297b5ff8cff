//! Shared helpers for chat-client integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bazaar_chat_client::hub::{HandshakeRequest, HubEvent, HubInvocation, HubLink, HubTransport};
use bazaar_chat_client::{
    ChatClient, ConnectError, ConnectResult, Message, Notice, NoticeKind, NoticeSink, RawMessage,
    StaticTokenSource, TokenSource,
};
use bazaar_shared_config::{ChatApiConfig, HubConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Outcome of one scripted handshake
#[derive(Debug, Clone)]
pub enum Handshake {
    Accept,
    Fail(ConnectError),
}

struct Session {
    url: String,
    events: mpsc::Sender<HubEvent>,
    invocations: mpsc::Receiver<HubInvocation>,
}

/// Hub transport driven by a script; accepts once the script runs out
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Handshake>>,
    delay: Mutex<Duration>,
    opens: AtomicUsize,
    sessions: Mutex<Vec<Session>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every handshake takes `delay`
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let transport = Self::default();
        *transport.delay.lock() = delay;
        Arc::new(transport)
    }

    pub fn push(&self, handshake: Handshake) {
        self.script.lock().push_back(handshake);
    }

    /// Queue `count` transport failures
    pub fn fail_next(&self, count: usize) {
        for _ in 0..count {
            self.push(Handshake::Fail(ConnectError::Transport(
                "connection refused".to_string(),
            )));
        }
    }

    /// Handshakes attempted so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn last_url(&self) -> Option<String> {
        self.sessions.lock().last().map(|s| s.url.clone())
    }

    fn latest_events(&self) -> mpsc::Sender<HubEvent> {
        self.sessions
            .lock()
            .last()
            .map(|s| s.events.clone())
            .expect("no hub session opened")
    }

    /// Push a message over the latest session
    pub async fn push_message(&self, message: serde_json::Value) {
        let raw: RawMessage = serde_json::from_value(message).expect("valid message json");
        self.latest_events()
            .send(HubEvent::ReceiveMessage(raw))
            .await
            .expect("session closed");
    }

    /// End the latest session from the hub side
    pub async fn close_latest(&self, error: Option<&str>) {
        self.latest_events()
            .send(HubEvent::Closed {
                error: error.map(str::to_string),
            })
            .await
            .expect("session closed");
    }

    /// Hub calls sent on session `index` so far
    pub fn invocations(&self, index: usize) -> Vec<HubInvocation> {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(index) else {
            return Vec::new();
        };
        let mut received = Vec::new();
        while let Ok(invocation) = session.invocations.try_recv() {
            received.push(invocation);
        }
        received
    }
}

#[async_trait]
impl HubTransport for ScriptedTransport {
    async fn open(&self, request: HandshakeRequest) -> ConnectResult<HubLink> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front().unwrap_or(Handshake::Accept);
        match next {
            Handshake::Fail(e) => Err(e),
            Handshake::Accept => {
                let (link, events, invocations) = HubLink::channel();
                self.sessions.lock().push(Session {
                    url: request.url,
                    events,
                    invocations,
                });
                Ok(link)
            }
        }
    }
}

/// Notice sink that remembers what it was asked to show
#[derive(Default)]
pub struct RecordingNoticeSink {
    shown: Mutex<Vec<NoticeKind>>,
}

impl RecordingNoticeSink {
    pub fn shown(&self) -> Vec<NoticeKind> {
        self.shown.lock().clone()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn show(&self, notice: &Notice) {
        self.shown.lock().push(notice.kind);
    }
}

/// Hub settings with short delays
pub fn fast_hub_config() -> HubConfig {
    HubConfig {
        reconnect_base_ms: 10,
        reconnect_max_ms: 50,
        reconnect_jitter: 0.0,
        poll_interval_ms: 10,
        wait_timeout_secs: 1,
        notice_interval_secs: 0,
        ..HubConfig::default()
    }
}

pub struct Harness {
    pub client: ChatClient,
    pub transport: Arc<ScriptedTransport>,
    pub notices: Arc<RecordingNoticeSink>,
}

/// Client against `api_url` with a scripted hub
pub fn harness_with(
    api_url: &str,
    transport: Arc<ScriptedTransport>,
    tokens: Arc<dyn TokenSource>,
) -> Harness {
    let notices = Arc::new(RecordingNoticeSink::default());
    let mut api_config = ChatApiConfig::with_url(api_url);
    api_config.retry_base_delay_ms = 1;
    let client = ChatClient::with_parts(
        &api_config,
        fast_hub_config(),
        tokens,
        transport.clone(),
        notices.clone(),
    )
    .expect("client builds");

    Harness {
        client,
        transport,
        notices,
    }
}

pub fn harness(transport: Arc<ScriptedTransport>) -> Harness {
    harness_with(
        "http://127.0.0.1:9",
        transport,
        Arc::new(StaticTokenSource::new("test-token")),
    )
}

/// Poll `condition` for up to two seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Message observer that records delivered ids
pub fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&Message) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |message: &Message| {
        sink.lock().push(message.id.to_string())
    })
}

/// Connection observer that records every value it is called with
pub fn state_recorder() -> (Arc<Mutex<Vec<bool>>>, impl Fn(bool) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |connected: bool| sink.lock().push(connected))
}
