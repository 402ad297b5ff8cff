//! Connection lifecycle: single-flight connect, circuit breaker, reconnect loop
//!
//! [`ConnectionManager`] is the only thing allowed to change the connection
//! state. Transitions happen under one mutex that is never held across an
//! await; side effects (observer callbacks, notices) run after it is released.
//!
//! Every attempt and every teardown bumps an epoch. An attempt whose epoch no
//! longer matches when it completes is superseded and its result is ignored,
//! and a session only reports its own close.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use bazaar_shared_config::HubConfig;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::breaker::{CooldownWindow, FailureCircuitBreaker};
use crate::connection::ChannelConnection;
use crate::dispatcher::MessageDispatcher;
use crate::error::{ConnectError, ConnectResult};
use crate::hub::{HandshakeRequest, HubInvocation, HubLink, HubTransport};
use crate::models::ConversationId;
use crate::notice::{NoticeGate, NoticeKind, NoticeSink};
use crate::state::ConnectionState;
use crate::token::TokenSource;

type SharedAttempt = Shared<BoxFuture<'static, ConnectResult<()>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Initial,
    Reconnect,
}

struct Machine {
    state: ConnectionState,
    breaker: FailureCircuitBreaker,
    cooldown: CooldownWindow,
    epoch: u64,
    in_flight: Option<SharedAttempt>,
    channel: Option<ChannelConnection>,
    reconnect: Option<JoinHandle<()>>,
    /// Conversation groups to be a member of, with open-view counts
    joined: HashMap<ConversationId, usize>,
}

impl Machine {
    /// Drop the session and any pending work; returns the session so it can be
    /// released outside the lock
    fn teardown(&mut self) -> Option<ChannelConnection> {
        self.epoch += 1;
        self.in_flight = None;
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.abort();
        }
        self.channel.take()
    }

    fn rejoin(&self) {
        let Some(channel) = &self.channel else {
            return;
        };
        for conversation_id in self.joined.keys() {
            if let Err(e) = channel.send(HubInvocation::join(conversation_id)) {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to rejoin conversation");
            }
        }
    }
}

/// Side effects of a transition, applied once the machine lock is released
#[derive(Default)]
struct Effects {
    publish: Option<bool>,
    notice: Option<NoticeKind>,
    released: Option<ChannelConnection>,
}

struct ManagerInner {
    config: HubConfig,
    transport: Arc<dyn HubTransport>,
    tokens: Arc<dyn TokenSource>,
    dispatcher: MessageDispatcher,
    notices: NoticeGate,
    policy: ReconnectPolicy,
    machine: Mutex<Machine>,
}

/// Owner of the push channel and its lifecycle
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        config: HubConfig,
        transport: Arc<dyn HubTransport>,
        tokens: Arc<dyn TokenSource>,
        dispatcher: MessageDispatcher,
        notice_sink: Arc<dyn NoticeSink>,
    ) -> Self {
        let machine = Machine {
            state: ConnectionState::Idle,
            breaker: FailureCircuitBreaker::new(config.failure_threshold),
            cooldown: CooldownWindow::new(config.cooldown()),
            epoch: 0,
            in_flight: None,
            channel: None,
            reconnect: None,
            joined: HashMap::new(),
        };

        Self {
            inner: Arc::new(ManagerInner {
                notices: NoticeGate::new(notice_sink, config.notice_interval()),
                policy: ReconnectPolicy::from_config(&config),
                config,
                transport,
                tokens,
                dispatcher,
                machine: Mutex::new(machine),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.machine.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Consecutive failures counted by the circuit breaker
    pub fn failure_count(&self) -> u32 {
        self.inner.machine.lock().breaker.failures()
    }

    /// Connect, or join the attempt already in flight
    ///
    /// Returns immediately when connected. Fails with
    /// [`ConnectError::Disabled`] while disabled and with
    /// [`ConnectError::NotAuthenticated`] when no usable credential exists;
    /// neither case touches the circuit breaker.
    pub async fn connect(&self) -> ConnectResult<()> {
        let attempt = {
            let mut machine = self.inner.machine.lock();
            match machine.state {
                ConnectionState::Disabled => return Err(ConnectError::Disabled),
                ConnectionState::Connected => return Ok(()),
                _ => {}
            }
            match machine.in_flight.clone() {
                Some(in_flight) => {
                    debug!(epoch = machine.epoch, "Joining in-flight connection attempt");
                    in_flight
                }
                None => {
                    let token = self.inner.tokens.usable_token().ok_or_else(|| {
                        debug!("No active login, skipping hub connection");
                        ConnectError::NotAuthenticated
                    })?;
                    self.inner.start_attempt(&mut machine, token)
                }
            }
        };
        attempt.await
    }

    /// Start connecting in the background if that could help; never waits
    pub fn ensure_connected(&self) {
        if !self.state().accepts_connect() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, skipping background connect");
            return;
        };
        let manager = self.clone();
        runtime.spawn(async move {
            if let Err(e) = manager.connect().await {
                debug!(error = %e, "Background connect did not succeed");
            }
        });
    }

    /// Wait for a live connection
    ///
    /// Starts an attempt when nothing is in progress; while one is in progress
    /// the state is polled at the configured interval up to the wait timeout.
    pub async fn wait_until_connected(&self) -> ConnectResult<()> {
        let poll_interval = self.inner.config.poll_interval();
        let limit = self.inner.config.wait_timeout();
        let started = tokio::time::Instant::now();

        loop {
            match self.state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disabled => return Err(ConnectError::Disabled),
                state if state.is_transitioning() => {}
                _ => return self.connect().await,
            }
            if started.elapsed() >= limit {
                warn!(waited_secs = limit.as_secs(), "Gave up waiting for hub connection");
                return Err(ConnectError::Timeout(limit.as_secs()));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Close the session; a later `connect()` starts over
    pub fn stop(&self) {
        let effects = {
            let mut machine = self.inner.machine.lock();
            let was_live = matches!(
                machine.state,
                ConnectionState::Connected | ConnectionState::Reconnecting
            );
            let released = machine.teardown();
            if machine.state != ConnectionState::Disabled {
                machine.state = ConnectionState::Closed;
            }
            info!(epoch = machine.epoch, "Hub connection stopped");
            Effects {
                publish: was_live.then_some(false),
                released,
                ..Effects::default()
            }
        };
        self.inner.apply(effects);
    }

    /// Turn real-time delivery off until `enable()`
    pub fn disable(&self) {
        let effects = {
            let mut machine = self.inner.machine.lock();
            if machine.state == ConnectionState::Disabled {
                return;
            }
            let was_live = matches!(
                machine.state,
                ConnectionState::Connected | ConnectionState::Reconnecting
            );
            let released = machine.teardown();
            machine.state = ConnectionState::Disabled;
            info!("Real-time delivery disabled");
            Effects {
                publish: was_live.then_some(false),
                notice: Some(NoticeKind::RealtimeDisabled),
                released,
            }
        };
        self.inner.apply(effects);
    }

    /// Leave the disabled state and clear failure accounting
    pub fn enable(&self) {
        let effects = {
            let mut machine = self.inner.machine.lock();
            machine.breaker.reset();
            machine.cooldown.reset();
            if machine.state != ConnectionState::Disabled {
                return;
            }
            machine.epoch += 1;
            machine.state = ConnectionState::Idle;
            info!("Real-time delivery enabled");
            Effects {
                notice: Some(NoticeKind::RealtimeEnabled),
                ..Effects::default()
            }
        };
        self.inner.apply(effects);
    }

    /// Become a member of a conversation's push group (counted per open view)
    pub fn join_conversation(&self, conversation_id: &ConversationId) {
        let mut machine = self.inner.machine.lock();
        let views = machine.joined.entry(conversation_id.clone()).or_insert(0);
        *views += 1;
        if *views > 1 {
            return;
        }
        if let Some(channel) = &machine.channel {
            if let Err(e) = channel.send(HubInvocation::join(conversation_id)) {
                debug!(conversation_id = %conversation_id, error = %e, "Join deferred to next connect");
            }
        }
    }

    /// Drop one view's membership; the group is left with the last one
    pub fn leave_conversation(&self, conversation_id: &ConversationId) {
        let mut machine = self.inner.machine.lock();
        let Some(views) = machine.joined.get_mut(conversation_id) else {
            return;
        };
        *views = views.saturating_sub(1);
        if *views > 0 {
            return;
        }
        machine.joined.remove(conversation_id);
        if let Some(channel) = &machine.channel {
            if let Err(e) = channel.send(HubInvocation::leave(conversation_id)) {
                debug!(conversation_id = %conversation_id, error = %e, "Leave not sent");
            }
        }
    }

    /// Conversations currently joined
    pub fn joined_conversations(&self) -> Vec<ConversationId> {
        let mut joined: Vec<_> = self.inner.machine.lock().joined.keys().cloned().collect();
        joined.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        joined
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let machine = self.inner.machine.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &machine.state)
            .field("failures", &machine.breaker.failures())
            .field("epoch", &machine.epoch)
            .finish()
    }
}

impl ManagerInner {
    fn apply(&self, effects: Effects) {
        drop(effects.released);
        if let Some(kind) = effects.notice {
            self.notices.raise(kind);
        }
        if let Some(connected) = effects.publish {
            self.dispatcher.registry().publish_connection_state(connected);
        }
    }

    /// Begin a handshake under the machine lock and return its shared outcome
    fn start_attempt(self: &Arc<Self>, machine: &mut Machine, token: String) -> SharedAttempt {
        let now = Instant::now();
        if machine.cooldown.is_cooling(now) {
            debug!(
                since_last_ms = machine
                    .cooldown
                    .elapsed(now)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or_default(),
                "Connection attempt inside cooldown window, proceeding"
            );
        }
        machine.cooldown.record_attempt(now);

        let kind = if machine.state == ConnectionState::Reconnecting {
            AttemptKind::Reconnect
        } else {
            machine.state = ConnectionState::Connecting;
            AttemptKind::Initial
        };
        machine.epoch += 1;
        let epoch = machine.epoch;
        debug!(epoch, ?kind, failures = machine.breaker.failures(), "Starting hub handshake");

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.run_attempt(epoch, kind, token).await });
        let attempt = async move {
            handle.await.unwrap_or_else(|e| {
                Err(ConnectError::Transport(format!("connect task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        machine.in_flight = Some(attempt.clone());
        attempt
    }

    async fn run_attempt(
        self: Arc<Self>,
        epoch: u64,
        kind: AttemptKind,
        token: String,
    ) -> ConnectResult<()> {
        let result = match self.config.websocket_url(&token) {
            Ok(url) => {
                self.transport
                    .open(HandshakeRequest {
                        url,
                        handshake_timeout: self.config.handshake_timeout(),
                    })
                    .await
            }
            Err(e) => Err(ConnectError::Transport(e.to_string())),
        };
        self.finish_attempt(epoch, kind, result)
    }

    fn finish_attempt(
        self: &Arc<Self>,
        epoch: u64,
        kind: AttemptKind,
        result: ConnectResult<HubLink>,
    ) -> ConnectResult<()> {
        let (outcome, effects) = {
            let mut machine = self.machine.lock();
            if machine.epoch != epoch {
                debug!(epoch, current = machine.epoch, "Ignoring superseded connection attempt");
                return Err(ConnectError::Superseded);
            }
            machine.in_flight = None;

            match result {
                Ok(link) => {
                    let weak = Arc::downgrade(self);
                    let channel =
                        ChannelConnection::attach(link, epoch, self.dispatcher.clone(), move |error| {
                            if let Some(inner) = weak.upgrade() {
                                inner.on_closed(epoch, error);
                            }
                        });
                    let replaced = machine.channel.replace(channel);
                    machine.state = ConnectionState::Connected;
                    machine.breaker.record_success();
                    machine.reconnect = None;
                    machine.rejoin();
                    info!(epoch, ?kind, joined = machine.joined.len(), "Hub connected");
                    (
                        Ok(()),
                        Effects {
                            publish: Some(true),
                            released: replaced,
                            ..Effects::default()
                        },
                    )
                }
                Err(e) => {
                    let counted = e.counts_toward_breaker();
                    let tripped = counted && machine.breaker.record_failure();
                    let notice = if machine.breaker.is_tripped() {
                        machine.state = ConnectionState::Disabled;
                        if tripped {
                            warn!(
                                failures = machine.breaker.failures(),
                                threshold = machine.breaker.threshold(),
                                error = %e,
                                "Circuit breaker opened, real-time delivery disabled"
                            );
                            Some(NoticeKind::CircuitOpen)
                        } else {
                            None
                        }
                    } else {
                        warn!(
                            epoch,
                            ?kind,
                            failures = machine.breaker.failures(),
                            remaining = machine.breaker.remaining(),
                            error = %e,
                            "Hub connection attempt failed"
                        );
                        if kind == AttemptKind::Initial || !counted {
                            machine.state = ConnectionState::Error;
                        }
                        None
                    };
                    let publish = (kind == AttemptKind::Initial
                        || machine.state != ConnectionState::Reconnecting)
                        .then_some(false);
                    (
                        Err(e),
                        Effects {
                            publish,
                            notice,
                            released: None,
                        },
                    )
                }
            }
        };
        self.apply(effects);
        outcome
    }

    /// The session behind `epoch` ended on its own
    fn on_closed(self: &Arc<Self>, epoch: u64, error: Option<String>) {
        let effects = {
            let mut machine = self.machine.lock();
            let current = machine
                .channel
                .as_ref()
                .map(|channel| channel.epoch() == epoch)
                .unwrap_or(false);
            if !current || machine.state != ConnectionState::Connected {
                debug!(epoch, "Ignoring close of a replaced session");
                return;
            }
            let released = machine.channel.take();

            match error {
                None => {
                    machine.state = ConnectionState::Closed;
                    info!(epoch, "Hub closed the connection");
                    Effects {
                        publish: Some(false),
                        released,
                        ..Effects::default()
                    }
                }
                Some(error) => {
                    let tripped = machine.breaker.record_failure();
                    if machine.breaker.is_tripped() {
                        machine.state = ConnectionState::Disabled;
                        warn!(
                            epoch,
                            failures = machine.breaker.failures(),
                            threshold = machine.breaker.threshold(),
                            error = %error,
                            "Hub connection lost, circuit breaker open"
                        );
                        Effects {
                            publish: Some(false),
                            notice: tripped.then_some(NoticeKind::CircuitOpen),
                            released,
                        }
                    } else {
                        machine.state = ConnectionState::Reconnecting;
                        warn!(
                            epoch,
                            failures = machine.breaker.failures(),
                            remaining = machine.breaker.remaining(),
                            error = %error,
                            "Hub connection lost, reconnecting"
                        );
                        let weak = Arc::downgrade(self);
                        if let Some(previous) = machine.reconnect.replace(tokio::spawn(reconnect_loop(weak))) {
                            previous.abort();
                        }
                        Effects {
                            publish: Some(false),
                            released,
                            ..Effects::default()
                        }
                    }
                }
            }
        };
        self.apply(effects);
    }
}

/// Retry with backoff while the machine stays in `Reconnecting`
///
/// Each failure is counted by the breaker, so the loop ends at the latest when
/// the breaker opens and the machine moves to `Disabled`.
async fn reconnect_loop(inner: Weak<ManagerInner>) {
    let mut attempt: u32 = 0;
    loop {
        let Some(delay) = inner.upgrade().map(|inner| inner.policy.delay(attempt)) else {
            return;
        };
        tokio::time::sleep(delay).await;

        let Some(manager) = inner.upgrade() else {
            return;
        };
        let next = {
            let mut machine = manager.machine.lock();
            if machine.state != ConnectionState::Reconnecting {
                return;
            }
            match machine.in_flight.clone() {
                Some(in_flight) => in_flight,
                None => match manager.tokens.usable_token() {
                    Some(token) => {
                        debug!(
                            attempt = attempt + 1,
                            remaining = machine.breaker.remaining(),
                            delay_ms = delay.as_millis() as u64,
                            "Reconnecting to hub"
                        );
                        manager.start_attempt(&mut machine, token)
                    }
                    None => {
                        info!("Login ended while reconnecting, closing hub connection");
                        machine.state = ConnectionState::Closed;
                        machine.reconnect = None;
                        return;
                    }
                },
            }
        };
        drop(manager);

        match next.await {
            Ok(()) | Err(ConnectError::Superseded) => return,
            Err(_) => attempt = attempt.saturating_add(1),
        }
    }
}
