//! Connection lifecycle tests against a scripted hub

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bazaar_chat_client::hub::JOIN_CONVERSATION;
use bazaar_chat_client::{ConnectError, ConnectionState, NoticeKind, SessionTokens};
use futures_util::future::join_all;

use common::{eventually, harness, harness_with, recorder, state_recorder, ScriptedTransport};

#[tokio::test]
async fn test_concurrent_connects_share_one_handshake() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(50));
    let h = harness(transport.clone());
    let manager = h.client.connection();

    let results = join_all((0..8).map(|_| manager.connect())).await;

    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert_eq!(transport.opens(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_when_connected_is_noop() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());
    let manager = h.client.connection();

    manager.connect().await.unwrap();
    manager.connect().await.unwrap();

    assert_eq!(transport.opens(), 1);
}

#[tokio::test]
async fn test_token_travels_in_connection_url() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());

    h.client.connection().connect().await.unwrap();

    let url = transport.last_url().unwrap();
    assert!(url.starts_with("ws://"), "{}", url);
    assert!(url.contains("access_token=test-token"), "{}", url);
}

#[tokio::test]
async fn test_three_failures_disable_until_enable() {
    let transport = ScriptedTransport::new();
    transport.fail_next(3);
    let h = harness(transport.clone());
    let manager = h.client.connection();

    for _ in 0..3 {
        assert_matches!(manager.connect().await, Err(ConnectError::Transport(_)));
    }
    assert_eq!(manager.state(), ConnectionState::Disabled);
    assert_eq!(h.notices.shown(), vec![NoticeKind::CircuitOpen]);

    // Fourth call is rejected without a handshake
    assert_eq!(manager.connect().await, Err(ConnectError::Disabled));
    assert_eq!(transport.opens(), 3);

    manager.enable();
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert_eq!(manager.failure_count(), 0);

    manager.connect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.failure_count(), 0);
    assert_eq!(
        h.notices.shown(),
        vec![NoticeKind::CircuitOpen, NoticeKind::RealtimeEnabled]
    );
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let transport = ScriptedTransport::new();
    transport.fail_next(2);
    let h = harness(transport.clone());
    let (states, observer) = state_recorder();
    let _sub = h.client.subscribe_to_connection_state(observer);
    let manager = h.client.connection();

    assert!(manager.connect().await.is_err());
    assert!(manager.connect().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Error);
    assert_eq!(manager.failure_count(), 2);

    manager.connect().await.unwrap();
    assert_eq!(manager.failure_count(), 0);
    // Replay, two failed attempts, then the connect
    assert_eq!(*states.lock(), vec![false, false, false, true]);
}

#[tokio::test]
async fn test_stop_when_connected_notifies_observers() {
    let transport = ScriptedTransport::new();
    let h = harness(transport);
    let (states, observer) = state_recorder();
    let _sub = h.client.subscribe_to_connection_state(observer);
    let manager = h.client.connection();

    manager.connect().await.unwrap();
    manager.stop();

    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(*states.lock(), vec![false, true, false]);
}

#[tokio::test]
async fn test_disable_when_connected_notifies_observers() {
    let transport = ScriptedTransport::new();
    let h = harness(transport);
    let (states, observer) = state_recorder();
    let _sub = h.client.subscribe_to_connection_state(observer);
    let manager = h.client.connection();

    manager.connect().await.unwrap();
    manager.disable();

    assert_eq!(manager.state(), ConnectionState::Disabled);
    assert_eq!(*states.lock(), vec![false, true, false]);
    assert_eq!(h.notices.shown(), vec![NoticeKind::RealtimeDisabled]);
}

#[tokio::test]
async fn test_ensure_connected_retries_after_failure() {
    let transport = ScriptedTransport::new();
    transport.fail_next(1);
    let h = harness(transport.clone());
    let manager = h.client.connection().clone();

    assert!(manager.connect().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Error);

    manager.ensure_connected();
    assert!(eventually(|| manager.is_connected()).await);
    assert_eq!(transport.opens(), 2);
}

#[tokio::test]
async fn test_cooldown_does_not_block_retry() {
    let transport = ScriptedTransport::new();
    transport.fail_next(1);
    let h = harness(transport.clone());
    let manager = h.client.connection();

    assert!(manager.connect().await.is_err());
    // Immediately again, well inside the 3s window
    manager.connect().await.unwrap();
    assert_eq!(transport.opens(), 2);
}

#[tokio::test]
async fn test_not_authenticated_fails_fast() {
    let transport = ScriptedTransport::new();
    let tokens = Arc::new(SessionTokens::new());
    let h = harness_with("http://127.0.0.1:9", transport.clone(), tokens.clone());
    let manager = h.client.connection();

    for _ in 0..5 {
        assert_eq!(manager.connect().await, Err(ConnectError::NotAuthenticated));
    }
    assert_eq!(transport.opens(), 0);
    assert_eq!(manager.failure_count(), 0);
    assert_eq!(manager.state(), ConnectionState::Idle);

    tokens.set("fresh-token", None);
    manager.connect().await.unwrap();
    assert!(transport.last_url().unwrap().contains("access_token=fresh-token"));
}

#[tokio::test]
async fn test_disabled_makes_no_attempts() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());
    let manager = h.client.connection();

    manager.disable();
    assert_eq!(manager.connect().await, Err(ConnectError::Disabled));
    manager.ensure_connected();
    assert_eq!(
        manager.wait_until_connected().await,
        Err(ConnectError::Disabled)
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.opens(), 0);
    assert_eq!(h.notices.shown(), vec![NoticeKind::RealtimeDisabled]);
}

#[tokio::test]
async fn test_late_subscriber_sees_connected_immediately() {
    let transport = ScriptedTransport::new();
    let h = harness(transport);
    h.client.connection().connect().await.unwrap();

    let (states, observer) = state_recorder();
    let _sub = h.client.subscribe_to_connection_state(observer);

    assert_eq!(*states.lock(), vec![true]);
}

#[tokio::test]
async fn test_abnormal_close_reconnects_and_rejoins() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());
    let (states, observer) = state_recorder();
    let _sub = h.client.subscribe_to_connection_state(observer);
    let (_seen, on_message) = recorder();
    let _view = h.client.open_conversation("c1".into(), on_message);

    h.client.connection().connect().await.unwrap();
    transport.close_latest(Some("connection reset")).await;

    let manager = h.client.connection().clone();
    assert!(eventually(|| transport.session_count() == 2 && manager.is_connected()).await);
    assert_eq!(manager.failure_count(), 0);
    assert_eq!(*states.lock(), vec![false, true, false, true]);

    let rejoined = transport.invocations(1);
    assert!(rejoined
        .iter()
        .any(|i| i.target == JOIN_CONVERSATION && i.arguments == vec![serde_json::json!("c1")]));
}

#[tokio::test]
async fn test_reconnect_failures_trip_breaker() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());
    let manager = h.client.connection().clone();

    manager.connect().await.unwrap();
    transport.fail_next(5);
    transport.close_latest(Some("connection reset")).await;

    assert!(eventually(|| manager.state() == ConnectionState::Disabled).await);
    // Lost session plus two failed reconnects
    assert_eq!(transport.opens(), 3);
    assert_eq!(h.notices.shown(), vec![NoticeKind::CircuitOpen]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.opens(), 3);
}

#[tokio::test]
async fn test_clean_close_does_not_reconnect() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());
    let manager = h.client.connection().clone();

    manager.connect().await.unwrap();
    transport.close_latest(None).await;

    assert!(eventually(|| manager.state() == ConnectionState::Closed).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.opens(), 1);
    assert_eq!(manager.failure_count(), 0);
}

#[tokio::test]
async fn test_stop_supersedes_in_flight_attempt() {
    let transport = ScriptedTransport::with_delay(Duration::from_millis(100));
    let h = harness(transport.clone());
    let manager = h.client.connection().clone();

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect().await })
    };
    assert!(eventually(|| manager.state() == ConnectionState::Connecting).await);

    manager.stop();
    assert_eq!(pending.await.unwrap(), Err(ConnectError::Superseded));
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_wait_until_connected_times_out_mid_transition() {
    let transport = ScriptedTransport::with_delay(Duration::from_secs(5));
    let h = harness(transport);
    let manager = h.client.connection().clone();

    manager.ensure_connected();
    assert!(eventually(|| manager.state() == ConnectionState::Connecting).await);

    assert_eq!(
        manager.wait_until_connected().await,
        Err(ConnectError::Timeout(1))
    );
}

#[tokio::test]
async fn test_wait_until_connected_connects_when_idle() {
    let transport = ScriptedTransport::new();
    let h = harness(transport.clone());

    h.client.connection().wait_until_connected().await.unwrap();
    assert_eq!(transport.opens(), 1);
}
