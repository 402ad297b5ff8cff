//! Connection lifecycle states

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No attempts until `enable()`
    Disabled,
    /// Enabled, never connected
    #[default]
    Idle,
    /// First handshake in flight
    Connecting,
    /// Live channel
    Connected,
    /// Lost the channel, retrying
    Reconnecting,
    /// Stopped, or closed cleanly by the hub
    Closed,
    /// Last handshake failed below the breaker threshold
    Error,
}

impl ConnectionState {
    /// Whether messages flow right now
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether a handshake is pending or will be retried
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Settled states from which a fresh handshake may start
    pub fn accepts_connect(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disabled => "disabled",
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}
