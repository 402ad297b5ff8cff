//! Credential access for the hub and the REST API
//!
//! The client only reads credentials; acquiring and refreshing them belongs
//! to the host application, which feeds [`SessionTokens`] (or its own
//! [`TokenSource`] implementation).

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Read-only view of the current login
pub trait TokenSource: Send + Sync {
    /// Whether a user session is active
    fn is_login_active(&self) -> bool;

    /// The current bearer credential, if any
    fn current_token(&self) -> Option<String>;

    /// Token usable for a request right now: login active and credential non-empty
    fn usable_token(&self) -> Option<String> {
        if !self.is_login_active() {
            return None;
        }
        self.current_token().filter(|t| !t.trim().is_empty())
    }
}

/// Fixed credential, typically read once from the environment
#[derive(Clone)]
pub struct StaticTokenSource {
    token: Option<String>,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Source with no login at all
    pub fn logged_out() -> Self {
        Self { token: None }
    }
}

impl fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenSource")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TokenSource for StaticTokenSource {
    fn is_login_active(&self) -> bool {
        self.token.is_some()
    }

    fn current_token(&self) -> Option<String> {
        self.token.clone()
    }
}

#[derive(Default)]
struct Session {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Mutable login state updated by the host's auth flow
///
/// Login and token refresh call [`SessionTokens::set`]; logout calls
/// [`SessionTokens::clear`]. The hub reads the token per connection attempt,
/// so a refresh is picked up on the next (re)connect.
#[derive(Default)]
pub struct SessionTokens {
    session: RwLock<Session>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh credential with an optional expiry
    pub fn set(&self, token: impl Into<String>, expires_at: Option<DateTime<Utc>>) {
        let mut session = self.session.write();
        session.token = Some(token.into());
        session.expires_at = expires_at;
        tracing::debug!(expires_at = ?expires_at, "Session token updated");
    }

    /// Forget the credential (logout)
    pub fn clear(&self) {
        *self.session.write() = Session::default();
        tracing::debug!("Session token cleared");
    }

    fn is_expired(session: &Session) -> bool {
        session
            .expires_at
            .map(|expires_at| expires_at <= Utc::now())
            .unwrap_or(false)
    }
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.read();
        f.debug_struct("SessionTokens")
            .field("token", &session.token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &session.expires_at)
            .finish()
    }
}

impl TokenSource for SessionTokens {
    fn is_login_active(&self) -> bool {
        let session = self.session.read();
        session.token.is_some() && !Self::is_expired(&session)
    }

    fn current_token(&self) -> Option<String> {
        let session = self.session.read();
        if Self::is_expired(&session) {
            return None;
        }
        session.token.clone()
    }
}
