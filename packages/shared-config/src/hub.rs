//! Real-time hub configuration types

use std::time::Duration;

use url::Url;

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Settings for the push channel to the message hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub endpoint URL (http(s) or ws(s))
    pub url: String,

    /// Consecutive connection failures before real-time delivery is disabled
    pub failure_threshold: u32,

    /// Advisory window between connection attempts (milliseconds)
    pub cooldown_ms: u64,

    /// Poll interval while waiting for a connection mid-transition (milliseconds)
    pub poll_interval_ms: u64,

    /// Upper bound for waiting on a connection mid-transition (seconds)
    pub wait_timeout_secs: u64,

    /// Handshake timeout applied by the transport (seconds)
    pub handshake_timeout_secs: u64,

    /// First reconnect delay (milliseconds)
    pub reconnect_base_ms: u64,

    /// Reconnect delay ceiling (milliseconds)
    pub reconnect_max_ms: u64,

    /// Jitter applied to reconnect delays, as a fraction of the delay (0.0 - 1.0)
    pub reconnect_jitter: f64,

    /// Minimum spacing between repeated user notices of one kind (seconds)
    pub notice_interval_secs: u64,
}

impl HubConfig {
    /// Load hub configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            url: get_env_or_default("BAZAAR_HUB_URL", "http://localhost:5000/hubs/chat"),
            failure_threshold: parse_env("BAZAAR_HUB_FAILURE_THRESHOLD", 3)?,
            cooldown_ms: parse_env("BAZAAR_HUB_COOLDOWN_MS", 3_000)?,
            poll_interval_ms: parse_env("BAZAAR_HUB_POLL_INTERVAL_MS", 500)?,
            wait_timeout_secs: parse_env("BAZAAR_HUB_WAIT_TIMEOUT_SECS", 10)?,
            handshake_timeout_secs: parse_env("BAZAAR_HUB_HANDSHAKE_TIMEOUT_SECS", 15)?,
            reconnect_base_ms: parse_env("BAZAAR_HUB_RECONNECT_BASE_MS", 1_000)?,
            reconnect_max_ms: parse_env("BAZAAR_HUB_RECONNECT_MAX_MS", 30_000)?,
            reconnect_jitter: parse_env("BAZAAR_HUB_RECONNECT_JITTER", 0.3)?,
            notice_interval_secs: parse_env("BAZAAR_HUB_NOTICE_INTERVAL_SECS", 10)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Check threshold, jitter and delay bounds
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "BAZAAR_HUB_FAILURE_THRESHOLD",
                "threshold must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect_jitter) {
            return Err(ConfigError::invalid(
                "BAZAAR_HUB_RECONNECT_JITTER",
                format!("{} is outside 0.0 - 1.0", self.reconnect_jitter),
            ));
        }
        if self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(ConfigError::ValidationError(format!(
                "reconnect ceiling {}ms is below base delay {}ms",
                self.reconnect_max_ms, self.reconnect_base_ms
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "BAZAAR_HUB_POLL_INTERVAL_MS",
                "poll interval must be positive",
            ));
        }
        self.parse_url().map(|_| ())
    }

    fn parse_url(&self) -> ConfigResult<Url> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl("BAZAAR_HUB_URL".to_string(), e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(parsed),
            other => Err(ConfigError::UnsupportedScheme {
                name: "BAZAAR_HUB_URL".to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    /// Websocket URL for one connection attempt, carrying the bearer token
    ///
    /// The token is read per attempt so a refreshed credential is picked up
    /// on the next (re)connect.
    pub fn websocket_url(&self, access_token: &str) -> ConfigResult<String> {
        let mut url = self.parse_url()?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| ConfigError::UnsupportedScheme {
            name: "BAZAAR_HUB_URL".to_string(),
            scheme: url.scheme().to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("access_token", access_token);
        Ok(url.into())
    }

    /// Advisory cooldown between connection attempts
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Poll interval while a connection is mid-transition
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Cap on waiting for a connection mid-transition
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Transport handshake timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Minimum spacing between repeated notices
    pub fn notice_interval(&self) -> Duration {
        Duration::from_secs(self.notice_interval_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000/hubs/chat".to_string(),
            failure_threshold: 3,
            cooldown_ms: 3_000,
            poll_interval_ms: 500,
            wait_timeout_secs: 10,
            handshake_timeout_secs: 15,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            reconnect_jitter: 0.3,
            notice_interval_secs: 10,
        }
    }
}
