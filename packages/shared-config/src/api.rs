//! Chat REST API configuration types

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Configuration for the request/response chat API
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Marketplace API base URL
    pub url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry attempts for idempotent reads
    pub retry_attempts: u32,

    /// Base delay for read retry backoff (milliseconds)
    pub retry_base_delay_ms: u64,
}

impl ChatApiConfig {
    /// Load API configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            url: get_env_or_default("BAZAAR_API_URL", "http://localhost:5000"),
            timeout_secs: parse_env("BAZAAR_API_TIMEOUT", 30)?,
            retry_attempts: parse_env("BAZAAR_API_RETRIES", 3)?,
            retry_base_delay_ms: parse_env("BAZAAR_API_RETRY_DELAY_MS", 250)?,
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

    /// Reject settings that would make every request fail
    pub fn validate(&self) -> ConfigResult<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl("BAZAAR_API_URL".to_string(), e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme {
                name: "BAZAAR_API_URL".to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "BAZAAR_API_TIMEOUT",
                "timeout must be at least one second",
            ));
        }
        Ok(())
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Collection endpoint for conversations (create + list)
    pub fn rooms_url(&self) -> String {
        format!("{}/api/chat/rooms", self.base())
    }

    /// Endpoint for a single conversation
    pub fn room_url(&self, conversation_id: &str) -> String {
        format!("{}/api/chat/rooms/{}", self.base(), conversation_id)
    }

    /// Endpoint for a conversation's messages (list + send)
    pub fn messages_url(&self, conversation_id: &str) -> String {
        format!("{}/api/chat/rooms/{}/messages", self.base(), conversation_id)
    }

    /// Endpoint acknowledging a conversation as read
    pub fn mark_read_url(&self, conversation_id: &str) -> String {
        format!("{}/api/chat/rooms/{}/read", self.base(), conversation_id)
    }
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatApiConfig::default();
        assert_eq!(config.url, "http://localhost:5000");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn test_endpoint_urls_with_trailing_slash() {
        let config = ChatApiConfig::with_url("https://ads.example.com/");
        assert_eq!(config.rooms_url(), "https://ads.example.com/api/chat/rooms");
        assert_eq!(
            config.room_url("c1"),
            "https://ads.example.com/api/chat/rooms/c1"
        );
        assert_eq!(
            config.messages_url("c1"),
            "https://ads.example.com/api/chat/rooms/c1/messages"
        );
        assert_eq!(
            config.mark_read_url("c1"),
            "https://ads.example.com/api/chat/rooms/c1/read"
        );
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("BAZAAR_API_URL", Some("https://api.example.com")),
                ("BAZAAR_API_TIMEOUT", Some("5")),
                ("BAZAAR_API_RETRIES", None),
            ],
            || {
                let config = ChatApiConfig::from_env().unwrap();
                assert_eq!(config.url, "https://api.example.com");
                assert_eq!(config.timeout_secs, 5);
                assert_eq!(config.retry_attempts, 3);
            },
        );
    }

    #[test]
    fn test_from_env_rejects_garbage_timeout() {
        temp_env::with_var("BAZAAR_API_TIMEOUT", Some("soon"), || {
            assert!(matches!(
                ChatApiConfig::from_env(),
                Err(ConfigError::InvalidValue(name, _)) if name == "BAZAAR_API_TIMEOUT"
            ));
        });
    }

    #[test]
    fn test_validate_rejects_websocket_scheme() {
        let config = ChatApiConfig::with_url("ws://localhost:5000");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }
}
