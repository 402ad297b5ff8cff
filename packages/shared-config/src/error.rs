//! Configuration error types for the chat client settings

use thiserror::Error;

/// Errors raised while loading or validating client configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required environment variable
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable present but unparsable
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Endpoint URL could not be parsed
    #[error("invalid URL format for {0}: {1}")]
    InvalidUrl(String, String),

    /// Endpoint URL uses a scheme the hub transport cannot speak
    #[error("unsupported URL scheme '{scheme}' for {name}, expected http(s) or ws(s)")]
    UnsupportedScheme { name: String, scheme: String },

    /// Values parsed but contradict each other
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Build an [`ConfigError::InvalidValue`] for a named setting
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue(name.into(), reason.into())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
