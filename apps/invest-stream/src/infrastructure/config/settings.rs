//! Stream Client Settings
//!
//! Configuration for the streaming client, built in code or loaded from
//! environment variables.

use std::time::Duration;

/// Production market data stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://api-invest.tinkoff.ru/openapi/md/v1/md-openapi/ws";

/// Default bound on the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for answering a server ping.
pub const DEFAULT_PONG_DEADLINE: Duration = Duration::from_secs(1);

/// Default wait for the server's close acknowledgement.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Streaming client configuration.
#[derive(Clone)]
pub struct StreamConfig {
    url: String,
    token: String,
    /// Upper bound on connect + upgrade.
    pub handshake_timeout: Duration,
    /// Upper bound on sending a pong.
    pub pong_deadline: Duration,
    /// Upper bound on waiting for the close handshake before the read loop
    /// is stopped.
    pub close_grace: Duration,
}

impl StreamConfig {
    /// Configuration for the production endpoint with default timeouts.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            token: token.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            pong_deadline: DEFAULT_PONG_DEADLINE,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }

    /// Point the client at a different endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Override the pong deadline.
    #[must_use]
    pub const fn with_pong_deadline(mut self, deadline: Duration) -> Self {
        self.pong_deadline = deadline;
        self
    }

    /// Override the close grace period.
    #[must_use]
    pub const fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `INVEST_TOKEN` (required)
    /// - `INVEST_STREAM_URL`
    /// - `INVEST_HANDSHAKE_TIMEOUT_SECS`
    /// - `INVEST_PONG_DEADLINE_MS`
    /// - `INVEST_CLOSE_GRACE_MS`
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or empty, or a timeout is not
    /// a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("INVEST_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("INVEST_TOKEN".to_string()))?;

        if token.is_empty() {
            return Err(ConfigError::EmptyValue("INVEST_TOKEN".to_string()));
        }

        let mut config = Self::new(token);

        if let Ok(url) = std::env::var("INVEST_STREAM_URL")
            && !url.is_empty()
        {
            config.url = url;
        }

        config.handshake_timeout =
            parse_env_duration_secs("INVEST_HANDSHAKE_TIMEOUT_SECS", config.handshake_timeout)?;
        config.pong_deadline =
            parse_env_duration_millis("INVEST_PONG_DEADLINE_MS", config.pong_deadline)?;
        config.close_grace =
            parse_env_duration_millis("INVEST_CLOSE_GRACE_MS", config.close_grace)?;

        Ok(config)
    }

    /// Stream endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("handshake_timeout", &self.handshake_timeout)
            .field("pong_deadline", &self.pong_deadline)
            .field("close_grace", &self.close_grace)
            .finish()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

fn parse_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(parse_env_u64(key)?.map_or(default, Duration::from_secs))
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(parse_env_u64(key)?.map_or(default, Duration::from_millis))
}
