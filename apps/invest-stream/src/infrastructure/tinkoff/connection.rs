//! Connection Manager
//!
//! Opens the market data WebSocket with bearer token authorization and a
//! bounded handshake, and classifies handshake failures.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics;

/// Write half of a stream connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of a stream connection.
pub type FrameSource = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Write half shared by subscription calls and the keep-alive responder.
pub type SharedSink = Arc<tokio::sync::Mutex<FrameSink>>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors raised while establishing the stream connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Server answered the upgrade with 403: the token is invalid.
    #[error("invalid token")]
    Forbidden,

    /// Server answered the upgrade with 401: no token was accepted.
    #[error("token not provided")]
    Unauthorized,

    /// Handshake did not complete in time.
    #[error("can't connect to {url}: handshake timed out after {timeout:?}")]
    Timeout {
        /// Target URL.
        url: String,
        /// Configured handshake timeout.
        timeout: Duration,
    },

    /// Server answered the upgrade with another non-success status.
    #[error("can't connect to {url}: server responded {status}")]
    Rejected {
        /// Target URL.
        url: String,
        /// HTTP status of the response.
        status: StatusCode,
    },

    /// Transport-level failure without an HTTP response.
    #[error("can't connect to {url}: {source}")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying WebSocket error.
        #[source]
        source: Box<WsError>,
    },

    /// URL could not be turned into an upgrade request.
    #[error("invalid stream url {url}: {source}")]
    InvalidRequest {
        /// Target URL.
        url: String,
        /// Underlying WebSocket error.
        #[source]
        source: Box<WsError>,
    },

    /// Token contains characters not allowed in an HTTP header.
    #[error("token is not a valid header value")]
    InvalidToken,
}

impl ConnectError {
    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::Timeout { .. } => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Transport { .. } => "transport",
            Self::InvalidRequest { .. } | Self::InvalidToken => "invalid_request",
        }
    }

    /// Classify a handshake error by the HTTP response it carries, if any.
    #[must_use]
    pub fn from_handshake(url: &str, err: WsError) -> Self {
        match err {
            WsError::Http(response) => match response.status() {
                StatusCode::FORBIDDEN => Self::Forbidden,
                StatusCode::UNAUTHORIZED => Self::Unauthorized,
                status => Self::Rejected {
                    url: url.to_string(),
                    status,
                },
            },
            other => Self::Transport {
                url: url.to_string(),
                source: Box::new(other),
            },
        }
    }
}

// =============================================================================
// Connect
// =============================================================================

/// Open the stream and split it into its write and read halves.
///
/// # Errors
///
/// Returns [`ConnectError`] if the request cannot be built, the handshake
/// times out or the server refuses the upgrade.
pub async fn connect(config: &StreamConfig) -> Result<(FrameSink, FrameSource), ConnectError> {
    let result = open(config).await;

    if let Err(e) = &result {
        metrics::record_connect_failure(e.reason());
        tracing::warn!(url = %config.url(), error = %e, "Stream connection failed");
    }

    result
}

async fn open(config: &StreamConfig) -> Result<(FrameSink, FrameSource), ConnectError> {
    let url = config.url();

    let mut request = url
        .into_client_request()
        .map_err(|e| ConnectError::InvalidRequest {
            url: url.to_string(),
            source: Box::new(e),
        })?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token()))
        .map_err(|_| ConnectError::InvalidToken)?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    tracing::info!(url = %url, "Connecting to market data stream");

    let handshake = tokio_tungstenite::connect_async(request);
    let (ws_stream, response) = match tokio::time::timeout(config.handshake_timeout, handshake).await
    {
        Ok(Ok(connected)) => connected,
        Ok(Err(e)) => return Err(ConnectError::from_handshake(url, e)),
        Err(_) => {
            return Err(ConnectError::Timeout {
                url: url.to_string(),
                timeout: config.handshake_timeout,
            });
        }
    };

    tracing::debug!(status = %response.status(), "Stream handshake complete");

    let (write, read) = ws_stream.split();
    Ok((Box::pin(write), Box::pin(read)))
}
