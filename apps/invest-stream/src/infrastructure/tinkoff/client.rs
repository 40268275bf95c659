//! Streaming Client
//!
//! Owns one market data connection and exposes the subscription calls, the
//! event read loop and shutdown.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use invest_stream::{CandleInterval, StreamConfig, StreamingClient};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(StreamingClient::connect(StreamConfig::new("token")).await?);
//!
//!     let reader = Arc::clone(&client);
//!     tokio::spawn(async move {
//!         reader
//!             .run_read_loop(|event| {
//!                 tracing::info!(?event, "Got event");
//!                 Ok::<(), std::io::Error>(())
//!             })
//!             .await
//!     });
//!
//!     client
//!         .subscribe_candle("BBG005DXJS36", CandleInterval::FiveMinutes, "req-1")
//!         .await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use super::connection::{self, ConnectError, FrameSink, FrameSource, SharedSink};
use super::dispatcher::{DispatchError, Dispatcher};
use super::keepalive::KeepAlive;
use super::messages::{ControlMessage, StreamEvent};
use crate::domain::market::CandleInterval;
use crate::domain::subscription::{Subscription, SubscriptionAction, SubscriptionError};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors from subscription calls and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Request failed local validation; nothing was sent.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Control frame could not be serialized.
    #[error("can't encode control frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// Control frame could not be written.
    #[error("can't {action} event: {source}")]
    Send {
        /// Subscription action of the frame.
        action: SubscriptionAction,
        /// Underlying WebSocket error.
        #[source]
        source: WsError,
    },

    /// Close handshake could not be started.
    #[error("can't close connection: {0}")]
    Close(#[source] WsError),
}

// =============================================================================
// Streaming Client
// =============================================================================

/// Market data streaming client.
///
/// The read half is used by [`run_read_loop`](Self::run_read_loop); the write
/// half is shared by subscription calls and ping replies, behind one lock.
pub struct StreamingClient {
    url: String,
    writer: SharedSink,
    reader: tokio::sync::Mutex<FrameSource>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    close_grace: Duration,
    closed: AtomicBool,
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl StreamingClient {
    /// Connect to the stream described by `config`.
    ///
    /// Fails atomically: no client exists unless the handshake succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the connection cannot be established.
    pub async fn connect(config: StreamConfig) -> Result<Self, ConnectError> {
        let (sink, source) = connection::connect(&config).await?;
        tracing::info!(url = %config.url(), "Connected to market data stream");
        Ok(Self::from_boxed(sink, source, &config))
    }

    /// Build a client over an already-established transport.
    ///
    /// `config` supplies the pong deadline and close grace period; its URL is
    /// only used for logs.
    pub fn from_transport<W, R>(sink: W, source: R, config: &StreamConfig) -> Self
    where
        W: Sink<Message, Error = WsError> + Send + 'static,
        R: Stream<Item = Result<Message, WsError>> + Send + 'static,
    {
        Self::from_boxed(Box::pin(sink), Box::pin(source), config)
    }

    fn from_boxed(sink: FrameSink, source: FrameSource, config: &StreamConfig) -> Self {
        Self {
            url: config.url().to_string(),
            writer: Arc::new(tokio::sync::Mutex::new(sink)),
            reader: tokio::sync::Mutex::new(source),
            dispatcher: Dispatcher::new(KeepAlive::new(config.pong_deadline), config.close_grace),
            shutdown: CancellationToken::new(),
            close_grace: config.close_grace,
            closed: AtomicBool::new(false),
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to candles of `figi` at `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if `figi` is empty, `interval` is
    /// [`CandleInterval::Unknown`] or the frame cannot be sent.
    pub async fn subscribe_candle(
        &self,
        figi: &str,
        interval: CandleInterval,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let subscription = Subscription::candle(figi, interval)?;
        self.send(SubscriptionAction::Subscribe, &subscription, request_id)
            .await
    }

    /// Unsubscribe from candles of `figi` at `interval`.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe_candle`](Self::subscribe_candle).
    pub async fn unsubscribe_candle(
        &self,
        figi: &str,
        interval: CandleInterval,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let subscription = Subscription::candle(figi, interval)?;
        self.send(SubscriptionAction::Unsubscribe, &subscription, request_id)
            .await
    }

    /// Subscribe to the order book of `figi` with `depth` levels per side.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Subscription`] without writing anything if
    /// `depth` is outside `1..=20` or `figi` is empty, and
    /// [`StreamError::Send`] if the frame cannot be written.
    pub async fn subscribe_orderbook(
        &self,
        figi: &str,
        depth: i32,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let subscription = Subscription::order_book(figi, depth)?;
        self.send(SubscriptionAction::Subscribe, &subscription, request_id)
            .await
    }

    /// Unsubscribe from the order book of `figi` at `depth`.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe_orderbook`](Self::subscribe_orderbook).
    pub async fn unsubscribe_orderbook(
        &self,
        figi: &str,
        depth: i32,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let subscription = Subscription::order_book(figi, depth)?;
        self.send(SubscriptionAction::Unsubscribe, &subscription, request_id)
            .await
    }

    /// Subscribe to status updates of `figi`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if `figi` is empty or the frame cannot be sent.
    pub async fn subscribe_instrument_info(
        &self,
        figi: &str,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let subscription = Subscription::instrument_info(figi)?;
        self.send(SubscriptionAction::Subscribe, &subscription, request_id)
            .await
    }

    /// Unsubscribe from status updates of `figi`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if `figi` is empty or the frame cannot be sent.
    pub async fn unsubscribe_instrument_info(
        &self,
        figi: &str,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let subscription = Subscription::instrument_info(figi)?;
        self.send(SubscriptionAction::Unsubscribe, &subscription, request_id)
            .await
    }

    /// Write one control frame for `subscription`.
    ///
    /// Success means the frame was written. The server's verdict arrives
    /// later on the event stream, tagged with `request_id` when it is an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if the frame cannot be encoded or written.
    pub async fn send(
        &self,
        action: SubscriptionAction,
        subscription: &Subscription,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let json = ControlMessage::new(action, subscription, request_id).to_json()?;

        tracing::debug!(
            action = %action,
            kind = subscription.kind(),
            figi = subscription.figi(),
            request_id,
            "Sending control frame"
        );

        self.writer
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|source| StreamError::Send { action, source })?;

        metrics::record_control_frame_sent(action.as_str());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Read loop
    // -------------------------------------------------------------------------

    /// Read events and hand each one to `handler`, in wire order.
    ///
    /// Runs until the connection fails or closes, [`close`](Self::close) is
    /// called, or `handler` returns an error; that error comes back unchanged
    /// as [`DispatchError::Handler`].
    /// Undecodable frames and unknown event kinds are logged and skipped.
    /// Pings are answered here, so the loop must be running for the
    /// connection to stay alive.
    ///
    /// # Errors
    ///
    /// Always returns an error describing why the loop stopped.
    pub async fn run_read_loop<F, E>(&self, handler: F) -> Result<(), DispatchError<E>>
    where
        F: FnMut(StreamEvent) -> Result<(), E>,
    {
        let mut source = self.reader.lock().await;
        tracing::debug!(url = %self.url, "Starting read loop");
        self.dispatcher
            .run(&mut *source, &self.writer, &self.shutdown, handler)
            .await
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Close the connection and stop the read loop.
    ///
    /// Sends a close frame, then signals the read loop, which waits up to the
    /// configured close grace period for the server's acknowledgement and
    /// returns [`DispatchError::Read`]. A server that never answers cannot
    /// keep the loop alive. Only the first call does anything; later calls
    /// return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Close`] if the close frame cannot be sent. The
    /// read loop is stopped either way.
    pub async fn close(&self) -> Result<(), StreamError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stream already closed");
            return Ok(());
        }

        tracing::info!(url = %self.url, "Closing market data stream");

        let send_close = async { self.writer.lock().await.close().await };
        let result = match tokio::time::timeout(self.close_grace, send_close).await {
            Ok(Ok(()) | Err(WsError::AlreadyClosed | WsError::ConnectionClosed)) => Ok(()),
            Ok(Err(e)) => Err(StreamError::Close(e)),
            Err(_) => {
                tracing::debug!(
                    grace_ms = self.close_grace.as_millis(),
                    "Close frame not flushed before grace period"
                );
                Ok(())
            }
        };

        self.shutdown.cancel();
        result
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
