//! Event Dispatch Loop
//!
//! Reads frames one at a time, decodes them into [`StreamEvent`]s and hands
//! each one to a caller-supplied handler, in wire order.
//!
//! # Exit contract
//!
//! The loop runs until one of:
//!
//! - the read half fails or ends: [`DispatchError::Read`]
//! - a pong cannot be sent for a non-transient reason: [`DispatchError::KeepAlive`]
//! - the handler returns `Err(e)`: [`DispatchError::Handler`] carrying `e`
//! - the shutdown token is cancelled: [`DispatchError::Read`] with
//!   `ConnectionClosed`, after waiting up to the close grace period for the
//!   server's close acknowledgement
//!
//! Frames that fail to decode, and events of unknown kinds, are logged and
//! dropped. They never end the loop.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{DecodeError, JsonCodec};
use super::connection::SharedSink;
use super::keepalive::KeepAlive;
use super::messages::StreamEvent;
use crate::infrastructure::metrics::{self, FrameType};

/// Longest frame excerpt written to logs.
const LOG_PREVIEW_LEN: usize = 256;

/// Reasons the dispatch loop stopped.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError<E> {
    /// Reading from the connection failed or the connection ended.
    #[error("can't read message: {0}")]
    Read(#[source] WsError),

    /// Answering a server ping failed.
    #[error("can't answer ping: {0}")]
    KeepAlive(#[source] WsError),

    /// The event handler asked the loop to stop.
    #[error("event handler failed: {0}")]
    Handler(E),
}

impl<E> DispatchError<E> {
    /// Take the handler's error, if the handler is what stopped the loop.
    pub fn into_handler_error(self) -> Option<E> {
        match self {
            Self::Handler(e) => Some(e),
            Self::Read(_) | Self::KeepAlive(_) => None,
        }
    }
}

/// Frame-to-event dispatcher.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    codec: JsonCodec,
    keepalive: KeepAlive,
    close_grace: Duration,
}

impl Dispatcher {
    /// Create a dispatcher answering pings with `keepalive` and waiting
    /// `close_grace` for a close acknowledgement on shutdown.
    #[must_use]
    pub const fn new(keepalive: KeepAlive, close_grace: Duration) -> Self {
        Self {
            codec: JsonCodec::new(),
            keepalive,
            close_grace,
        }
    }

    /// Run the read loop over `source`, answering pings on `sink`, until
    /// `shutdown` is cancelled.
    ///
    /// Only returns on error; see the module docs for the exit contract.
    pub async fn run<S, F, E>(
        &self,
        source: &mut S,
        sink: &SharedSink,
        shutdown: &CancellationToken,
        mut handler: F,
    ) -> Result<(), DispatchError<E>>
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin + ?Sized,
        F: FnMut(StreamEvent) -> Result<(), E>,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                next = source.next() => Some(next),
            };

            let Some(next) = next else {
                self.await_close_ack(source).await;
                return Err(DispatchError::Read(WsError::ConnectionClosed));
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    tracing::info!(error = %e, "Stream read failed");
                    return Err(DispatchError::Read(e));
                }
                None => {
                    tracing::info!("Stream ended");
                    return Err(DispatchError::Read(WsError::ConnectionClosed));
                }
            };

            let frame: &[u8] = match &message {
                Message::Text(text) => {
                    metrics::record_frame_received(FrameType::Text);
                    text.as_bytes()
                }
                Message::Binary(data) => {
                    metrics::record_frame_received(FrameType::Binary);
                    data.as_ref()
                }
                Message::Ping(payload) => {
                    metrics::record_frame_received(FrameType::Ping);
                    self.keepalive
                        .respond(sink, payload.clone())
                        .await
                        .map_err(DispatchError::KeepAlive)?;
                    continue;
                }
                Message::Pong(_) => {
                    metrics::record_frame_received(FrameType::Pong);
                    continue;
                }
                Message::Close(close) => {
                    metrics::record_frame_received(FrameType::Close);
                    tracing::info!(frame = ?close, "Server sent close frame");
                    continue;
                }
                Message::Frame(_) => {
                    metrics::record_frame_received(FrameType::Other);
                    continue;
                }
            };

            match self.codec.decode(frame) {
                Ok(event) => {
                    let kind = event.kind();
                    handler(event).map_err(DispatchError::Handler)?;
                    metrics::record_event_dispatched(kind.as_str());
                }
                Err(DecodeError::UnknownKind(kind)) => {
                    metrics::record_frame_dropped("unknown_kind");
                    tracing::warn!(
                        kind = %kind,
                        frame = %preview(frame),
                        "Got unknown event"
                    );
                }
                Err(e) => {
                    metrics::record_frame_dropped(e.reason());
                    tracing::warn!(
                        error = %e,
                        frame = %preview(frame),
                        "Can't decode event"
                    );
                }
            }
        }
    }

    /// Read until the server acknowledges the close, the stream ends or the
    /// grace period runs out. Frames read here are discarded.
    async fn await_close_ack<S>(&self, source: &mut S)
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin + ?Sized,
    {
        let ack = async {
            while let Some(Ok(message)) = source.next().await {
                if message.is_close() {
                    break;
                }
            }
        };

        if tokio::time::timeout(self.close_grace, ack).await.is_err() {
            tracing::debug!(
                grace_ms = self.close_grace.as_millis(),
                "Close not acknowledged before grace period"
            );
        }
        tracing::info!("Read loop stopped by shutdown");
    }
}

fn preview(frame: &[u8]) -> String {
    let text = String::from_utf8_lossy(frame);
    match text.char_indices().nth(LOG_PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Bytes;

    use super::*;
    use crate::infrastructure::tinkoff::connection::FrameSink;
    use crate::infrastructure::tinkoff::messages::EventKind;

    const CANDLE: &str = r#"{"event":"candle","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG1","interval":"5min","o":1.5,"c":2.5,"h":3,"l":1,"v":10,"time":"2019-08-07T15:35:00Z"}}"#;
    const ORDERBOOK: &str = r#"{"event":"orderbook","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG1","depth":1,"bids":[[1.1,2]],"asks":[[1.2,3]]}}"#;
    const ERROR: &str = r#"{"event":"error","time":"2019-08-07T15:35:00Z","payload":{"request_id":"r1","error":"nope"}}"#;

    fn text(s: &str) -> Result<Message, WsError> {
        Ok(Message::Text(s.to_string().into()))
    }

    fn sink() -> (SharedSink, futures::channel::mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Message>();
        let sink: FrameSink = Box::pin(
            tx.sink_map_err(|e| WsError::Io(io::Error::new(io::ErrorKind::BrokenPipe, e))),
        );
        (Arc::new(tokio::sync::Mutex::new(sink)), rx)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(KeepAlive::new(Duration::from_secs(1)), Duration::from_secs(1))
    }

    fn silent_source() -> futures_util::stream::Pending<Result<Message, WsError>> {
        futures_util::stream::pending()
    }

    #[tokio::test]
    async fn mixed_frames_deliver_known_events_in_order() {
        let mut source = futures_util::stream::iter(vec![
            text(CANDLE),
            text("garbage{"),
            text(ORDERBOOK),
            text(r#"{"event":"portfolio","time":"2019-08-07T15:35:00Z","payload":{}}"#),
            text(ERROR),
        ]);
        let (sink, _rx) = sink();

        let mut seen = Vec::new();
        let result = dispatcher()
            .run(&mut source, &sink, &CancellationToken::new(), |event: StreamEvent| {
                seen.push(event.kind());
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(
            seen,
            vec![EventKind::Candle, EventKind::OrderBook, EventKind::Error]
        );
        assert!(matches!(
            result,
            Err(DispatchError::Read(WsError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn handler_error_stops_before_next_frame() {
        let mut source =
            futures_util::stream::iter(vec![text(CANDLE), text(ORDERBOOK), text(ERROR)]);
        let (sink, _rx) = sink();

        let mut calls = 0;
        let result = dispatcher()
            .run(&mut source, &sink, &CancellationToken::new(), |event: StreamEvent| {
                calls += 1;
                if event.kind() == EventKind::OrderBook {
                    Err("stop here")
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls, 2);
        assert_eq!(result.unwrap_err().into_handler_error(), Some("stop here"));
        // The error frame is still unread.
        assert!(source.next().await.is_some());
    }

    #[tokio::test]
    async fn read_error_ends_loop() {
        let mut source = futures_util::stream::iter(vec![
            text(CANDLE),
            Err(WsError::Io(io::Error::from(io::ErrorKind::ConnectionReset))),
            text(ERROR),
        ]);
        let (sink, _rx) = sink();

        let mut calls = 0;
        let result = dispatcher()
            .run(&mut source, &sink, &CancellationToken::new(), |_| {
                calls += 1;
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(DispatchError::Read(WsError::Io(_)))));
    }

    #[tokio::test]
    async fn ping_is_answered_with_matching_pong() {
        let mut source = futures_util::stream::iter(vec![
            Ok(Message::Ping(Bytes::from_static(b"abc"))),
            text(CANDLE),
        ]);
        let (sink, mut rx) = sink();

        let mut calls = 0;
        let _ = dispatcher()
            .run(&mut source, &sink, &CancellationToken::new(), |_| {
                calls += 1;
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(
            rx.next().await,
            Some(Message::Pong(Bytes::from_static(b"abc")))
        );
    }

    #[tokio::test]
    async fn binary_frames_are_decoded() {
        let frame = Message::Binary(Bytes::from_static(ERROR.as_bytes()));
        let mut source = futures_util::stream::iter(vec![Ok(frame)]);
        let (sink, _rx) = sink();

        let mut request_ids = Vec::new();
        let _ = dispatcher()
            .run(&mut source, &sink, &CancellationToken::new(), |event| {
                if let StreamEvent::Error(e) = event {
                    request_ids.push(e.request_id().map(str::to_string));
                }
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(request_ids, vec![Some("r1".to_string())]);
    }

    #[tokio::test]
    async fn bad_payload_for_known_kind_is_dropped() {
        let mut source = futures_util::stream::iter(vec![
            text(r#"{"event":"orderbook","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG1"}}"#),
            text(CANDLE),
        ]);
        let (sink, _rx) = sink();

        let mut seen = Vec::new();
        let _ = dispatcher()
            .run(&mut source, &sink, &CancellationToken::new(), |event| {
                seen.push(event.kind());
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(seen, vec![EventKind::Candle]);
    }

    #[tokio::test]
    async fn shutdown_ends_loop_on_silent_connection() {
        let mut source = silent_source();
        let (sink, _rx) = sink();
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let mut calls = 0;
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            Dispatcher::new(
                KeepAlive::new(Duration::from_secs(1)),
                Duration::from_millis(50),
            )
            .run(&mut source, &sink, &shutdown, |_| {
                calls += 1;
                Ok::<(), String>(())
            }),
        )
        .await
        .unwrap();

        assert_eq!(calls, 0);
        assert!(matches!(
            result,
            Err(DispatchError::Read(WsError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn shutdown_skips_frames_after_close_ack() {
        let mut source = futures_util::stream::iter(vec![
            Ok(Message::Close(None)),
            text(CANDLE),
        ])
        .chain(silent_source());
        let (sink, _rx) = sink();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut calls = 0;
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher().run(&mut source, &sink, &shutdown, |_| {
                calls += 1;
                Ok::<(), String>(())
            }),
        )
        .await
        .unwrap();

        assert_eq!(calls, 0);
        assert!(matches!(result, Err(DispatchError::Read(_))));
        // Reading stopped at the acknowledgement.
        assert!(matches!(source.next().await, Some(Ok(Message::Text(_)))));
    }

    #[test]
    fn preview_truncates_long_frames() {
        let long = "x".repeat(1000);
        let shown = preview(long.as_bytes());
        assert_eq!(shown.len(), LOG_PREVIEW_LEN + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(preview(b"short"), "short");
    }
}
