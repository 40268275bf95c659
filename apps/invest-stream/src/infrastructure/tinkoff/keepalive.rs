//! Keep-Alive Responder
//!
//! Answers server pings with a pong carrying the same payload. The send is
//! bounded by a short deadline. A connection that is already closing, a
//! transient I/O condition or an expired deadline is not treated as a
//! failure; anything else is returned and ends the read loop.

use std::io::ErrorKind;
use std::time::Duration;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message};

use super::connection::SharedSink;

/// Result of answering a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongOutcome {
    /// Pong was written and flushed.
    Sent,
    /// Connection is closing; nothing was sent.
    Closing,
    /// Transient condition or deadline expiry; nothing guaranteed sent.
    Transient,
}

/// Ping responder bound to a pong deadline.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    deadline: Duration,
}

impl KeepAlive {
    /// Create a responder with the given pong deadline.
    #[must_use]
    pub const fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Send a pong echoing `payload`.
    ///
    /// # Errors
    ///
    /// Returns the send error unless it signals a closing connection or a
    /// transient condition.
    pub async fn respond(&self, sink: &SharedSink, payload: Bytes) -> Result<PongOutcome, WsError> {
        let send = async {
            let mut sink = sink.lock().await;
            sink.send(Message::Pong(payload)).await
        };

        match tokio::time::timeout(self.deadline, send).await {
            Ok(Ok(())) => {
                tracing::trace!("Pong sent");
                Ok(PongOutcome::Sent)
            }
            Ok(Err(e)) if is_closing(&e) => {
                tracing::debug!(error = %e, "Skipping pong, connection closing");
                Ok(PongOutcome::Closing)
            }
            Ok(Err(e)) if is_transient(&e) => {
                tracing::debug!(error = %e, "Skipping pong, transient network condition");
                Ok(PongOutcome::Transient)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::debug!(
                    deadline_ms = self.deadline.as_millis(),
                    "Pong not sent before deadline"
                );
                Ok(PongOutcome::Transient)
            }
        }
    }
}

fn is_closing(err: &WsError) -> bool {
    matches!(
        err,
        WsError::AlreadyClosed
            | WsError::ConnectionClosed
            | WsError::Protocol(ProtocolError::SendAfterClosing)
    )
}

fn is_transient(err: &WsError) -> bool {
    match err {
        WsError::Io(e) => matches!(
            e.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use futures_util::{Sink, StreamExt};

    use super::*;
    use crate::infrastructure::tinkoff::connection::FrameSink;

    /// Sink that fails every send with a fixed error.
    struct FailingSink(fn() -> WsError);

    impl Sink<Message> for FailingSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Err((self.0)()))
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), WsError> {
            Err((self.0)())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Sink that never becomes ready.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), WsError> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    fn shared(sink: FrameSink) -> SharedSink {
        Arc::new(tokio::sync::Mutex::new(sink))
    }

    fn failing(make: fn() -> WsError) -> SharedSink {
        shared(Box::pin(FailingSink(make)))
    }

    #[tokio::test]
    async fn pong_echoes_ping_payload() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded::<Message>();
        let sink = shared(Box::pin(tx.sink_map_err(|e| {
            WsError::Io(io::Error::new(io::ErrorKind::BrokenPipe, e))
        })));

        let outcome = KeepAlive::new(Duration::from_secs(1))
            .respond(&sink, Bytes::from_static(b"ping-42"))
            .await
            .unwrap();

        assert_eq!(outcome, PongOutcome::Sent);
        assert_eq!(
            rx.next().await,
            Some(Message::Pong(Bytes::from_static(b"ping-42")))
        );
    }

    #[tokio::test]
    async fn closing_connection_is_swallowed() {
        let keepalive = KeepAlive::new(Duration::from_secs(1));

        for make in [
            (|| WsError::AlreadyClosed) as fn() -> WsError,
            || WsError::ConnectionClosed,
            || WsError::Protocol(ProtocolError::SendAfterClosing),
        ] {
            let outcome = keepalive
                .respond(&failing(make), Bytes::new())
                .await
                .unwrap();
            assert_eq!(outcome, PongOutcome::Closing);
        }
    }

    #[tokio::test]
    async fn transient_io_is_swallowed() {
        let outcome = KeepAlive::new(Duration::from_secs(1))
            .respond(
                &failing(|| WsError::Io(io::Error::from(io::ErrorKind::WouldBlock))),
                Bytes::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PongOutcome::Transient);
    }

    #[tokio::test]
    async fn other_failures_propagate() {
        let err = KeepAlive::new(Duration::from_secs(1))
            .respond(
                &failing(|| WsError::Io(io::Error::from(io::ErrorKind::ConnectionReset))),
                Bytes::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WsError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn deadline_expiry_is_transient() {
        let outcome = KeepAlive::new(Duration::from_millis(20))
            .respond(&shared(Box::pin(StalledSink)), Bytes::new())
            .await
            .unwrap();
        assert_eq!(outcome, PongOutcome::Transient);
    }
}
