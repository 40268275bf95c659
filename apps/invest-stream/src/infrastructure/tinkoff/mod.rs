//! Tinkoff Streaming Adapters
//!
//! WebSocket client for the brokerage's market data stream:
//!
//! - **connection**: authorized handshake and failure classification
//! - **keepalive**: pong replies to server pings
//! - **codec** / **messages**: JSON wire format
//! - **dispatcher**: frame-to-event read loop
//! - **client**: subscriptions, read loop and shutdown on one connection

pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod keepalive;
pub mod messages;

pub use client::{StreamError, StreamingClient};
pub use codec::{DecodeError, JsonCodec};
pub use connection::{ConnectError, FrameSink, FrameSource, SharedSink, connect};
pub use dispatcher::{DispatchError, Dispatcher};
pub use keepalive::{KeepAlive, PongOutcome};
pub use messages::*;
