//! Configuration Module
//!
//! Endpoint, credentials and timeouts for the streaming client.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_CLOSE_GRACE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PONG_DEADLINE,
    DEFAULT_STREAM_URL, StreamConfig,
};
