#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Invest Stream - Market Data Streaming Client
//!
//! Client for the brokerage's streaming market data WebSocket: opens an
//! authorized connection, keeps it alive, manages candle, order book and
//! instrument status subscriptions, and delivers decoded events to a
//! caller-supplied handler.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Wire vocabulary and subscription requests
//!   - `market`: Candle intervals and trading statuses
//!   - `subscription`: Validated subscribe/unsubscribe targets
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `tinkoff`: WebSocket connection, keep-alive, codec, read loop, client
//!   - `config`: Connection settings from code or environment
//!   - `metrics`: Prometheus counters
//!   - `telemetry`: Logging and OpenTelemetry setup
//!
//! # Data Flow
//!
//! ```text
//!                  ┌──────────────────┐  control frames
//!  caller ────────►│ StreamingClient  │──────────────────┐
//!                  └──────────────────┘                  ▼
//!                          ▲                       ┌───────────┐
//!   handler(event) ◄── Dispatcher ◄── JsonCodec ◄──│ WebSocket │
//!                          │                       └───────────┘
//!                          └── KeepAlive (pong) ─────────▲
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Stream vocabulary with no I/O.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{CandleInterval, MAX_ORDERBOOK_DEPTH, TradingStatus};
pub use domain::subscription::{
    OrderBookDepth, Subscription, SubscriptionAction, SubscriptionError,
};

// Client
pub use infrastructure::tinkoff::{
    ConnectError, DecodeError, DispatchError, StreamError, StreamingClient,
};

// Events
pub use infrastructure::tinkoff::messages::{
    Candle, CandleEvent, ErrorEvent, EventKind, InstrumentInfo, InstrumentInfoEvent, OrderBook,
    OrderBookEvent, PriceLevel, StreamErrorPayload, StreamEvent,
};

// Configuration
pub use infrastructure::config::{
    ConfigError, DEFAULT_CLOSE_GRACE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PONG_DEADLINE,
    DEFAULT_STREAM_URL, StreamConfig,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
