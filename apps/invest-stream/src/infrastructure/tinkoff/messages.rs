//! Streaming Message Types
//!
//! Wire format types for the market data WebSocket.
//!
//! # Inbound
//!
//! Every inbound frame is a JSON object with an `event` discriminator, a
//! `time` stamp and a kind-specific `payload`:
//!
//! ```json
//! {"event": "candle", "time": "2019-08-07T15:35:00.029721253Z", "payload": {...}}
//! ```
//!
//! Known kinds: `candle`, `orderbook`, `instrument_info`, `error`.
//!
//! # Outbound
//!
//! Control frames subscribe or unsubscribe one instrument:
//!
//! ```json
//! {"event": "orderbook:subscribe", "request_id": "X", "figi": "BBG1", "depth": 10}
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::market::{CandleInterval, TradingStatus};
use crate::domain::subscription::{Subscription, SubscriptionAction};

// =============================================================================
// Envelope
// =============================================================================

/// Minimal view of an inbound frame, used only to pick the payload decoder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    /// Event kind.
    pub event: String,
}

/// Closed set of event kinds this client decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Candle update.
    Candle,
    /// Order book snapshot.
    OrderBook,
    /// Instrument status update.
    InstrumentInfo,
    /// Server-side error report.
    Error,
}

impl EventKind {
    /// Map a wire discriminator to a kind, `None` for kinds this client does
    /// not know.
    #[must_use]
    pub fn from_wire(event: &str) -> Option<Self> {
        match event {
            "candle" => Some(Self::Candle),
            "orderbook" => Some(Self::OrderBook),
            "instrument_info" => Some(Self::InstrumentInfo),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Get the wire discriminator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candle => "candle",
            Self::OrderBook => "orderbook",
            Self::InstrumentInfo => "instrument_info",
            Self::Error => "error",
        }
    }
}

// =============================================================================
// Typed Events
// =============================================================================

/// Decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Candle update.
    Candle(CandleEvent),
    /// Order book snapshot.
    OrderBook(OrderBookEvent),
    /// Instrument status update.
    InstrumentInfo(InstrumentInfoEvent),
    /// Server-side error report.
    Error(ErrorEvent),
}

impl StreamEvent {
    /// Kind of the event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Candle(_) => EventKind::Candle,
            Self::OrderBook(_) => EventKind::OrderBook,
            Self::InstrumentInfo(_) => EventKind::InstrumentInfo,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Server timestamp of the event.
    #[must_use]
    pub const fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Candle(e) => e.time,
            Self::OrderBook(e) => e.time,
            Self::InstrumentInfo(e) => e.time,
            Self::Error(e) => e.time,
        }
    }
}

/// Candle event.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "event": "candle",
///   "time": "2019-08-07T15:35:00.029721253Z",
///   "payload": {
///     "figi": "BBG0013HGFT4", "interval": "5min",
///     "o": 64.0575, "c": 64.0575, "h": 64.0575, "l": 64.0575,
///     "v": 156, "time": "2019-08-07T15:35:00Z"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleEvent {
    /// Server timestamp.
    pub time: DateTime<Utc>,
    /// Candle data.
    #[serde(rename = "payload")]
    pub candle: Candle,
}

/// OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Instrument FIGI.
    pub figi: String,
    /// Candle interval.
    pub interval: CandleInterval,
    /// Open price.
    #[serde(rename = "o")]
    pub open: Decimal,
    /// Close price.
    #[serde(rename = "c")]
    pub close: Decimal,
    /// High price.
    #[serde(rename = "h")]
    pub high: Decimal,
    /// Low price.
    #[serde(rename = "l")]
    pub low: Decimal,
    /// Traded volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Start of the bar.
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
}

/// Order book event.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "event": "orderbook",
///   "time": "2019-08-07T15:35:00.029721253Z",
///   "payload": {
///     "figi": "BBG0013HGFT4", "depth": 2,
///     "bids": [[64.3525, 204], [64.1975, 30]],
///     "asks": [[64.38, 2], [64.4, 3]]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEvent {
    /// Server timestamp.
    pub time: DateTime<Utc>,
    /// Order book data.
    #[serde(rename = "payload")]
    pub order_book: OrderBook,
}

/// Order book snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Instrument FIGI.
    pub figi: String,
    /// Levels per side.
    pub depth: u32,
    /// Bid levels, best first.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub asks: Vec<PriceLevel>,
}

/// An empty book side may arrive as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One `[price, quantity]` level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    /// Level price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.0
    }

    /// Quantity at the level.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.1
    }
}

/// Instrument info event.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "event": "instrument_info",
///   "time": "2019-08-07T15:35:00.029721253Z",
///   "payload": {
///     "figi": "BBG0013HGFT4", "trade_status": "normal_trading",
///     "min_price_increment": 0.0025, "lot": 1000
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfoEvent {
    /// Server timestamp.
    pub time: DateTime<Utc>,
    /// Instrument status.
    #[serde(rename = "payload")]
    pub info: InstrumentInfo,
}

/// Instrument trading parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Instrument FIGI.
    pub figi: String,
    /// Current trading status.
    pub trade_status: TradingStatus,
    /// Minimum price step.
    pub min_price_increment: Decimal,
    /// Lot size.
    pub lot: Decimal,
    /// Accrued coupon interest (bonds only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrued_interest: Option<Decimal>,
    /// Upper price limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_up: Option<Decimal>,
    /// Lower price limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_down: Option<Decimal>,
}

/// Error event.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "event": "error",
///   "time": "2019-08-07T15:35:00.029721253Z",
///   "payload": {"request_id": "123ASD1123", "error": "Subscription instrument_info:subscribe. FIGI NOOOOOOO not found"}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Server timestamp.
    pub time: DateTime<Utc>,
    /// Error details.
    #[serde(rename = "payload")]
    pub error: StreamErrorPayload,
}

impl ErrorEvent {
    /// Request id of the control frame that caused the error, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.error.request_id.as_deref()
    }
}

/// Error description reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamErrorPayload {
    /// Correlation token of the failing control frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Human-readable error.
    pub error: String,
}

// =============================================================================
// Control Frames
// =============================================================================

/// Subscribe/unsubscribe control frame.
///
/// Field order matches the wire layout the server documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage<'a> {
    /// `<kind>:<action>`.
    pub event: String,
    /// Caller-chosen correlation token.
    pub request_id: &'a str,
    /// Instrument FIGI.
    pub figi: &'a str,
    /// Candle interval, candle subscriptions only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<CandleInterval>,
    /// Order book depth, order book subscriptions only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u8>,
}

impl<'a> ControlMessage<'a> {
    /// Build the control frame for `action` on `subscription`.
    #[must_use]
    pub fn new(
        action: SubscriptionAction,
        subscription: &'a Subscription,
        request_id: &'a str,
    ) -> Self {
        let (interval, depth) = match subscription {
            Subscription::Candle { interval, .. } => (Some(*interval), None),
            Subscription::OrderBook { depth, .. } => (None, Some(depth.get())),
            Subscription::InstrumentInfo { .. } => (None, None),
        };

        Self {
            event: format!("{}:{}", subscription.kind(), action.as_str()),
            request_id,
            figi: subscription.figi(),
            interval,
            depth,
        }
    }

    /// Serialize to the JSON text sent on the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
