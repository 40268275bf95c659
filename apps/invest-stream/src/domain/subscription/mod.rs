//! Subscription Types
//!
//! Typed description of what a caller can subscribe to on the market data
//! stream. The client keeps no subscription table: the server is the
//! authority on what is active, and acknowledgements or rejections arrive
//! asynchronously on the event stream keyed by the caller's request id.
//!
//! Validation happens here, before anything touches the network.

use std::fmt;

use super::market::{CandleInterval, MAX_ORDERBOOK_DEPTH};

// =============================================================================
// Error Type
// =============================================================================

/// Local validation failures for subscription requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// Order book depth outside `1..=MAX_ORDERBOOK_DEPTH`.
    #[error("invalid depth {0}, should be in interval 0 < x <= {MAX_ORDERBOOK_DEPTH}")]
    InvalidDepth(i32),

    /// Instrument identifier is empty.
    #[error("instrument figi must not be empty")]
    EmptyFigi,

    /// Candle interval has no wire name to subscribe with.
    #[error("candle interval is not supported by the stream")]
    UnknownInterval,
}

// =============================================================================
// Order Book Depth
// =============================================================================

/// Order book depth that has been checked against the API bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderBookDepth(u8);

impl OrderBookDepth {
    /// Validate a raw depth.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::InvalidDepth`] unless `1 <= depth <= 20`.
    pub fn new(depth: i32) -> Result<Self, SubscriptionError> {
        if (1..=MAX_ORDERBOOK_DEPTH).contains(&depth) {
            u8::try_from(depth)
                .map(Self)
                .map_err(|_| SubscriptionError::InvalidDepth(depth))
        } else {
            Err(SubscriptionError::InvalidDepth(depth))
        }
    }

    /// Get the depth value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Whether a control frame adds or removes a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionAction {
    /// Start receiving events.
    Subscribe,
    /// Stop receiving events.
    Unsubscribe,
}

impl SubscriptionAction {
    /// Get the wire suffix of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for SubscriptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single market data subscription for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subscription {
    /// Candles aggregated over `interval`.
    Candle {
        /// Instrument FIGI.
        figi: String,
        /// Candle interval.
        interval: CandleInterval,
    },
    /// Order book snapshots with `depth` levels per side.
    OrderBook {
        /// Instrument FIGI.
        figi: String,
        /// Levels per side.
        depth: OrderBookDepth,
    },
    /// Instrument status updates.
    InstrumentInfo {
        /// Instrument FIGI.
        figi: String,
    },
}

impl Subscription {
    /// Candle subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::UnknownInterval`] for
    /// [`CandleInterval::Unknown`] and [`SubscriptionError::EmptyFigi`] for an
    /// empty `figi`.
    pub fn candle(figi: &str, interval: CandleInterval) -> Result<Self, SubscriptionError> {
        if interval == CandleInterval::Unknown {
            return Err(SubscriptionError::UnknownInterval);
        }
        Ok(Self::Candle {
            figi: checked_figi(figi)?,
            interval,
        })
    }

    /// Order book subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::InvalidDepth`] for a depth outside
    /// `1..=20` and [`SubscriptionError::EmptyFigi`] for an empty `figi`.
    pub fn order_book(figi: &str, depth: i32) -> Result<Self, SubscriptionError> {
        let depth = OrderBookDepth::new(depth)?;
        Ok(Self::OrderBook {
            figi: checked_figi(figi)?,
            depth,
        })
    }

    /// Instrument info subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::EmptyFigi`] for an empty `figi`.
    pub fn instrument_info(figi: &str) -> Result<Self, SubscriptionError> {
        Ok(Self::InstrumentInfo {
            figi: checked_figi(figi)?,
        })
    }

    /// Instrument the subscription refers to.
    #[must_use]
    pub fn figi(&self) -> &str {
        match self {
            Self::Candle { figi, .. }
            | Self::OrderBook { figi, .. }
            | Self::InstrumentInfo { figi } => figi,
        }
    }

    /// Event kind name used as the control frame prefix.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Candle { .. } => "candle",
            Self::OrderBook { .. } => "orderbook",
            Self::InstrumentInfo { .. } => "instrument_info",
        }
    }
}

fn checked_figi(figi: &str) -> Result<String, SubscriptionError> {
    if figi.is_empty() {
        Err(SubscriptionError::EmptyFigi)
    } else {
        Ok(figi.to_string())
    }
}
