//! Market Data Vocabulary
//!
//! Enumerations shared by the streaming wire format: candle intervals and
//! instrument trading statuses. Both map one-to-one onto the strings the
//! streaming API uses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum order book depth accepted by the streaming API.
pub const MAX_ORDERBOOK_DEPTH: i32 = 20;

// =============================================================================
// Candle Interval
// =============================================================================

/// Aggregation interval of a candle subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    /// One minute.
    #[serde(rename = "1min")]
    OneMinute,
    /// Two minutes.
    #[serde(rename = "2min")]
    TwoMinutes,
    /// Three minutes.
    #[serde(rename = "3min")]
    ThreeMinutes,
    /// Five minutes.
    #[serde(rename = "5min")]
    FiveMinutes,
    /// Ten minutes.
    #[serde(rename = "10min")]
    TenMinutes,
    /// Fifteen minutes.
    #[serde(rename = "15min")]
    FifteenMinutes,
    /// Thirty minutes.
    #[serde(rename = "30min")]
    ThirtyMinutes,
    /// One hour.
    #[serde(rename = "hour")]
    Hour,
    /// Two hours.
    #[serde(rename = "2hour")]
    TwoHours,
    /// Four hours.
    #[serde(rename = "4hour")]
    FourHours,
    /// One trading day.
    #[serde(rename = "day")]
    Day,
    /// One week.
    #[serde(rename = "week")]
    Week,
    /// One month.
    #[serde(rename = "month")]
    Month,
    /// Interval string not known to this client. Decodes only; it cannot be
    /// subscribed to.
    #[serde(other)]
    Unknown,
}

impl CandleInterval {
    /// Get the wire name of the interval.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::TwoMinutes => "2min",
            Self::ThreeMinutes => "3min",
            Self::FiveMinutes => "5min",
            Self::TenMinutes => "10min",
            Self::FifteenMinutes => "15min",
            Self::ThirtyMinutes => "30min",
            Self::Hour => "hour",
            Self::TwoHours => "2hour",
            Self::FourHours => "4hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Trading Status
// =============================================================================

/// Trading status of an instrument as reported by `instrument_info` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingStatus {
    /// Trading is paused.
    BreakInTrading,
    /// Continuous trading session.
    NormalTrading,
    /// Instrument cannot be traded.
    NotAvailableForTrading,
    /// Closing auction.
    ClosingAuction,
    /// Closing period.
    ClosingPeriod,
    /// Dark pool auction.
    DarkPoolAuction,
    /// Discrete auction.
    DiscreteAuction,
    /// Opening period.
    OpeningPeriod,
    /// Opening auction.
    OpeningAuctionPeriod,
    /// Trading at the closing auction price.
    TradingAtClosingAuctionPrice,
    /// Status string not known to this client.
    #[serde(other)]
    Unknown,
}

impl TradingStatus {
    /// Whether orders can currently be matched for the instrument.
    #[must_use]
    pub const fn is_trading(&self) -> bool {
        matches!(
            self,
            Self::NormalTrading
                | Self::OpeningAuctionPeriod
                | Self::ClosingAuction
                | Self::DarkPoolAuction
                | Self::DiscreteAuction
                | Self::TradingAtClosingAuctionPrice
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(CandleInterval::OneMinute, "1min")]
    #[test_case(CandleInterval::FiveMinutes, "5min")]
    #[test_case(CandleInterval::ThirtyMinutes, "30min")]
    #[test_case(CandleInterval::Hour, "hour")]
    #[test_case(CandleInterval::FourHours, "4hour")]
    #[test_case(CandleInterval::Day, "day")]
    #[test_case(CandleInterval::Month, "month")]
    fn candle_interval_wire_names(interval: CandleInterval, wire: &str) {
        let quoted = format!("\"{wire}\"");
        assert_eq!(interval.as_str(), wire);
        assert_eq!(serde_json::to_string(&interval).unwrap(), quoted);
        assert_eq!(
            serde_json::from_str::<CandleInterval>(&quoted).unwrap(),
            interval
        );
    }

    #[test_case("\"7min\"")]
    #[test_case("\"quarter\"")]
    fn candle_interval_unlisted_decodes_as_unknown(json: &str) {
        assert_eq!(
            serde_json::from_str::<CandleInterval>(json).unwrap(),
            CandleInterval::Unknown
        );
    }

    #[test_case("\"normal_trading\"", TradingStatus::NormalTrading)]
    #[test_case("\"break_in_trading\"", TradingStatus::BreakInTrading)]
    #[test_case("\"not_available_for_trading\"", TradingStatus::NotAvailableForTrading)]
    #[test_case(
        "\"trading_at_closing_auction_price\"",
        TradingStatus::TradingAtClosingAuctionPrice
    )]
    #[test_case("\"something_new\"", TradingStatus::Unknown)]
    fn trading_status_parsing(json: &str, expected: TradingStatus) {
        let status: TradingStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status, expected);
    }

    #[test]
    fn trading_status_is_trading() {
        assert!(TradingStatus::NormalTrading.is_trading());
        assert!(!TradingStatus::BreakInTrading.is_trading());
        assert!(!TradingStatus::NotAvailableForTrading.is_trading());
        assert!(!TradingStatus::Unknown.is_trading());
    }
}
