//! Stream Codec
//!
//! Two-step decoding of inbound frames: the envelope first, to learn the
//! event kind, then the kind-specific event. Failures are reported as
//! [`DecodeError`] so the dispatcher can log and drop the frame.

use super::messages::{
    CandleEvent, Envelope, ErrorEvent, EventKind, InstrumentInfoEvent, OrderBookEvent,
    StreamEvent,
};

/// Why a frame could not be turned into a [`StreamEvent`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not JSON or has no `event` discriminator.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Discriminator names a kind this client does not decode.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// Known kind whose payload does not match the expected shape.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        /// Kind announced by the envelope.
        kind: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnknownKind(_) => "unknown_kind",
            Self::Payload { .. } => "invalid_payload",
        }
    }
}

/// JSON codec for the market data stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one frame into a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the envelope or the payload cannot be
    /// decoded, or when the kind is not recognized.
    pub fn decode(&self, frame: &[u8]) -> Result<StreamEvent, DecodeError> {
        let envelope: Envelope = serde_json::from_slice(frame).map_err(DecodeError::Malformed)?;

        let kind = EventKind::from_wire(&envelope.event)
            .ok_or(DecodeError::UnknownKind(envelope.event))?;

        let payload_err = |source| DecodeError::Payload {
            kind: kind.as_str(),
            source,
        };

        let event = match kind {
            EventKind::Candle => {
                StreamEvent::Candle(serde_json::from_slice::<CandleEvent>(frame).map_err(payload_err)?)
            }
            EventKind::OrderBook => StreamEvent::OrderBook(
                serde_json::from_slice::<OrderBookEvent>(frame).map_err(payload_err)?,
            ),
            EventKind::InstrumentInfo => StreamEvent::InstrumentInfo(
                serde_json::from_slice::<InstrumentInfoEvent>(frame).map_err(payload_err)?,
            ),
            EventKind::Error => {
                StreamEvent::Error(serde_json::from_slice::<ErrorEvent>(frame).map_err(payload_err)?)
            }
        };

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{CandleInterval, TradingStatus};
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn decode_candle() {
        let frame = br#"{"event":"candle","time":"2019-08-07T15:35:00.029721253Z","payload":{"figi":"BBG0013HGFT4","interval":"5min","o":64.0575,"c":64.0625,"h":64.07,"l":64.05,"v":156,"time":"2019-08-07T15:35:00Z"}}"#;

        let decoded = JsonCodec::new().decode(frame).unwrap();
        assert_eq!(
            decoded
                .time()
                .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            "2019-08-07T15:35:00.029721253Z"
        );

        let StreamEvent::Candle(event) = decoded else {
            panic!("expected candle");
        };
        assert_eq!(event.time, utc("2019-08-07T15:35:00.029721253Z"));
        assert_eq!(event.candle.timestamp, utc("2019-08-07T15:35:00Z"));
        assert_eq!(event.candle.figi, "BBG0013HGFT4");
        assert_eq!(event.candle.interval, CandleInterval::FiveMinutes);
        assert_eq!(event.candle.open, dec("64.0575"));
        assert_eq!(event.candle.close, dec("64.0625"));
        assert_eq!(event.candle.high, dec("64.07"));
        assert_eq!(event.candle.low, dec("64.05"));
        assert_eq!(event.candle.volume, dec("156"));
    }

    #[test]
    fn decode_orderbook() {
        let frame = br#"{"event":"orderbook","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG0013HGFT4","depth":2,"bids":[[64.3525,204],[64.1975,30]],"asks":[[64.38,2],[64.4,3]]}}"#;

        let StreamEvent::OrderBook(event) = JsonCodec::new().decode(frame).unwrap() else {
            panic!("expected orderbook");
        };
        let book = event.order_book;
        assert_eq!(book.depth, 2);
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[0].price(), dec("64.3525"));
        assert_eq!(book.bids[0].quantity(), dec("204"));
        assert_eq!(book.asks[1].price(), dec("64.4"));
        assert_eq!(book.asks[1].quantity(), dec("3"));
    }

    #[test]
    fn unlisted_candle_interval_is_delivered() {
        let frame = br#"{"event":"candle","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG1","interval":"7min","o":1,"c":2,"h":3,"l":0.5,"v":10,"time":"2019-08-07T15:35:00Z"}}"#;

        let StreamEvent::Candle(event) = JsonCodec::new().decode(frame).unwrap() else {
            panic!("expected candle");
        };
        assert_eq!(event.candle.interval, CandleInterval::Unknown);
        assert_eq!(event.candle.close, dec("2"));
    }

    #[test]
    fn null_book_sides_decode_as_empty() {
        let frame = br#"{"event":"orderbook","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG1","depth":5,"bids":null,"asks":[[10.5,1]]}}"#;

        let StreamEvent::OrderBook(event) = JsonCodec::new().decode(frame).unwrap() else {
            panic!("expected orderbook");
        };
        assert!(event.order_book.bids.is_empty());
        assert_eq!(event.order_book.asks.len(), 1);

        let frame = br#"{"event":"orderbook","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG1","depth":5,"asks":null}}"#;
        let StreamEvent::OrderBook(event) = JsonCodec::new().decode(frame).unwrap() else {
            panic!("expected orderbook");
        };
        assert!(event.order_book.bids.is_empty());
        assert!(event.order_book.asks.is_empty());
    }

    #[test]
    fn decode_instrument_info_with_optionals() {
        let frame = br#"{"event":"instrument_info","time":"2019-08-07T15:35:00Z","payload":{"figi":"BBG0013HGFT4","trade_status":"normal_trading","min_price_increment":0.0025,"lot":1000,"accrued_interest":12.5,"limit_up":70.1}}"#;

        let StreamEvent::InstrumentInfo(event) = JsonCodec::new().decode(frame).unwrap() else {
            panic!("expected instrument_info");
        };
        let info = event.info;
        assert_eq!(info.trade_status, TradingStatus::NormalTrading);
        assert_eq!(info.min_price_increment, dec("0.0025"));
        assert_eq!(info.lot, dec("1000"));
        assert_eq!(info.accrued_interest, Some(dec("12.5")));
        assert_eq!(info.limit_up, Some(dec("70.1")));
        assert_eq!(info.limit_down, None);
    }

    #[test]
    fn decode_error_event() {
        let frame = br#"{"event":"error","time":"2019-08-07T15:35:00Z","payload":{"request_id":"123ASD1123","error":"FIGI NOOOOOOO not found"}}"#;

        let StreamEvent::Error(event) = JsonCodec::new().decode(frame).unwrap() else {
            panic!("expected error");
        };
        assert_eq!(event.request_id(), Some("123ASD1123"));
        assert_eq!(event.error.error, "FIGI NOOOOOOO not found");
    }

    #[test]
    fn garbage_is_malformed() {
        let err = JsonCodec::new().decode(b"not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert_eq!(err.reason(), "malformed");
    }

    #[test]
    fn missing_discriminator_is_malformed() {
        let err = JsonCodec::new().decode(br#"{"time":"x"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let err = JsonCodec::new()
            .decode(br#"{"event":"portfolio","time":"2019-08-07T15:35:00Z","payload":{}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind(ref k) if k == "portfolio"));
    }

    #[test]
    fn bad_payload_for_known_kind() {
        let err = JsonCodec::new()
            .decode(br#"{"event":"candle","time":"2019-08-07T15:35:00Z","payload":{"figi":1}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Payload { kind: "candle", .. }));
        assert_eq!(err.reason(), "invalid_payload");
    }
}
