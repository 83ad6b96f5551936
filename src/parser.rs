//! Parser module for upstream venue messages
//!
//! Handles the l2Book quote API payloads and the trade stream frames, plus the
//! request bodies sent to both.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::{MarketDataError, Result};
use crate::feed::{TradeData, TradeSide};

/// Request body for the venue quote API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct L2BookRequest {
    #[serde(rename = "type")]
    kind: &'static str,

    /// Venue-qualified symbol
    pub coin: String,

    /// Significant figures used to bucket price levels (2..=5)
    #[serde(rename = "nSigFigs", skip_serializing_if = "Option::is_none")]
    pub n_sig_figs: Option<u32>,

    /// Mantissa, only valid together with `n_sig_figs == 5`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mantissa: Option<u32>,
}

impl L2BookRequest {
    /// Full-precision book request
    pub fn new(coin: &str) -> Self {
        Self {
            kind: "l2Book",
            coin: coin.to_string(),
            n_sig_figs: None,
            mantissa: None,
        }
    }

    /// Book request with level aggregation
    pub fn with_precision(
        coin: &str,
        n_sig_figs: Option<u32>,
        mantissa: Option<u32>,
    ) -> Result<Self> {
        if let Some(n) = n_sig_figs {
            if !(2..=5).contains(&n) {
                return Err(MarketDataError::InvalidRequest(format!(
                    "n_sig_figs must be between 2 and 5, got {}",
                    n
                )));
            }
        }
        if let Some(m) = mantissa {
            if n_sig_figs != Some(5) {
                return Err(MarketDataError::InvalidRequest(
                    "mantissa is only allowed when n_sig_figs is 5".to_string(),
                ));
            }
            if ![1, 2, 5].contains(&m) {
                return Err(MarketDataError::InvalidRequest(format!(
                    "mantissa must be one of 1, 2, 5, got {}",
                    m
                )));
            }
        }

        Ok(Self {
            n_sig_figs,
            mantissa,
            ..Self::new(coin)
        })
    }
}

/// One level as quoted by a venue
#[derive(Debug, Clone, Deserialize)]
pub struct RawLevel {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub px: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub sz: Decimal,

    /// Number of resting orders at this price
    pub n: u32,
}

/// l2Book response: `levels[0]` are bids, `levels[1]` asks
#[derive(Debug, Clone, Deserialize)]
pub struct L2BookSnapshot {
    #[serde(default)]
    pub levels: Vec<Vec<RawLevel>>,

    /// Venue timestamp (milliseconds)
    #[serde(default)]
    pub time: i64,
}

impl L2BookSnapshot {
    /// Decode a raw venue response
    pub fn parse(raw: serde_json::Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| MarketDataError::MalformedPayload(e.to_string()))
    }

    pub fn bids(&self) -> &[RawLevel] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn asks(&self) -> &[RawLevel] {
        self.levels.get(1).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Subscription request sent once per symbol on the trade stream
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    method: &'static str,
    subscription: TradeSubscription<'a>,
}

#[derive(Debug, Clone, Serialize)]
struct TradeSubscription<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    coin: &'a str,
}

impl<'a> SubscribeRequest<'a> {
    pub fn trades(coin: &'a str) -> Self {
        Self {
            method: "subscribe",
            subscription: TradeSubscription {
                kind: "trades",
                coin,
            },
        }
    }
}

/// Trade as pushed by the upstream stream
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub coin: String,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub px: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub sz: Decimal,

    /// "B" (buy aggressor) or "A" (sell aggressor)
    pub side: String,

    pub time: i64,

    pub tid: u64,
}

impl RawTrade {
    pub fn into_trade(self) -> Result<TradeData> {
        let side = match self.side.as_str() {
            "B" | "b" | "buy" | "BUY" => TradeSide::Buy,
            "A" | "a" | "sell" | "SELL" => TradeSide::Sell,
            other => {
                return Err(MarketDataError::ParseError(format!(
                    "unknown trade side {:?}",
                    other
                )))
            }
        };

        Ok(TradeData {
            symbol: self.coin,
            price: self.px,
            size: self.sz,
            side,
            timestamp: self.time,
            trade_id: self.tid,
        })
    }
}

/// Trade stream frame envelope
#[derive(Debug, Clone, Deserialize)]
struct FeedFrame {
    #[serde(default)]
    channel: Option<String>,

    #[serde(default)]
    data: serde_json::Value,
}

/// Parsed trade stream message
#[derive(Debug, Clone)]
pub enum FeedMessage {
    /// A batch of trades; entries are decoded one by one so a single bad entry
    /// does not discard the rest
    Trades(Vec<serde_json::Value>),
    /// Subscription acks, pongs and other frames without a trade list
    Other(Option<String>),
}

impl FeedMessage {
    /// Parse a raw trade stream frame
    pub fn parse(raw: &str) -> Result<Self> {
        let frame: FeedFrame = serde_json::from_str(raw)?;

        match frame.data {
            serde_json::Value::Array(entries) => Ok(FeedMessage::Trades(entries)),
            _ => Ok(FeedMessage::Other(frame.channel)),
        }
    }
}

/// Parse a decimal from plain or scientific notation
pub fn parse_decimal(s: &str) -> std::result::Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

/// Custom deserializer for Decimal from either a JSON string or number
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    };
    parse_decimal(text.trim()).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_l2_book() {
        let raw = json!({
            "coin": "merrli:BTC",
            "time": 1672531200000i64,
            "levels": [
                [{"px": "50000.0", "sz": "1.5", "n": 3}, {"px": 49999, "sz": 2, "n": 1}],
                [{"px": "50001.0", "sz": "0.25", "n": 2}]
            ]
        });

        let snapshot = L2BookSnapshot::parse(raw).unwrap();
        assert_eq!(snapshot.time, 1672531200000);
        assert_eq!(snapshot.bids().len(), 2);
        assert_eq!(snapshot.asks().len(), 1);
        assert_eq!(snapshot.bids()[1].px, dec!(49999));
        assert_eq!(snapshot.asks()[0].sz, dec!(0.25));
        assert_eq!(snapshot.asks()[0].n, 2);
    }

    #[test]
    fn test_missing_ask_side() {
        let raw = json!({"time": 1, "levels": [[{"px": "1", "sz": "1", "n": 1}]]});
        let snapshot = L2BookSnapshot::parse(raw).unwrap();
        assert_eq!(snapshot.bids().len(), 1);
        assert!(snapshot.asks().is_empty());
    }

    #[test]
    fn test_missing_level_field_is_malformed() {
        let raw = json!({"time": 1, "levels": [[{"px": "1", "n": 1}], []]});
        assert!(matches!(
            L2BookSnapshot::parse(raw),
            Err(MarketDataError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_non_numeric_price_is_malformed() {
        let raw = json!({"time": 1, "levels": [[{"px": "abc", "sz": "1", "n": 1}], []]});
        assert!(matches!(
            L2BookSnapshot::parse(raw),
            Err(MarketDataError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_l2_request_body() {
        let body = serde_json::to_value(L2BookRequest::new("sekaw:BTC")).unwrap();
        assert_eq!(body, json!({"type": "l2Book", "coin": "sekaw:BTC"}));

        let body =
            serde_json::to_value(L2BookRequest::with_precision("sekaw:BTC", Some(5), Some(2)).unwrap())
                .unwrap();
        assert_eq!(
            body,
            json!({"type": "l2Book", "coin": "sekaw:BTC", "nSigFigs": 5, "mantissa": 2})
        );
    }

    #[test]
    fn test_l2_request_precision_rules() {
        assert!(L2BookRequest::with_precision("x", Some(1), None).is_err());
        assert!(L2BookRequest::with_precision("x", Some(4), Some(2)).is_err());
        assert!(L2BookRequest::with_precision("x", Some(5), Some(3)).is_err());
        assert!(L2BookRequest::with_precision("x", None, Some(1)).is_err());
        assert!(L2BookRequest::with_precision("x", Some(3), None).is_ok());
    }

    #[test]
    fn test_subscribe_request_body() {
        let body = serde_json::to_value(SubscribeRequest::trades("merrli:BTC")).unwrap();
        assert_eq!(
            body,
            json!({"method": "subscribe", "subscription": {"type": "trades", "coin": "merrli:BTC"}})
        );
    }

    #[test]
    fn test_parse_trade_frame() {
        let raw = r#"{
            "channel": "trades",
            "data": [
                {"coin": "merrli:BTC", "side": "B", "px": "50000.5", "sz": "0.1", "time": 1700000000000, "tid": 42, "hash": "0x0"}
            ]
        }"#;

        let FeedMessage::Trades(entries) = FeedMessage::parse(raw).unwrap() else {
            panic!("Expected trades");
        };
        assert_eq!(entries.len(), 1);

        let trade: RawTrade = serde_json::from_value(entries[0].clone()).unwrap();
        let trade = trade.into_trade().unwrap();
        assert_eq!(trade.symbol, "merrli:BTC");
        assert_eq!(trade.price, dec!(50000.5));
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.trade_id, 42);
    }

    #[test]
    fn test_subscription_ack_is_not_trades() {
        let raw = r#"{"channel": "subscriptionResponse", "data": {"method": "subscribe"}}"#;
        assert!(matches!(
            FeedMessage::parse(raw).unwrap(),
            FeedMessage::Other(Some(channel)) if channel == "subscriptionResponse"
        ));
    }

    #[test]
    fn test_invalid_frame_is_error() {
        assert!(FeedMessage::parse("not json").is_err());
    }

    #[test]
    fn test_unknown_side_rejected() {
        let raw = RawTrade {
            coin: "x".to_string(),
            px: dec!(1),
            sz: dec!(1),
            side: "Z".to_string(),
            time: 1,
            tid: 1,
        };
        assert!(raw.into_trade().is_err());
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(parse_decimal("1e-5").unwrap(), dec!(0.00001));
    }
}
