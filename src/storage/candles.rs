//! OHLC candles derived from price snapshots
//!
//! Candles are built from the best ask only and carry no volume.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::PriceSnapshot;
use crate::error::MarketDataError;

const MINUTE_MS: i64 = 60_000;

/// One fixed-width bucket of ask prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Bucket start, milliseconds since epoch
    #[serde(rename = "timestamp")]
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(rename = "count")]
    pub sample_count: u32,
}

impl Candle {
    fn open_at(bucket_start: i64, price: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            sample_count: 1,
        }
    }

    fn push(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.sample_count = self.sample_count.saturating_add(1);
    }
}

/// Bucket start for a timestamp: `floor(ts / width) * width`
pub fn bucket_start(timestamp: i64, bucket_ms: i64) -> i64 {
    timestamp.div_euclid(bucket_ms) * bucket_ms
}

/// Build candles from snapshots, ascending by bucket start
///
/// Snapshots are ordered by timestamp first, so open and close follow time
/// order regardless of input order. Equal timestamps keep their input order.
pub fn build_candles(snapshots: &[PriceSnapshot], bucket_ms: i64) -> Vec<Candle> {
    if bucket_ms <= 0 {
        return Vec::new();
    }

    let mut ordered: Vec<&PriceSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|snapshot| snapshot.timestamp);

    let mut candles: BTreeMap<i64, Candle> = BTreeMap::new();
    for snapshot in ordered {
        let start = bucket_start(snapshot.timestamp, bucket_ms);
        candles
            .entry(start)
            .and_modify(|candle| candle.push(snapshot.best_ask))
            .or_insert_with(|| Candle::open_at(start, snapshot.best_ask));
    }

    candles.into_values().collect()
}

/// Chart timeframe token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeframe {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    #[default]
    OneHour,
    FourHours,
    OneDay,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::OneMinute => 1,
            Timeframe::FiveMinutes => 5,
            Timeframe::FifteenMinutes => 15,
            Timeframe::OneHour => 60,
            Timeframe::FourHours => 240,
            Timeframe::OneDay => 1440,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::OneMinute),
            "5m" => Ok(Timeframe::FiveMinutes),
            "15m" => Ok(Timeframe::FifteenMinutes),
            "1h" => Ok(Timeframe::OneHour),
            "4h" => Ok(Timeframe::FourHours),
            "1d" => Ok(Timeframe::OneDay),
            other => Err(MarketDataError::InvalidRequest(format!(
                "unknown timeframe {:?}, expected one of 1m, 5m, 15m, 1h, 4h, 1d",
                other
            ))),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket width in milliseconds for a width in minutes
pub(crate) fn minutes_to_ms(minutes: u32) -> i64 {
    i64::from(minutes) * MINUTE_MS
}
