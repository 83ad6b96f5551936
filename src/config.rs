//! Configuration module for the market data service

use serde::Deserialize;
use std::time::Duration;

use crate::error::{MarketDataError, Result};

/// Environment variable prefix, e.g. `NBBO_POLL_INTERVAL_MS=1000`
const ENV_PREFIX: &str = "NBBO";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Venue-qualified symbols merged into the aggregate book (e.g., ["merrli:BTC", "sekaw:BTC"])
    pub venue_symbols: Vec<String>,

    /// Venue-qualified symbols subscribed on the upstream trade feed
    pub trade_symbols: Vec<String>,

    /// Synthetic identifier carried by the aggregated book
    pub aggregate_symbol: String,

    /// Venue quote API endpoint (l2Book requests)
    pub info_endpoint: String,

    /// Upstream trade stream endpoint
    pub ws_endpoint: String,

    /// Timeout for a single venue fetch
    pub request_timeout_ms: u64,

    /// Broadcast cycle period
    pub poll_interval_ms: u64,

    /// Fixed delay between trade feed reconnection attempts
    pub reconnect_delay_ms: u64,

    /// Trade heartbeat period
    pub heartbeat_interval_secs: u64,

    /// SQLite database URL for price snapshots
    pub database_url: String,

    /// Snapshot retention window
    pub retention_days: u32,
    pub purge_interval_secs: u64,

    /// HTTP listen address
    pub bind_addr: String,
}

impl Config {
    /// Load configuration from defaults, `.env` and `NBBO_*` environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("venue_symbols", defaults.venue_symbols)?
            .set_default("trade_symbols", defaults.trade_symbols)?
            .set_default("aggregate_symbol", defaults.aggregate_symbol)?
            .set_default("info_endpoint", defaults.info_endpoint)?
            .set_default("ws_endpoint", defaults.ws_endpoint)?
            .set_default("request_timeout_ms", defaults.request_timeout_ms)?
            .set_default("poll_interval_ms", defaults.poll_interval_ms)?
            .set_default("reconnect_delay_ms", defaults.reconnect_delay_ms)?
            .set_default("heartbeat_interval_secs", defaults.heartbeat_interval_secs)?
            .set_default("database_url", defaults.database_url)?
            .set_default("retention_days", defaults.retention_days)?
            .set_default("purge_interval_secs", defaults.purge_interval_secs)?
            .set_default("bind_addr", defaults.bind_addr)?
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("venue_symbols")
                    .with_list_parse_key("trade_symbols"),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        for list in [&mut self.venue_symbols, &mut self.trade_symbols] {
            *list = list
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.venue_symbols.is_empty() {
            return Err(MarketDataError::ConfigError(
                "venue_symbols must not be empty".to_string(),
            ));
        }
        if self.trade_symbols.is_empty() {
            return Err(MarketDataError::ConfigError(
                "trade_symbols must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0
            || self.heartbeat_interval_secs == 0
            || self.purge_interval_secs == 0
        {
            return Err(MarketDataError::ConfigError(
                "poll, heartbeat and purge intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue_symbols: vec!["merrli:BTC".to_string(), "sekaw:BTC".to_string()],
            trade_symbols: vec![
                "merrli:BTC".to_string(),
                "sekaw:BTC".to_string(),
                "btcx:BTC-FEUSD".to_string(),
            ],
            aggregate_symbol: "BTC".to_string(),
            info_endpoint: "https://api.hyperliquid-testnet.xyz/info".to_string(),
            ws_endpoint: "wss://api.hyperliquid-testnet.xyz/ws".to_string(),
            request_timeout_ms: 5_000,
            poll_interval_ms: 3_000,
            reconnect_delay_ms: 5_000,
            heartbeat_interval_secs: 60,
            database_url: "sqlite://price_data.db".to_string(),
            retention_days: 30,
            purge_interval_secs: 3_600,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_empty_venues_rejected() {
        let config = Config {
            venue_symbols: vec![],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MarketDataError::ConfigError(_))
        ));
    }

    #[test]
    fn test_normalize_trims_symbols() {
        let mut config = Config {
            venue_symbols: vec![" merrli:BTC ".to_string(), "".to_string()],
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.venue_symbols, vec!["merrli:BTC".to_string()]);
    }
}
