//! Venue quote API client
//!
//! Fetches raw l2Book snapshots; reconstruction happens in `orderbook`.

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::orderbook::OrderBook;
use crate::parser::L2BookRequest;

/// Source of raw venue order book snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderBookSource: Send + Sync {
    /// Fetch the raw l2Book payload for one venue-qualified symbol
    async fn fetch_l2_book(&self, request: &L2BookRequest) -> Result<serde_json::Value>;
}

/// HTTP client for the venue info endpoint
#[derive(Debug, Clone)]
pub struct VenueClient {
    http: reqwest::Client,
    endpoint: String,
}

impl VenueClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint: config.info_endpoint.clone(),
        })
    }
}

#[async_trait]
impl OrderBookSource for VenueClient {
    async fn fetch_l2_book(&self, request: &L2BookRequest) -> Result<serde_json::Value> {
        debug!(coin = %request.coin, endpoint = %self.endpoint, "Fetching l2Book");

        let response = self.http.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::RestApiError(format!(
                "{} returned {}: {}",
                request.coin, status, body
            )));
        }

        // A `null` body is what the venue returns for unknown symbols
        let payload: serde_json::Value = response.json().await?;
        if payload.is_null() {
            return Err(MarketDataError::MalformedPayload(format!(
                "empty l2Book response for {}",
                request.coin
            )));
        }

        Ok(payload)
    }
}

/// Outcome of fetching every configured venue once
#[derive(Debug, Default)]
pub struct VenueFetch {
    /// Reconstructed books, in configured order
    pub books: Vec<OrderBook>,

    /// Symbols whose book was fetched and reconstructed
    pub processed: Vec<String>,

    /// One `VenueUnavailable` per failed symbol
    pub failures: Vec<MarketDataError>,
}

/// Fetch and reconstruct every symbol concurrently
///
/// A failure on one venue never affects the others.
pub async fn fetch_books(source: &dyn OrderBookSource, symbols: &[String]) -> VenueFetch {
    let fetches = symbols.iter().map(|symbol| async move {
        let request = L2BookRequest::new(symbol);
        let book = match source.fetch_l2_book(&request).await {
            Ok(raw) => OrderBook::reconstruct(raw, symbol),
            Err(e) => Err(e),
        };
        (symbol, book)
    });

    let mut fetch = VenueFetch::default();
    for (symbol, result) in join_all(fetches).await {
        match result {
            Ok(book) => {
                fetch.books.push(book);
                fetch.processed.push(symbol.clone());
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Venue unavailable this cycle");
                fetch.failures.push(MarketDataError::venue_unavailable(symbol, &e));
            }
        }
    }

    fetch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn healthy_book() -> serde_json::Value {
        json!({
            "time": 1,
            "levels": [[{"px": "100", "sz": "1", "n": 1}], [{"px": "101", "sz": "1", "n": 1}]]
        })
    }

    #[tokio::test]
    async fn test_fetch_books_isolates_failures() {
        let mut source = MockOrderBookSource::new();
        source.expect_fetch_l2_book().returning(|request| match request.coin.as_str() {
            "down" => Err(MarketDataError::RestApiError("timeout".to_string())),
            "garbled" => Ok(json!({"levels": [[{"px": "1"}]]})),
            _ => Ok(healthy_book()),
        });

        let symbols: Vec<String> = ["down", "ok", "garbled"].iter().map(|s| s.to_string()).collect();
        let fetch = fetch_books(&source, &symbols).await;

        assert_eq!(fetch.processed, vec!["ok".to_string()]);
        assert_eq!(fetch.books.len(), 1);
        assert_eq!(fetch.failures.len(), 2);
        assert!(fetch
            .failures
            .iter()
            .all(|e| matches!(e, MarketDataError::VenueUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_fetch_books_requests_full_precision() {
        let mut source = MockOrderBookSource::new();
        source
            .expect_fetch_l2_book()
            .withf(|request| request.n_sig_figs.is_none() && request.mantissa.is_none())
            .times(2)
            .returning(|_| Ok(healthy_book()));

        let symbols = vec!["a".to_string(), "b".to_string()];
        let fetch = fetch_books(&source, &symbols).await;
        assert_eq!(fetch.processed, symbols);
    }

    #[test]
    fn test_venue_client_from_config() {
        let config = Config::default();
        let client = VenueClient::new(&config).unwrap();
        assert_eq!(client.endpoint, config.info_endpoint);
    }
}
