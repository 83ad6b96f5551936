//! Error types for the market data service

use thiserror::Error;

/// Market data service errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Venue {symbol} unavailable: {reason}")]
    VenueUnavailable { symbol: String, reason: String },

    #[error("No venues available ({attempted} attempted)")]
    NoVenuesAvailable { attempted: usize },

    #[error("Malformed venue payload: {0}")]
    MalformedPayload(String),

    #[error("Upstream trade feed disconnected: {0}")]
    FeedDisconnected(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl MarketDataError {
    /// Wrap any failure as "this venue is unavailable this cycle".
    pub fn venue_unavailable(symbol: &str, cause: &MarketDataError) -> Self {
        MarketDataError::VenueUnavailable {
            symbol: symbol.to_string(),
            reason: cause.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        MarketDataError::RestApiError(err.to_string())
    }
}

impl From<sqlx::Error> for MarketDataError {
    fn from(err: sqlx::Error) -> Self {
        MarketDataError::StorageError(err.to_string())
    }
}

impl From<config::ConfigError> for MarketDataError {
    fn from(err: config::ConfigError) -> Self {
        MarketDataError::ConfigError(err.to_string())
    }
}

impl From<prometheus::Error> for MarketDataError {
    fn from(err: prometheus::Error) -> Self {
        MarketDataError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
