//! Query and ingestion endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::ApiError;
use crate::hub::CycleMetadata;
use crate::observability;
use crate::orderbook::{AggregatedOrderBook, OrderBook};
use crate::parser::L2BookRequest;
use crate::error::MarketDataError;
use crate::storage::{
    Candle, InsertOutcome, PriceSnapshot, SnapshotQuery, Timeframe, AGGREGATED_VENUE,
};
use crate::venue::fetch_books;
use crate::AppState;

const CHART_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "nbbo-market-data",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    Ok(observability::render(&state.registry)?)
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartParams {
    pub timeframe: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartResponse {
    pub success: bool,
    pub data: Vec<Candle>,
    pub coin: String,
    pub timeframe: String,
    pub count: usize,
}

/// Candles over the last 24 hours
///
/// Unknown timeframe tokens fall back to hourly buckets; the response echoes
/// the token as requested.
pub async fn chart(
    State(state): State<Arc<AppState>>,
    Path(coin): Path<String>,
    Query(params): Query<ChartParams>,
) -> ApiResult<ChartResponse> {
    let timeframe = match params.timeframe.as_deref() {
        Some(token) => token.parse::<Timeframe>().unwrap_or_else(|err| {
            debug!(error = %err, "Falling back to default timeframe");
            Timeframe::default()
        }),
        None => Timeframe::default(),
    };
    let label = params.timeframe.unwrap_or_else(|| timeframe.to_string());

    let to = chrono::Utc::now().timestamp_millis();
    let from = to - CHART_WINDOW_MS;
    let data = state
        .store
        .candles(&coin, timeframe.minutes(), Some(from), Some(to))
        .await?;

    Ok(Json(ChartResponse {
        success: true,
        count: data.len(),
        data,
        coin,
        timeframe: label,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OrderBookParams {
    pub coin: String,
    pub n_sig_figs: Option<u32>,
    pub mantissa: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OrderBookResponse {
    pub success: bool,
    pub data: OrderBook,
}

/// One venue's reconstructed book
pub async fn order_book(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OrderBookParams>,
) -> ApiResult<OrderBookResponse> {
    let request = L2BookRequest::with_precision(&params.coin, params.n_sig_figs, params.mantissa)?;
    let raw = state.venues.fetch_l2_book(&request).await?;
    let book = OrderBook::reconstruct(raw, &params.coin)?;

    Ok(Json(OrderBookResponse {
        success: true,
        data: book,
    }))
}

#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub success: bool,
    pub data: AggregatedOrderBook,
    pub metadata: CycleMetadata,
}

/// One-shot aggregate over every configured venue
pub async fn aggregate_order_books(
    State(state): State<Arc<AppState>>,
) -> ApiResult<AggregateResponse> {
    let symbols = &state.config.venue_symbols;
    let fetch = fetch_books(state.venues.as_ref(), symbols).await;
    let data = state.engine.aggregate(&fetch.books, &fetch.processed)?;

    Ok(Json(AggregateResponse {
        success: true,
        metadata: CycleMetadata {
            coins_processed: fetch.processed.len(),
            total_coins: symbols.len(),
        },
        data,
    }))
}

#[derive(Debug, Serialize)]
pub struct InsertResponse {
    pub success: bool,
    pub outcome: InsertOutcome,
}

/// Accepted ingestion payloads
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SnapshotBody {
    /// An aggregate or single-venue book response, `{data: {coin, bids, asks, ..}}`
    Book { data: OrderBook },
    Snapshot(PriceSnapshot),
}

impl SnapshotBody {
    fn into_snapshot(self) -> Result<PriceSnapshot, MarketDataError> {
        match self {
            SnapshotBody::Snapshot(snapshot) => Ok(snapshot),
            SnapshotBody::Book { data } => PriceSnapshot::from_order_book(&data, AGGREGATED_VENUE)
                .ok_or_else(|| {
                    MarketDataError::InvalidRequest(format!(
                        "book for {} has no asks to snapshot",
                        data.symbol()
                    ))
                }),
        }
    }
}

pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SnapshotBody>,
) -> ApiResult<InsertResponse> {
    let snapshot = body.into_snapshot()?;
    let outcome = state.store.insert(&snapshot).await?;
    if outcome == InsertOutcome::Duplicate {
        info!(
            symbol = %snapshot.symbol,
            timestamp = snapshot.timestamp,
            "Duplicate snapshot ignored"
        );
    }

    Ok(Json(InsertResponse {
        success: true,
        outcome,
    }))
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub success: bool,
    pub data: Vec<PriceSnapshot>,
    pub count: usize,
}

pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SnapshotQuery>,
) -> ApiResult<SnapshotsResponse> {
    let data = state.store.query(&filter).await?;

    Ok(Json(SnapshotsResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    pub symbol: String,
    pub venue: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub success: bool,
    pub data: Option<PriceSnapshot>,
}

/// Most recent stored snapshot; `data` is null when none exists
pub async fn latest_snapshot(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> ApiResult<LatestResponse> {
    let data = state
        .store
        .latest(&params.symbol, params.venue.as_deref())
        .await?;

    Ok(Json(LatestResponse {
        success: true,
        data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SnapshotStore;
    use crate::venue::MockOrderBookSource;
    use crate::Config;
    use axum::http::StatusCode;
    use serde_json::json;

    async fn state_with(source: MockOrderBookSource) -> Arc<AppState> {
        let store = SnapshotStore::in_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), Arc::new(source), store).unwrap())
    }

    fn book(bid: &str, ask: &str) -> serde_json::Value {
        json!({
            "time": 1,
            "levels": [[{"px": bid, "sz": "1", "n": 1}], [{"px": ask, "sz": "1", "n": 1}]]
        })
    }

    fn status_of(err: ApiError) -> StatusCode {
        err.status()
    }

    #[tokio::test]
    async fn test_chart_defaults_to_one_hour() {
        let state = state_with(MockOrderBookSource::new()).await;
        let now = chrono::Utc::now().timestamp_millis();
        state
            .store
            .insert(&PriceSnapshot {
                symbol: "BTC".to_string(),
                venue: "AGGREGATED".to_string(),
                timestamp: now - 1000,
                best_ask: 50000.0,
                best_bid: None,
                spread: None,
                mid_price: None,
            })
            .await
            .unwrap();

        let Json(response) = chart(
            State(state),
            Path("BTC".to_string()),
            Query(ChartParams::default()),
        )
        .await
        .unwrap();

        assert!(response.success);
        assert_eq!(response.timeframe, "1h");
        assert_eq!(response.coin, "BTC");
        assert_eq!(response.count, 1);
        assert_eq!(response.data[0].open, 50000.0);
    }

    #[tokio::test]
    async fn test_chart_unknown_timeframe_falls_back_to_hourly() {
        let state = state_with(MockOrderBookSource::new()).await;
        let now = chrono::Utc::now().timestamp_millis();
        let hour_start = now - now.rem_euclid(3_600_000);
        for (offset, ask) in [(0, 10.0), (60_000, 11.0)] {
            state
                .store
                .insert(&PriceSnapshot {
                    symbol: "BTC".to_string(),
                    venue: "AGGREGATED".to_string(),
                    timestamp: hour_start - 3_600_000 + offset,
                    best_ask: ask,
                    best_bid: None,
                    spread: None,
                    mid_price: None,
                })
                .await
                .unwrap();
        }

        let Json(response) = chart(
            State(state),
            Path("BTC".to_string()),
            Query(ChartParams {
                timeframe: Some("7m".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.timeframe, "7m");
        // One-minute apart samples share an hourly bucket
        assert_eq!(response.count, 1);
        assert_eq!(response.data[0].close, 11.0);
    }

    #[tokio::test]
    async fn test_chart_echoes_known_timeframe() {
        let state = state_with(MockOrderBookSource::new()).await;
        let Json(response) = chart(
            State(state),
            Path("BTC".to_string()),
            Query(ChartParams {
                timeframe: Some("15m".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.timeframe, "15m");
        assert_eq!(response.count, 0);
    }

    #[tokio::test]
    async fn test_order_book_passes_precision() {
        let mut source = MockOrderBookSource::new();
        source
            .expect_fetch_l2_book()
            .withf(|request| request.n_sig_figs == Some(5) && request.mantissa == Some(2))
            .returning(|_| Ok(book("100", "101")));
        let state = state_with(source).await;

        let Json(response) = order_book(
            State(state),
            Query(OrderBookParams {
                coin: "merrli:BTC".to_string(),
                n_sig_figs: Some(5),
                mantissa: Some(2),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.data.symbol(), "merrli:BTC");
    }

    #[tokio::test]
    async fn test_order_book_invalid_precision_is_bad_request() {
        let state = state_with(MockOrderBookSource::new()).await;
        let err = order_book(
            State(state),
            Query(OrderBookParams {
                coin: "merrli:BTC".to_string(),
                n_sig_figs: Some(9),
                mantissa: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_aggregate_reports_coverage() {
        let mut source = MockOrderBookSource::new();
        source.expect_fetch_l2_book().returning(|request| {
            if request.coin == "merrli:BTC" {
                Ok(book("100", "102"))
            } else {
                Err(MarketDataError::RestApiError("down".to_string()))
            }
        });
        let state = state_with(source).await;

        let Json(response) = aggregate_order_books(State(state)).await.unwrap();
        assert_eq!(response.metadata.coins_processed, 1);
        assert_eq!(response.metadata.total_coins, 2);
        assert_eq!(response.data.book().symbol(), "BTC");
    }

    #[tokio::test]
    async fn test_aggregate_without_venues_is_bad_gateway() {
        let mut source = MockOrderBookSource::new();
        source
            .expect_fetch_l2_book()
            .returning(|_| Err(MarketDataError::RestApiError("down".to_string())));
        let state = state_with(source).await;

        let err = aggregate_order_books(State(state)).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_snapshot_ingest_and_query() {
        let state = state_with(MockOrderBookSource::new()).await;
        let snapshot = PriceSnapshot {
            symbol: "BTC".to_string(),
            venue: "AGGREGATED".to_string(),
            timestamp: 10,
            best_ask: 2.0,
            best_bid: Some(1.0),
            spread: Some(1.0),
            mid_price: Some(1.5),
        };

        let body = || SnapshotBody::Snapshot(snapshot.clone());
        let Json(first) = create_snapshot(State(state.clone()), Json(body()))
            .await
            .unwrap();
        assert_eq!(first.outcome, InsertOutcome::Inserted);

        let Json(second) = create_snapshot(State(state.clone()), Json(body()))
            .await
            .unwrap();
        assert_eq!(second.outcome, InsertOutcome::Duplicate);

        let Json(listed) = list_snapshots(
            State(state),
            Query(SnapshotQuery {
                symbol: Some("BTC".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(listed.count, 1);
        assert_eq!(listed.data[0], snapshot);
    }

    #[tokio::test]
    async fn test_snapshot_ingest_from_aggregate_response() {
        let mut source = MockOrderBookSource::new();
        source
            .expect_fetch_l2_book()
            .returning(|_| Ok(book("100", "102")));
        let state = state_with(source).await;

        // Feed the aggregate endpoint's own response body back into ingestion
        let Json(aggregate) = aggregate_order_books(State(state.clone())).await.unwrap();
        let payload = serde_json::to_value(&aggregate).unwrap();
        let body: SnapshotBody = serde_json::from_value(payload).unwrap();
        assert!(matches!(body, SnapshotBody::Book { .. }));

        let Json(inserted) = create_snapshot(State(state.clone()), Json(body))
            .await
            .unwrap();
        assert_eq!(inserted.outcome, InsertOutcome::Inserted);

        let Json(latest) = latest_snapshot(
            State(state),
            Query(LatestParams {
                symbol: "BTC".to_string(),
                venue: Some(AGGREGATED_VENUE.to_string()),
            }),
        )
        .await
        .unwrap();
        let stored = latest.data.unwrap();
        assert_eq!(stored.venue, "AGGREGATED");
        assert_eq!(stored.timestamp, aggregate.data.book().timestamp());
        assert_eq!(stored.best_ask, 102.0);
        assert_eq!(stored.best_bid, Some(100.0));
        assert_eq!(stored.mid_price, Some(101.0));
    }

    #[test]
    fn test_snapshot_ingest_flat_body() {
        let body: SnapshotBody = serde_json::from_value(json!({
            "coin": "ETH", "dex": "merrli", "timestamp": 5, "best_ask": 2.5
        }))
        .unwrap();
        assert!(matches!(body, SnapshotBody::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_snapshot_ingest_book_without_asks_is_bad_request() {
        let state = state_with(MockOrderBookSource::new()).await;
        let body: SnapshotBody = serde_json::from_value(json!({
            "success": true,
            "data": {"coin": "BTC", "timestamp": 1, "bids": [{"price": 1.0, "size": 1.0}], "asks": []}
        }))
        .unwrap();

        let err = create_snapshot(State(state), Json(body)).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_latest_snapshot_picks_newest_and_filters_venue() {
        let state = state_with(MockOrderBookSource::new()).await;
        for (venue, timestamp, ask) in [("a", 1, 1.0), ("b", 3, 3.0), ("a", 2, 2.0)] {
            state
                .store
                .insert(&PriceSnapshot {
                    symbol: "BTC".to_string(),
                    venue: venue.to_string(),
                    timestamp,
                    best_ask: ask,
                    best_bid: None,
                    spread: None,
                    mid_price: None,
                })
                .await
                .unwrap();
        }

        let query = |venue: Option<&str>| {
            Query(LatestParams {
                symbol: "BTC".to_string(),
                venue: venue.map(str::to_string),
            })
        };

        let Json(any) = latest_snapshot(State(state.clone()), query(None)).await.unwrap();
        assert_eq!(any.data.map(|s| s.best_ask), Some(3.0));

        let Json(on_a) = latest_snapshot(State(state.clone()), query(Some("a"))).await.unwrap();
        assert_eq!(on_a.data.map(|s| s.timestamp), Some(2));

        let Json(missing) = latest_snapshot(State(state), query(Some("z"))).await.unwrap();
        assert!(missing.success);
        assert!(missing.data.is_none());
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders_registry() {
        let state = state_with(MockOrderBookSource::new()).await;
        let _sub = state.price_subscribers.subscribe().await;

        let text = tokio_test::assert_ok!(metrics(State(state)).await);
        assert!(text.contains("subscribers{channel=\"prices\"} 1"));
    }
}
