//! Price snapshot persistence
//!
//! Append-only SQLite table keyed by `(symbol, venue, timestamp)`. Duplicate
//! inserts are reported as `InsertOutcome::Duplicate`, never as errors.

mod candles;

pub use candles::{bucket_start, build_candles, Candle, Timeframe};

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{MarketDataError, Result};
use crate::orderbook::OrderBook;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Venue label for snapshots of the cross-venue book
pub const AGGREGATED_VENUE: &str = "AGGREGATED";

const SNAPSHOT_COLUMNS: &str =
    "symbol, venue, timestamp, best_ask, best_bid, spread, mid_price";

/// Point-in-time top of book for one symbol on one venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    #[serde(alias = "coin")]
    pub symbol: String,

    #[serde(alias = "dex")]
    pub venue: String,

    /// Milliseconds since epoch
    pub timestamp: i64,

    pub best_ask: f64,

    #[serde(default)]
    pub best_bid: Option<f64>,

    #[serde(default)]
    pub spread: Option<f64>,

    #[serde(default)]
    pub mid_price: Option<f64>,
}

impl PriceSnapshot {
    /// Snapshot of a book's top; `None` when the book has no asks
    pub fn from_order_book(book: &OrderBook, venue: &str) -> Option<Self> {
        let top = book.top();
        let best_ask = top.best_ask.and_then(|ask| ask.to_f64())?;

        Some(Self {
            symbol: book.symbol().to_string(),
            venue: venue.to_string(),
            timestamp: book.timestamp(),
            best_ask,
            best_bid: top.best_bid.and_then(|v| v.to_f64()),
            spread: top.spread.and_then(|v| v.to_f64()),
            mid_price: top.mid_price.and_then(|v| v.to_f64()),
        })
    }
}

/// Result of an idempotent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Optional, composable snapshot filters; bounds are inclusive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotQuery {
    pub symbol: Option<String>,
    pub venue: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<u32>,
}

/// SQLite-backed snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    /// Open (creating if missing) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(url = %url, "Snapshot store ready");
        Ok(store)
    }

    /// Private in-memory database, kept alive on a single connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                venue TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                best_ask REAL NOT NULL,
                best_bid REAL,
                spread REAL,
                mid_price REAL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                UNIQUE(symbol, venue, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_symbol_venue_ts \
             ON price_snapshots(symbol, venue, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON price_snapshots(timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a snapshot; an existing `(symbol, venue, timestamp)` is a no-op
    pub async fn insert(&self, snapshot: &PriceSnapshot) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO price_snapshots
                (symbol, venue, timestamp, best_ask, best_bid, spread, mid_price)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, venue, timestamp) DO NOTHING
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(&snapshot.venue)
        .bind(snapshot.timestamp)
        .bind(snapshot.best_ask)
        .bind(snapshot.best_bid)
        .bind(snapshot.spread)
        .bind(snapshot.mid_price)
        .execute(&self.pool)
        .await?;

        let outcome = if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        };

        debug!(
            symbol = %snapshot.symbol,
            venue = %snapshot.venue,
            timestamp = snapshot.timestamp,
            outcome = ?outcome,
            "Stored price snapshot"
        );
        Ok(outcome)
    }

    /// Snapshots matching every given filter, ascending by timestamp
    pub async fn query(&self, filter: &SnapshotQuery) -> Result<Vec<PriceSnapshot>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM price_snapshots WHERE 1=1",
            SNAPSHOT_COLUMNS
        ));

        if let Some(symbol) = &filter.symbol {
            builder.push(" AND symbol = ").push_bind(symbol.clone());
        }
        if let Some(venue) = &filter.venue {
            builder.push(" AND venue = ").push_bind(venue.clone());
        }
        if let Some(from) = filter.from {
            builder.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND timestamp <= ").push_bind(to);
        }

        builder.push(" ORDER BY timestamp ASC, id ASC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// Most recent snapshot for a symbol, optionally on one venue
    pub async fn latest(&self, symbol: &str, venue: Option<&str>) -> Result<Option<PriceSnapshot>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM price_snapshots WHERE symbol = ",
            SNAPSHOT_COLUMNS
        ));
        builder.push_bind(symbol.to_string());
        if let Some(venue) = venue {
            builder.push(" AND venue = ").push_bind(venue.to_string());
        }
        builder.push(" ORDER BY timestamp DESC, id DESC LIMIT 1");

        let row = builder.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// Ask-price candles for a symbol across all venues
    pub async fn candles(
        &self,
        symbol: &str,
        bucket_minutes: u32,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<Candle>> {
        if bucket_minutes == 0 {
            return Err(MarketDataError::InvalidRequest(
                "bucket width must be at least one minute".to_string(),
            ));
        }

        let snapshots = self
            .query(&SnapshotQuery {
                symbol: Some(symbol.to_string()),
                from,
                to,
                ..Default::default()
            })
            .await?;

        Ok(build_candles(&snapshots, candles::minutes_to_ms(bucket_minutes)))
    }

    /// Delete rows older than `retention_days` before now
    pub async fn purge(&self, retention_days: u32) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp_millis() - i64::from(retention_days) * DAY_MS;
        self.purge_before(cutoff).await
    }

    /// Delete rows with `timestamp < cutoff`
    pub async fn purge_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_snapshots WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        info!(deleted, cutoff, "Purged old snapshots");
        Ok(deleted)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<PriceSnapshot> {
    Ok(PriceSnapshot {
        symbol: row.try_get("symbol")?,
        venue: row.try_get("venue")?,
        timestamp: row.try_get("timestamp")?,
        best_ask: row.try_get("best_ask")?,
        best_bid: row.try_get("best_bid")?,
        spread: row.try_get("spread")?,
        mid_price: row.try_get("mid_price")?,
    })
}

/// Purge expired snapshots every `period`, forever
pub async fn run_retention(store: Arc<SnapshotStore>, retention_days: u32, period: Duration) {
    info!(retention_days, period_secs = period.as_secs(), "Starting snapshot retention");

    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if let Err(e) = store.purge(retention_days).await {
            error!(error = %e, "Snapshot purge failed");
        }
    }
}
