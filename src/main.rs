//! NBBO Market Data - service entry point
//!
//! Wires the venue poller, trade feed, heartbeat and retention tasks around
//! one shared state and serves the HTTP/WebSocket surface.

use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nbbo_market_data::{
    config::Config,
    feed::{run_heartbeat, FixedDelay, TradeFeedManager, TradeProcessor, TradeStreamClient},
    hub::PriceBroadcaster,
    server,
    storage::{run_retention, SnapshotStore},
    venue::{OrderBookSource, VenueClient},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting NBBO market data service");
    info!(
        venues = ?config.venue_symbols,
        trades = ?config.trade_symbols,
        "Configuration loaded"
    );

    let store = SnapshotStore::connect(&config.database_url).await?;
    let venues: Arc<dyn OrderBookSource> = Arc::new(VenueClient::new(&config)?);
    let state = Arc::new(AppState::new(config, venues, store)?);
    let config = state.config.clone();

    state.latest_trades.write().await.reset();

    let broadcaster = PriceBroadcaster::new(
        state.venues.clone(),
        config.venue_symbols.clone(),
        state.engine.clone(),
        state.price_subscribers.clone(),
        state.metrics.clone(),
        config.poll_interval(),
    );
    tokio::spawn(broadcaster.run());

    let processor = TradeProcessor::new(
        &config.trade_symbols,
        state.latest_trades.clone(),
        state.trade_subscribers.clone(),
        state.metrics.clone(),
    );
    let mut feed = TradeFeedManager::new(
        TradeStreamClient::new(&config.ws_endpoint),
        processor,
        Box::new(FixedDelay::new(config.reconnect_delay())),
        config.trade_symbols.clone(),
        state.metrics.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = feed.run().await {
            error!(error = %e, "Trade feed stopped");
        }
    });

    tokio::spawn(run_heartbeat(
        state.latest_trades.clone(),
        state.trade_subscribers.clone(),
        config.heartbeat_interval(),
    ));

    tokio::spawn(run_retention(
        state.store.clone(),
        config.retention_days,
        config.purge_interval(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Starting HTTP server");

    let shutdown_state = state.clone();
    axum::serve(listener, server::router(state.clone()))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open streams only end once their queues are closed
            let drained = shutdown_state.drain_subscribers().await;
            info!(drained, "Subscribers drained");
        })
        .await?;

    state.store.close().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
