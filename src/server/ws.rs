//! Streaming price and trade channels

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::hub::{SubscriberSet, Subscription, TradeFrame};
use crate::AppState;

pub async fn prices(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let subscription = state.price_subscribers.subscribe().await;
        stream_channel(socket, state.price_subscribers.clone(), subscription).await
    })
}

/// Trade channel; the current global latest trade is sent first, if any
pub async fn trades(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let subscription = admit_trade_subscriber(&state).await;
        stream_channel(socket, state.trade_subscribers.clone(), subscription).await
    })
}

/// Subscribe to the trade channel, then queue the cached global latest trade
///
/// Subscribing before the cache read means a trade recorded in between is
/// either in the initial frame or broadcast to the new queue, never lost.
pub(crate) async fn admit_trade_subscriber(state: &AppState) -> Subscription {
    let subscription = state.trade_subscribers.subscribe().await;

    let initial = state
        .latest_trades
        .read()
        .await
        .global()
        .map(TradeFrame::for_trade);

    if let Some(frame) = initial {
        match serde_json::to_string(&frame) {
            Ok(text) => {
                state.trade_subscribers.send_to(subscription.id, text).await;
            }
            Err(e) => warn!(error = %e, "Failed to encode initial trade frame"),
        }
    }

    subscription
}

/// Forward queued frames to the socket until either side goes away
async fn stream_channel(socket: WebSocket, subscribers: Arc<SubscriberSet>, subscription: Subscription) {
    let Subscription { id, mut receiver } = subscription;
    let (mut sender, mut incoming) = socket.split();

    loop {
        tokio::select! {
            outbound = receiver.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        debug!(channel = subscribers.channel(), id, error = %e, "Send failed, disconnecting");
                        break;
                    }
                }
                // Queue closed by a drain
                None => break,
            },
            inbound = incoming.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    subscribers.unsubscribe(id).await;
    let _ = sender.close().await;
}
