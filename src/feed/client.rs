//! WebSocket client for the upstream trade stream
//!
//! Handles connection, per-symbol subscription, and message reception.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MarketDataError, Result};
use crate::parser::SubscribeRequest;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single trade stream connection
pub struct TradeStreamClient {
    stream: Option<WsStream>,
    endpoint: String,
}

impl TradeStreamClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
        }
    }

    /// Open the connection
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.endpoint, "Connecting to trade stream");

        let (ws_stream, response) = connect_async(self.endpoint.as_str()).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "Trade stream connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Send one trades subscription per symbol
    pub async fn subscribe(&mut self, symbols: &[String]) -> Result<()> {
        let stream = self.stream_mut()?;

        for symbol in symbols {
            let request = serde_json::to_string(&SubscribeRequest::trades(symbol))?;
            stream
                .send(Message::Text(request))
                .await
                .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;
            info!(symbol = %symbol, "Subscribed to trades");
        }

        Ok(())
    }

    /// Receive the next text payload; `None` for control frames
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self.stream_mut()?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => Ok(Some(String::from_utf8_lossy(&data).to_string())),
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                let _ = stream.send(Message::Pong(data)).await;
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MarketDataError::FeedDisconnected("Connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "Trade stream error");
                self.stream = None;
                Err(MarketDataError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("Trade stream ended");
                self.stream = None;
                Err(MarketDataError::FeedDisconnected("Stream ended".to_string()))
            }
        }
    }

    /// Send a ping to keep the connection alive
    pub async fn ping(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Ping(vec![]))
                .await
                .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;
        }
        Ok(())
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }

    fn stream_mut(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| MarketDataError::FeedDisconnected("Not connected".to_string()))
    }
}
