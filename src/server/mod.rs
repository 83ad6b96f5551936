//! HTTP and WebSocket surface

mod routes;
mod ws;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::error::MarketDataError;
use crate::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/ws/prices", get(ws::prices))
        .route("/ws/trades", get(ws::trades))
        .route("/chart/:coin", get(routes::chart))
        .route("/order-books", get(routes::order_book))
        .route("/aggregate-order-books", get(routes::aggregate_order_books))
        .route(
            "/snapshots",
            get(routes::list_snapshots).post(routes::create_snapshot),
        )
        .route("/snapshots/latest", get(routes::latest_snapshot))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response with `{success: false, detail}` body
#[derive(Debug)]
pub struct ApiError(pub MarketDataError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MarketDataError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            MarketDataError::VenueUnavailable { .. }
            | MarketDataError::NoVenuesAvailable { .. }
            | MarketDataError::MalformedPayload(_)
            | MarketDataError::RestApiError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MarketDataError> for ApiError {
    fn from(err: MarketDataError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, status = %status, "Request failed");
        }

        let body = Json(serde_json::json!({
            "success": false,
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
