//! HTTP and WebSocket endpoints using Axum.

use crate::counter::ConnectionCounter;
use crate::outbound::Outbound;
use crate::session::Session;
use crate::subscription::RelayConfig;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use broker_client::Broker;
use futures::StreamExt;
use metrics::counter;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared application state.
pub struct AppState {
    pub counter: Arc<ConnectionCounter>,
    pub broker: Arc<dyn Broker>,
    pub relay: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(broker: Arc<dyn Broker>, relay: RelayConfig) -> Self {
        Self {
            counter: Arc::new(ConnectionCounter::new()),
            broker,
            relay: Arc::new(relay),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active: u64,
}

/// Create the gateway router. Unmatched paths are served from `assets`
/// when given.
pub fn create_router(state: Arc<AppState>, assets: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/v1/subscribe", get(ws_handler))
        .route("/v1/stat", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let router = match assets {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Number of open client connections.
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        active: state.counter.read(),
    })
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_failed_upgrade(|e| {
                counter!("gateway_upgrade_failures_total").increment(1);
                warn!("Failed to upgrade request: {}", e);
            })
            .on_upgrade(move |socket| handle_socket(socket, state)),
        Err(rejection) => {
            counter!("gateway_upgrade_failures_total").increment(1);
            warn!("Failed to upgrade request: {}", rejection);
            rejection.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (ws_tx, ws_rx) = socket.split();

    let session = Session::open(
        Outbound::new(ws_tx),
        state.broker.clone(),
        state.relay.clone(),
        &state.counter,
    );
    session.run(ws_rx).await;
}
