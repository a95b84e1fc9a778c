//! Push API: `/health` and `/ws`, serving this crate's WebSocket broadcast
//! instead of a REST query surface.

mod websocket;

pub use websocket::websocket_handler;

use std::sync::Arc;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::ApiConfig;
use crate::dispatch::websocket::WebSocketBroadcaster;
use crate::supervisor::Supervisor;

/// Shared state for the axum router: the broadcaster feeds `/ws`, the
/// Supervisor feeds `/health`'s per-marketplace SeenSet diagnostics.
#[derive(Clone)]
pub struct ApiState {
    pub websocket: WebSocketBroadcaster,
    pub supervisor: Arc<Supervisor>,
}

/// Starts the push API and returns its serving task's `JoinHandle`.
pub async fn start_server(state: ApiState, config: &ApiConfig) -> Result<tokio::task::JoinHandle<()>> {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("push API listening on {}", config.bind_address);

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!("push API server error: {}", err);
        }
    });

    Ok(handle)
}

async fn health_handler(axum::extract::State(state): axum::extract::State<ApiState>) -> Json<Value> {
    use crate::core::types::Marketplace;

    let mut marketplaces = Vec::new();
    for marketplace in Marketplace::ALL {
        let seen_count = match state.supervisor.seen_set_len(marketplace) {
            Some(seen_set) => seen_set.len().await,
            None => 0,
        };
        marketplaces.push(json!({
            "marketplace": marketplace.as_key(),
            "enabled": state.supervisor.is_enabled(marketplace),
            "seen_count": seen_count,
        }));
    }

    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp(),
        "service": "giftwatch",
        "marketplaces": marketplaces,
    }))
}
