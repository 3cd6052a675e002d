//! Scrape endpoint.
//!
//! Serves the registry in the Prometheus text format on `/metrics`, plus a
//! JSON health check.

use super::Bridge;
use crate::core::{BridgeError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Scrape server state.
#[derive(Clone)]
pub struct HttpState {
    /// Pipeline whose registry is served
    pub bridge: Bridge,
}

/// Create the scrape router.
pub fn create_http_router(bridge: Bridge) -> Router {
    let state = HttpState { bridge };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .route("/", get(root_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve scrapes until the listener fails.
pub async fn serve(listener: TcpListener, bridge: Bridge) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Serving metrics on http://{}/metrics", addr);

    axum::serve(listener, create_http_router(bridge))
        .await
        .map_err(|e| BridgeError::network(format!("HTTP server error: {}", e)))
}

async fn metrics_handler(State(state): State<HttpState>) -> std::result::Result<Response, HttpError> {
    let registry = state.bridge.registry();
    let body = registry.render().map_err(|e| {
        tracing::error!("Failed to render metrics: {}", e);
        HttpError::Internal(e.to_string())
    })?;

    Ok(([(header::CONTENT_TYPE, registry.content_type())], body).into_response())
}

async fn health_check(State(state): State<HttpState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rules": state.bridge.engine().len(),
        "messages": state.bridge.metrics().messages_total(),
    }))
}

async fn root_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        concat!(
            "<html><head><title>Heka Exporter</title></head><body>",
            "<h1>Heka Exporter</h1>",
            "<p><a href=\"/metrics\">Metrics</a></p>",
            "</body></html>"
        ),
    )
}

/// Scrape endpoint error
#[derive(Debug)]
pub enum HttpError {
    /// Encoding the registry failed
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
