//! Admin listener: health and Prometheus metrics
//!
//! Runs on its own port (default 127.0.0.1:9090); nothing here is reachable
//! through Telegram.
//!
//! Endpoints:
//! - GET /health   JSON status, 503 when no Gemini key is bound
//! - GET /metrics  Prometheus text exposition

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use key_pool::CompletionClient;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::service::{BotHandle, ServiceMetrics};

/// Shared state for admin handlers
#[derive(Clone)]
pub struct AppState {
    pub metrics: ServiceMetrics,
    pub completions: Arc<CompletionClient>,
    pub bot: BotHandle,
    pub prometheus: PrometheusHandle,
}

/// Build the admin router.
///
/// The concurrency limit queues excess requests rather than rejecting them.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Returns 200 while a Gemini key is bound, 503 "degraded" otherwise. The bot
/// keeps serving menus while degraded; only AI answers fall back to the
/// unavailable placeholder.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let key_info = state.completions.key_info();
    let status_code = if key_info.has_model {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if key_info.has_model { "healthy" } else { "degraded" },
        "bot_username": state.bot.username,
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "updates_handled": state.metrics.updates_total.load(Ordering::Relaxed),
        "updates_in_flight": state.metrics.in_flight.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "credentials": key_info,
    });

    (
        status_code,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
