//! Router for the operational surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use super::middleware::{enforce_rate_limit, RateLimitState};
use crate::config::GateConfig;
use crate::ratelimit::{RateLimiter, StatsSnapshot};

/// Build the service router.
///
/// Every route except `/health` sits behind the limiter, including the
/// fallback, so unknown paths still count toward the `default` quota.
pub fn build_router(limiter: Arc<RateLimiter>, config: &GateConfig) -> Router {
    let rate_limit = RateLimitState::classified(limiter.clone())
        .trust_forwarded_headers(config.rate_limiting.trust_forwarded_headers);

    Router::new()
        .route(&config.server.stats_path, get(stats))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(rate_limit, enforce_rate_limit))
        .route("/health", get(health))
        .with_state(limiter)
}

async fn stats(State(limiter): State<Arc<RateLimiter>>) -> Json<StatsSnapshot> {
    Json(limiter.stats())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "error": {
                "code": "NOT_FOUND",
                "message": "No such route",
            }
        })),
    )
}
