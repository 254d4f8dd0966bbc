//! Control API (C14, SPEC_FULL §2 [ADD], §6 [ADD]).
//!
//! `axum` router wiring every control endpoint over a shared
//! `Arc<Orchestrator>`, plus the event-bus WebSocket upgrade. Grounded
//! in the teacher's `api` module + `main.rs` router assembly:
//! `tower_http::cors::CorsLayer` for dashboard access,
//! `middleware::rate_limit` ahead of the control surface, and
//! `middleware::logging`-style per-request spans.

pub mod routes;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware as axum_middleware, routing::{get, post}, Router};
use tower_http::cors::CorsLayer;

use crate::middleware::{rate_limit::rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer};
use crate::orchestrator::Orchestrator;

/// Builds the full router: control endpoints, the WebSocket upgrade,
/// and the ambient `/health` liveness probe, layered with CORS, rate
/// limiting, and request logging.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let rate_limiter = RateLimitLayer::new(RateLimitConfig {
        max_requests: 120,
        window: Duration::from_secs(60),
        burst: 30,
    });

    let control = Router::new()
        .route("/live/stats", get(routes::live_stats))
        .route("/sim/stats", get(routes::sim_stats))
        .route("/sim/start", post(routes::sim_start))
        .route("/sim/stop", post(routes::sim_stop))
        .route("/sim/clear", post(routes::sim_clear))
        .route("/detections", get(routes::list_detections))
        .route("/sim/emergencies", get(routes::top_emergencies))
        .route_layer(axum_middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    Router::new()
        .merge(control)
        .route("/events", get(ws::events_handler))
        .route("/health", get(routes::health))
        .layer(axum_middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

/// Default bind address fallback for callers that construct the
/// listener directly instead of going through `DetectorConfig`.
pub fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}
