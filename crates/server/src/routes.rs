//! Route configuration.

use crate::handlers;
use crate::metrics::{metrics_handler, track_requests};
use crate::state::AppState;
use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/origin", get(handlers::get_origin))
        .route(
            "/tags/{tag}",
            get(handlers::get_tag)
                .head(handlers::has_tag)
                .put(handlers::put_tag),
        )
        .route("/tags/{tag}/replicate", post(handlers::replicate))
        .route(
            "/tags/{tag}/duplicate-replicate",
            post(handlers::duplicate_replicate),
        );

    // Restrict /metrics to scrapers at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let timeout = state.config.server.request_timeout();
    router
        .layer(middleware::from_fn(track_requests))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
