//! Route definitions for the AvatarForge HTTP API.
//!
//! The router receives `AppState` and passes it to all handlers via Axum's
//! `State` extractor.

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the upload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the complete Axum router with all routes and middleware.
///
/// Receives the fully-constructed `AppState` and threads it through
/// every route via `.with_state(state)`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = (state.config.server.max_upload_bytes as usize)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    Router::new()
        .merge(info_routes())
        .merge(convert_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::compression::build_compression_layer())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors::build_cors_layer(&state.config.server.cors))
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Service description and health endpoints
fn info_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::health::service_info))
        .route("/health", get(handlers::health::health))
}

/// Conversion endpoints
fn convert_routes() -> Router<AppState> {
    Router::new()
        .route("/convert", post(handlers::convert::convert_upload))
        .route("/convert-mml", post(handlers::convert::convert_mml))
        .route("/convert-url", get(handlers::convert::convert_url))
}
