//! API route configuration.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Lookups
        .route("/api/v1/lookup", post(handlers::batch_lookup))
        .route("/api/v1/lookup/:key", get(handlers::lookup))

        // Cache
        .route("/api/v1/cache/stats", get(handlers::cache_stats))
        .route("/api/v1/cache/flush", post(handlers::flush_cache))

        // Dispatch and throttling
        .route("/api/v1/dispatch/stats", get(handlers::dispatch_stats))
        .route("/api/v1/rate-limit", get(handlers::rate_limit_status))
        .route("/api/v1/rate-limit/dismiss", post(handlers::dismiss_rate_limit))

        .with_state(state)
}
