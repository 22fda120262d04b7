//! API route handlers.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, info};

use whereabouts_cache::CacheStats;
use whereabouts_core::error::WhereaboutsError;
use whereabouts_core::types::normalize_key;
use whereabouts_dispatch::{DispatchStats, RateLimitStatus};

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: state.started.elapsed().as_secs(),
        cached_entries: state.coordinator.cache().len(),
        rate_limit: state.coordinator.rate_limit_status(),
    })
}

/// GET /api/v1/lookup/:key
pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<LookupResponse>> {
    let key = normalize_key(&key);
    if key.is_empty() {
        return Err(ApiError::bad_request("Key must not be empty"));
    }

    let location = state.coordinator.lookup(&key).await;
    debug!(key, found = location.is_some(), "Lookup served");
    Ok(Json(LookupResponse::new(key, location)))
}

/// POST /api/v1/lookup
pub async fn batch_lookup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchLookupRequest>,
) -> Result<Json<BatchLookupResponse>> {
    let keys = batch_keys(&req.keys, state.config.max_batch_keys)?;

    let lookups = keys.iter().map(|key| state.coordinator.lookup(key));
    let locations = futures::future::join_all(lookups).await;

    let results: Vec<LookupResponse> = keys
        .into_iter()
        .zip(locations)
        .map(|(key, location)| LookupResponse::new(key, location))
        .collect();
    let found = results.iter().filter(|r| r.found).count();

    info!(requested = results.len(), found, "Batch lookup served");
    Ok(Json(BatchLookupResponse { results, found }))
}

/// Normalizes and deduplicates batch keys, keeping first-seen order.
fn batch_keys(raw: &[String], max: usize) -> std::result::Result<Vec<String>, WhereaboutsError> {
    let mut seen = HashSet::new();
    let keys: Vec<String> = raw
        .iter()
        .map(|k| normalize_key(k))
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect();

    if keys.len() > max {
        return Err(WhereaboutsError::ValidationError(format!(
            "batch of {} keys exceeds the limit of {}",
            keys.len(),
            max
        )));
    }
    Ok(keys)
}

/// GET /api/v1/cache/stats
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.coordinator.cache().stats())
}

/// POST /api/v1/cache/flush
pub async fn flush_cache(State(state): State<Arc<AppState>>) -> Json<FlushResponse> {
    state.coordinator.flush().await;
    let entries = state.coordinator.cache().len();
    info!(entries, "Cache flushed on request");
    Json(FlushResponse { entries })
}

/// GET /api/v1/dispatch/stats
pub async fn dispatch_stats(State(state): State<Arc<AppState>>) -> Json<DispatchStats> {
    Json(state.coordinator.dispatch_stats())
}

/// GET /api/v1/rate-limit
pub async fn rate_limit_status(State(state): State<Arc<AppState>>) -> Json<RateLimitStatus> {
    Json(state.coordinator.rate_limit_status())
}

/// POST /api/v1/rate-limit/dismiss
pub async fn dismiss_rate_limit(State(state): State<Arc<AppState>>) -> Json<RateLimitStatus> {
    state.coordinator.dismiss_rate_limit();
    Json(state.coordinator.rate_limit_status())
}
