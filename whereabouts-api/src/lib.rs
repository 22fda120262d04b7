//! # Whereabouts API Server
//!
//! REST surface over the lookup coordinator.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness, cache size and rate-limit state
//! - `GET /api/v1/lookup/:key` - Resolve one key
//! - `POST /api/v1/lookup` - Resolve a batch of keys concurrently
//! - `GET /api/v1/cache/stats` - Cache statistics
//! - `POST /api/v1/cache/flush` - Persist the cache now
//! - `GET /api/v1/dispatch/stats` - Queue and concurrency statistics
//! - `GET /api/v1/rate-limit` - Rate-limit countdown state
//! - `POST /api/v1/rate-limit/dismiss` - Dismiss the countdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use whereabouts_api::{ApiConfig, ApiServer};
//!
//! let server = ApiServer::from_config(ApiConfig::from_env()).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod dto;
mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{build_coordinator, coordinator_with_client, ApiConfig, AppState};

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use whereabouts_core::error::Result;
use whereabouts_core::traits::Notifier;
use whereabouts_dispatch::LogNotifier;

/// API server for whereabouts lookups.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a server around prepared state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Builds the lookup pipeline from `config`, logging rate-limit notices.
    pub async fn from_config(config: ApiConfig) -> Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier)).await
    }

    /// Builds the lookup pipeline from `config` with a custom notifier.
    pub async fn with_notifier(config: ApiConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        Ok(Self::new(AppState::from_config(config, notifier).await?))
    }

    /// Creates the router with all routes configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves until Ctrl-C, then flushes the cache.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.state.config.addr();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Whereabouts API server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        self.state.coordinator.shutdown().await;
        Ok(())
    }
}
