//! App state: coordinator and server config.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use whereabouts_cache::{FileStore, MemoryStore};
use whereabouts_client::AboutClient;
use whereabouts_core::config::WhereaboutsConfig;
use whereabouts_core::error::Result;
use whereabouts_core::traits::{Notifier, PersistentStore};
use whereabouts_dispatch::{Collaborators, Coordinator};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_BATCH_KEYS: usize = 100;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Listen address
    pub bind: IpAddr,
    /// Listen port
    pub port: u16,
    /// Largest accepted batch lookup
    pub max_batch_keys: usize,
    /// Cache file; memory-only when unset
    pub cache_path: Option<PathBuf>,
    /// Lookup pipeline settings
    pub lookup: WhereaboutsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_batch_keys: DEFAULT_MAX_BATCH_KEYS,
            cache_path: None,
            lookup: WhereaboutsConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Reads `WHEREABOUTS_*` variables, after loading `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            bind: std::env::var("WHEREABOUTS_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind),
            port: std::env::var("WHEREABOUTS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            max_batch_keys: std::env::var("WHEREABOUTS_MAX_BATCH_KEYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_batch_keys),
            cache_path: std::env::var("WHEREABOUTS_CACHE_PATH").ok().map(PathBuf::from),
            lookup: WhereaboutsConfig::from_env(),
        }
    }

    /// Socket address to listen on.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Shared handler state.
pub struct AppState {
    /// Server configuration
    pub config: ApiConfig,
    /// Lookup pipeline
    pub coordinator: Coordinator,
    /// Process start, for uptime reporting
    pub started: Instant,
}

impl AppState {
    /// Wraps an existing coordinator.
    pub fn new(config: ApiConfig, coordinator: Coordinator) -> Self {
        Self {
            config,
            coordinator,
            started: Instant::now(),
        }
    }

    /// Builds the HTTP client, store and coordinator described by `config`.
    pub async fn from_config(config: ApiConfig, notifier: Arc<dyn Notifier>) -> Result<Arc<Self>> {
        let coordinator = build_coordinator(&config.lookup, config.cache_path.as_deref(), notifier).await?;
        Ok(Arc::new(Self::new(config, coordinator)))
    }
}

/// Wires an [`AboutClient`] and a file or memory store into a [`Coordinator`].
///
/// The client doubles as the readiness gate: dispatch waits until it holds
/// credentials.
pub async fn build_coordinator(
    config: &WhereaboutsConfig,
    cache_path: Option<&Path>,
    notifier: Arc<dyn Notifier>,
) -> Result<Coordinator> {
    let client = Arc::new(AboutClient::with_config(config.client.clone())?);
    coordinator_with_client(config, client, cache_path, notifier).await
}

/// Builds a [`Coordinator`] around an existing client.
///
/// Lookups queue until `client` holds credentials; installing them later with
/// [`AboutClient::set_credentials`] releases the queue.
pub async fn coordinator_with_client(
    config: &WhereaboutsConfig,
    client: Arc<AboutClient>,
    cache_path: Option<&Path>,
    notifier: Arc<dyn Notifier>,
) -> Result<Coordinator> {
    let store: Arc<dyn PersistentStore> = match cache_path {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let parts = Collaborators::new(client.clone())
        .with_readiness(client)
        .with_store(store)
        .with_notifier(notifier);

    Coordinator::new(config.clone(), parts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use whereabouts_client::Credentials;
    use whereabouts_core::config::ClientConfig;
    use whereabouts_dispatch::LogNotifier;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const QUERY_PATH: &str = "/i/api/graphql/XRqGa7EeokUU5kppkh13EA/AboutAccountQuery";

    #[tokio::test]
    async fn test_lookup_queued_until_credentials_arrive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_PATH))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "user_result_by_screen_name": { "result": { "about_profile": {
                    "account_based_in": "Kenya",
                    "source": "Kenya Play Store"
                }}}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = WhereaboutsConfig::default();
        config.client = ClientConfig {
            min_request_interval_ms: 0,
            timeout_seconds: 5,
            ..ClientConfig::new(server.uri())
        };
        let client = Arc::new(AboutClient::with_config(config.client.clone()).unwrap());
        let coordinator = coordinator_with_client(&config, client.clone(), None, Arc::new(LogNotifier))
            .await
            .unwrap();

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.lookup("alice").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.dispatch_stats().queued, 1);

        client.set_credentials(Credentials::new("token", "csrf"));

        let location = tokio::time::timeout(Duration::from_secs(3), pending)
            .await
            .expect("lookup should finish once credentials are installed")
            .unwrap()
            .expect("profile should be returned");
        assert_eq!(location.account_based_in.as_deref(), Some("Kenya"));
        assert_eq!(coordinator.dispatch_stats().queued, 0);
    }
}
