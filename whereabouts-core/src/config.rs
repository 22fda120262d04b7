//! Configuration for cache, dispatcher and remote client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, WhereaboutsError};

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window for successful lookups, in seconds
    pub success_ttl_seconds: u64,
    /// Freshness window for failed lookups, in seconds
    pub error_ttl_seconds: u64,
    /// Maximum number of entries
    pub max_entries: usize,
    /// Flush debounce window in milliseconds
    pub flush_debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl_seconds: DEFAULT_SUCCESS_TTL_SECS,
            error_ttl_seconds: DEFAULT_ERROR_TTL_SECS,
            max_entries: DEFAULT_MAX_CACHE_ENTRIES,
            flush_debounce_ms: DEFAULT_FLUSH_DEBOUNCE_MS,
        }
    }
}

impl CacheConfig {
    /// TTL applied to an entry.
    pub fn ttl(&self, is_error: bool) -> Duration {
        if is_error {
            Duration::from_secs(self.error_ttl_seconds)
        } else {
            Duration::from_secs(self.success_ttl_seconds)
        }
    }

    /// Flush debounce window.
    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }
}

/// Dispatcher configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum simultaneously outstanding fetches
    pub max_concurrent: usize,
    /// Countdown horizon when the API omits a reset time, in seconds
    pub rate_limit_fallback_seconds: u64,
    /// Countdown refresh interval in milliseconds
    pub countdown_tick_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit_fallback_seconds: DEFAULT_RATE_LIMIT_FALLBACK_SECS,
            countdown_tick_ms: DEFAULT_COUNTDOWN_TICK_MS,
        }
    }
}

impl DispatchConfig {
    /// Fallback rate-limit horizon.
    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_secs(self.rate_limit_fallback_seconds)
    }

    /// Countdown tick interval.
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

/// Remote API client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API origin, e.g. "https://x.com"
    pub base_url: String,
    /// GraphQL persisted query id
    pub query_id: String,
    /// Bearer token sent in the authorization header
    pub bearer_token: Option<String>,
    /// CSRF token (the `ct0` cookie value)
    pub csrf_token: Option<String>,
    /// Minimum spacing between network calls in milliseconds
    pub min_request_interval_ms: u64,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            query_id: DEFAULT_QUERY_ID.into(),
            bearer_token: None,
            csrf_token: None,
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
            timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Creates a config pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Adds session credentials.
    pub fn with_credentials(
        mut self,
        bearer_token: impl Into<String>,
        csrf_token: impl Into<String>,
    ) -> Self {
        self.bearer_token = Some(bearer_token.into());
        self.csrf_token = Some(csrf_token.into());
        self
    }

    /// Minimum interval between network calls.
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhereaboutsConfig {
    /// Cache settings
    pub cache: CacheConfig,
    /// Dispatcher settings
    pub dispatch: DispatchConfig,
    /// Remote API settings
    pub client: ClientConfig,
}

impl WhereaboutsConfig {
    /// Loads configuration from `WHEREABOUTS_*` environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            cache: CacheConfig {
                success_ttl_seconds: env_or("WHEREABOUTS_SUCCESS_TTL_SECS", defaults.cache.success_ttl_seconds),
                error_ttl_seconds: env_or("WHEREABOUTS_ERROR_TTL_SECS", defaults.cache.error_ttl_seconds),
                max_entries: env_or("WHEREABOUTS_MAX_CACHE_ENTRIES", defaults.cache.max_entries),
                flush_debounce_ms: env_or("WHEREABOUTS_FLUSH_DEBOUNCE_MS", defaults.cache.flush_debounce_ms),
            },
            dispatch: DispatchConfig {
                max_concurrent: env_or("WHEREABOUTS_MAX_CONCURRENT", defaults.dispatch.max_concurrent),
                rate_limit_fallback_seconds: env_or(
                    "WHEREABOUTS_RATE_LIMIT_FALLBACK_SECS",
                    defaults.dispatch.rate_limit_fallback_seconds,
                ),
                countdown_tick_ms: env_or("WHEREABOUTS_COUNTDOWN_TICK_MS", defaults.dispatch.countdown_tick_ms),
            },
            client: ClientConfig {
                base_url: std::env::var("WHEREABOUTS_BASE_URL").unwrap_or(defaults.client.base_url),
                query_id: std::env::var("WHEREABOUTS_QUERY_ID").unwrap_or(defaults.client.query_id),
                bearer_token: std::env::var("WHEREABOUTS_BEARER_TOKEN").ok(),
                csrf_token: std::env::var("WHEREABOUTS_CSRF_TOKEN").ok(),
                min_request_interval_ms: env_or(
                    "WHEREABOUTS_MIN_REQUEST_INTERVAL_MS",
                    defaults.client.min_request_interval_ms,
                ),
                timeout_seconds: env_or("WHEREABOUTS_TIMEOUT_SECS", defaults.client.timeout_seconds),
            },
        }
    }

    /// Rejects configurations the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_concurrent == 0 {
            return Err(WhereaboutsError::ConfigError("max_concurrent must be at least 1".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(WhereaboutsError::ConfigError("max_entries must be at least 1".into()));
        }
        if self.cache.error_ttl_seconds > self.cache.success_ttl_seconds {
            return Err(WhereaboutsError::ConfigError(format!(
                "error TTL ({}s) must not exceed success TTL ({}s)",
                self.cache.error_ttl_seconds, self.cache.success_ttl_seconds
            )));
        }
        if self.client.base_url.trim().is_empty() {
            return Err(WhereaboutsError::ConfigError("base_url must not be empty".into()));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
