//! Account location client.
//!
//! Calls the GraphQL about-account operation with captured session headers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

use whereabouts_core::config::ClientConfig;
use whereabouts_core::constants::{ABOUT_ACCOUNT_OPERATION, RATE_LIMIT_RESET_HEADER};
use whereabouts_core::error::{Result, WhereaboutsError};
use whereabouts_core::traits::{RemoteFetch, SessionReadiness};
use whereabouts_core::types::{AccountLocation, FetchOutcome};

use crate::pacer::Pacer;

/// Session headers required for authenticated calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Value of the authorization header, with or without the `Bearer ` prefix.
    pub authorization: String,
    /// CSRF token echoed in `x-csrf-token`.
    pub csrf_token: String,
    /// Additional `x-*` headers captured from the session.
    pub extra_headers: BTreeMap<String, String>,
}

impl Credentials {
    /// Creates credentials from a bearer token and CSRF token.
    pub fn new(authorization: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            authorization: authorization.into(),
            csrf_token: csrf_token.into(),
            extra_headers: BTreeMap::new(),
        }
    }

    /// Adds an extra header. Only `x-*` headers are kept.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        if name.starts_with("x-") {
            self.extra_headers.insert(name, value.into());
        }
        self
    }

    fn authorization_header(&self) -> String {
        if self.authorization.starts_with("Bearer ") {
            self.authorization.clone()
        } else {
            format!("Bearer {}", self.authorization)
        }
    }
}

/// HTTP implementation of [`RemoteFetch`].
///
/// Also acts as the session readiness signal: it is ready once credentials
/// have been installed.
pub struct AboutClient {
    config: ClientConfig,
    endpoint: Url,
    http_client: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
    /// Flips to true when credentials are first installed.
    ready: watch::Sender<bool>,
    pacer: Pacer,
}

impl AboutClient {
    /// Creates a client. Credentials from the config are installed if both are present.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.base_url)
            .and_then(|base| {
                base.join(&format!("/i/api/graphql/{}/{}", config.query_id, ABOUT_ACCOUNT_OPERATION))
            })
            .map_err(|e| WhereaboutsError::ConfigError(format!("invalid base_url: {}", e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| WhereaboutsError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        let credentials = match (&config.bearer_token, &config.csrf_token) {
            (Some(bearer), Some(csrf)) => Some(Credentials::new(bearer, csrf)),
            _ => None,
        };

        let (ready, _) = watch::channel(credentials.is_some());

        Ok(Self {
            pacer: Pacer::new(config.min_request_interval()),
            config,
            endpoint,
            http_client,
            credentials: RwLock::new(credentials),
            ready,
        })
    }

    /// Installs or replaces the session credentials.
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write() = Some(credentials);
        if !self.ready.send_replace(true) {
            info!("Session credentials installed, client ready");
        } else {
            debug!("Session credentials replaced");
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request_url(&self, screen_name: &str) -> Url {
        let variables = serde_json::json!({ "screenName": screen_name }).to_string();
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("variables", &variables);
        url
    }

    async fn fetch_unpaced(&self, screen_name: &str, credentials: &Credentials) -> FetchOutcome {
        let mut request = self
            .http_client
            .get(self.request_url(screen_name))
            .header("Accept", "*/*")
            .header("Content-Type", "application/json")
            .header("authorization", credentials.authorization_header())
            .header("x-csrf-token", &credentials.csrf_token);
        for (name, value) in &credentials.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(screen_name, error = %e, "Request failed");
                return FetchOutcome::Failure(e.to_string());
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = parse_reset_header(response.headers().get(RATE_LIMIT_RESET_HEADER));
            match reset_at {
                Some(reset) => warn!(screen_name, %reset, "Rate limited"),
                None => warn!(screen_name, "Rate limited, reset time unknown"),
            }
            return FetchOutcome::RateLimited { reset_at };
        }

        if !status.is_success() {
            warn!(screen_name, %status, "Unexpected status");
            return FetchOutcome::Failure(format!("HTTP {}", status.as_u16()));
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(screen_name, error = %e, "Invalid response body");
                return FetchOutcome::Failure(format!("invalid response body: {}", e));
            }
        };

        let location = extract_location(&body);
        debug!(screen_name, found = location.is_some(), "Fetched about profile");
        FetchOutcome::Success(location)
    }
}

#[async_trait]
impl RemoteFetch for AboutClient {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> FetchOutcome {
        let Some(credentials) = self.credentials.read().clone() else {
            return FetchOutcome::Failure("auth headers not ready".into());
        };

        self.pacer.run(self.fetch_unpaced(key, &credentials)).await
    }
}

#[async_trait]
impl SessionReadiness for AboutClient {
    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// Reads `x-rate-limit-reset` (epoch seconds).
fn parse_reset_header(value: Option<&reqwest::header::HeaderValue>) -> Option<DateTime<Utc>> {
    let secs: i64 = value?.to_str().ok()?.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Pulls the about-profile fields out of the GraphQL response.
///
/// Returns `None` when the profile is missing, which callers treat as an
/// empty but successful lookup.
fn extract_location(body: &serde_json::Value) -> Option<AccountLocation> {
    let profile = body.pointer("/data/user_result_by_screen_name/result/about_profile")?;
    if !profile.is_object() {
        return None;
    }

    let field = |name: &str| {
        profile
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(AccountLocation {
        account_based_in: field("account_based_in"),
        connected_via: field("source"),
        created_at: field("created_at"),
    })
}
