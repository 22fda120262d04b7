//! DTOs for API requests and responses.

use serde::{Deserialize, Serialize};
use whereabouts_core::types::{AccountLocation, Platform};
use whereabouts_dispatch::RateLimitStatus;

/// Location metadata with the derived origin fields.
#[derive(Debug, Serialize)]
pub struct LocationDto {
    /// Declared location
    pub account_based_in: Option<String>,
    /// Raw connection origin text
    pub connected_via: Option<String>,
    /// Account creation time as reported
    pub created_at: Option<String>,
    /// Classified connection platform
    pub platform: Option<Platform>,
    /// Country part of the connection origin
    pub connection_country: Option<String>,
}

impl From<AccountLocation> for LocationDto {
    fn from(location: AccountLocation) -> Self {
        Self {
            platform: location.connection_platform(),
            connection_country: location.connection_country(),
            account_based_in: location.account_based_in,
            connected_via: location.connected_via,
            created_at: location.created_at,
        }
    }
}

/// Result of a single lookup.
#[derive(Debug, Serialize)]
pub struct LookupResponse {
    /// Normalized key
    pub key: String,
    /// Whether metadata was found
    pub found: bool,
    /// The metadata, if found
    pub location: Option<LocationDto>,
}

impl LookupResponse {
    /// Builds a response for `key`.
    pub fn new(key: String, location: Option<AccountLocation>) -> Self {
        Self {
            key,
            found: location.is_some(),
            location: location.map(LocationDto::from),
        }
    }
}

/// Request to look up several keys at once.
#[derive(Debug, Deserialize)]
pub struct BatchLookupRequest {
    /// Keys to resolve
    pub keys: Vec<String>,
}

/// Response for a batch lookup.
#[derive(Debug, Serialize)]
pub struct BatchLookupResponse {
    /// One result per distinct key, in request order
    pub results: Vec<LookupResponse>,
    /// Number of results with metadata
    pub found: usize,
}

/// Response for a cache flush.
#[derive(Debug, Serialize)]
pub struct FlushResponse {
    /// Entries written to the store
    pub entries: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Entries in the lookup cache
    pub cached_entries: usize,
    /// Rate-limit state
    pub rate_limit: RateLimitStatus,
}
