//! Domain types: the looked-up payload, cache entries and fetch outcomes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalizes a lookup key.
///
/// Keys are case-insensitive handles; surrounding whitespace is ignored.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYLOAD
// ═══════════════════════════════════════════════════════════════════════════════

/// Location metadata published by an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLocation {
    /// Declared country or region the account is based in.
    pub account_based_in: Option<String>,
    /// Where the account connects from, e.g. "Germany App Store".
    pub connected_via: Option<String>,
    /// Account creation time as reported by the remote API.
    pub created_at: Option<String>,
}

/// Client platform inferred from the connection origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Apple App Store / iOS.
    AppStore,
    /// Google Play / Android.
    PlayStore,
    /// Anything else, usually the web client.
    Web,
}

impl AccountLocation {
    /// Returns true if no field carries information.
    pub fn is_empty(&self) -> bool {
        self.account_based_in.is_none() && self.connected_via.is_none() && self.created_at.is_none()
    }

    /// Classifies the platform from `connected_via`.
    pub fn connection_platform(&self) -> Option<Platform> {
        let via = self.connected_via.as_deref()?.to_lowercase();

        if via.contains("app store") || via.contains("ios") {
            Some(Platform::AppStore)
        } else if via.contains("android") || via.contains("play store") || via.contains("google play") {
            Some(Platform::PlayStore)
        } else {
            Some(Platform::Web)
        }
    }

    /// Extracts the country part of `connected_via`.
    ///
    /// "Germany App Store" becomes "germany". Returns `None` for web clients.
    pub fn connection_country(&self) -> Option<String> {
        let lowered = self.connected_via.as_deref()?.trim().to_lowercase();
        let country = ["appstore", "playstore", "googleplay"]
            .into_iter()
            .find_map(|suffix| strip_store_suffix(&lowered, suffix))
            .unwrap_or(&lowered)
            .trim();
        if country.is_empty() || country == "web" || country == "browser" {
            None
        } else {
            Some(country.to_string())
        }
    }
}

/// Strips `suffix` from the end of `text`, ignoring whitespace in `text`.
///
/// `suffix` is given without spaces, so "appstore" matches "App Store",
/// "AppStore" and "App  Store" alike.
fn strip_store_suffix<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let mut wanted = suffix.chars().rev().peekable();
    let mut cut = text.len();

    for (idx, c) in text.char_indices().rev() {
        let Some(&expected) = wanted.peek() else {
            break;
        };
        if c.is_whitespace() {
            continue;
        }
        if c != expected {
            return None;
        }
        wanted.next();
        cut = idx;
    }

    wanted.peek().is_none().then(|| text[..cut].trim_end())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// A cached lookup result.
///
/// Entries are immutable once written and replaced wholesale on refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized key.
    pub key: String,
    /// Looked-up payload; `None` when the account has nothing to report or the lookup failed.
    pub value: Option<AccountLocation>,
    /// Whether the entry records a failed or throttled lookup.
    pub is_error: bool,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(key: &str, value: Option<AccountLocation>, is_error: bool) -> Self {
        Self::with_timestamp(key, value, is_error, Utc::now())
    }

    /// Creates an entry with an explicit creation time.
    pub fn with_timestamp(
        key: &str,
        value: Option<AccountLocation>,
        is_error: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            key: normalize_key(key),
            value,
            is_error,
            timestamp,
        }
    }

    /// Age of the entry at `now`. Entries stamped in the future have zero age.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FETCH OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single remote fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The call succeeded. `None` means the response carried no usable payload.
    Success(Option<AccountLocation>),
    /// The remote API throttled the call.
    RateLimited {
        /// When the throttle lifts, if the API said so.
        reset_at: Option<DateTime<Utc>>,
    },
    /// Transport, HTTP or session failure.
    Failure(String),
}

impl FetchOutcome {
    /// Whether the outcome should be cached with the short error TTL.
    pub fn is_error(&self) -> bool {
        !matches!(self, FetchOutcome::Success(_))
    }

    /// The value handed to waiters.
    pub fn value(&self) -> Option<AccountLocation> {
        match self {
            FetchOutcome::Success(value) => value.clone(),
            _ => None,
        }
    }
}
