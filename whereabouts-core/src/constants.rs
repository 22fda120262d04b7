//! Default limits and intervals.
//!
//! The remote API allows a small request budget per 15 minute window, so the
//! defaults lean towards caching aggressively and calling rarely.

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Freshness window for a successful lookup (24 hours).
pub const DEFAULT_SUCCESS_TTL_SECS: u64 = 24 * 60 * 60;

/// Freshness window for a failed or throttled lookup (30 minutes).
pub const DEFAULT_ERROR_TTL_SECS: u64 = 30 * 60;

/// Maximum number of cached keys before oldest-first eviction kicks in.
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 5000;

/// Writes within this window collapse into a single flush.
pub const DEFAULT_FLUSH_DEBOUNCE_MS: u64 = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of simultaneously outstanding remote fetches.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Countdown horizon used when the remote API omits a reset time (15 minutes).
pub const DEFAULT_RATE_LIMIT_FALLBACK_SECS: u64 = 15 * 60;

/// Countdown refresh interval.
pub const DEFAULT_COUNTDOWN_TICK_MS: u64 = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// REMOTE API
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum spacing between two network calls.
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 200;

/// HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default API origin.
pub const DEFAULT_BASE_URL: &str = "https://x.com";

/// GraphQL persisted query id of the about-account operation.
pub const DEFAULT_QUERY_ID: &str = "XRqGa7EeokUU5kppkh13EA";

/// GraphQL operation name.
pub const ABOUT_ACCOUNT_OPERATION: &str = "AboutAccountQuery";

/// Response header carrying the throttle reset time (epoch seconds).
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
