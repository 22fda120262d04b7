//! Error types for whereabouts.
//!
//! Lookups never surface these to their callers; they are absorbed into
//! cache metadata. They do flow through persistence, configuration and the
//! outer surfaces (API, CLI).

use thiserror::Error;

/// Result type alias using `WhereaboutsError`.
pub type Result<T> = std::result::Result<T, WhereaboutsError>;

/// Main error type for all whereabouts operations.
#[derive(Debug, Error)]
pub enum WhereaboutsError {
    // ═══════════════════════════════════════════════════════════════════════════
    // REMOTE API ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Session credentials have not been captured yet.
    #[error("Session not ready: {0}")]
    NotReady(String),

    /// The remote API is throttling us.
    #[error("Rate limited until {reset_at:?}")]
    RateLimited {
        /// Epoch seconds at which the throttle lifts, if known.
        reset_at: Option<i64>,
    },

    /// HTTP request failed or returned a non-success status.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The response could not be interpreted.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Persistent store rejected a load or save.
    #[error("Store error: {0}")]
    StoreError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WhereaboutsError {
    /// Returns true if a later request for the same key may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WhereaboutsError::NotReady(_)
                | WhereaboutsError::RateLimited { .. }
                | WhereaboutsError::HttpError(_)
        )
    }

    /// Returns true if this is a throttling signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, WhereaboutsError::RateLimited { .. })
    }
}
