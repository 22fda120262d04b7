//! # Whereabouts Core
//!
//! Core types, errors, and collaborator traits for the whereabouts lookup service.
//!
//! This crate provides the building blocks shared by every other whereabouts crate:
//!
//! - **Types**: the account location payload, cache entries and fetch outcomes
//! - **Errors**: a single error enum with classification helpers
//! - **Constants**: default TTLs, limits and intervals
//! - **Config**: serde-friendly configuration loaded from the environment
//! - **Traits**: the seams to the remote API, persistence, readiness and notification
//!
//! ## Example
//!
//! ```rust
//! use whereabouts_core::{normalize_key, AccountLocation};
//!
//! assert_eq!(normalize_key("  Alice "), "alice");
//! let loc = AccountLocation::default();
//! let json = serde_json::to_string(&loc).unwrap();
//! assert!(json.contains("account_based_in"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{CacheConfig, ClientConfig, DispatchConfig, WhereaboutsConfig};
pub use error::{Result, WhereaboutsError};
pub use traits::*;
pub use types::*;
