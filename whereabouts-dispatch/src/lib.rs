//! # Whereabouts Dispatch
//!
//! Turns individual lookups into a deduplicated, bounded stream of fetches.
//!
//! - At most one fetch per key is queued or in flight; later callers wait on it.
//! - Fetches leave a FIFO queue under a concurrency ceiling, only while the
//!   session is ready.
//! - Throttled fetches drive a dismissable countdown notification.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use whereabouts_dispatch::{Collaborators, Coordinator};
//!
//! let coordinator = Coordinator::new(config, Collaborators::new(Arc::new(client))).await?;
//! let location = coordinator.lookup("alice").await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod coalescer;
mod coordinator;
mod dispatcher;
mod notifier;
mod ratelimit;
mod readiness;

pub use coalescer::{Coalescer, PendingRequest, Waiter};
pub use coordinator::{Collaborators, Coordinator};
pub use dispatcher::{DispatchStats, Dispatcher, QueueItem};
pub use notifier::LogNotifier;
pub use ratelimit::{
    format_countdown, Effect, RateLimitMachine, RateLimitMonitor, RateLimitState, RateLimitStatus,
};
pub use readiness::SessionGate;
