//! Notifier that reports the rate-limit countdown through tracing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use whereabouts_core::traits::Notifier;

use crate::ratelimit::format_countdown;

/// Logs countdown events instead of drawing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, reset_at: DateTime<Utc>) {
        let remaining = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        warn!(%reset_at, "Rate limited. Retry in {}", format_countdown(remaining));
    }

    fn hide(&self) {
        info!("Rate limit countdown hidden");
    }

    fn countdown(&self, remaining: Duration) {
        debug!(remaining = %format_countdown(remaining), "Rate limit countdown");
    }
}
