//! Rate-limit notification state machine.
//!
//! ```text
//!            throttle(T), T != dismissed
//!   Hidden ───────────────────────────────▶ Showing(T)
//!     ▲  ▲                                   │      │
//!     │  │ now >= T (marker cleared)         │      │ dismiss
//!     │  └───────────────────────────────────┘      ▼
//!     │         now >= T (marker cleared)      Dismissed(T)
//!     └─────────────────────────────────────────────┘
//! ```
//!
//! A throttle report carrying the dismissed reset time is suppressed; any
//! other reset time shows a fresh countdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use whereabouts_core::traits::Notifier;

/// Notifier state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitState {
    /// Nothing shown.
    Hidden,
    /// Countdown to the given reset time is visible.
    Showing(DateTime<Utc>),
    /// The user closed the countdown for this reset time.
    Dismissed(DateTime<Utc>),
}

/// Side effect requested by a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do.
    None,
    /// Show a countdown to the reset time, replacing any current one.
    Show(DateTime<Utc>),
    /// Remove the countdown.
    Hide,
    /// Refresh the countdown text.
    Countdown(Duration),
}

/// Pure transition logic; time is always passed in.
#[derive(Clone, Debug)]
pub struct RateLimitMachine {
    state: RateLimitState,
    dismissed_reset: Option<DateTime<Utc>>,
}

impl Default for RateLimitMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitMachine {
    /// Starts hidden with no dismissed marker.
    pub fn new() -> Self {
        Self {
            state: RateLimitState::Hidden,
            dismissed_reset: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> RateLimitState {
        self.state
    }

    /// Reset time the user last dismissed, if still relevant.
    pub fn dismissed_reset(&self) -> Option<DateTime<Utc>> {
        self.dismissed_reset
    }

    /// Handles a throttle report.
    pub fn on_throttle(&mut self, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Effect {
        let expired = self.expire(now);

        if self.dismissed_reset == Some(reset_at) {
            debug!(%reset_at, "Countdown was dismissed, suppressing");
            return expired;
        }
        if reset_at <= now {
            debug!(%reset_at, "Reset time already passed, not showing");
            return expired;
        }
        if self.state == RateLimitState::Showing(reset_at) {
            return Effect::None;
        }

        self.state = RateLimitState::Showing(reset_at);
        Effect::Show(reset_at)
    }

    /// Handles the user closing the countdown.
    pub fn on_dismiss(&mut self) -> Effect {
        match self.state {
            RateLimitState::Showing(reset_at) => {
                self.dismissed_reset = Some(reset_at);
                self.state = RateLimitState::Dismissed(reset_at);
                Effect::Hide
            }
            _ => Effect::None,
        }
    }

    /// Advances the countdown.
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> Effect {
        match self.expire(now) {
            Effect::None => match self.state {
                RateLimitState::Showing(reset_at) => {
                    Effect::Countdown((reset_at - now).to_std().unwrap_or(Duration::ZERO))
                }
                _ => Effect::None,
            },
            effect => effect,
        }
    }

    /// Moves to `Hidden` once the reset time passed and clears the marker.
    fn expire(&mut self, now: DateTime<Utc>) -> Effect {
        if self.dismissed_reset.is_some_and(|reset| now >= reset) {
            self.dismissed_reset = None;
        }

        match self.state {
            RateLimitState::Showing(reset_at) if now >= reset_at => {
                self.state = RateLimitState::Hidden;
                Effect::Hide
            }
            RateLimitState::Dismissed(reset_at) if now >= reset_at => {
                self.state = RateLimitState::Hidden;
                Effect::None
            }
            _ => Effect::None,
        }
    }
}

impl RateLimitState {
    /// Lowercase state name.
    pub fn name(&self) -> &'static str {
        match self {
            RateLimitState::Hidden => "hidden",
            RateLimitState::Showing(_) => "showing",
            RateLimitState::Dismissed(_) => "dismissed",
        }
    }

    /// Reset time of the current countdown, if any.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RateLimitState::Hidden => None,
            RateLimitState::Showing(reset_at) | RateLimitState::Dismissed(reset_at) => Some(*reset_at),
        }
    }
}

/// Snapshot of the rate-limit status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// "hidden", "showing" or "dismissed"
    pub state: &'static str,
    /// When the throttle lifts
    pub reset_at: Option<DateTime<Utc>>,
    /// Whole seconds until the throttle lifts
    pub remaining_seconds: Option<u64>,
}

/// Drives a [`RateLimitMachine`] and forwards its effects to a [`Notifier`].
pub struct RateLimitMonitor {
    machine: Mutex<RateLimitMachine>,
    notifier: Arc<dyn Notifier>,
    fallback: Duration,
}

impl RateLimitMonitor {
    /// Creates a monitor. `fallback` is the horizon used for reports without a reset time.
    pub fn new(notifier: Arc<dyn Notifier>, fallback: Duration) -> Self {
        Self {
            machine: Mutex::new(RateLimitMachine::new()),
            notifier,
            fallback,
        }
    }

    /// Records a throttle report from the remote API.
    pub fn report(&self, reset_at: Option<DateTime<Utc>>) {
        self.report_at(reset_at, Utc::now());
    }

    /// Records a throttle report observed at `now`.
    ///
    /// A report without a reset time joins the countdown already running, if
    /// its reset is still ahead; otherwise it starts one `fallback` from now.
    pub fn report_at(&self, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        let mut machine = self.machine.lock();
        let reset_at = reset_at
            .or_else(|| machine.state().reset_at().filter(|reset| *reset > now))
            .unwrap_or_else(|| {
                now + chrono::Duration::from_std(self.fallback).unwrap_or(chrono::Duration::zero())
            });
        let effect = machine.on_throttle(reset_at, now);
        self.apply(effect);
    }

    /// Closes the countdown on behalf of the user.
    pub fn dismiss(&self) {
        let mut machine = self.machine.lock();
        let effect = machine.on_dismiss();
        if effect == Effect::Hide {
            info!("Rate limit countdown dismissed");
        }
        self.apply(effect);
    }

    /// Advances the countdown to the current time.
    pub fn tick(&self) {
        self.tick_at(Utc::now());
    }

    /// Advances the countdown to `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) {
        let mut machine = self.machine.lock();
        let effect = machine.on_tick(now);
        self.apply(effect);
    }

    /// Returns the current state.
    pub fn state(&self) -> RateLimitState {
        self.machine.lock().state()
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> RateLimitStatus {
        let now = Utc::now();
        let state = self.state();
        let reset_at = state.reset_at();
        RateLimitStatus {
            state: state.name(),
            reset_at,
            remaining_seconds: reset_at.map(|reset| (reset - now).num_seconds().max(0) as u64),
        }
    }

    /// Spawns a task ticking the countdown every `interval`.
    pub fn spawn_ticker(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                monitor.tick();
            }
        })
    }

    /// Runs under the machine lock so notifications follow transition order.
    fn apply(&self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Show(reset_at) => {
                info!(%reset_at, "Showing rate limit countdown");
                self.notifier.show(reset_at);
            }
            Effect::Hide => self.notifier.hide(),
            Effect::Countdown(remaining) => self.notifier.countdown(remaining),
        }
    }
}

/// Formats a countdown as `"{m}m {s}s"`, or `"{s}s"` under a minute.
///
/// Partial seconds round up so the display never reads zero early.
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    let minutes = total / 60;
    let seconds = total % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn show(&self, reset_at: DateTime<Utc>) {
            self.events.lock().push(format!("show {}", reset_at.timestamp()));
        }
        fn hide(&self) {
            self.events.lock().push("hide".into());
        }
        fn countdown(&self, remaining: Duration) {
            self.events.lock().push(format!("tick {}", remaining.as_secs()));
        }
    }

    #[test]
    fn test_throttle_shows_countdown() {
        let mut machine = RateLimitMachine::new();
        assert_eq!(machine.on_throttle(at(60), at(0)), Effect::Show(at(60)));
        assert_eq!(machine.state(), RateLimitState::Showing(at(60)));
    }

    #[test]
    fn test_same_reset_while_showing_is_noop() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));
        assert_eq!(machine.on_throttle(at(60), at(5)), Effect::None);
    }

    #[test]
    fn test_new_reset_while_showing_replaces() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));
        assert_eq!(machine.on_throttle(at(90), at(5)), Effect::Show(at(90)));
        assert_eq!(machine.state(), RateLimitState::Showing(at(90)));
    }

    #[test]
    fn test_dismissed_reset_is_suppressed() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));
        assert_eq!(machine.on_dismiss(), Effect::Hide);
        assert_eq!(machine.state(), RateLimitState::Dismissed(at(60)));

        assert_eq!(machine.on_throttle(at(60), at(10)), Effect::None);
        assert_eq!(machine.state(), RateLimitState::Dismissed(at(60)));
    }

    #[test]
    fn test_different_reset_after_dismiss_shows() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));
        machine.on_dismiss();

        assert_eq!(machine.on_throttle(at(120), at(10)), Effect::Show(at(120)));
        assert_eq!(machine.state(), RateLimitState::Showing(at(120)));
    }

    #[test]
    fn test_expiry_clears_dismissed_marker() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));
        machine.on_dismiss();

        assert_eq!(machine.on_tick(at(61)), Effect::None);
        assert_eq!(machine.state(), RateLimitState::Hidden);
        assert_eq!(machine.dismissed_reset(), None);

        assert_eq!(machine.on_throttle(at(900), at(62)), Effect::Show(at(900)));
    }

    #[test]
    fn test_throttle_after_reset_passed_without_tick() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));
        machine.on_dismiss();

        // No tick ran; the report itself notices the old reset passed.
        assert_eq!(machine.on_throttle(at(300), at(100)), Effect::Show(at(300)));
        assert_eq!(machine.dismissed_reset(), None);
    }

    #[test]
    fn test_tick_counts_down_then_hides() {
        let mut machine = RateLimitMachine::new();
        machine.on_throttle(at(60), at(0));

        assert_eq!(machine.on_tick(at(15)), Effect::Countdown(Duration::from_secs(45)));
        assert_eq!(machine.on_tick(at(60)), Effect::Hide);
        assert_eq!(machine.state(), RateLimitState::Hidden);
        assert_eq!(machine.on_tick(at(61)), Effect::None);
    }

    #[test]
    fn test_reset_in_the_past_is_ignored() {
        let mut machine = RateLimitMachine::new();
        assert_eq!(machine.on_throttle(at(0), at(10)), Effect::None);
        assert_eq!(machine.state(), RateLimitState::Hidden);
    }

    #[test]
    fn test_dismiss_when_hidden_is_noop() {
        let mut machine = RateLimitMachine::new();
        assert_eq!(machine.on_dismiss(), Effect::None);
        assert_eq!(machine.dismissed_reset(), None);
    }

    #[test]
    fn test_monitor_full_scenario() {
        let recorder = Arc::new(Recorder::default());
        let monitor = RateLimitMonitor::new(recorder.clone(), Duration::from_secs(900));

        monitor.report_at(Some(at(60)), at(0));
        monitor.tick_at(at(30));
        monitor.dismiss();
        monitor.report_at(Some(at(60)), at(31));
        monitor.tick_at(at(61));
        monitor.report_at(Some(at(200)), at(62));

        assert_eq!(
            *recorder.events.lock(),
            vec![
                format!("show {}", at(60).timestamp()),
                "tick 30".to_string(),
                "hide".to_string(),
                format!("show {}", at(200).timestamp()),
            ]
        );
    }

    #[test]
    fn test_monitor_uses_fallback_horizon() {
        let recorder = Arc::new(Recorder::default());
        let monitor = RateLimitMonitor::new(recorder.clone(), Duration::from_secs(900));

        monitor.report_at(None, at(0));

        assert_eq!(monitor.state(), RateLimitState::Showing(at(900)));
        assert_eq!(*recorder.events.lock(), vec![format!("show {}", at(900).timestamp())]);
    }

    #[test]
    fn test_report_without_reset_keeps_running_countdown() {
        let recorder = Arc::new(Recorder::default());
        let monitor = RateLimitMonitor::new(recorder.clone(), Duration::from_secs(900));

        monitor.report_at(None, at(0));
        monitor.report_at(None, at(1));
        monitor.report_at(None, at(2));

        assert_eq!(monitor.state(), RateLimitState::Showing(at(900)));
        assert_eq!(*recorder.events.lock(), vec![format!("show {}", at(900).timestamp())]);
    }

    #[test]
    fn test_report_without_reset_stays_dismissed() {
        let recorder = Arc::new(Recorder::default());
        let monitor = RateLimitMonitor::new(recorder.clone(), Duration::from_secs(900));

        monitor.report_at(None, at(0));
        monitor.dismiss();
        monitor.report_at(None, at(1));
        monitor.report_at(None, at(2));

        assert_eq!(monitor.state(), RateLimitState::Dismissed(at(900)));
        assert_eq!(
            *recorder.events.lock(),
            vec![format!("show {}", at(900).timestamp()), "hide".to_string()]
        );
    }

    #[test]
    fn test_report_without_reset_after_expiry_starts_new_countdown() {
        let recorder = Arc::new(Recorder::default());
        let monitor = RateLimitMonitor::new(recorder.clone(), Duration::from_secs(60));

        monitor.report_at(None, at(0));
        monitor.dismiss();
        monitor.report_at(None, at(60));

        assert_eq!(monitor.state(), RateLimitState::Showing(at(120)));
        assert_eq!(
            recorder.events.lock().last().cloned(),
            Some(format!("show {}", at(120).timestamp()))
        );
    }

    #[test]
    fn test_notifications_follow_state_under_contention() {
        let recorder = Arc::new(Recorder::default());
        let monitor = RateLimitMonitor::new(recorder.clone(), Duration::from_secs(900));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..=500 {
                    monitor.report_at(Some(at(1_000 + i)), at(0));
                }
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    monitor.dismiss();
                }
            });
        });

        let last = recorder.events.lock().last().cloned();
        match monitor.state() {
            RateLimitState::Showing(reset_at) => {
                assert_eq!(last, Some(format!("show {}", reset_at.timestamp())));
            }
            RateLimitState::Dismissed(_) => assert_eq!(last.as_deref(), Some("hide")),
            RateLimitState::Hidden => panic!("countdown should not expire"),
        }
    }

    #[test]
    fn test_status_snapshot() {
        let monitor = RateLimitMonitor::new(Arc::new(Recorder::default()), Duration::from_secs(900));
        let hidden = monitor.status();
        assert_eq!(hidden.state, "hidden");
        assert_eq!(hidden.remaining_seconds, None);

        let now = Utc::now();
        monitor.report_at(Some(now + chrono::Duration::seconds(120)), now);
        let showing = monitor.status();
        assert_eq!(showing.state, "showing");
        assert!(showing.remaining_seconds.is_some_and(|s| s <= 120 && s >= 110));

        monitor.dismiss();
        assert_eq!(monitor.status().state, "dismissed");
    }

    #[test_case(Duration::from_secs(0), "0s")]
    #[test_case(Duration::from_secs(59), "59s")]
    #[test_case(Duration::from_millis(59_200), "1m 0s")]
    #[test_case(Duration::from_secs(60), "1m 0s")]
    #[test_case(Duration::from_secs(754), "12m 34s")]
    fn test_format_countdown(remaining: Duration, expected: &str) {
        assert_eq!(format_countdown(remaining), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_hides_expired_countdown() {
        let recorder = Arc::new(Recorder::default());
        let monitor = Arc::new(RateLimitMonitor::new(recorder.clone(), Duration::from_secs(900)));

        // Reset already behind wall-clock time by the first tick.
        let now = Utc::now();
        monitor.report_at(Some(now - chrono::Duration::seconds(1)), now - chrono::Duration::seconds(10));
        assert!(matches!(monitor.state(), RateLimitState::Showing(_)));

        let handle = monitor.spawn_ticker(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.abort();

        assert_eq!(monitor.state(), RateLimitState::Hidden);
        assert_eq!(recorder.events.lock().last().map(String::as_str), Some("hide"));
    }
}
