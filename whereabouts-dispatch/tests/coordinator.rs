//! End-to-end behaviour of the lookup coordinator against a scripted fetcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use whereabouts_cache::MemoryStore;
use whereabouts_core::traits::{Notifier, RemoteFetch};
use whereabouts_core::types::{AccountLocation, CacheEntry, FetchOutcome};
use whereabouts_core::WhereaboutsConfig;
use whereabouts_dispatch::{Collaborators, Coordinator, SessionGate};

fn located(key: &str) -> AccountLocation {
    AccountLocation {
        account_based_in: Some(format!("home of {key}")),
        connected_via: Some("Web".into()),
        created_at: None,
    }
}

struct ScriptedFetcher {
    latency: Duration,
    outcomes: Mutex<HashMap<String, FetchOutcome>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            outcomes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn script(&self, key: &str, outcome: FetchOutcome) {
        self.outcomes.lock().insert(key.to_string(), outcome);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl RemoteFetch for ScriptedFetcher {
    async fn fetch(&self, key: &str) -> FetchOutcome {
        self.calls.lock().push(key.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if key == "boom" {
            panic!("scripted panic");
        }
        self.outcomes
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| FetchOutcome::Success(Some(located(key))))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    shown: Mutex<Vec<DateTime<Utc>>>,
    hidden: AtomicUsize,
}

impl Notifier for RecordingNotifier {
    fn show(&self, reset_at: DateTime<Utc>) {
        self.shown.lock().push(reset_at);
    }

    fn hide(&self) {
        self.hidden.fetch_add(1, Ordering::SeqCst);
    }
}

async fn coordinator(fetcher: &Arc<ScriptedFetcher>) -> Coordinator {
    Coordinator::new(WhereaboutsConfig::default(), Collaborators::new(fetcher.clone()))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_lookups_share_one_fetch() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(100));
    let coordinator = coordinator(&fetcher).await;

    let (a, b, c) = tokio::join!(
        coordinator.lookup("alice"),
        coordinator.lookup("Alice"),
        coordinator.lookup("  ALICE "),
    );

    assert_eq!(fetcher.calls(), vec!["alice".to_string()]);
    assert_eq!(a, Some(located("alice")));
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(coordinator.dispatch_stats().pending_keys, 0);
}

#[tokio::test(start_paused = true)]
async fn test_many_waiters_one_fetch() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(50));
    let coordinator = coordinator(&fetcher).await;

    let lookups = (0..25).map(|_| coordinator.lookup("carol"));
    let results = futures::future::join_all(lookups).await;

    assert_eq!(fetcher.calls_for("carol"), 1);
    assert!(results.iter().all(|r| *r == Some(located("carol"))));
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_fetch() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let coordinator = coordinator(&fetcher).await;

    let first = coordinator.lookup("alice").await;
    let second = coordinator.lookup("alice").await;

    assert_eq!(first, second);
    assert_eq!(fetcher.calls_for("alice"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_success_is_refetched() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let coordinator = coordinator(&fetcher).await;
    let stale = AccountLocation {
        account_based_in: Some("Old".into()),
        ..Default::default()
    };
    coordinator.cache().insert(CacheEntry::with_timestamp(
        "bob",
        Some(stale),
        false,
        Utc::now() - chrono::Duration::hours(25),
    ));

    let result = coordinator.lookup("bob").await;

    assert_eq!(result, Some(located("bob")));
    assert_eq!(fetcher.calls_for("bob"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_success_is_served_from_cache() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let coordinator = coordinator(&fetcher).await;
    let cached = AccountLocation {
        account_based_in: Some("Canada".into()),
        ..Default::default()
    };
    coordinator.cache().insert(CacheEntry::with_timestamp(
        "bob",
        Some(cached.clone()),
        false,
        Utc::now() - chrono::Duration::hours(1),
    ));

    assert_eq!(coordinator.lookup("bob").await, Some(cached));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_error_entries_use_short_ttl() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let coordinator = coordinator(&fetcher).await;
    let now = Utc::now();
    coordinator.cache().insert(CacheEntry::with_timestamp(
        "recent",
        None,
        true,
        now - chrono::Duration::minutes(29),
    ));
    coordinator.cache().insert(CacheEntry::with_timestamp(
        "stale",
        None,
        true,
        now - chrono::Duration::minutes(31),
    ));

    assert_eq!(coordinator.lookup("recent").await, None);
    assert_eq!(coordinator.lookup("stale").await, Some(located("stale")));
    assert_eq!(fetcher.calls(), vec!["stale".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_respects_concurrency_ceiling() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(100));
    let coordinator = coordinator(&fetcher).await;

    let keys: Vec<String> = (0..10).map(|i| format!("user{i}")).collect();
    let results = futures::future::join_all(keys.iter().map(|k| coordinator.lookup(k))).await;

    assert!(results.iter().all(Option::is_some));
    assert_eq!(fetcher.calls().len(), 10);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(fetcher.peak.load(Ordering::SeqCst), 3);

    let stats = coordinator.dispatch_stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.dispatched_total, 10);
    assert!(stats.peak_active <= 3);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_order_is_fifo() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(20));
    let mut config = WhereaboutsConfig::default();
    config.dispatch.max_concurrent = 1;
    let coordinator = Coordinator::new(config, Collaborators::new(fetcher.clone()))
        .await
        .unwrap();

    let keys = ["dave", "erin", "frank", "grace"];
    futures::future::join_all(keys.iter().map(|k| coordinator.lookup(k))).await;

    assert_eq!(fetcher.calls(), keys.map(String::from).to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_queue_waits_for_session() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let gate = Arc::new(SessionGate::new());
    let coordinator = Coordinator::new(
        WhereaboutsConfig::default(),
        Collaborators::new(fetcher.clone()).with_readiness(gate.clone()),
    )
    .await
    .unwrap();

    let pending = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.lookup("alice").await })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(fetcher.calls().is_empty());
    assert_eq!(coordinator.dispatch_stats().queued, 1);
    assert_eq!(coordinator.dispatch_stats().pending_keys, 1);

    assert!(gate.mark_ready());

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("queued lookup should dispatch once the session is ready")
        .unwrap();
    assert_eq!(result, Some(located("alice")));
    assert_eq!(coordinator.dispatch_stats().queued, 0);
    assert_eq!(fetcher.calls_for("alice"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_shows_then_dismiss_suppresses() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let reset_at = Utc::now() + chrono::Duration::minutes(10);
    fetcher.script("alice", FetchOutcome::RateLimited { reset_at: Some(reset_at) });
    fetcher.script("bob", FetchOutcome::RateLimited { reset_at: Some(reset_at) });
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = Coordinator::new(
        WhereaboutsConfig::default(),
        Collaborators::new(fetcher.clone()).with_notifier(notifier.clone()),
    )
    .await
    .unwrap();

    assert_eq!(coordinator.lookup("alice").await, None);
    assert_eq!(*notifier.shown.lock(), vec![reset_at]);
    assert_eq!(coordinator.rate_limit_status().state, "showing");

    coordinator.dismiss_rate_limit();
    assert_eq!(notifier.hidden.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.rate_limit_status().state, "dismissed");

    assert_eq!(coordinator.lookup("bob").await, None);
    assert_eq!(notifier.shown.lock().len(), 1);

    let later = reset_at + chrono::Duration::minutes(5);
    fetcher.script("carol", FetchOutcome::RateLimited { reset_at: Some(later) });
    coordinator.lookup("carol").await;
    assert_eq!(*notifier.shown.lock(), vec![reset_at, later]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_reset_uses_fallback() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    fetcher.script("alice", FetchOutcome::RateLimited { reset_at: None });
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = Coordinator::new(
        WhereaboutsConfig::default(),
        Collaborators::new(fetcher.clone()).with_notifier(notifier.clone()),
    )
    .await
    .unwrap();

    let before = Utc::now();
    coordinator.lookup("alice").await;

    let shown = notifier.shown.lock().clone();
    assert_eq!(shown.len(), 1);
    let horizon = (shown[0] - before).num_seconds();
    assert!((895..=905).contains(&horizon), "horizon was {horizon}s");

    let entry = coordinator.cache().get("alice").unwrap();
    assert!(entry.is_error);
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_cached_as_error() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    fetcher.script("alice", FetchOutcome::Failure("HTTP 500".into()));
    let coordinator = coordinator(&fetcher).await;

    assert_eq!(coordinator.lookup("alice").await, None);
    assert_eq!(coordinator.lookup("alice").await, None);

    assert_eq!(fetcher.calls_for("alice"), 1);
    let entry = coordinator.cache().get("alice").unwrap();
    assert!(entry.is_error);
    assert_eq!(entry.value, None);
}

#[tokio::test(start_paused = true)]
async fn test_empty_success_is_not_an_error() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    fetcher.script("ghost", FetchOutcome::Success(None));
    let coordinator = coordinator(&fetcher).await;

    assert_eq!(coordinator.lookup("ghost").await, None);

    let entry = coordinator.cache().get("ghost").unwrap();
    assert!(!entry.is_error);
    assert_eq!(coordinator.rate_limit_status().state, "hidden");
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetch_resolves_waiters() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let coordinator = coordinator(&fetcher).await;

    let (a, b) = tokio::join!(coordinator.lookup("boom"), coordinator.lookup("boom"));

    assert_eq!((a, b), (None, None));
    assert!(coordinator.cache().get("boom").unwrap().is_error);
    assert_eq!(coordinator.dispatch_stats().active, 0);

    assert_eq!(coordinator.lookup("after").await, Some(located("after")));
}

#[tokio::test(start_paused = true)]
async fn test_empty_key_is_not_fetched() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let coordinator = coordinator(&fetcher).await;

    assert_eq!(coordinator.lookup("   ").await, None);
    assert!(fetcher.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_results_reach_the_store() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(
        WhereaboutsConfig::default(),
        Collaborators::new(fetcher.clone()).with_store(store.clone()),
    )
    .await
    .unwrap();

    coordinator.lookup("alice").await;
    coordinator.lookup("bob").await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let saved = store.snapshot();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved["alice"].value, Some(located("alice")));
}

#[tokio::test(start_paused = true)]
async fn test_persisted_entries_are_served_after_restart() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let store = Arc::new(MemoryStore::new());

    let first = Coordinator::new(
        WhereaboutsConfig::default(),
        Collaborators::new(fetcher.clone()).with_store(store.clone()),
    )
    .await
    .unwrap();
    first.lookup("alice").await;
    first.shutdown().await;

    let second = Coordinator::new(
        WhereaboutsConfig::default(),
        Collaborators::new(fetcher.clone()).with_store(store.clone()),
    )
    .await
    .unwrap();

    assert_eq!(second.lookup("alice").await, Some(located("alice")));
    assert_eq!(fetcher.calls_for("alice"), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let fetcher = ScriptedFetcher::new(Duration::from_millis(10));
    let mut config = WhereaboutsConfig::default();
    config.dispatch.max_concurrent = 0;

    let result = Coordinator::new(config, Collaborators::new(fetcher)).await;
    assert!(result.is_err());
}
