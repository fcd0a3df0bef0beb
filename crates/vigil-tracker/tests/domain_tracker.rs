use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use vigil_test_support::fixtures::{domain_config, settle};
use vigil_test_support::{CountingStore, ScriptedFetchChannel, init_test_logging};
use vigil_tracker::{
    ConnectionType, ConnectivityNotifier, DomainPolicy, DomainTracker, FetchError, FetchResponse,
    PreferenceStore, Subscription, Tracker, TrackerConfig, TrackerMode, TrackerPhase, keys,
};

const PAST_STARTUP: Duration = Duration::from_millis(5_001);

struct Harness {
    tracker: DomainTracker,
    channel: Arc<ScriptedFetchChannel>,
    store: Arc<CountingStore>,
    notifier: ConnectivityNotifier,
    hits: Arc<AtomicUsize>,
    _subscription: Subscription,
}

impl Harness {
    fn start(config: TrackerConfig, store: CountingStore) -> Self {
        init_test_logging();
        let channel = ScriptedFetchChannel::new();
        let store = Arc::new(store);
        let notifier = ConnectivityNotifier::new();
        let tracker = Tracker::spawn(
            config,
            DomainPolicy::search_domain(),
            channel.clone(),
            store.clone(),
            &notifier,
        )
        .expect("tracker spawns");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let subscription = tracker.register_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        Self {
            tracker,
            channel,
            store,
            notifier,
            hits,
            _subscription: subscription,
        }
    }

    fn normal() -> Self {
        Self::start(domain_config(), CountingStore::new())
    }

    fn notifications(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn awake_with_request(&self) -> vigil_test_support::HeldFetch {
        self.tracker.request_server_check().expect("tracker running");
        tokio::time::sleep(PAST_STARTUP).await;
        self.channel.next_fetch().await.expect("fetch issued")
    }
}

#[tokio::test(start_paused = true)]
async fn startup_without_request_issues_no_fetch() {
    let harness = Harness::start(
        domain_config(),
        CountingStore::with_entries([(keys::LAST_KNOWN_VALUE, json!("https://www.google.com/"))]),
    );
    assert!(init_test_logging(), "suite renders tracker events");

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(harness.channel.issued(), 0);
    assert_eq!(
        harness.tracker.phase().await.expect("tracker running"),
        TrackerPhase::Idle {
            need_to_load: false,
            already_loaded: false
        }
    );
    assert_eq!(harness.tracker.current().as_str(), "https://www.google.com/");
}

#[tokio::test(start_paused = true)]
async fn requests_wait_for_startup_delay() {
    let harness = Harness::normal();
    harness.tracker.request_server_check().expect("tracker running");
    harness.tracker.request_server_check().expect("tracker running");

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(harness.channel.issued(), 0);
    assert_eq!(
        harness.tracker.phase().await.expect("tracker running"),
        TrackerPhase::Sleeping { need_to_load: true }
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.channel.issued(), 1);
    let held = harness.channel.next_fetch().await.expect("fetch issued");
    assert!(held.request().bypass_cache);
    assert_eq!(held.request().url.path(), "/searchdomaincheck");
}

#[tokio::test(start_paused = true)]
async fn accepted_domain_updates_value_store_and_subscribers() {
    let harness = Harness::normal();
    let mut updates = harness.tracker.subscribe_updates();

    let held = harness.awake_with_request().await;
    assert!(held.respond(FetchResponse::from_body(".google.de")));
    settle().await;

    assert_eq!(harness.tracker.current().as_str(), "https://www.google.de/");
    assert_eq!(
        harness.store.get_string(keys::LAST_KNOWN_VALUE).as_deref(),
        Some("https://www.google.de/")
    );
    assert_eq!(harness.store.writes(), 1);
    assert_eq!(harness.notifications(), 1);
    assert!(updates.has_changed().expect("tracker value alive"));
    assert_eq!(updates.borrow_and_update().as_str(), "https://www.google.de/");
    assert_eq!(
        harness.tracker.phase().await.expect("tracker running"),
        TrackerPhase::Idle {
            need_to_load: false,
            already_loaded: true
        }
    );
}

#[tokio::test(start_paused = true)]
async fn foreign_domain_is_rejected_silently() {
    let harness = Harness::normal();

    let held = harness.awake_with_request().await;
    assert!(held.respond(FetchResponse::from_body(".evil.com")));
    settle().await;

    assert_eq!(harness.tracker.current().as_str(), "https://www.google.com/");
    assert_eq!(harness.store.writes(), 0);
    assert_eq!(harness.notifications(), 0);
    assert_eq!(
        harness.tracker.phase().await.expect("tracker running"),
        TrackerPhase::Idle {
            need_to_load: false,
            already_loaded: false
        }
    );
}

#[tokio::test(start_paused = true)]
async fn transport_failure_retries_on_next_trigger() {
    let harness = Harness::normal();

    let held = harness.awake_with_request().await;
    assert!(held.fail(FetchError::Unavailable { reason: "offline" }));
    settle().await;
    assert_eq!(harness.notifications(), 0);

    harness.tracker.request_server_check().expect("tracker running");
    let retry = harness.channel.next_fetch().await.expect("retry issued");
    assert!(retry.respond(FetchResponse::from_body(".google.fr")));
    settle().await;

    assert_eq!(harness.channel.issued(), 2);
    assert_eq!(harness.tracker.current().as_str(), "https://www.google.fr/");
    assert_eq!(harness.notifications(), 1);
}

#[tokio::test(start_paused = true)]
async fn triggers_during_flight_are_coalesced() {
    let harness = Harness::normal();
    let first = harness.awake_with_request().await;

    for _ in 0..5 {
        harness.tracker.request_server_check().expect("tracker running");
    }
    harness.notifier.notify(ConnectionType::None);
    harness.notifier.notify(ConnectionType::Wifi);
    harness.notifier.notify(ConnectionType::Ethernet);
    settle().await;
    assert_eq!(harness.channel.issued(), 1);

    assert!(first.respond(FetchResponse::from_body(".google.de")));
    settle().await;
    assert_eq!(harness.channel.issued(), 2);

    let second = harness.channel.next_fetch().await.expect("follow-up issued");
    assert!(second.respond(FetchResponse::from_body(".google.de")));
    settle().await;

    assert_eq!(harness.channel.issued(), 2);
    assert_eq!(harness.notifications(), 1);
    assert_eq!(harness.store.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn connectivity_returning_refetches_once() {
    let harness = Harness::normal();
    let held = harness.awake_with_request().await;
    assert!(held.respond(FetchResponse::from_body(".google.de")));
    settle().await;

    harness.notifier.notify(ConnectionType::None);
    settle().await;
    assert_eq!(harness.channel.issued(), 1);

    harness.notifier.notify(ConnectionType::Cellular3g);
    settle().await;
    assert_eq!(harness.channel.issued(), 2);

    let refetch = harness.channel.next_fetch().await.expect("refetch issued");
    assert!(refetch.respond(FetchResponse::from_body(".google.de")));
    settle().await;
    assert_eq!(harness.notifications(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_fetch() {
    let harness = Harness::normal();
    let held = harness.awake_with_request().await;

    harness.tracker.shutdown().await.expect("shutdown succeeds");
    settle().await;

    assert!(held.is_abandoned());
    assert!(!held.respond(FetchResponse::from_body(".google.de")));
    settle().await;

    assert_eq!(harness.tracker.current().as_str(), "https://www.google.com/");
    assert_eq!(harness.store.writes(), 0);
    assert_eq!(harness.notifications(), 0);
    assert_eq!(harness.notifier.subscriber_count(), 0);
    assert!(harness.tracker.request_server_check().is_err());
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_tracker() {
    let Harness {
        tracker,
        channel,
        notifier,
        _subscription,
        ..
    } = Harness::normal();
    tracker.request_server_check().expect("tracker running");
    tokio::time::sleep(PAST_STARTUP).await;
    let held = channel.next_fetch().await.expect("fetch issued");

    drop(tracker);
    settle().await;

    assert!(held.is_abandoned());
    assert_eq!(notifier.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fixed_mode_pins_default_and_never_wakes_itself() {
    let harness = Harness::start(
        domain_config().with_mode(TrackerMode::Fixed),
        CountingStore::with_entries([(keys::LAST_KNOWN_VALUE, json!("https://www.google.fr/"))]),
    );
    assert_eq!(harness.tracker.current().as_str(), "https://www.google.com/");

    harness.tracker.request_server_check().expect("tracker running");
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert_eq!(harness.channel.issued(), 0);

    harness.tracker.finish_sleep().expect("tracker running");
    let held = harness.channel.next_fetch().await.expect("fetch issued");
    assert!(held.respond(FetchResponse::from_body(".google.it")));
    settle().await;
    assert_eq!(harness.tracker.current().as_str(), "https://www.google.it/");
}

#[tokio::test(start_paused = true)]
async fn early_finish_sleep_makes_timer_a_no_op() {
    let harness = Harness::normal();
    harness.tracker.finish_sleep().expect("tracker running");
    harness.tracker.request_server_check().expect("tracker running");
    let held = harness.channel.next_fetch().await.expect("fetch issued");
    assert!(held.respond(FetchResponse::from_body(".google.de")));

    tokio::time::sleep(PAST_STARTUP).await;
    assert_eq!(harness.channel.issued(), 1);
    assert_eq!(harness.notifications(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_callbacks_stop_firing() {
    let harness = Harness::normal();
    let late_hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&late_hits);
    let subscription = harness.tracker.register_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    drop(subscription);

    let held = harness.awake_with_request().await;
    assert!(held.respond(FetchResponse::from_body(".google.de")));
    settle().await;

    assert_eq!(late_hits.load(Ordering::SeqCst), 0);
    assert_eq!(harness.notifications(), 1);
}
