use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use vigil_test_support::fixtures::{
    flagged_response, provider_entry, settings_body, settings_config, settle, versioned_response,
};
use vigil_test_support::{CountingStore, HeldFetch, ScriptedFetchChannel, init_test_logging};
use vigil_tracker::{
    ConnectionType, ConnectivityNotifier, FetchResponse, PreferenceStore, ProviderSettings,
    ProviderSettingsTracker, Subscription, Tracker, TrackerMode, VersionedSettingsPolicy,
    clear_provider_overrides, keys, overrides_data_version, stored_provider_overrides,
};

const PAST_STARTUP: Duration = Duration::from_millis(7_001);
const BUILTIN_DATA_VERSION: i64 = 112;

struct Harness {
    tracker: ProviderSettingsTracker,
    channel: Arc<ScriptedFetchChannel>,
    store: Arc<CountingStore>,
    notifier: ConnectivityNotifier,
    hits: Arc<AtomicUsize>,
    _subscription: Subscription,
}

impl Harness {
    fn start(mode: TrackerMode, store: CountingStore) -> Self {
        init_test_logging();
        let channel = ScriptedFetchChannel::new();
        let store = Arc::new(store);
        let notifier = ConnectivityNotifier::new();
        let tracker = Tracker::spawn(
            settings_config().with_mode(mode),
            VersionedSettingsPolicy::new(),
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

    fn at_version_five() -> Self {
        Self::start(
            TrackerMode::Normal,
            CountingStore::with_entries([(keys::LAST_KNOWN_VERSION, json!(5))]),
        )
    }

    fn notifications(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn first_fetch(&self) -> HeldFetch {
        self.tracker.request_server_check().expect("tracker running");
        tokio::time::sleep(PAST_STARTUP).await;
        self.channel.next_fetch().await.expect("fetch issued")
    }

    async fn refetch(&self) -> HeldFetch {
        self.notifier.notify(ConnectionType::Wifi);
        self.channel.next_fetch().await.expect("refetch issued")
    }
}

fn two_providers() -> String {
    settings_body(&[provider_entry("Alpha", 1), provider_entry("Beta", 2)])
}

#[tokio::test(start_paused = true)]
async fn startup_delay_is_seven_seconds() {
    let harness = Harness::at_version_five();
    harness.tracker.request_server_check().expect("tracker running");

    tokio::time::sleep(Duration::from_millis(6_900)).await;
    assert_eq!(harness.channel.issued(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.channel.issued(), 1);
    assert_eq!(
        harness.channel.requests()[0].url.as_str(),
        vigil_test_support::fixtures::SETTINGS_CHECK_URL
    );
}

#[tokio::test(start_paused = true)]
async fn newer_version_replaces_overrides() {
    let harness = Harness::at_version_five();
    assert_eq!(harness.tracker.current().version, 5);

    let held = harness.first_fetch().await;
    assert!(held.respond(versioned_response(two_providers(), 7)));
    settle().await;

    let current = harness.tracker.current();
    assert_eq!(current.version, 7);
    assert_eq!(current.overrides.len(), 2);
    assert_eq!(harness.notifications(), 1);
    assert_eq!(harness.store.writes(), 1);
    assert_eq!(harness.store.get_int(keys::LAST_KNOWN_VERSION), Some(7));

    let typed = stored_provider_overrides(harness.store.as_ref());
    let names: Vec<&str> = typed.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Beta"]);
    assert_eq!(
        overrides_data_version(harness.store.as_ref(), BUILTIN_DATA_VERSION),
        7
    );
}

#[tokio::test(start_paused = true)]
async fn same_version_is_not_reapplied() {
    let harness = Harness::at_version_five();
    let held = harness.first_fetch().await;
    assert!(held.respond(versioned_response(two_providers(), 7)));
    settle().await;
    let accepted = harness.store.snapshot();
    let writes = harness.store.writes();

    let held = harness.refetch().await;
    assert!(held.respond(versioned_response(
        settings_body(&[provider_entry("Gamma", 3), provider_entry("Delta", 4)]),
        7
    )));
    settle().await;

    assert_eq!(harness.notifications(), 1);
    assert_eq!(harness.store.writes(), writes);
    assert_eq!(harness.store.snapshot(), accepted);
    assert_eq!(harness.tracker.current().overrides.len(), 2);
    assert_eq!(
        harness.tracker.current().overrides[0]["name"],
        json!("Alpha")
    );
}

#[tokio::test(start_paused = true)]
async fn missing_version_header_changes_nothing() {
    let harness = Harness::at_version_five();
    let before = harness.store.snapshot();

    let held = harness.first_fetch().await;
    let response = FetchResponse::from_body(two_providers())
        .with_header(vigil_tracker::policy::versioned::SUGGESTIONS_HEADER, "1");
    assert!(held.respond(response));
    settle().await;

    assert_eq!(harness.store.writes(), 0);
    assert_eq!(harness.store.snapshot(), before);
    assert_eq!(harness.notifications(), 0);
    assert_eq!(harness.tracker.current().version, 5);
}

#[tokio::test(start_paused = true)]
async fn short_override_list_keeps_version_but_records_flag() {
    let harness = Harness::at_version_five();

    let held = harness.first_fetch().await;
    let body = settings_body(&[provider_entry("Solo", 1)]);
    assert!(held.respond(flagged_response(body, 8, 1)));
    settle().await;

    assert_eq!(harness.store.writes(), 1);
    assert_eq!(harness.store.get_int(keys::ENABLE_SERVER_SUGGESTIONS), Some(1));
    assert_eq!(harness.store.get_int(keys::LAST_KNOWN_VERSION), Some(5));
    assert_eq!(harness.notifications(), 0);

    harness.tracker.request_server_check().expect("tracker running");
    let retry = harness.channel.next_fetch().await.expect("rejection allows retry");
    assert!(retry.respond(flagged_response(two_providers(), 8, 0)));
    settle().await;

    assert_eq!(harness.tracker.current().version, 8);
    assert_eq!(harness.store.get_int(keys::ENABLE_SERVER_SUGGESTIONS), Some(0));
    assert_eq!(harness.notifications(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_bodies_are_dropped() {
    let harness = Harness::at_version_five();
    let mut held = harness.first_fetch().await;

    for body in ["<html>oops</html>", "{\"a\":1}", "{truncated", "{\"search_provider_overrides\": 3}"] {
        assert!(held.respond(versioned_response(body, 9)));
        settle().await;
        assert_eq!(harness.tracker.current().version, 5);
        harness.tracker.request_server_check().expect("tracker running");
        held = harness.channel.next_fetch().await.expect("retry issued");
    }

    assert!(!held.is_abandoned());
    assert_eq!(harness.store.writes(), 0);
    assert_eq!(harness.notifications(), 0);
    assert_eq!(harness.channel.issued(), 5);
}

#[tokio::test(start_paused = true)]
async fn initial_value_reads_persisted_overrides() {
    let seeded = [
        (keys::LAST_KNOWN_VERSION, json!(4)),
        (
            keys::PROVIDER_OVERRIDES,
            json!([provider_entry("Alpha", 1), provider_entry("Beta", 2)]),
        ),
        (keys::PROVIDER_OVERRIDES_VERSION, json!(4)),
    ];

    let normal = Harness::start(TrackerMode::Normal, CountingStore::with_entries(seeded.clone()));
    assert_eq!(normal.tracker.current().version, 4);
    assert_eq!(normal.tracker.current().overrides.len(), 2);

    let fixed = Harness::start(TrackerMode::Fixed, CountingStore::with_entries(seeded));
    assert_eq!(fixed.tracker.current(), ProviderSettings::unknown());

    clear_provider_overrides(normal.store.as_ref()).expect("memory write");
    assert!(stored_provider_overrides(normal.store.as_ref()).is_empty());
    assert_eq!(
        overrides_data_version(normal.store.as_ref(), BUILTIN_DATA_VERSION),
        BUILTIN_DATA_VERSION
    );
}
