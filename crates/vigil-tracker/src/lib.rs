#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Deferred, network-aware tracker for small pieces of server-provided
//! configuration.
//!
//! A tracker sleeps through startup, fetches on explicit request or when
//! connectivity returns, validates the response through a [`ResponsePolicy`],
//! persists accepted values and notifies subscribers. At most one fetch is in
//! flight at a time and every failure degrades to "keep the last known value".
//!
//! Layout: `machine.rs` (refresh state machine), `engine.rs` (policy, store
//! and fan-out around the machine), `tracker.rs` (owner task and handle),
//! `policy/` (domain and versioned settings validation), `store/`
//! (preference persistence), `fetch.rs`, `connectivity.rs`, `subscribers.rs`.

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod machine;
pub mod policy;
pub mod store;
pub mod subscribers;
pub mod tracker;

pub use config::{TrackerConfig, TrackerMode};
pub use connectivity::{ConnectionType, ConnectivityNotifier, ConnectivitySource, ConnectivityStream};
pub use engine::{FetchTicket, TrackerEngine};
pub use error::{FetchError, StoreError, StoreResult, TrackerError, TrackerResult};
pub use fetch::{FetchChannel, FetchRequest, FetchResponse, HttpFetchChannel};
pub use machine::{RequestId, TrackerPhase};
pub use policy::{
    DomainPolicy, Evaluation, ProviderOverride, ProviderSettings, Rejection, ResponsePolicy,
    VersionedSettingsPolicy, clear_provider_overrides, overrides_data_version,
    stored_provider_overrides,
};
pub use store::{JsonFilePreferences, MemoryPreferences, PreferenceStore, keys};
pub use subscribers::{SubscriberRegistry, Subscription};
pub use tracker::{DomainTracker, ProviderSettingsTracker, Tracker};
